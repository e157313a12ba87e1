use crate::db::RecordStore;
use crate::errors::Result;
use crate::metrics::{
    QUERIES_TOTAL, QUERY_FAILURES_TOTAL, QUERY_LATENCY_SECONDS, RECORDS_RETURNED_TOTAL,
};
use crate::model::Record;
use crate::validate::{parse_cursor, parse_flag, parse_limit, RecordParams};
use chrono::{DateTime, Duration, Utc};
use tokio::time::Instant;
use tracing::debug;

pub const TABLE: &str = "iot_data";

/// Length of the trailing window used by `within_one_hour`.
pub const RECENT_WINDOW_SECS: i64 = 3600;

// Casts pin every column to the SQL type `Record` decodes.
const RECORD_COLUMNS: &str = "device, \
    timestamp::text AS timestamp, \
    pro_ver::int4 AS pro_ver, \
    minor_ver::int4 AS minor_ver, \
    sn::int8 AS sn, \
    model, \
    tyield::float8 AS tyield, \
    dyield::float8 AS dyield, \
    pf::float8 AS pf, \
    pmax::float8 AS pmax, \
    pac::float8 AS pac, \
    sac::float8 AS sac, \
    uab::float8 AS uab, \
    ubc::float8 AS ubc, \
    uca::float8 AS uca, \
    ia::float8 AS ia, \
    ib::float8 AS ib, \
    ic::float8 AS ic, \
    freq::float8 AS freq, \
    tmod::float8 AS tmod, \
    tamb::float8 AS tamb, \
    mode, \
    qac::int4 AS qac, \
    bus_capacitance::float8 AS bus_capacitance, \
    ac_capacitance::float8 AS ac_capacitance, \
    pdc::float8 AS pdc, \
    pmax_lim::float8 AS pmax_lim, \
    smax_lim::float8 AS smax_lim, \
    is_sent, \
    reg_timestamp::text AS reg_timestamp";

/// The query variants the API can issue against `iot_data`.
///
/// Timestamps are compared as integers (Unix seconds), which is what the
/// point cursor is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// Every record strictly after `cursor`, oldest first.
    After { cursor: i64, limit: i64 },
    /// Records at or after `since`, newest first.
    Recent { since: i64, limit: i64 },
    /// The newest `limit` records, returned oldest first.
    Default { limit: i64 },
    /// The single newest record.
    Latest,
}

impl QueryShape {
    /// Picks the shape for a list request. A cursor wins over the recency
    /// flag, which wins over the default.
    pub fn from_params(params: &RecordParams, now: DateTime<Utc>) -> Result<Self> {
        let limit = parse_limit(params.recent_count.as_deref());

        if let Some(raw) = params.after.as_deref() {
            let cursor = parse_cursor(raw)?;
            return Ok(QueryShape::After { cursor, limit });
        }

        if parse_flag(params.within_one_hour.as_deref()) {
            let since = (now - Duration::seconds(RECENT_WINDOW_SECS)).timestamp();
            return Ok(QueryShape::Recent { since, limit });
        }

        Ok(QueryShape::Default { limit })
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryShape::After { .. } => "after",
            QueryShape::Recent { .. } => "recent",
            QueryShape::Default { .. } => "default",
            QueryShape::Latest => "latest",
        }
    }

    pub fn limit(&self) -> i64 {
        match *self {
            QueryShape::After { limit, .. }
            | QueryShape::Recent { limit, .. }
            | QueryShape::Default { limit } => limit,
            QueryShape::Latest => 1,
        }
    }

    /// SQL text for this shape. Values are always bound as `$n` parameters,
    /// in the order documented on each arm.
    pub fn sql(&self) -> String {
        match self {
            // $1 cursor, $2 limit
            QueryShape::After { .. } => format!(
                "SELECT {} FROM {} WHERE timestamp > $1 ORDER BY timestamp ASC LIMIT $2",
                RECORD_COLUMNS, TABLE
            ),
            // $1 since, $2 limit
            QueryShape::Recent { .. } => format!(
                "SELECT {} FROM {} WHERE timestamp >= $1 ORDER BY timestamp DESC LIMIT $2",
                RECORD_COLUMNS, TABLE
            ),
            // $1 limit
            QueryShape::Default { .. } => format!(
                "SELECT {} FROM {} ORDER BY timestamp DESC LIMIT $1",
                RECORD_COLUMNS, TABLE
            ),
            QueryShape::Latest => format!(
                "SELECT {} FROM {} ORDER BY timestamp DESC LIMIT 1",
                RECORD_COLUMNS, TABLE
            ),
        }
    }

    /// Whether rows come back newest first but must be served oldest first.
    fn reverses_fetch_order(&self) -> bool {
        matches!(self, QueryShape::Default { .. })
    }
}

/// Runs `shape` against the store and returns the records in the order the
/// shape promises.
pub async fn fetch_records(store: &dyn RecordStore, shape: QueryShape) -> Result<Vec<Record>> {
    let label = shape.name();
    QUERIES_TOTAL.with_label_values(&[label]).inc();

    let start = Instant::now();
    let result = store.fetch(&shape).await;
    QUERY_LATENCY_SECONDS
        .with_label_values(&[label])
        .observe(start.elapsed().as_secs_f64());

    let mut records = match result {
        Ok(records) => records,
        Err(e) => {
            QUERY_FAILURES_TOTAL.with_label_values(&[label]).inc();
            return Err(e);
        }
    };

    if shape.reverses_fetch_order() {
        records.reverse();
    }

    RECORDS_RETURNED_TOTAL
        .with_label_values(&[label])
        .inc_by(records.len() as u64);
    debug!(shape = label, count = records.len(), "Fetched records");

    Ok(records)
}

/// Fetches the newest record, or `None` when the table is empty.
pub async fn fetch_latest(store: &dyn RecordStore) -> Result<Option<Record>> {
    let records = fetch_records(store, QueryShape::Latest).await?;
    Ok(records.into_iter().next())
}
