use async_trait::async_trait;
use iot_data_api::db::RecordStore;
use iot_data_api::errors::{Error, Result};
use iot_data_api::model::Record;
use iot_data_api::query::QueryShape;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory stand-in for `iot_data` that answers each shape the way the
/// SQL does: filter, sort and limit on the integer timestamp.
#[derive(Default)]
pub struct MemoryStore {
    pub rows: Vec<Record>,
    pub fail_queries: bool,
    pub fail_ping: bool,
    pub ping_delay: Option<Duration>,
    pub fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn with_timestamps(timestamps: &[i64]) -> Self {
        Self {
            rows: timestamps.iter().map(|ts| record_at(*ts)).collect(),
            ..Default::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(&self, shape: &QueryShape) -> Result<Vec<Record>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }

        let ts = |r: &Record| r.timestamp.parse::<i64>().unwrap();
        let mut rows: Vec<Record> = self
            .rows
            .iter()
            .filter(|r| match *shape {
                QueryShape::After { cursor, .. } => ts(r) > cursor,
                QueryShape::Recent { since, .. } => ts(r) >= since,
                QueryShape::Default { .. } | QueryShape::Latest => true,
            })
            .cloned()
            .collect();

        match shape {
            QueryShape::After { .. } => rows.sort_by_key(|r| ts(r)),
            _ => rows.sort_by_key(|r| std::cmp::Reverse(ts(r))),
        }
        rows.truncate(shape.limit() as usize);
        Ok(rows)
    }

    async fn ping(&self) -> Result<()> {
        if let Some(delay) = self.ping_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_ping {
            return Err(Error::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

pub fn record_at(ts: i64) -> Record {
    Record {
        device: format!("INV-{}", ts % 7),
        timestamp: ts.to_string(),
        pro_ver: 1,
        minor_ver: 2,
        sn: 1_000_000 + ts,
        model: "SG5KTL".to_string(),
        tyield: 1000.0 + ts as f64,
        dyield: 12.5,
        pf: 0.98,
        pmax: 5.0,
        pac: 3.2,
        sac: 3.3,
        uab: 400.0,
        ubc: 401.0,
        uca: 399.0,
        ia: 4.6,
        ib: 4.7,
        ic: 4.5,
        freq: 50.0,
        tmod: 38.0,
        tamb: 21.0,
        mode: "RUN".to_string(),
        qac: -40,
        bus_capacitance: 1.1,
        ac_capacitance: 0.9,
        pdc: 3.4,
        pmax_lim: 100.0,
        smax_lim: 100.0,
        is_sent: ts % 2 == 0,
        reg_timestamp: (ts + 1).to_string(),
    }
}
