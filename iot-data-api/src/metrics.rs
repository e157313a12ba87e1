use crate::errors::Result;
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("iot_api_queries_total", "Total record queries by shape"),
        &["shape"]
    )
    .expect("valid queries_total metric");
    pub static ref QUERY_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "iot_api_query_failures_total",
            "Total record queries that failed in the database"
        ),
        &["shape"]
    )
    .expect("valid query_failures_total metric");
    pub static ref QUERY_LATENCY_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "iot_api_query_latency_seconds",
            "Time taken to fetch and decode records"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ]),
        &["shape"]
    )
    .expect("valid query_latency_seconds metric");
    pub static ref RECORDS_RETURNED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "iot_api_records_returned_total",
            "Total records returned to clients"
        ),
        &["shape"]
    )
    .expect("valid records_returned_total metric");
    pub static ref READINESS_FAILURES_TOTAL: IntCounter = IntCounter::with_opts(Opts::new(
        "iot_api_readiness_failures_total",
        "Total readiness probes that found the database unavailable"
    ))
    .expect("valid readiness_failures_total metric");
}

pub fn init_metrics() -> Result<()> {
    REGISTRY.register(Box::new(QUERIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUERY_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUERY_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(RECORDS_RETURNED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINESS_FAILURES_TOTAL.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
