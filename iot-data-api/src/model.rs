use serde::{Deserialize, Serialize};

/// One inverter telemetry sample as stored in `iot_data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Record {
    pub device: String,
    pub timestamp: String,
    pub pro_ver: i32,
    pub minor_ver: i32,
    pub sn: i64,
    pub model: String,
    pub tyield: f64,
    pub dyield: f64,
    pub pf: f64,
    pub pmax: f64,
    pub pac: f64,
    pub sac: f64,
    pub uab: f64,
    pub ubc: f64,
    pub uca: f64,
    pub ia: f64,
    pub ib: f64,
    pub ic: f64,
    pub freq: f64,
    pub tmod: f64,
    pub tamb: f64,
    pub mode: String,
    pub qac: i32,
    pub bus_capacitance: f64,
    pub ac_capacitance: f64,
    pub pdc: f64,
    pub pmax_lim: f64,
    pub smax_lim: f64,
    pub is_sent: bool,
    pub reg_timestamp: String,
}

/// Envelope returned by the latest-record endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleRecordResponse {
    pub data: Record,
}
