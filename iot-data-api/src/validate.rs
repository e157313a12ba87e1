use crate::errors::{Error, Result};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 1000;

pub const LIMIT_PARAM: &str = "recent_count";
pub const WITHIN_ONE_HOUR_PARAM: &str = "within_one_hour";
pub const CURSOR_PARAM: &str = "after";

/// Raw query string of the list endpoint. Every field is kept as text so
/// malformed values reach the clamping rules instead of being rejected by
/// the extractor.
#[derive(Debug, Clone, Default)]
pub struct RecordParams {
    pub recent_count: Option<String>,
    pub within_one_hour: Option<String>,
    pub after: Option<String>,
}

impl RecordParams {
    /// Builds params from decoded query pairs. The first occurrence of a
    /// repeated key wins; unknown keys are ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = RecordParams::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                LIMIT_PARAM => &mut params.recent_count,
                WITHIN_ONE_HOUR_PARAM => &mut params.within_one_hour,
                CURSOR_PARAM => &mut params.after,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }
}

/// Parses the row limit. Absent, unparsable, non-positive and oversized
/// values all fall back to `DEFAULT_LIMIT`.
pub fn parse_limit(raw: Option<&str>) -> i64 {
    match raw.and_then(|s| s.parse::<i64>().ok()) {
        Some(limit) if limit > 0 && limit <= MAX_LIMIT => limit,
        _ => DEFAULT_LIMIT,
    }
}

/// Parses a boolean flag using the usual literal set (`1`, `t`, `TRUE`,
/// `False`, ...). Anything else is `false`.
pub fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw, Some("1" | "t" | "T" | "TRUE" | "true" | "True"))
}

/// Parses the point cursor. Unlike the other parameters a malformed cursor
/// is rejected, never defaulted.
pub fn parse_cursor(raw: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|_| Error::InvalidParameter {
        name: CURSOR_PARAM,
        value: raw.to_string(),
    })
}
