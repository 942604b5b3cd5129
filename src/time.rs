use chrono::{DateTime, SecondsFormat, Utc};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// ISO-8601 UTC timestamp with millisecond precision, as stored on
/// notifications and members and written into export documents.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn to_date(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// `YYYY-MM-DD` for file names.
pub fn today_stamp() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
