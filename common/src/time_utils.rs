use time::OffsetDateTime;

/// Milliseconds since the unix epoch.
pub fn utc_now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
