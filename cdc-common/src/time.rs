use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;

/// Current time as seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
}

/// Current local time, formatted for log lines and diagnostics.
pub fn now_str() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Microseconds since the Postgres epoch (2000-01-01T00:00:00Z), the
/// `system_clock` field carried by every replication feedback message.
pub fn now_pg_epoch_micros() -> i64 {
    const PG_EPOCH_OFFSET_MICROS: i64 = 946_684_800_000_000;
    let unix_micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_micros() as i64;
    unix_micros - PG_EPOCH_OFFSET_MICROS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_secs_is_positive() {
        assert!(now_secs() > 0);
    }
}
