mod client;
mod env;
mod retry;

pub use client::ModuleClient;
pub use env::{env_or, EnvVars};
pub use retry::{retry, RetryPolicy};

/// Seconds since the unix epoch.
pub fn get_current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Calendar year of a unix timestamp, in UTC.
pub fn year_of(timestamp: i64) -> i32 {
    use chrono::Datelike;
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.year())
        .unwrap_or(1970)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_of_known_timestamps() {
        assert_eq!(year_of(0), 1970);
        // 2024-03-01T00:00:00Z
        assert_eq!(year_of(1_709_251_200), 2024);
    }

    #[test]
    fn current_timestamp_is_recent() {
        // after 2024-01-01
        assert!(get_current_timestamp() > 1_704_067_200);
    }
}
