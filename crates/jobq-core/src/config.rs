//! Runtime configuration, persisted in the `config` table (spec §3, §6).
//!
//! Workers re-read every key from the store each poll tick (spec §9,
//! "Config hot-reload") — nothing here is cached across ticks.

/// The distinguished config entry workers observe between jobs to trigger
/// graceful shutdown (spec §3, "Control flags").
pub const STOP_FLAG_KEY: &str = "workers.stop";

/// `(key, default_value)` pairs seeded by `jobq init` (spec §6).
pub const DEFAULTS: &[(&str, &str)] = &[
    ("poll_interval_ms", "500"),
    ("base_backoff_seconds", "2"),
    ("max_backoff_seconds", "3600"),
    ("lease_duration_seconds", "60"),
    ("default_max_retries", "3"),
    ("exec_timeout_seconds", "30"),
    (STOP_FLAG_KEY, "0"),
];

/// Snapshot of the tunables a worker consults on each poll tick.
#[derive(Debug, Clone, Copy)]
pub struct WorkerTunables {
    pub poll_interval_ms: u64,
    pub base_backoff_seconds: i64,
    pub max_backoff_seconds: i64,
    pub lease_duration_seconds: i64,
    pub default_max_retries: i64,
    pub exec_timeout_seconds: u64,
}

impl WorkerTunables {
    /// Parse from the raw `(key, value)` rows of the `config` table, falling
    /// back to [`DEFAULTS`] for any key missing or unparsable.
    pub fn from_rows(rows: &[(String, String)]) -> Self {
        let get = |key: &str| -> Option<&str> {
            rows.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
        };
        let default_of = |key: &str| -> &'static str {
            DEFAULTS
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .unwrap_or("0")
        };
        let parse = |key: &str| -> i64 {
            get(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| default_of(key).parse().unwrap_or(0))
        };

        Self {
            poll_interval_ms: parse("poll_interval_ms").max(0) as u64,
            base_backoff_seconds: parse("base_backoff_seconds"),
            max_backoff_seconds: parse("max_backoff_seconds"),
            lease_duration_seconds: parse("lease_duration_seconds"),
            default_max_retries: parse("default_max_retries"),
            exec_timeout_seconds: parse("exec_timeout_seconds").max(0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_defaults_when_rows_missing() {
        let tunables = WorkerTunables::from_rows(&[]);
        assert_eq!(tunables.poll_interval_ms, 500);
        assert_eq!(tunables.base_backoff_seconds, 2);
        assert_eq!(tunables.max_backoff_seconds, 3600);
        assert_eq!(tunables.lease_duration_seconds, 60);
        assert_eq!(tunables.default_max_retries, 3);
        assert_eq!(tunables.exec_timeout_seconds, 30);
    }

    #[test]
    fn overrides_defaults_from_rows() {
        let rows = vec![
            ("poll_interval_ms".to_string(), "250".to_string()),
            ("max_backoff_seconds".to_string(), "60".to_string()),
        ];
        let tunables = WorkerTunables::from_rows(&rows);
        assert_eq!(tunables.poll_interval_ms, 250);
        assert_eq!(tunables.max_backoff_seconds, 60);
        // untouched keys still fall back
        assert_eq!(tunables.base_backoff_seconds, 2);
    }
}
