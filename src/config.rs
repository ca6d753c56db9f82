use std::path::PathBuf;
use std::str::FromStr;

/// Process configuration, read from `FRONTDESK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    /// Appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 7878,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind: lookup("FRONTDESK_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "FRONTDESK_PORT").unwrap_or(defaults.port),
            data_dir: lookup("FRONTDESK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_connections: parsed::<usize>(&lookup, "FRONTDESK_MAX_CONNECTIONS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_connections),
            compact_threshold: parsed(&lookup, "FRONTDESK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parsed(&lookup, "FRONTDESK_METRICS_PORT"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("frontdesk.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        assert_eq!(from_pairs(&[]), Config::default());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = from_pairs(&[
            ("FRONTDESK_BIND", "127.0.0.1"),
            ("FRONTDESK_PORT", "9000"),
            ("FRONTDESK_DATA_DIR", "/var/lib/frontdesk"),
            ("FRONTDESK_COMPACT_THRESHOLD", "50"),
            ("FRONTDESK_METRICS_PORT", "9100"),
        ]);
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/frontdesk/frontdesk.wal"));
        assert_eq!(cfg.compact_threshold, 50);
        assert_eq!(cfg.metrics_port, Some(9100));
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let cfg = from_pairs(&[
            ("FRONTDESK_PORT", "seventy"),
            ("FRONTDESK_MAX_CONNECTIONS", "0"),
        ]);
        assert_eq!(cfg.port, 7878);
        assert_eq!(cfg.max_connections, 256);
    }
}
