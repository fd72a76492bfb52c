use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::WheelhouseError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Capacity used when `max_threads = 0` and the host cannot report its
/// available parallelism.
pub const FALLBACK_CAPACITY: usize = 4;

/// Env var naming the active profile.
pub const PROFILE_ENV: &str = "WHEELHOUSE_PROFILE";

// ── Pool config ───────────────────────────────────────────────

/// Pool configuration. Set once at startup and immutable for the lifetime of
/// a runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum concurrent execution units. 0 = available parallelism.
    #[serde(default)]
    pub max_threads: usize,
    /// Pre-allocate `capacity` reusable units instead of one unit per dispatch.
    #[serde(default = "default_persistence")]
    pub persistence: bool,
    /// Default `cacheable` flag for submitted tasks.
    #[serde(default)]
    pub memoize: bool,
    /// No multi-unit primitive: run every task as a single range on an inline unit.
    #[serde(default)]
    pub legacy: bool,
    /// Verbose per-dispatch logging.
    #[serde(default)]
    pub debug: bool,
}

fn default_persistence() -> bool {
    true
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: 0,
            persistence: default_persistence(),
            memoize: false,
            legacy: false,
            debug: false,
        }
    }
}

impl PoolConfig {
    /// Defaults overridden by environment variables (call `load_dotenv()` first).
    ///
    /// Profile is read from `WHEELHOUSE_PROFILE`. When set (e.g. `BENCH`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse a TOML file, then apply environment overrides on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WheelhouseError> {
        let mut config = Self::from_toml_str(&std::fs::read_to_string(path)?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, WheelhouseError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `WHEELHOUSE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        let profile = env_opt(PROFILE_ENV).unwrap_or_default().to_uppercase();
        self.apply_overrides(&profile, env_opt);
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// ignored and the current setting is kept.
    pub fn apply_overrides<F>(&mut self, profile: &str, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            if !profile.is_empty() {
                if let Some(v) = lookup(&format!("{}_{}", profile, key)) {
                    return Some(v);
                }
            }
            lookup(key)
        };

        if let Some(n) = get("WHEELHOUSE_MAX_THREADS").and_then(|v| v.trim().parse().ok()) {
            self.max_threads = n;
        }
        if let Some(b) = get("WHEELHOUSE_PERSISTENCE").and_then(|v| parse_bool(&v)) {
            self.persistence = b;
        }
        if let Some(b) = get("WHEELHOUSE_MEMOIZE").and_then(|v| parse_bool(&v)) {
            self.memoize = b;
        }
        if let Some(b) = get("WHEELHOUSE_LEGACY").and_then(|v| parse_bool(&v)) {
            self.legacy = b;
        }
        if let Some(b) = get("WHEELHOUSE_DEBUG").and_then(|v| parse_bool(&v)) {
            self.debug = b;
        }
    }

    /// Effective pool capacity (always >= 1).
    pub fn resolved_capacity(&self) -> usize {
        if self.max_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(FALLBACK_CAPACITY)
        } else {
            self.max_threads
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Pool config loaded:");
        tracing::info!(
            "  capacity:    {} (max_threads={})",
            self.resolved_capacity(),
            self.max_threads
        );
        tracing::info!("  persistence: {}", self.persistence);
        tracing::info!("  memoize:     {}", self.memoize);
        tracing::info!("  legacy:      {}", self.legacy);
    }

    /// JSON view of the resolved settings.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "capacity": self.resolved_capacity(),
            "max_threads": self.max_threads,
            "persistence": self.persistence,
            "memoize": self.memoize,
            "legacy": self.legacy,
            "debug": self.debug,
        })
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_threads, 0);
        assert!(config.persistence);
        assert!(!config.memoize);
        assert!(!config.legacy);
        assert!(config.resolved_capacity() >= 1);
    }

    #[test]
    fn explicit_capacity() {
        let config = PoolConfig { max_threads: 6, ..Default::default() };
        assert_eq!(config.resolved_capacity(), 6);
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = PoolConfig::from_toml_str("max_threads = 3\nmemoize = true\n").unwrap();
        assert_eq!(config.max_threads, 3);
        assert!(config.memoize);
        assert!(config.persistence);
    }

    #[test]
    fn toml_rejects_wrong_types() {
        let err = PoolConfig::from_toml_str("max_threads = \"many\"").unwrap_err();
        assert!(matches!(err, WheelhouseError::ConfigParse(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_threads = 2").unwrap();
        writeln!(file, "persistence = false").unwrap();
        let config = PoolConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_threads, 2);
        assert!(!config.persistence);
    }

    #[test]
    fn overrides_apply_and_skip_garbage() {
        let mut config = PoolConfig::default();
        config.apply_overrides(
            "",
            lookup_from(&[
                ("WHEELHOUSE_MAX_THREADS", "8"),
                ("WHEELHOUSE_PERSISTENCE", "off"),
                ("WHEELHOUSE_MEMOIZE", "maybe"),
            ]),
        );
        assert_eq!(config.max_threads, 8);
        assert!(!config.persistence);
        assert!(!config.memoize);
    }

    #[test]
    fn profiled_key_wins_over_plain_key() {
        let mut config = PoolConfig::default();
        config.apply_overrides(
            "BENCH",
            lookup_from(&[
                ("WHEELHOUSE_MAX_THREADS", "2"),
                ("BENCH_WHEELHOUSE_MAX_THREADS", "16"),
                ("WHEELHOUSE_LEGACY", "true"),
            ]),
        );
        assert_eq!(config.max_threads, 16);
        assert!(config.legacy);
    }

    #[test]
    fn summary_reports_capacity() {
        let config = PoolConfig { max_threads: 5, ..Default::default() };
        assert_eq!(config.summary()["capacity"], 5);
    }
}
