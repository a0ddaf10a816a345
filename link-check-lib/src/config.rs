//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `LC_*`
//! environment variables, and merging configurations with proper precedence
//! rules. Precedence, highest first: CLI arguments (applied by the binary),
//! environment variables, local file, global file, XDG file, built-in
//! defaults.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [pool]
//! workers = 10
//! queue_capacity = 100
//! probe_timeout = "2s"
//! grace_period = "3s"
//!
//! [storage]
//! path = "storage.json"
//! ```

use crate::error::LinkCheckError;
use crate::types::PoolConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    /// HTTP listener settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    /// Worker pool settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolSection>,

    /// Snapshot file settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServerConfig {
    /// Address to listen on, e.g. "127.0.0.1:8080"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PoolSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,

    /// Probe timeout (as string, e.g. "2s", "500ms")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_timeout: Option<String>,

    /// Shutdown grace period (as string, e.g. "3s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    /// Location of the JSON snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl FileConfig {
    /// Overlay the values present in this file onto `config`.
    ///
    /// Only call on a validated config; unparsable durations are skipped.
    pub fn apply_to(&self, mut config: PoolConfig) -> PoolConfig {
        if let Some(pool) = &self.pool {
            if let Some(workers) = pool.workers {
                config = config.with_workers(workers);
            }
            if let Some(capacity) = pool.queue_capacity {
                config = config.with_queue_capacity(capacity);
            }
            if let Some(timeout) = pool.probe_timeout.as_deref().and_then(parse_duration_string) {
                config = config.with_probe_timeout(timeout);
            }
            if let Some(grace) = pool.grace_period.as_deref().and_then(parse_duration_string) {
                config = config.with_grace_period(grace);
            }
        }
        if let Some(path) = self.storage.as_ref().and_then(|s| s.path.clone()) {
            config = config.with_state_path(path);
        }
        config
    }

    /// Bind address from the `[server]` section, if any.
    pub fn bind(&self) -> Option<&str> {
        self.server.as_ref().and_then(|s| s.bind.as_deref())
    }
}

/// Configuration discovery and loading functionality.
#[derive(Debug, Default)]
pub struct ConfigManager;

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// `FileError` if the file is missing or unreadable, `ConfigError` if it
    /// is not valid TOML or fails validation.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, LinkCheckError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(LinkCheckError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            LinkCheckError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            LinkCheckError::config(format!("Failed to parse TOML configuration: {}", e))
        })?;

        self.validate_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// Files that fail to load are logged and skipped.
    pub fn discover_and_load(&self) -> FileConfig {
        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        let mut merged_config = FileConfig::default();
        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded config file");
                    merged_config = self.merge_configs(merged_config, config);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring config file"),
            }
        }

        merged_config
    }

    /// Look for configuration files in the current directory.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        let candidates = ["./link-check.toml", "./.link-check.toml"];

        candidates
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Look for configuration files in the user's home directory.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let candidates = [".link-check.toml", "link-check.toml"];

        candidates
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("link-check").join("config.toml");
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Merge two configurations; values from `higher` win.
    fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            server: match (lower.server, higher.server) {
                (Some(mut lower_server), Some(higher_server)) => {
                    if higher_server.bind.is_some() {
                        lower_server.bind = higher_server.bind;
                    }
                    Some(lower_server)
                }
                (lower_server, higher_server) => higher_server.or(lower_server),
            },
            pool: match (lower.pool, higher.pool) {
                (Some(mut lower_pool), Some(higher_pool)) => {
                    if higher_pool.workers.is_some() {
                        lower_pool.workers = higher_pool.workers;
                    }
                    if higher_pool.queue_capacity.is_some() {
                        lower_pool.queue_capacity = higher_pool.queue_capacity;
                    }
                    if higher_pool.probe_timeout.is_some() {
                        lower_pool.probe_timeout = higher_pool.probe_timeout;
                    }
                    if higher_pool.grace_period.is_some() {
                        lower_pool.grace_period = higher_pool.grace_period;
                    }
                    Some(lower_pool)
                }
                (lower_pool, higher_pool) => higher_pool.or(lower_pool),
            },
            storage: match (lower.storage, higher.storage) {
                (Some(mut lower_storage), Some(higher_storage)) => {
                    if higher_storage.path.is_some() {
                        lower_storage.path = higher_storage.path;
                    }
                    Some(lower_storage)
                }
                (lower_storage, higher_storage) => higher_storage.or(lower_storage),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), LinkCheckError> {
        if let Some(pool) = &config.pool {
            if let Some(workers) = pool.workers {
                if workers == 0 || workers > 100 {
                    return Err(LinkCheckError::config("Workers must be between 1 and 100"));
                }
            }

            if pool.queue_capacity == Some(0) {
                return Err(LinkCheckError::config("Queue capacity must be at least 1"));
            }

            for (name, value) in [
                ("probe_timeout", &pool.probe_timeout),
                ("grace_period", &pool.grace_period),
            ] {
                if let Some(value) = value {
                    if parse_duration_string(value).is_none() {
                        return Err(LinkCheckError::config(format!(
                            "Invalid {} '{}'. Use format like '500ms', '2s', '1m'",
                            name, value
                        )));
                    }
                }
            }

            if let Some(timeout) = pool.probe_timeout.as_deref().and_then(parse_duration_string) {
                if timeout.is_zero() {
                    return Err(LinkCheckError::config("probe_timeout must be greater than zero"));
                }
            }
        }

        if let Some(bind) = config.bind() {
            if bind.trim().is_empty() {
                return Err(LinkCheckError::config("server.bind cannot be empty"));
            }
        }

        if let Some(path) = config.storage.as_ref().and_then(|s| s.path.as_ref()) {
            if path.as_os_str().is_empty() {
                return Err(LinkCheckError::config("storage.path cannot be empty"));
            }
        }

        Ok(())
    }
}

/// Environment variable configuration that mirrors the server's CLI options.
///
/// This represents configuration values that can be set via `LC_*` variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub probe_timeout: Option<Duration>,
    pub grace_period: Option<Duration>,
    pub state_path: Option<PathBuf>,
    pub bind: Option<String>,
    pub config: Option<PathBuf>,
}

impl EnvConfig {
    /// Overlay the values present in the environment onto `config`.
    pub fn apply_to(&self, mut config: PoolConfig) -> PoolConfig {
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(capacity) = self.queue_capacity {
            config = config.with_queue_capacity(capacity);
        }
        if let Some(timeout) = self.probe_timeout {
            config = config.with_probe_timeout(timeout);
        }
        if let Some(grace) = self.grace_period {
            config = config.with_grace_period(grace);
        }
        if let Some(path) = &self.state_path {
            config = config.with_state_path(path.clone());
        }
        config
    }
}

/// Load configuration from `LC_*` environment variables.
///
/// Invalid values are logged as warnings and ignored.
pub fn load_env_config() -> EnvConfig {
    load_env_config_from(|key| env::var(key).ok())
}

/// Same as [`load_env_config`] with an injectable variable lookup.
pub fn load_env_config_from<F>(lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();

    // LC_WORKERS - number of pool workers
    if let Some(val) = lookup("LC_WORKERS") {
        match val.trim().parse::<usize>() {
            Ok(workers) if (1..=100).contains(&workers) => {
                debug!(workers, "using LC_WORKERS");
                env_config.workers = Some(workers);
            }
            _ => warn!(value = %val, "invalid LC_WORKERS, must be 1-100"),
        }
    }

    // LC_QUEUE_CAPACITY - task queue capacity
    if let Some(val) = lookup("LC_QUEUE_CAPACITY") {
        match val.trim().parse::<usize>() {
            Ok(capacity) if capacity > 0 => {
                debug!(capacity, "using LC_QUEUE_CAPACITY");
                env_config.queue_capacity = Some(capacity);
            }
            _ => warn!(value = %val, "invalid LC_QUEUE_CAPACITY, must be a positive integer"),
        }
    }

    // LC_PROBE_TIMEOUT / LC_GRACE_PERIOD - durations
    env_config.probe_timeout = lookup_duration(&lookup, "LC_PROBE_TIMEOUT");
    env_config.grace_period = lookup_duration(&lookup, "LC_GRACE_PERIOD");

    // LC_STATE_PATH - snapshot file
    env_config.state_path = lookup_non_empty(&lookup, "LC_STATE_PATH").map(PathBuf::from);

    // LC_BIND - listen address
    env_config.bind = lookup_non_empty(&lookup, "LC_BIND");

    // LC_CONFIG - explicit config file
    env_config.config = lookup_non_empty(&lookup, "LC_CONFIG").map(PathBuf::from);

    env_config
}

fn lookup_duration<F>(lookup: &F, key: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let val = lookup(key)?;
    let parsed = parse_duration_string(&val);
    match parsed {
        Some(duration) => debug!(key, ?duration, "using duration from environment"),
        None => warn!(key, value = %val, "invalid duration, use format like '500ms', '2s', '1m'"),
    }
    parsed
}

fn lookup_non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

/// Parse a duration like "500ms", "5s", "2m"; a bare number is seconds.
pub fn parse_duration_string(value: &str) -> Option<Duration> {
    let value = value.trim().to_lowercase();

    if let Some(ms) = value.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = value.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = value.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        value.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_parse_duration_string() {
        assert_eq!(parse_duration_string("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration_string("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration_string("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration_string(" 3 "), Some(Duration::from_secs(3)));
        assert_eq!(parse_duration_string("0s"), Some(Duration::ZERO));
        assert_eq!(parse_duration_string("invalid"), None);
        assert_eq!(parse_duration_string("-1s"), None);
    }

    #[test]
    fn test_load_valid_config() {
        let temp_file = write_config(
            r#"
[server]
bind = "0.0.0.0:9000"

[pool]
workers = 25
probe_timeout = "1500ms"
grace_period = "5s"

[storage]
path = "/var/lib/link-check/state.json"
"#,
        );

        let manager = ConfigManager::new();
        let config = manager.load_file(temp_file.path()).unwrap();

        assert_eq!(config.bind(), Some("0.0.0.0:9000"));
        let pool = config.pool.clone().unwrap();
        assert_eq!(pool.workers, Some(25));
        assert_eq!(pool.queue_capacity, None);

        let applied = config.apply_to(PoolConfig::default());
        assert_eq!(applied.workers, 25);
        assert_eq!(applied.queue_capacity, 100);
        assert_eq!(applied.probe_timeout, Duration::from_millis(1500));
        assert_eq!(applied.grace_period, Duration::from_secs(5));
        assert_eq!(
            applied.state_path,
            PathBuf::from("/var/lib/link-check/state.json")
        );
    }

    #[test]
    fn test_invalid_workers() {
        let temp_file = write_config("[pool]\nworkers = 0\n");
        let result = ConfigManager::new().load_file(temp_file.path());
        assert!(matches!(result, Err(LinkCheckError::ConfigError { .. })));
    }

    #[test]
    fn test_invalid_duration() {
        let temp_file = write_config("[pool]\ngrace_period = \"soon\"\n");
        assert!(ConfigManager::new().load_file(temp_file.path()).is_err());

        let temp_file = write_config("[pool]\nprobe_timeout = \"0s\"\n");
        assert!(ConfigManager::new().load_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let temp_file = write_config("[pool\nworkers = ");
        assert!(matches!(
            ConfigManager::new().load_file(temp_file.path()),
            Err(LinkCheckError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigManager::new().load_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(LinkCheckError::FileError { .. })));
    }

    #[test]
    fn test_merge_configs() {
        let manager = ConfigManager::new();

        let lower = FileConfig {
            pool: Some(PoolSection {
                workers: Some(10),
                grace_period: Some("3s".to_string()),
                ..Default::default()
            }),
            storage: Some(StorageConfig {
                path: Some(PathBuf::from("lower.json")),
            }),
            ..Default::default()
        };

        let higher = FileConfig {
            pool: Some(PoolSection {
                workers: Some(25),
                ..Default::default()
            }),
            server: Some(ServerConfig {
                bind: Some("127.0.0.1:1".to_string()),
            }),
            ..Default::default()
        };

        let merged = manager.merge_configs(lower, higher);
        let pool = merged.pool.clone().unwrap();

        assert_eq!(pool.workers, Some(25)); // Higher wins
        assert_eq!(pool.grace_period, Some("3s".to_string())); // Lower preserved
        assert_eq!(merged.bind(), Some("127.0.0.1:1"));
        assert_eq!(
            merged.storage.unwrap().path,
            Some(PathBuf::from("lower.json"))
        );
    }

    #[test]
    fn test_env_config() {
        let vars: HashMap<&str, &str> = [
            ("LC_WORKERS", "4"),
            ("LC_QUEUE_CAPACITY", "0"),
            ("LC_PROBE_TIMEOUT", "750ms"),
            ("LC_GRACE_PERIOD", "later"),
            ("LC_STATE_PATH", "  /tmp/state.json "),
            ("LC_BIND", ""),
        ]
        .into_iter()
        .collect();

        let env_config = load_env_config_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(env_config.workers, Some(4));
        assert_eq!(env_config.queue_capacity, None);
        assert_eq!(env_config.probe_timeout, Some(Duration::from_millis(750)));
        assert_eq!(env_config.grace_period, None);
        assert_eq!(env_config.state_path, Some(PathBuf::from("/tmp/state.json")));
        assert_eq!(env_config.bind, None);
        assert_eq!(env_config.config, None);

        let applied = env_config.apply_to(PoolConfig::default());
        assert_eq!(applied.workers, 4);
        assert_eq!(applied.probe_timeout, Duration::from_millis(750));
        assert_eq!(applied.grace_period, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_env_workers_ignored() {
        let env_config = load_env_config_from(|key| {
            (key == "LC_WORKERS").then(|| "500".to_string())
        });
        assert_eq!(env_config.workers, None);
    }
}
