//! Supervisor configuration.
//!
//! Defaults, overridden by an optional TOML file, overridden in turn by
//! `RIGSUP_*` environment variables. The config never reaches into the
//! session registry; it only feeds descriptors and launch parameters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Pool endpoint a mining session connects to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    /// Algorithm hint forwarded to the miner, e.g. `rx/0`.
    pub algo: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "pool.hashvault.pro".to_string(),
            port: 443,
            algo: Some("rx/0".to_string()),
        }
    }
}

/// Where a network's node binary is released from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSource {
    /// GitHub `owner/repo`.
    pub repo: String,
    /// Binary name inside the release archive.
    pub binary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    /// Default payout address for mining sessions.
    pub wallet: Option<String>,
    /// Cache root override; platform cache dir when absent.
    pub cache_dir: Option<PathBuf>,
    /// Use a binary already on PATH instead of downloading, when present.
    pub prefer_system_binary: bool,
    /// Extra arguments appended to the miner argument vector.
    pub extra_miner_args: Vec<String>,
    /// Node sources by network name.
    pub networks: BTreeMap<String, NetworkSource>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            wallet: None,
            cache_dir: None,
            prefer_system_binary: false,
            extra_miner_args: Vec::new(),
            networks: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Default config file location under the data directory.
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("config.toml")
    }

    /// Load configuration: file (when it exists) over defaults, environment
    /// over both.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.is_file() => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            Some(path) => {
                debug!(path = %path.display(), "config file absent, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `RIGSUP_*` environment overrides.
    fn apply_env(&mut self) {
        if let Ok(host) = dotenvy::var("RIGSUP_POOL_HOST") {
            self.pool.host = host;
        }
        if let Ok(val) = dotenvy::var("RIGSUP_POOL_PORT")
            && let Ok(port) = val.parse()
        {
            self.pool.port = port;
        }
        if let Ok(algo) = dotenvy::var("RIGSUP_POOL_ALGO") {
            self.pool.algo = Some(algo);
        }
        if let Ok(wallet) = dotenvy::var("RIGSUP_WALLET") {
            self.wallet = Some(wallet);
        }
        if let Ok(dir) = dotenvy::var("RIGSUP_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Ok(val) = dotenvy::var("RIGSUP_PREFER_SYSTEM_BINARY") {
            self.prefer_system_binary = val.eq_ignore_ascii_case("true") || val == "1";
        }
        if let Ok(raw) = dotenvy::var("RIGSUP_EXTRA_MINER_ARGS")
            && let Ok(args) = shell_words::split(&raw)
        {
            self.extra_miner_args = args;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(!config.pool.host.is_empty());
        assert!(config.pool.port > 0);
        assert!(config.networks.is_empty());
        assert!(!config.prefer_system_binary);
    }

    #[test]
    fn parses_toml_with_networks() {
        let raw = r#"
            wallet = "48edfHu7V9Z84YzzMa6fUueoELZ9ZRXq9V"
            prefer_system_binary = true

            [pool]
            host = "pool.example.org"
            port = 3333

            [networks.quai]
            repo = "dominant-strategies/go-quai"
            binary = "go-quai"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.pool.host, "pool.example.org");
        assert_eq!(config.pool.port, 3333);
        assert!(config.prefer_system_binary);
        assert_eq!(config.networks["quai"].binary, "go-quai");
        // Unset sections keep their defaults.
        assert_eq!(config.pool.algo.as_deref(), Some("rx/0"));
    }

    #[test]
    #[serial]
    fn env_overrides_file_values() {
        // SAFETY: serialized test, no concurrent env access.
        unsafe {
            std::env::set_var("RIGSUP_POOL_HOST", "env.example.org");
            std::env::set_var("RIGSUP_EXTRA_MINER_ARGS", "--threads 4 --no-huge-pages");
        }
        let config = Config::load(None).unwrap();
        assert_eq!(config.pool.host, "env.example.org");
        assert_eq!(
            config.extra_miner_args,
            vec!["--threads", "4", "--no-huge-pages"]
        );
        unsafe {
            std::env::remove_var("RIGSUP_POOL_HOST");
            std::env::remove_var("RIGSUP_EXTRA_MINER_ARGS");
        }
    }

    #[test]
    #[serial]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/rigsup/config.toml"))).unwrap();
        assert_eq!(config.pool.port, PoolConfig::default().port);
    }
}
