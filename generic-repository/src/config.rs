//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `GENREPO_`, nested keys separated by `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/generic-repository/config.toml
//! 4. System directory: /etc/generic-repository/config.toml
//! 5. Default values
//!
//! ```toml
//! [session]
//! name = "orders-service"
//! connectivity_timeout_ms = 2000
//!
//! [paging]
//! default_page_size = 25
//! max_page_size = 200
//!
//! [tracing]
//! log_level = "generic_repository=debug,info"
//! json = true
//!
//! [turso]
//! mode = "local"
//! path = "./data/app.db"
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

const APP_DIR: &str = "generic-repository";
const ENV_PREFIX: &str = "GENREPO_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Unit-of-work session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Paging limits for repository queries
    #[serde(default)]
    pub paging: PagingConfig,

    /// Log output settings
    #[serde(default)]
    pub tracing: TracingConfig,

    /// libsql/Turso engine configuration (optional)
    #[serde(default)]
    pub turso: Option<TursoConfig>,
}

/// Unit-of-work session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name attached to session log events
    #[serde(default = "default_session_name")]
    pub name: String,

    /// Upper bound for `check_connectivity` probes in milliseconds
    #[serde(default = "default_connectivity_timeout")]
    pub connectivity_timeout_ms: u64,
}

impl SessionConfig {
    pub fn connectivity_timeout(&self) -> Duration {
        Duration::from_millis(self.connectivity_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_session_name(),
            connectivity_timeout_ms: default_connectivity_timeout(),
        }
    }
}

/// Paging limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Page size used when a caller passes none
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// Largest page size a query may request; bigger requests are clamped
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

impl PagingConfig {
    /// Page size to use for a request, after defaulting and clamping
    pub fn effective_page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// `EnvFilter` directive string
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default = "default_false")]
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: default_false(),
        }
    }
}

/// How the libsql engine connects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TursoMode {
    /// SQLite file, no network
    #[default]
    Local,
    /// Turso cloud or libsql-server
    Remote,
    /// Local SQLite file that syncs with a remote database
    EmbeddedReplica,
}

/// libsql/Turso engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TursoConfig {
    /// Connection mode
    #[serde(default)]
    pub mode: TursoMode,

    /// Database file (local and embedded replica modes)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Remote database URL (remote and embedded replica modes)
    #[serde(default)]
    pub url: Option<String>,

    /// Auth token (remote and embedded replica modes)
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Sync interval for embedded replicas in seconds
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,

    /// Maximum retry attempts for establishing the connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retry attempts in milliseconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl TursoConfig {
    /// Local-file configuration with default retry settings
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: TursoMode::Local,
            path: Some(path.into()),
            url: None,
            auth_token: None,
            sync_interval_secs: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_session_name() -> String {
    APP_DIR.to_string()
}

fn default_connectivity_timeout() -> u64 {
    5_000
}

fn default_page_size() -> u64 {
    20
}

fn default_max_page_size() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_false() -> bool {
    false
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    500
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Environment variables (`GENREPO_` prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let config_paths = Self::find_config_paths();

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so later files override earlier ones
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the XDG and system directories. Environment variables still
    /// apply on top.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Config file locations in priority order (highest first)
    fn find_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_DIR);
        if let Some(path) = xdg_dirs.find_config_file("config.toml") {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc").join(APP_DIR).join("config.toml"));
        paths
    }

    /// Where a user-level config file should be placed
    ///
    /// Creates the parent directory if needed.
    pub fn recommended_path() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_DIR);
        xdg_dirs.place_config_file("config.toml").map_err(|e| {
            crate::error::Error::Internal(format!("Failed to create config directory: {}", e))
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            paging: PagingConfig::default(),
            tracing: TracingConfig::default(),
            turso: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.name, "generic-repository");
        assert_eq!(config.session.connectivity_timeout(), Duration::from_secs(5));
        assert_eq!(config.paging.default_page_size, 20);
        assert_eq!(config.paging.max_page_size, 100);
        assert_eq!(config.tracing.log_level, "info");
        assert!(!config.tracing.json);
        assert!(config.turso.is_none());
    }

    #[test]
    fn test_effective_page_size() {
        let paging = PagingConfig::default();
        assert_eq!(paging.effective_page_size(None), 20);
        assert_eq!(paging.effective_page_size(Some(7)), 7);
        assert_eq!(paging.effective_page_size(Some(5_000)), 100);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[session]
name = "billing"
connectivity_timeout_ms = 250

[paging]
max_page_size = 50

[turso]
mode = "local"
path = "./billing.db"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();

        assert_eq!(config.session.name, "billing");
        assert_eq!(
            config.session.connectivity_timeout(),
            Duration::from_millis(250)
        );
        assert_eq!(config.paging.max_page_size, 50);
        assert_eq!(config.paging.default_page_size, 20);
        let turso = config.turso.unwrap();
        assert_eq!(turso.mode, TursoMode::Local);
        assert_eq!(turso.path, Some(PathBuf::from("./billing.db")));
        assert_eq!(turso.max_retries, 3);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.paging.default_page_size, 20);
    }

    #[test]
    fn test_invalid_value_is_a_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[paging]\nmax_page_size = \"lots\"").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }

    #[test]
    fn test_turso_local_helper() {
        let turso = TursoConfig::local("/tmp/x.db");
        assert_eq!(turso.mode, TursoMode::Local);
        assert_eq!(turso.retry_delay(), Duration::from_millis(500));
    }
}
