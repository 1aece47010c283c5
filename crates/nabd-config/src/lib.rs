//! Configuration for the nabd server.
//!
//! A TOML file layered over built-in defaults and `NABD_*` environment
//! variables, translated to [`nabd_core::ServerConfig`] with validation.
//! The binary adds its command-line overrides on top.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use nabd_core::ServerConfig;
use nabd_core::config::{DEFAULT_PING_INTERVAL, DEFAULT_PORT};
use nabd_core::proto::{Limits, Throttle};

/// Prefix for environment overrides, e.g. `NABD_SERVER__LISTEN`.
pub const ENV_PREFIX: &str = "NABD_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("config file already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,

    #[serde(default)]
    pub paths: Paths,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    /// Devices to set up at startup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bunnies: Vec<BunnyEntry>,
}

/// `[server]`: listener and device defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Server {
    /// Socket address to bind, e.g. "0.0.0.0:8080".
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Host announced to devices by the locate endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise: Option<String>,

    /// Ping interval for newly created devices, in seconds.
    #[serde(default = "default_ping_interval")]
    pub default_ping_interval: u8,

    /// Seconds to wait for a complete request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            advertise: None,
            default_ping_interval: default_ping_interval(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// `[paths]`: where served files and saved state live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Paths {
    #[serde(default = "default_resources")]
    pub resources: PathBuf,

    #[serde(default = "default_state")]
    pub state: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            resources: default_resources(),
            state: default_state(),
        }
    }
}

/// `[throttle]`: response pacing for the devices' small receive buffers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pause between chunks, in milliseconds. 0 disables pacing.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// `[limits]`: request size caps.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_head_bytes")]
    pub max_head_bytes: usize,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_head_bytes: limits.max_head_bytes,
            max_body_bytes: limits.max_body_bytes,
        }
    }
}

/// `[[bunnies]]`: a device provisioned when the server starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BunnyEntry {
    pub serial: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Overrides `server.default_ping_interval` for this device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_interval: Option<u8>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginEntry>,
}

/// A plugin attached to a provisioned device, with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PluginEntry {
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

fn default_listen() -> String {
    format!("0.0.0.0:{DEFAULT_PORT}")
}
fn default_ping_interval() -> u8 {
    DEFAULT_PING_INTERVAL
}
fn default_request_timeout() -> u64 {
    30
}
fn default_resources() -> PathBuf {
    PathBuf::from("files")
}
fn default_state() -> PathBuf {
    PathBuf::from("state")
}
fn default_chunk_size() -> usize {
    Throttle::DEFAULT_CHUNK_SIZE
}
fn default_delay_ms() -> u64 {
    25
}
fn default_max_head_bytes() -> usize {
    Limits::default().max_head_bytes
}
fn default_max_body_bytes() -> usize {
    Limits::default().max_body_bytes
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "nabd", "nabd").map_or_else(
        || PathBuf::from("nabd.toml"),
        |dirs| dirs.config_dir().join("nabd.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from `path` (or the default location) plus environment.
///
/// A missing file is not an error: defaults and environment still apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    Ok(config)
}

fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parents.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Write a default config to `path`. Refuses to overwrite unless `force`.
pub fn init_config(path: &Path, force: bool) -> Result<Config, ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    let config = Config::default();
    save_config(&config, path)?;
    Ok(config)
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Validate and build the runtime [`ServerConfig`].
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let listen: SocketAddr = self.server.listen.parse().map_err(|_| {
            ConfigError::validation(
                "server.listen",
                format!("expected host:port, got '{}'", self.server.listen),
            )
        })?;

        if self.server.default_ping_interval == 0 {
            return Err(ConfigError::validation(
                "server.default_ping_interval",
                "must be at least 1 second",
            ));
        }
        if self.server.request_timeout == 0 {
            return Err(ConfigError::validation(
                "server.request_timeout",
                "must be at least 1 second",
            ));
        }
        if self.throttle.chunk_size == 0 {
            return Err(ConfigError::validation("throttle.chunk_size", "must be positive"));
        }
        if self.limits.max_head_bytes == 0 {
            return Err(ConfigError::validation("limits.max_head_bytes", "must be positive"));
        }
        if self.paths.resources.as_os_str().is_empty() {
            return Err(ConfigError::validation("paths.resources", "must not be empty"));
        }
        if self.paths.state.as_os_str().is_empty() {
            return Err(ConfigError::validation("paths.state", "must not be empty"));
        }
        self.validate_bunnies()?;

        let advertise = self
            .server
            .advertise
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_owned);

        Ok(ServerConfig {
            listen,
            advertise,
            resources_root: self.paths.resources.clone(),
            state_root: self.paths.state.clone(),
            default_ping_interval: self.server.default_ping_interval,
            throttle: Throttle {
                chunk_size: self.throttle.chunk_size,
                delay: Duration::from_millis(self.throttle.delay_ms),
            },
            limits: Limits {
                max_head_bytes: self.limits.max_head_bytes,
                max_body_bytes: self.limits.max_body_bytes,
            },
            request_timeout: Duration::from_secs(self.server.request_timeout),
        })
    }

    fn validate_bunnies(&self) -> Result<(), ConfigError> {
        let mut seen = Vec::with_capacity(self.bunnies.len());
        for entry in &self.bunnies {
            let serial = entry.serial.trim().to_lowercase();
            if serial.is_empty() {
                return Err(ConfigError::validation("bunnies.serial", "must not be empty"));
            }
            if seen.contains(&serial) {
                return Err(ConfigError::validation(
                    "bunnies.serial",
                    format!("'{serial}' is listed twice"),
                ));
            }
            if entry.ping_interval == Some(0) {
                return Err(ConfigError::validation(
                    "bunnies.ping_interval",
                    format!("'{serial}' must ping at least every second"),
                ));
            }
            if entry.plugins.iter().any(|p| p.name.trim().is_empty()) {
                return Err(ConfigError::validation(
                    "bunnies.plugins.name",
                    format!("'{serial}' has a plugin without a name"),
                ));
            }
            seen.push(serial);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_core_defaults() {
        let server = Config::default().to_server_config().unwrap();
        assert_eq!(server, ServerConfig::default());
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let config = load_config(Some(Path::new("absent.toml"))).unwrap();
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "nabd.toml",
                r#"
                [server]
                listen = "127.0.0.1:9000"
                default_ping_interval = 10

                [paths]
                resources = "/srv/nabd"
                "#,
            )?;
            jail.set_env("NABD_SERVER__LISTEN", "127.0.0.1:9100");
            jail.set_env("NABD_THROTTLE__DELAY_MS", "0");

            let config = load_config(Some(Path::new("nabd.toml"))).unwrap();
            assert_eq!(config.server.listen, "127.0.0.1:9100");
            assert_eq!(config.server.default_ping_interval, 10);
            assert_eq!(config.paths.resources, PathBuf::from("/srv/nabd"));
            assert_eq!(config.paths.state, PathBuf::from("state"));
            assert_eq!(config.throttle.delay_ms, 0);
            assert_eq!(config.throttle.chunk_size, 1000);
            Ok(())
        });
    }

    #[test]
    fn bad_toml_is_a_figment_error() {
        Jail::expect_with(|jail| {
            jail.create_file("nabd.toml", "[server\nlisten = ")?;
            let err = load_config(Some(Path::new("nabd.toml"))).unwrap_err();
            assert!(matches!(err, ConfigError::Figment(_)));
            Ok(())
        });
    }

    #[test]
    fn translation_rejects_bad_values() {
        let mut config = Config::default();
        config.server.listen = "not an address".into();
        let err = config.to_server_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "server.listen"));

        let mut config = Config::default();
        config.server.default_ping_interval = 0;
        assert!(config.to_server_config().is_err());

        let mut config = Config::default();
        config.throttle.chunk_size = 0;
        assert!(config.to_server_config().is_err());
    }

    #[test]
    fn translation_carries_values() {
        let mut config = Config::default();
        config.server.advertise = Some("  nabd.lan ".into());
        config.throttle.delay_ms = 5;
        config.limits.max_body_bytes = 1024;

        let server = config.to_server_config().unwrap();
        assert_eq!(server.advertise.as_deref(), Some("nabd.lan"));
        assert_eq!(server.throttle.delay, Duration::from_millis(5));
        assert_eq!(server.limits.max_body_bytes, 1024);
    }

    #[test]
    fn blank_advertise_is_dropped() {
        let mut config = Config::default();
        config.server.advertise = Some("   ".into());
        assert_eq!(config.to_server_config().unwrap().advertise, None);
    }

    #[test]
    fn bunnies_parse_and_validate() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "nabd.toml",
                r#"
                [[bunnies]]
                serial = "0013D3849A3B"
                name = "Lapinou"

                [[bunnies.plugins]]
                name = "talkie"
                parameters = { receiver = "0013d3849a3c" }

                [[bunnies]]
                serial = "0013d3849a3c"
                ping_interval = 5
                "#,
            )?;

            let config = load_config(Some(Path::new("nabd.toml"))).unwrap();
            assert_eq!(config.bunnies.len(), 2);
            let first = &config.bunnies[0];
            assert_eq!(first.name.as_deref(), Some("Lapinou"));
            assert_eq!(first.plugins[0].name, "talkie");
            assert_eq!(first.plugins[0].parameters["receiver"], "0013d3849a3c");
            assert_eq!(config.bunnies[1].ping_interval, Some(5));
            assert!(config.to_server_config().is_ok());
            Ok(())
        });
    }

    #[test]
    fn duplicate_serials_are_rejected() {
        let entry = BunnyEntry {
            serial: "AB".into(),
            name: None,
            ping_interval: None,
            plugins: Vec::new(),
        };
        let mut config = Config::default();
        config.bunnies = vec![entry.clone(), BunnyEntry { serial: "ab".into(), ..entry }];

        let err = config.to_server_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref reason, .. } if reason.contains("twice")));
    }

    #[test]
    fn init_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/nabd.toml");

        init_config(&path, false).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[server]"));
        assert!(text.contains("listen = \"0.0.0.0:8080\""));

        let err = init_config(&path, false).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists { .. }));
        init_config(&path, true).unwrap();
    }

    #[test]
    fn saved_file_loads_back() {
        Jail::expect_with(|jail| {
            let mut config = Config::default();
            config.server.advertise = Some("nabd.lan".into());
            config.paths.state = PathBuf::from("saved");
            save_config(&config, &jail.directory().join("nabd.toml")).unwrap();

            let loaded = load_config(Some(Path::new("nabd.toml"))).unwrap();
            assert_eq!(loaded, config);
            Ok(())
        });
    }
}
