// ── Runtime server configuration ──
//
// Describes *how* the server runs: where it listens, where its files live,
// and how it paces devices. Core never reads config files; the binary
// builds a `ServerConfig` (via `nabd-config`) and hands it in.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use nabd_proto::{Limits, Throttle};

/// Seconds a fresh device waits between polls.
pub const DEFAULT_PING_INTERVAL: u8 = 20;

/// Port devices are usually pointed at.
pub const DEFAULT_PORT: u16 = 8080;

/// Everything the server needs at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Socket the device listener binds.
    pub listen: SocketAddr,
    /// Host announced by `/vl/locate.jsp`. Falls back to the bound address.
    pub advertise: Option<String>,
    /// Root for sounds, boot code, records and other served files.
    pub resources_root: PathBuf,
    /// Root for persisted devices and choreographies.
    pub state_root: PathBuf,
    /// Ping interval given to newly created devices.
    pub default_ping_interval: u8,
    /// Response body pacing.
    pub throttle: Throttle,
    /// Request size limits.
    pub limits: Limits,
    /// How long a worker waits for a complete request.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            advertise: None,
            resources_root: PathBuf::from("files"),
            state_root: PathBuf::from("state"),
            default_ping_interval: DEFAULT_PING_INTERVAL,
            throttle: Throttle::default(),
            limits: Limits::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// The `host:port` devices should use to reach us, given the address the
    /// listener actually bound.
    pub fn locate_address(&self, bound: SocketAddr) -> String {
        match &self.advertise {
            Some(host) if !host.is_empty() => format!("{host}:{}", bound.port()),
            _ => bound.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_prefers_advertised_host() {
        let bound = SocketAddr::from(([127, 0, 0, 1], 9000));
        let mut config = ServerConfig::default();
        assert_eq!(config.locate_address(bound), "127.0.0.1:9000");

        config.advertise = Some("nabd.lan".into());
        assert_eq!(config.locate_address(bound), "nabd.lan:9000");
    }
}
