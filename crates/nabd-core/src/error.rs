// ── Core error types ──
//
// Errors surfaced by device, plugin and registry operations. Devices never
// see these: the dispatcher maps them to a 404 or a closed connection.
// Administrative callers (CLI, persistence) get them as `Result`s.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Lookup errors ────────────────────────────────────────────────
    #[error("Bunny not found: {serial}")]
    BunnyNotFound { serial: String },

    #[error("Choreography not found: {name}")]
    ChoreographyNotFound { name: String },

    /// The plugin is not attached to the bunny.
    #[error("No such plugin attached: {name}")]
    PluginNotFound { name: String },

    /// The plugin registry has no descriptor with that name.
    #[error("Unknown plugin: {name}")]
    UnknownPlugin { name: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Plugin {plugin} has no parameter named {parameter}")]
    InvalidParameter { plugin: String, parameter: String },

    #[error("Bunny {serial} already belongs to another burrow")]
    AlreadyRegistered { serial: String },

    #[error("Malformed request: {reason}")]
    MalformedRequest { reason: String },

    // ── Wrapped lower layers ─────────────────────────────────────────
    #[error(transparent)]
    Protocol(#[from] nabd_proto::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot persist {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },
}

impl CoreError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest {
            reason: reason.into(),
        }
    }

    /// Returns `true` for any "no such thing" variant.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BunnyNotFound { .. }
                | Self::ChoreographyNotFound { .. }
                | Self::PluginNotFound { .. }
                | Self::UnknownPlugin { .. }
        )
    }

    /// Returns `true` if the peer sent input we refused to act on.
    pub fn is_malformed(&self) -> bool {
        match self {
            Self::MalformedRequest { .. } => true,
            Self::Protocol(err) => err.is_malformed(),
            _ => false,
        }
    }
}
