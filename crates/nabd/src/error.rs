//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and process exit codes.

use miette::Diagnostic;
use thiserror::Error;

use nabd_config::ConfigError;
use nabd_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Server ───────────────────────────────────────────────────────
    #[error("Could not listen on {addr}")]
    #[diagnostic(
        code(nabd::bind_failed),
        help(
            "Is another server already using that port?\n\
             Pick another with: nabd serve --listen 0.0.0.0:8081"
        )
    )]
    Bind {
        addr: String,
        #[source]
        source: CoreError,
    },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(nabd::not_found), help("{hint}"))]
    NotFound {
        resource_type: String,
        identifier: String,
        hint: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(nabd::conflict))]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    // ── Data ─────────────────────────────────────────────────────────
    #[error("Invalid data: {reason}")]
    #[diagnostic(
        code(nabd::invalid_data),
        help("Choreography files are a 4-byte length, the payload, then 4 zero bytes.")
    )]
    InvalidData { reason: String },

    #[error("Cannot persist {path}: {reason}")]
    #[diagnostic(
        code(nabd::persistence),
        help("Check that the state directory exists and is writable.")
    )]
    Persistence { path: String, reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(nabd::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(nabd::config_exists),
        help("Edit it directly, or overwrite with: nabd config init --force")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(nabd::config),
        help("Check the file shown by `nabd config path` and any NABD_* variables.")
    )]
    Config(ConfigError),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Bind { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } | Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::BunnyNotFound { serial } => CliError::NotFound {
                resource_type: "bunny".into(),
                identifier: serial,
                hint: "Serials are the 12 hex digits printed under the rabbit.".into(),
            },

            CoreError::ChoreographyNotFound { name } => CliError::NotFound {
                resource_type: "choreography".into(),
                identifier: name,
                hint: "Choreographies are loaded from <state>/choreographies/*.chor".into(),
            },

            CoreError::PluginNotFound { name } | CoreError::UnknownPlugin { name } => {
                CliError::NotFound {
                    resource_type: "plugin".into(),
                    identifier: name,
                    hint: "Run: nabd plugins to see available plugins".into(),
                }
            }

            CoreError::InvalidParameter { plugin, parameter } => CliError::Validation {
                field: format!("{plugin} parameter"),
                reason: format!("'{parameter}' is not a parameter of {plugin}"),
            },

            CoreError::AlreadyRegistered { serial } => CliError::Conflict {
                resource_type: "bunny".into(),
                identifier: serial,
            },

            CoreError::MalformedRequest { reason } => CliError::InvalidData { reason },

            CoreError::Protocol(err) => CliError::InvalidData {
                reason: err.to_string(),
            },

            CoreError::Persistence { path, reason } => CliError::Persistence {
                path: path.display().to_string(),
                reason,
            },

            CoreError::Io(err) => CliError::Io(err),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::AlreadyExists { path } => CliError::ConfigExists {
                path: path.display().to_string(),
            },
            ConfigError::Io(err) => CliError::Io(err),
            other => CliError::Config(other),
        }
    }
}
