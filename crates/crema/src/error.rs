//! CLI error types with miette diagnostics.
//!
//! Maps `SyncError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use crema_config::ConfigError;
use crema_core::{SyncError, TransientKind};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the machine gateway")]
    #[diagnostic(
        code(crema::connection_failed),
        help(
            "Check that the gateway or local bridge is running and reachable.\n\
             Self-signed bridge? Try: crema status --insecure"
        )
    )]
    ConnectionFailed { message: String },

    #[error("Gateway request timed out")]
    #[diagnostic(
        code(crema::timeout),
        help("Increase the timeout with --timeout or check the gateway's responsiveness.")
    )]
    Timeout { message: String },

    #[error("Status update failed: {message}")]
    #[diagnostic(code(crema::update_failed))]
    UpdateFailed { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(crema::auth_failed),
        help(
            "The gateway rejected the bearer token.\n\
             Store a fresh one with: crema config set-token"
        )
    )]
    AuthFailed { message: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(crema::no_credentials),
        help(
            "Store one with: crema config set-token --profile {profile}\n\
             Or set CREMA_TOKEN."
        )
    )]
    NoCredentials { profile: String },

    // ── Lookup ───────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(crema::not_found),
        help("Run: crema {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("'{operation}' is not supported on a {model}")]
    #[diagnostic(code(crema::unsupported))]
    Unsupported { operation: String, model: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(crema::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(crema::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: crema config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No machine configured")]
    #[diagnostic(
        code(crema::no_config),
        help(
            "Create a profile with: crema config init\n\
             Expected at: {path}\n\
             Or pass --url, --serial and --model."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(crema::config))]
    Config(Box<ConfigError>),

    #[error("Sync coordinator stopped")]
    #[diagnostic(code(crema::stopped))]
    Stopped,

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    #[diagnostic(code(crema::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML encoding failed: {0}")]
    #[diagnostic(code(crema::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Prompt failed: {0}")]
    #[diagnostic(code(crema::prompt))]
    Prompt(#[from] dialoguer::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::Unsupported { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── SyncError → CliError mapping ─────────────────────────────────────

impl From<SyncError> for CliError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Auth { message } => CliError::AuthFailed { message },
            SyncError::Transient { message, kind } => match kind {
                TransientKind::Connection => CliError::ConnectionFailed { message },
                TransientKind::Timeout => CliError::Timeout { message },
                TransientKind::Server => CliError::UpdateFailed { message },
            },
            SyncError::Protocol { message } => CliError::UpdateFailed { message },
            SyncError::Stopped => CliError::Stopped,
            SyncError::Unsupported { operation, model } => {
                CliError::Unsupported { operation, model }
            }
            SyncError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}
