// ── Sync error taxonomy ──
//
// User-facing errors from crema-core. Consumers never see HTTP status
// codes or JSON parse failures directly: the `From<crema_api::Error>`
// impl folds transport-layer errors into auth / transient / protocol.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credentials rejected. Fatal: never retried internally, the host
    /// is expected to prompt for re-authentication.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Network, timeout, or server-side failure. The store keeps its
    /// last-good state and the next scheduled tick retries.
    #[error("Update failed: {message}")]
    Transient {
        message: String,
        kind: TransientKind,
    },

    /// The machine answered with something unparseable. Treated like
    /// `Transient` for retry purposes.
    #[error("Malformed response from machine: {message}")]
    Protocol { message: String },

    /// The coordinator has been torn down.
    #[error("Sync coordinator is stopped")]
    Stopped,

    #[error("Operation not supported: {operation} on {model}")]
    Unsupported { operation: String, model: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SyncError {
    /// Returns `true` for errors that must surface as "re-authentication required".
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Returns `true` if the next scheduled refresh may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Protocol { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<crema_api::Error> for SyncError {
    fn from(err: crema_api::Error) -> Self {
        match err {
            crema_api::Error::Authentication { message } => SyncError::Auth { message },
            crema_api::Error::Deserialization { message, body: _ } => {
                SyncError::Protocol { message }
            }
            crema_api::Error::InvalidUrl(e) => SyncError::Config {
                message: format!("Invalid URL: {e}"),
            },
            other => SyncError::Transient {
                kind: TransientKind::of(&other),
                message: other.to_string(),
            },
        }
    }
}

/// Coarse cause of a transient failure, for hosts that report it differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// The gateway could not be reached (DNS, refused, TLS, socket drop).
    Connection,
    Timeout,
    /// The gateway answered with a non-success status.
    Server,
}

impl TransientKind {
    fn of(err: &crema_api::Error) -> Self {
        match err {
            crema_api::Error::Timeout { .. } => Self::Timeout,
            crema_api::Error::Transport(e) if e.is_timeout() => Self::Timeout,
            crema_api::Error::Transport(_)
            | crema_api::Error::Tls(_)
            | crema_api::Error::WebSocketConnect(_)
            | crema_api::Error::WebSocketClosed { .. } => Self::Connection,
            _ => Self::Server,
        }
    }
}
