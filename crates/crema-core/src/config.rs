// ── Runtime machine configuration ──
//
// These types describe *how* to reach a machine and how often to sync.
// They carry credential data and tuning, but never touch disk.
// The CLI (or any host) constructs a `MachineConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::model::MachineModel;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (local bridges with self-signed certs).
    DangerAcceptInvalid,
}

/// Scheduling knobs for the sync coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between full pulls. Zero disables the periodic task.
    pub poll_interval: Duration,
    /// Open the push channel after the first successful pull.
    pub use_push_channel: bool,
    /// Settle time after a toggle before re-pulling status.
    pub update_delay: Duration,
    /// Capacity of the bounded queue between the push socket and the coordinator.
    pub push_queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            use_push_channel: false,
            update_delay: Duration::from_secs(2),
            push_queue_capacity: 64,
        }
    }
}

/// Configuration for syncing a single machine.
///
/// Built by the CLI/host, passed to the coordinator -- core never reads config files.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Gateway URL (e.g., `https://gw.example.com` or a local bridge).
    pub url: Url,
    /// Machine serial number, used to scope every endpoint.
    pub serial_number: String,
    pub model: MachineModel,
    /// Friendly name for display; falls back to the serial number.
    pub machine_name: Option<String>,
    /// Bearer token (already obtained; token exchange is out of scope).
    pub token: Option<SecretString>,
    pub tls: TlsVerification,
    /// Request timeout.
    pub timeout: Duration,
    pub sync: SyncConfig,
}

impl MachineConfig {
    pub fn new(url: Url, serial_number: impl Into<String>, model: MachineModel) -> Self {
        Self {
            url,
            serial_number: serial_number.into(),
            model,
            machine_name: None,
            token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            sync: SyncConfig::default(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.machine_name.as_deref().unwrap_or(&self.serial_number)
    }
}
