// ── Status source seam ──
//
// Abstracts the machine gateway so the coordinator can be driven by the
// real HTTP/websocket client or by a scripted fake in tests.

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crema_api::transport::{TlsMode, TransportConfig};
use crema_api::websocket::{PushRegistration, ReconnectConfig};
use crema_api::{MachineClient, MachineCommand, PushDelta, StatusMap};

use crate::config::{MachineConfig, TlsVerification};
use crate::error::SyncError;

/// Where machine status comes from and where commands go.
pub trait MachineSource: Send + Sync + 'static {
    /// Full status pull.
    fn fetch_status(&self) -> impl Future<Output = Result<StatusMap, crema_api::Error>> + Send;

    /// Write one property.
    fn send_command(
        &self,
        command: &MachineCommand,
    ) -> impl Future<Output = Result<(), crema_api::Error>> + Send;

    /// Start delivering push deltas into `deltas` until `cancel` fires.
    fn open_push(
        &self,
        deltas: mpsc::Sender<PushDelta>,
        cancel: CancellationToken,
    ) -> Result<PushRegistration, crema_api::Error>;
}

/// Production source backed by the machine gateway.
pub struct GatewaySource {
    client: MachineClient,
    reconnect: ReconnectConfig,
}

impl GatewaySource {
    pub fn new(client: MachineClient) -> Self {
        Self {
            client,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Build the HTTP client from a machine config.
    pub fn from_config(config: &MachineConfig) -> Result<Self, SyncError> {
        let transport = TransportConfig {
            tls: tls_to_transport(&config.tls),
            timeout: config.timeout,
            token: config.token.clone(),
        };
        let client = MachineClient::new(
            config.url.clone(),
            config.serial_number.clone(),
            &transport,
        )?;
        Ok(Self::new(client))
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn client(&self) -> &MachineClient {
        &self.client
    }
}

impl MachineSource for GatewaySource {
    fn fetch_status(&self) -> impl Future<Output = Result<StatusMap, crema_api::Error>> + Send {
        self.client.fetch_status()
    }

    fn send_command(
        &self,
        command: &MachineCommand,
    ) -> impl Future<Output = Result<(), crema_api::Error>> + Send {
        self.client.send_command(command)
    }

    fn open_push(
        &self,
        deltas: mpsc::Sender<PushDelta>,
        cancel: CancellationToken,
    ) -> Result<PushRegistration, crema_api::Error> {
        self.client
            .open_push(deltas, self.reconnect.clone(), cancel)
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
