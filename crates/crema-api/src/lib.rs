// crema-api: Async client for La Marzocco machine status, commands, and push events

pub mod client;
pub mod command;
pub mod error;
pub mod status;
pub mod transport;
pub mod websocket;

pub use client::MachineClient;
pub use command::MachineCommand;
pub use error::Error;
pub use status::{PushDelta, StatusMap, StatusValue};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{PushRegistration, ReconnectConfig};
