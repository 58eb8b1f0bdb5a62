// crema-core: Status synchronization layer between crema-api and consumers (CLI, hosts).

pub mod capability;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod observer;
pub mod source;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use capability::{BinarySensor, MachineSwitch, Toggleable};
pub use config::{MachineConfig, SyncConfig, TlsVerification};
pub use coordinator::{SyncCoordinator, SyncState, UpdateHealth};
pub use error::{SyncError, TransientKind};
pub use model::MachineModel;
pub use observer::{StatusObserver, SubscriptionHandle};
pub use source::{GatewaySource, MachineSource};
pub use store::{StatusSnapshot, StatusStore};
pub use stream::StatusStream;

// Status value types are part of the public surface.
pub use crema_api::{MachineCommand, PushDelta, StatusMap, StatusValue};
