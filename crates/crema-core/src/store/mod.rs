// ── Status store ──
//
// Copy-on-write device status with push-based change notification.

mod snapshot;
mod status_store;

pub use snapshot::StatusSnapshot;
pub use status_store::StatusStore;
