// ── Domain model ──
//
// Machine models and the well-known status property names.

pub mod keys;
mod machine;

pub use machine::MachineModel;
