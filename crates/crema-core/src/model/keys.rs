//! Well-known status property names.

pub const POWER: &str = "power";
pub const GLOBAL_AUTO: &str = "global_auto";
pub const ENABLE_PREBREWING: &str = "enable_prebrewing";
pub const ENABLE_PREINFUSION: &str = "enable_preinfusion";
pub const STEAM_BOILER_ENABLE: &str = "steam_boiler_enable";
pub const WATER_RESERVOIR_CONTACT: &str = "water_reservoir_contact";

/// Reserved key for the real-time brewing flag. Stored apart from the
/// regular properties (see `StatusSnapshot::brew_active`).
pub const BREW_ACTIVE: &str = "brew_active";
