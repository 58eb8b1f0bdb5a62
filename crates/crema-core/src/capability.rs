// ── Machine capabilities ──
//
// Typed descriptions of what can be read and toggled on a machine. Each
// switch knows its status key, how to encode a command, which models offer
// it, and which extra status keys are shown alongside it.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crema_api::{MachineCommand, StatusMap, StatusValue};

use crate::model::MachineModel;
use crate::model::keys;
use crate::store::StatusSnapshot;

/// Attribute holding the time the latest status data arrived locally.
const DATE_RECEIVED: &str = "date_received";

const WEEKDAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Something that reads as on/off from the status and can be set.
pub trait Toggleable {
    /// Status key holding the current state.
    fn property(&self) -> &'static str;

    /// Current state, or `None` if the key is unknown or not boolean-like.
    fn read(&self, snapshot: &StatusSnapshot) -> Option<bool> {
        snapshot.get(self.property()).and_then(|v| v.as_bool())
    }

    /// Command that moves the machine to `on`.
    fn command(&self, on: bool) -> MachineCommand;

    fn supports(&self, _model: MachineModel) -> bool {
        true
    }
}

// ── Switches ────────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MachineSwitch {
    Main,
    AutoOnOff,
    Prebrew,
    Preinfusion,
    #[strum(to_string = "steam_boiler_enable", serialize = "steam_boiler")]
    SteamBoiler,
}

impl MachineSwitch {
    /// Stable identifier (`main`, `auto_on_off`, ...).
    pub fn key(self) -> &'static str {
        self.into()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Main => "Main",
            Self::AutoOnOff => "Auto On Off",
            Self::Prebrew => "Prebrew",
            Self::Preinfusion => "Preinfusion",
            Self::SteamBoiler => "Steam Boiler Enable",
        }
    }

    /// Status keys shown next to this switch on `model`.
    pub fn attribute_keys(self, model: MachineModel) -> Vec<String> {
        use MachineModel::{Gs3Av, LineaMicra, LineaMini};

        match (self, model) {
            (Self::Main, Gs3Av) => (1..=5).map(|k| format!("dose_k{k}")).collect(),
            (Self::AutoOnOff, _) => std::iter::once(DATE_RECEIVED.to_owned())
                .chain(WEEKDAYS.iter().flat_map(|day| {
                    [
                        format!("{day}_auto"),
                        format!("{day}_on_time"),
                        format!("{day}_off_time"),
                    ]
                }))
                .collect(),
            (Self::Prebrew, Gs3Av) => std::iter::once(DATE_RECEIVED.to_owned())
                .chain((1..=4).map(|k| format!("prebrewing_ton_k{k}")))
                .chain((1..=4).map(|k| format!("prebrewing_toff_k{k}")))
                .collect(),
            (Self::Prebrew, LineaMini | LineaMicra) => vec![
                DATE_RECEIVED.to_owned(),
                "prebrewing_ton_k1".to_owned(),
                "prebrewing_toff_k1".to_owned(),
            ],
            (Self::Preinfusion, Gs3Av) => std::iter::once(DATE_RECEIVED.to_owned())
                .chain((1..=4).map(|k| format!("preinfusion_k{k}")))
                .collect(),
            (Self::Preinfusion, LineaMini | LineaMicra) => {
                vec![DATE_RECEIVED.to_owned(), "preinfusion_k1".to_owned()]
            }
            _ => Vec::new(),
        }
    }

    /// Known values for [`attribute_keys`](Self::attribute_keys).
    ///
    /// `date_received` is the later of the snapshot's full and delta merge
    /// times, absent until something has been merged.
    pub fn attributes(self, model: MachineModel, snapshot: &StatusSnapshot) -> StatusMap {
        self.attribute_keys(model)
            .into_iter()
            .filter_map(|key| {
                let value = if key == DATE_RECEIVED {
                    received_at(snapshot)
                } else {
                    snapshot.get(&key)
                };
                value.map(|value| (key, value))
            })
            .collect()
    }
}

fn received_at(snapshot: &StatusSnapshot) -> Option<StatusValue> {
    snapshot
        .last_full_merge()
        .max(snapshot.last_delta_merge())
        .map(|at| StatusValue::Text(at.to_rfc3339()))
}

impl Toggleable for MachineSwitch {
    fn property(&self) -> &'static str {
        match self {
            Self::Main => keys::POWER,
            Self::AutoOnOff => keys::GLOBAL_AUTO,
            Self::Prebrew => keys::ENABLE_PREBREWING,
            Self::Preinfusion => keys::ENABLE_PREINFUSION,
            Self::SteamBoiler => keys::STEAM_BOILER_ENABLE,
        }
    }

    fn read(&self, snapshot: &StatusSnapshot) -> Option<bool> {
        let value = snapshot.get(self.property())?;
        match self {
            // Reported as "Enabled"/"Disabled"; anything else is off.
            Self::AutoOnOff => value.as_str().map(|s| s == "Enabled"),
            _ => value.as_bool(),
        }
    }

    fn command(&self, on: bool) -> MachineCommand {
        let value = match self {
            Self::Main => StatusValue::Int(i64::from(on)),
            Self::AutoOnOff => StatusValue::from(if on { "Enabled" } else { "Disabled" }),
            _ => StatusValue::Bool(on),
        };
        MachineCommand::new(self.property(), value)
    }

    fn supports(&self, model: MachineModel) -> bool {
        match self {
            Self::Prebrew | Self::Preinfusion => model != MachineModel::Gs3Mp,
            _ => true,
        }
    }
}

// ── Binary sensors ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BinarySensor {
    /// On (a problem) when the reservoir contact is open.
    WaterReservoir,
    /// On while a shot is being pulled. Only reported over the push channel.
    BrewActive,
}

impl BinarySensor {
    pub fn label(self) -> &'static str {
        match self {
            Self::WaterReservoir => "Water Reservoir",
            Self::BrewActive => "Brew Active",
        }
    }

    pub fn property(self) -> &'static str {
        match self {
            Self::WaterReservoir => keys::WATER_RESERVOIR_CONTACT,
            Self::BrewActive => keys::BREW_ACTIVE,
        }
    }

    pub fn is_on(self, snapshot: &StatusSnapshot) -> Option<bool> {
        match self {
            Self::WaterReservoir => snapshot
                .get(keys::WATER_RESERVOIR_CONTACT)
                .and_then(|v| v.as_bool())
                .map(|contact| !contact),
            Self::BrewActive => snapshot.brew_active(),
        }
    }

    pub fn is_available(self, snapshot: &StatusSnapshot) -> bool {
        snapshot.contains_key(self.property())
    }

    pub fn requires_push(self) -> bool {
        matches!(self, Self::BrewActive)
    }

    /// Sensors worth offering given whether the push channel is enabled.
    pub fn available_for(use_push_channel: bool) -> Vec<Self> {
        use strum::IntoEnumIterator;
        Self::iter()
            .filter(|sensor| use_push_channel || !sensor.requires_push())
            .collect()
    }
}
