use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Machine model. Decides which switches exist and which extra
/// attributes each switch exposes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum MachineModel {
    #[strum(to_string = "GS3 AV", serialize = "gs3-av", serialize = "gs3_av")]
    #[serde(rename = "GS3 AV", alias = "gs3-av")]
    Gs3Av,

    #[strum(to_string = "GS3 MP", serialize = "gs3-mp", serialize = "gs3_mp")]
    #[serde(rename = "GS3 MP", alias = "gs3-mp")]
    Gs3Mp,

    #[strum(to_string = "Linea Mini", serialize = "lm", serialize = "linea-mini")]
    #[serde(rename = "Linea Mini", alias = "lm")]
    LineaMini,

    #[strum(to_string = "Micra", serialize = "lmu", serialize = "linea-micra")]
    #[serde(rename = "Micra", alias = "lmu")]
    LineaMicra,
}
