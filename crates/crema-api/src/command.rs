use serde::{Deserialize, Serialize};

use crate::status::StatusValue;

/// A property write sent to the machine.
///
/// Serialized as the `{ "property": ..., "value": ... }` body of the
/// commands endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineCommand {
    pub property: String,
    pub value: StatusValue,
}

impl MachineCommand {
    pub fn new(property: impl Into<String>, value: impl Into<StatusValue>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}
