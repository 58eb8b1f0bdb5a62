//! Machine status values as delivered by full pulls and push deltas.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One full status snapshot: property name → value.
pub type StatusMap = BTreeMap<String, StatusValue>;

/// A single machine property value.
///
/// Composite fields (e.g. a weekly auto on/off schedule) arrive as a
/// nested mapping and are always stored and replaced as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Map(BTreeMap<String, StatusValue>),
}

impl StatusValue {
    /// Convert a raw JSON value. Returns `None` for `null` and arrays,
    /// which have no place in the status model.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Text(s)),
            serde_json::Value::Object(obj) => Some(Self::Map(
                obj.into_iter()
                    .filter_map(|(k, v)| Self::from_json(v).map(|v| (k, v)))
                    .collect(),
            )),
            serde_json::Value::Null | serde_json::Value::Array(_) => None,
        }
    }

    /// Lenient boolean reading.
    ///
    /// The machine reports flags as booleans, `0`/`1`, or
    /// `"Enabled"`/`"Disabled"` depending on the field.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(n) => Some(*n != 0),
            Self::Text(s) => match s.to_ascii_lowercase().as_str() {
                "enabled" | "on" | "true" => Some(true),
                "disabled" | "off" | "false" => Some(false),
                _ => None,
            },
            Self::Float(_) | Self::Map(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, StatusValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Map(_))
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for StatusValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for StatusValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for StatusValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for StatusValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for StatusValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// A single-property update delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushDelta {
    pub key: String,
    pub value: StatusValue,
}

/// Convert a JSON object into a [`StatusMap`], dropping `null`s and arrays.
pub(crate) fn map_from_json(obj: serde_json::Map<String, serde_json::Value>) -> StatusMap {
    obj.into_iter()
        .filter_map(|(k, v)| match StatusValue::from_json(v) {
            Some(value) => Some((k, value)),
            None => {
                tracing::trace!(key = %k, "skipping status field without a scalar or object value");
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_stay_integers() {
        assert_eq!(StatusValue::from_json(json!(1)), Some(StatusValue::Int(1)));
        assert_eq!(
            StatusValue::from_json(json!(96.2)),
            Some(StatusValue::Float(96.2))
        );
    }

    #[test]
    fn lenient_booleans() {
        assert_eq!(StatusValue::Int(0).as_bool(), Some(false));
        assert_eq!(StatusValue::Int(1).as_bool(), Some(true));
        assert_eq!(StatusValue::from("Enabled").as_bool(), Some(true));
        assert_eq!(StatusValue::from("Disabled").as_bool(), Some(false));
        assert_eq!(StatusValue::from("none").as_bool(), None);
        assert_eq!(StatusValue::Float(1.0).as_bool(), None);
    }

    #[test]
    fn nested_objects_become_composites() {
        let value = StatusValue::from_json(json!({
            "auto": "Enabled",
            "on": { "time": 6 },
            "off": { "time": 17 },
            "note": null
        }))
        .unwrap();

        assert!(value.is_composite());
        let map = value.as_map().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["on"].as_map().unwrap()["time"], StatusValue::Int(6));
    }

    #[test]
    fn map_from_json_drops_nulls_and_arrays() {
        let obj = json!({
            "power": 1,
            "coffee_set_temp": 96.2,
            "water_reservoir_contact": null,
            "history": [1, 2, 3]
        });
        let serde_json::Value::Object(obj) = obj else {
            panic!("expected object")
        };

        let map = map_from_json(obj);
        assert_eq!(map.len(), 2);
        assert_eq!(map["power"], StatusValue::Int(1));
    }

    #[test]
    fn untagged_deserialize_prefers_narrowest() {
        let map: StatusMap =
            serde_json::from_str(r#"{"a": true, "b": 3, "c": 2.5, "d": "x"}"#).unwrap();
        assert_eq!(map["a"], StatusValue::Bool(true));
        assert_eq!(map["b"], StatusValue::Int(3));
        assert_eq!(map["c"], StatusValue::Float(2.5));
        assert_eq!(map["d"], StatusValue::Text("x".into()));
    }

    #[test]
    fn display_composite() {
        let mut inner = BTreeMap::new();
        inner.insert("on".to_string(), StatusValue::Int(6));
        inner.insert("auto".to_string(), StatusValue::from("Enabled"));
        assert_eq!(StatusValue::Map(inner).to_string(), "{auto: Enabled, on: 6}");
    }
}
