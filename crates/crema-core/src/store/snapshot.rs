use chrono::{DateTime, Utc};
use serde::Serialize;

use crema_api::{StatusMap, StatusValue};

use crate::model::keys::BREW_ACTIVE;

/// Immutable point-in-time view of the machine status.
///
/// Handed to observers and readers behind an `Arc`; the store never
/// mutates a snapshot that has been published.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    properties: StatusMap,
    brew_active: Option<bool>,
    revision: u64,
    last_full_merge: Option<DateTime<Utc>>,
    last_delta_merge: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    /// Look up a property. The reserved `brew_active` key reads the
    /// dedicated brewing flag.
    pub fn get(&self, key: &str) -> Option<StatusValue> {
        if key == BREW_ACTIVE {
            return self.brew_active.map(StatusValue::Bool);
        }
        self.properties.get(key).cloned()
    }

    pub fn brew_active(&self) -> Option<bool> {
        self.brew_active
    }

    /// Regular properties, without the reserved brewing flag.
    pub fn properties(&self) -> &StatusMap {
        &self.properties
    }

    /// Flatten into one mapping, including `brew_active` once it is known.
    pub fn to_map(&self) -> StatusMap {
        let mut map = self.properties.clone();
        if let Some(active) = self.brew_active {
            map.insert(BREW_ACTIVE.to_owned(), StatusValue::Bool(active));
        }
        map
    }

    pub fn keys(&self) -> Vec<String> {
        self.to_map().into_keys().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        if key == BREW_ACTIVE {
            self.brew_active.is_some()
        } else {
            self.properties.contains_key(key)
        }
    }

    pub fn len(&self) -> usize {
        self.properties.len() + usize::from(self.brew_active.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bumped once per applied merge.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_full_merge(&self) -> Option<DateTime<Utc>> {
        self.last_full_merge
    }

    pub fn last_delta_merge(&self) -> Option<DateTime<Utc>> {
        self.last_delta_merge
    }

    // ── Mutation (store only) ────────────────────────────────────────

    /// Set one key, routing `brew_active` to its reserved slot.
    ///
    /// Returns `false` if the value was rejected.
    pub(super) fn apply(&mut self, key: String, value: StatusValue) -> bool {
        if key == BREW_ACTIVE {
            return match value.as_bool() {
                Some(active) => {
                    self.brew_active = Some(active);
                    true
                }
                None => {
                    tracing::warn!(%value, "ignoring non-boolean brew_active value");
                    false
                }
            };
        }
        // Composite values replace the whole entry.
        self.properties.insert(key, value);
        true
    }

    pub(super) fn stamp_full(&mut self, at: DateTime<Utc>) {
        self.revision += 1;
        self.last_full_merge = Some(at);
    }

    pub(super) fn stamp_delta(&mut self, at: DateTime<Utc>) {
        self.revision += 1;
        self.last_delta_merge = Some(at);
    }
}
