// ── Central status store ──
//
// Single source of truth for the machine's last-known state. Every merge
// runs under the watch channel's lock against a copy-on-write snapshot and
// publishes the result in one step, so no reader ever sees a half-applied
// merge.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use crema_api::{StatusMap, StatusValue};

use super::StatusSnapshot;

/// Thread-safe status store with push-based change notification.
///
/// Mutated only by the sync coordinator. Readers get `Arc` snapshots that
/// stay valid (and unchanged) for as long as they hold them.
pub struct StatusStore {
    snapshot: watch::Sender<Arc<StatusSnapshot>>,
}

impl StatusStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(StatusSnapshot::default()));
        Self { snapshot }
    }

    /// Overwrite every key present in `status`.
    ///
    /// Keys absent from `status` are left untouched: values from an older
    /// pull survive until a later pull or delta overwrites them.
    pub fn merge_full(&self, status: StatusMap) -> Arc<StatusSnapshot> {
        let mut published = Arc::default();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|current| {
            let next = Arc::make_mut(current);
            for (key, value) in status {
                next.apply(key, value);
            }
            next.stamp_full(Utc::now());
            published = Arc::clone(current);
        });
        published
    }

    /// Set a single key (push-channel delta).
    ///
    /// Returns `None` when the value was rejected; nothing is published then.
    pub fn merge_one(&self, key: &str, value: StatusValue) -> Option<Arc<StatusSnapshot>> {
        let mut published = None;
        self.snapshot.send_if_modified(|current| {
            let mut next = StatusSnapshot::clone(current);
            if !next.apply(key.to_owned(), value) {
                return false;
            }
            next.stamp_delta(Utc::now());
            *current = Arc::new(next);
            published = Some(Arc::clone(current));
            true
        });
        published
    }

    /// The current snapshot (cheap `Arc` clone).
    pub fn read(&self) -> Arc<StatusSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StatusSnapshot>> {
        self.snapshot.subscribe()
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}
