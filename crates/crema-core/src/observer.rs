// ── Observer registry ──
//
// Holds weak references to status observers. The registry never keeps an
// observer alive: once the caller drops its `Arc`, the entry is pruned on
// the next notification.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use uuid::Uuid;

use crate::store::StatusSnapshot;

/// Receives the new snapshot after every successful merge.
///
/// Callbacks run on the task that performed the merge, one snapshot at a
/// time and in revision order. Keep them short and non-blocking, and do not
/// call `on_push_message` from inside one: the coordinator is still holding
/// its notify gate. Closures implement this trait automatically.
pub trait StatusObserver: Send + Sync {
    fn on_status_update(&self, snapshot: &Arc<StatusSnapshot>);
}

impl<F> StatusObserver for F
where
    F: Fn(&Arc<StatusSnapshot>) + Send + Sync,
{
    fn on_status_update(&self, snapshot: &Arc<StatusSnapshot>) {
        self(snapshot);
    }
}

/// Opaque handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    observers: DashMap<SubscriptionHandle, Weak<dyn StatusObserver>>,
}

impl ObserverRegistry {
    pub(crate) fn subscribe<O: StatusObserver + 'static>(
        &self,
        observer: &Arc<O>,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle::new();
        let observer: Arc<dyn StatusObserver> = observer.clone();
        self.observers.insert(handle, Arc::downgrade(&observer));
        handle
    }

    /// Returns `true` if the handle was registered.
    pub(crate) fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.observers.remove(&handle).is_some()
    }

    /// Call every live observer once with `snapshot`.
    ///
    /// Observers are collected first so no map shard is locked while a
    /// callback runs (a callback may subscribe or unsubscribe).
    pub(crate) fn notify(&self, snapshot: &Arc<StatusSnapshot>) {
        let mut live = Vec::with_capacity(self.observers.len());
        let mut dead = Vec::new();
        for entry in &self.observers {
            match entry.value().upgrade() {
                Some(observer) => live.push(observer),
                None => dead.push(*entry.key()),
            }
        }

        for handle in dead {
            self.observers.remove(&handle);
        }
        if !live.is_empty() {
            tracing::trace!(observers = live.len(), revision = snapshot.revision(), "notifying");
        }
        for observer in live {
            observer.on_status_update(snapshot);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn clear(&self) {
        self.observers.clear();
    }
}
