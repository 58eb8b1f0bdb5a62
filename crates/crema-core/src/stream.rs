// ── Reactive status stream ──
//
// Subscription type for consuming store changes without registering an
// observer callback.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::StatusSnapshot;

/// A subscription to the machine status.
///
/// Provides both point-in-time snapshot access and change notification via
/// [`changed`](Self::changed) or by converting into a `Stream`. Intermediate
/// snapshots may be coalesced if the consumer falls behind; the latest one
/// is never lost.
pub struct StatusStream {
    current: Arc<StatusSnapshot>,
    receiver: watch::Receiver<Arc<StatusSnapshot>>,
}

impl StatusStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<StatusSnapshot>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation time (or at the last `changed`).
    pub fn current(&self) -> &Arc<StatusSnapshot> {
        &self.current
    }

    /// The latest snapshot, which may be newer than `current`.
    pub fn latest(&self) -> Arc<StatusSnapshot> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<StatusSnapshot>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    ///
    /// The stream yields the current snapshot first.
    pub fn into_stream(self) -> StatusWatchStream {
        StatusWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct StatusWatchStream {
    inner: WatchStream<Arc<StatusSnapshot>>,
}

impl Stream for StatusWatchStream {
    type Item = Arc<StatusSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
