// ── Reactive factory stream ──
//
// Subscription handle for consuming snapshot changes from the FactoryStore.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::FactoryState;

/// A subscription to the factory snapshot.
///
/// Provides both point-in-time access and change notification via
/// [`changed()`](Self::changed) or by converting into a `Stream`.
pub struct FactoryStream {
    current: Arc<FactoryState>,
    receiver: watch::Receiver<Arc<FactoryState>>,
}

impl FactoryStream {
    pub(crate) fn new(mut receiver: watch::Receiver<Arc<FactoryState>>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// The snapshot as of creation or the last `changed()`.
    pub fn current(&self) -> &Arc<FactoryState> {
        &self.current
    }

    /// The latest snapshot (may have changed since `current`).
    pub fn latest(&self) -> Arc<FactoryState> {
        self.receiver.borrow().clone()
    }

    /// Whether a newer snapshot is waiting.
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` if the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<FactoryState>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Convert into a `Stream` that yields the current snapshot, then every
    /// subsequent one.
    pub fn into_stream(self) -> FactoryWatchStream {
        FactoryWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct FactoryWatchStream {
    inner: WatchStream<Arc<FactoryState>>,
}

impl Stream for FactoryWatchStream {
    type Item = Arc<FactoryState>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
