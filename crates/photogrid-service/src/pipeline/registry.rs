use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::Shared;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use photogrid_sources::PhotoId;

use crate::utils::futures::CallOnDrop;

use super::task::FetchOutcome;

/// A clonable channel yielding a fetch's terminal outcome.
///
/// Every subscriber polls its own clone; the sender side is completed by the
/// task future exactly once.
pub(super) type FetchChannel = Shared<oneshot::Receiver<FetchOutcome>>;

struct InFlightFetch {
    channel: FetchChannel,
    token: CancellationToken,
    /// Number of slots currently interested in this fetch.
    subscribers: usize,
}

/// The table of in-flight fetches, keyed by photo id.
///
/// The registry enforces that at most one fetch per photo is ever in flight:
/// concurrent subscriptions for the same id are coalesced onto the same
/// channel. It is also the cancellation handle for everything it tracks.
///
/// An entry lives from [`subscribe`](Self::subscribe) spawning the fetch
/// until the task future reaches a terminal state and drops its removal
/// guard.
#[derive(Clone, Default)]
pub(super) struct TaskRegistry {
    inner: Arc<Mutex<BTreeMap<PhotoId, InFlightFetch>>>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("in_flight", &self.inner.lock().len())
            .finish()
    }
}

impl TaskRegistry {
    /// Subscribes to the in-flight fetch for `id`, creating it if absent.
    ///
    /// When a fetch is already in flight, its channel is returned together
    /// with `false` and the subscriber count is bumped; the caller must not
    /// start another fetch.
    ///
    /// Otherwise `spawn` is invoked with the new fetch's cancellation token,
    /// the sender completing the returned channel, and a guard that removes
    /// the registry entry when dropped. The callback must arrange for the
    /// fetch to run, to drop the guard on any terminal state, and to
    /// complete the sender.
    pub(super) fn subscribe<S>(&self, id: PhotoId, spawn: S) -> (FetchChannel, bool)
    where
        S: FnOnce(CancellationToken, oneshot::Sender<FetchOutcome>, CallOnDrop),
    {
        let mut inner = self.inner.lock();

        if let Some(entry) = inner.get_mut(&id) {
            // A concurrent fetch for this photo was deduplicated.
            metric!(counter("fetch.channel.hit") += 1);
            entry.subscribers += 1;
            return (entry.channel.clone(), false);
        }

        metric!(counter("fetch.channel.miss") += 1);

        let (sender, receiver) = oneshot::channel();
        let channel = receiver.shared();
        let token = CancellationToken::new();

        let remove_token = CallOnDrop::new({
            let registry = self.clone();
            move || registry.remove(id)
        });

        let evicted = inner.insert(
            id,
            InFlightFetch {
                channel: channel.clone(),
                token: token.clone(),
                subscribers: 1,
            },
        );
        debug_assert!(evicted.is_none());

        // Release the lock before handing control to the caller: the removal
        // guard takes it again when the task finishes, and nothing stops a
        // synchronous spawn callback from reaching a terminal state
        // immediately.
        drop(inner);

        spawn(token, sender, remove_token);

        (channel, true)
    }

    /// Removes the entry for `id`, if present.
    ///
    /// This is the single removal path: it runs when the task future reaches
    /// any terminal state, whether completed, failed, or cancelled.
    pub(super) fn remove(&self, id: PhotoId) {
        self.inner.lock().remove(&id);
    }

    /// Detaches one subscriber's interest from the in-flight fetch for `id`.
    ///
    /// The underlying fetch is only cancelled when the last subscriber
    /// detaches; other cells waiting for the same photo keep it alive.
    /// Entries are not removed here, removal happens through the task's own
    /// terminal-state path, which avoids races between an explicit cancel
    /// and natural completion. Detaching from a fetch that already completed
    /// is a no-op.
    pub(super) fn cancel(&self, id: PhotoId) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.get_mut(&id) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
            if entry.subscribers == 0 {
                entry.token.cancel();
            }
        }
    }

    /// The number of fetches currently in flight.
    pub(super) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
