use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use photogrid_sources::PhotoReference;

use crate::caching::PhotoCache;
use crate::download::{FetchError, ImageFetch};

/// The terminal outcome of one fetch attempt.
pub type FetchOutcome = Result<Bytes, FetchError>;

/// One attempt to retrieve the image payload for a photo.
///
/// A task is created by the registry when no fetch for its photo is in
/// flight. It waits for a worker slot, performs the remote retrieval, and
/// commits the payload to the cache before its completion is fanned out to
/// subscribers.
///
/// Cancellation is cooperative: the token is checked before dialing out and
/// again after the response returns. Once it fires, no side effect is
/// committed, even if the payload is already in hand.
pub(super) struct FetchTask<F> {
    reference: PhotoReference,
    fetcher: Arc<F>,
    cache: PhotoCache,
    token: CancellationToken,
    workers: Arc<Semaphore>,
}

impl<F: ImageFetch> FetchTask<F> {
    pub(super) fn new(
        reference: PhotoReference,
        fetcher: Arc<F>,
        cache: PhotoCache,
        token: CancellationToken,
        workers: Arc<Semaphore>,
    ) -> Self {
        Self {
            reference,
            fetcher,
            cache,
            token,
            workers,
        }
    }

    /// Runs the fetch to its terminal outcome.
    pub(super) async fn run(self) -> FetchOutcome {
        let id = self.reference.id;

        // The semaphore is never closed while the pipeline is alive, so
        // acquisition only fails during teardown.
        let _permit = match self.workers.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Err(FetchError::Cancelled),
        };

        if self.token.is_cancelled() {
            metric!(counter("fetch.cancelled") += 1, "stage" => "queued");
            return Err(FetchError::Cancelled);
        }

        let result = self.fetcher.fetch_image(&self.reference).await;

        // The network call may well have completed, but a cancelled outcome
        // must not be acted upon.
        if self.token.is_cancelled() {
            metric!(counter("fetch.cancelled") += 1, "stage" => "fetched");
            return Err(FetchError::Cancelled);
        }

        match result {
            Ok(payload) => {
                // The cache write is tied to the fetch, not to any slot: even
                // if every interested cell scrolled away by now, the payload
                // benefits future requests for this photo.
                self.cache.insert(id, payload.clone());
                metric!(counter("fetch.done") += 1, "status" => "ok");
                Ok(payload)
            }
            Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
            Err(err) => {
                tracing::error!(%id, error = %err, "Failed to fetch photo");
                metric!(counter("fetch.done") += 1, "status" => "err");
                Err(err)
            }
        }
    }
}
