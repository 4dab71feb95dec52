//! The per-photo fetch/cache/cancellation pipeline.
//!
//! The [`ImagePipeline`] drives a grid of reusable display slots: a request
//! binds a slot to a photo and guarantees that the slot eventually shows
//! either a cached payload or a freshly fetched one, or nothing at all if it
//! was rebound or cancelled first. Concurrent requests for the same photo
//! are coalesced onto a single fetch, and work for cells that scroll away is
//! cancelled cooperatively.
//!
//! Fetches run on the tokio runtime, bounded by a worker semaphore.
//! Deliveries are funneled through a dedicated consumer task which
//! re-validates the slot's binding before every display, so a delayed result
//! can never flash up in a cell that has since been reused for another
//! photo.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};

use photogrid_sources::{PhotoId, PhotoReference};

use crate::caching::PhotoCache;
use crate::config::Config;
use crate::download::ImageFetch;
use crate::utils::futures::CancelOnDrop;

mod registry;
mod task;

use registry::TaskRegistry;
use task::FetchTask;

/// Identifier of a reusable display slot (one grid cell).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub u32);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The surface that displays fetched payloads.
///
/// Calls are serialized by the pipeline and never run concurrently with a
/// rebind of the same slot. Implementations must return quickly and must not
/// call back into the pipeline.
pub trait RenderTarget: Send + Sync + 'static {
    /// Shows the payload in the given slot.
    fn display(&self, slot: SlotId, payload: Bytes);

    /// Clears the given slot back to its placeholder state.
    fn clear(&self, slot: SlotId);
}

/// A payload delivery waiting for the consumer context.
struct Delivery {
    slot: SlotId,
    id: PhotoId,
    payload: Bytes,
}

/// The consumer side: slot bindings plus the render target.
///
/// All binding mutations and the staleness check take the same lock, so a
/// pending delivery either observes a slot's old binding or its new one,
/// never anything in between.
struct Consumer {
    bindings: Mutex<HashMap<SlotId, PhotoId>>,
    render: Arc<dyn RenderTarget>,
}

impl Consumer {
    /// Re-validates the slot's binding and displays the payload if the slot
    /// is still showing the photo it was fetched for.
    fn deliver(&self, delivery: Delivery) {
        let bindings = self.bindings.lock();
        match bindings.get(&delivery.slot) {
            Some(bound) if *bound == delivery.id => {
                self.render.display(delivery.slot, delivery.payload);
            }
            _ => {
                // The slot was rebound or released while the fetch was in
                // flight. Dropping the delivery here is what keeps reused
                // cells from showing the wrong image.
                tracing::debug!(slot = %delivery.slot, id = %delivery.id, "Discarding stale delivery");
                metric!(counter("pipeline.delivery.stale") += 1);
            }
        }
    }
}

/// Orchestrates on-demand loading of photos into display slots.
///
/// Internally deduplicates concurrent fetches per photo (in-memory) and
/// serves repeated requests from the payload cache.
pub struct ImagePipeline<F> {
    fetcher: Arc<F>,
    cache: PhotoCache,
    registry: TaskRegistry,
    workers: Arc<Semaphore>,
    consumer: Arc<Consumer>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    _consumer_task: CancelOnDrop<()>,
}

impl<F> std::fmt::Debug for ImagePipeline<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePipeline")
            .field("cache", &self.cache)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<F: ImageFetch> ImagePipeline<F> {
    /// Creates a new pipeline.
    ///
    /// Fetches are spawned onto the current tokio runtime, with at most
    /// [`max_concurrent_fetches`](Config::max_concurrent_fetches) of them
    /// running at any time. Deliveries to `render` are serialized on a
    /// dedicated consumer task that lives as long as the pipeline.
    pub fn new(config: &Config, fetcher: F, render: Arc<dyn RenderTarget>) -> Self {
        let (deliveries, mut rx) = mpsc::unbounded_channel();

        let consumer = Arc::new(Consumer {
            bindings: Default::default(),
            render,
        });

        let consumer_task = tokio::spawn({
            let consumer = Arc::clone(&consumer);
            async move {
                while let Some(delivery) = rx.recv().await {
                    consumer.deliver(delivery);
                }
            }
        });

        Self {
            fetcher: Arc::new(fetcher),
            cache: PhotoCache::new(&config.in_memory),
            registry: TaskRegistry::default(),
            workers: Arc::new(Semaphore::new(config.max_concurrent_fetches)),
            consumer,
            deliveries,
            _consumer_task: CancelOnDrop::new(consumer_task),
        }
    }

    /// Binds `slot` to the given photo and arranges for its payload to be
    /// displayed.
    ///
    /// On a cache hit the payload is delivered synchronously and no task is
    /// created. Otherwise the slot subscribes to the in-flight fetch for the
    /// photo, starting one if necessary; every slot that coalesces onto the
    /// same fetch receives its own delivery when it completes.
    ///
    /// Any previous interest of this slot is detached first, as if
    /// [`cancel`](Self::cancel) had been called.
    ///
    /// NOTE: This function is deliberately *not* `async`; it eagerly spawns
    /// the fetch and returns, like a cell configuration pass on a rendering
    /// thread would.
    pub fn request(&self, slot: SlotId, reference: &PhotoReference) {
        let id = reference.id;

        {
            let mut bindings = self.consumer.bindings.lock();

            let rebound = match bindings.insert(slot, id) {
                Some(previous) if previous != id => {
                    self.registry.cancel(previous);
                    true
                }
                _ => false,
            };

            if let Some(payload) = self.cache.get(id) {
                // Holding the binding lock keeps this delivery atomic with
                // respect to rebinds, same as deliveries on the consumer
                // task.
                self.render().display(slot, payload);
                return;
            }

            if rebound {
                // Show the placeholder while the new photo loads instead of
                // the photo this cell was reused from.
                self.render().clear(slot);
            }
        }

        let (channel, _is_new) = self.registry.subscribe(id, |token, sender, remove_token| {
            let task = FetchTask::new(
                reference.clone(),
                Arc::clone(&self.fetcher),
                self.cache.clone(),
                token,
                Arc::clone(&self.workers),
            );

            tokio::spawn(async move {
                let outcome = task.run().await;
                // Drop the removal guard before completing the channel, so
                // that latecomers either join a channel that will still
                // produce data, or start a fresh fetch.
                drop(remove_token);
                sender.send(outcome).ok();
            });
        });

        // Wire up this slot's delivery. Failures were already logged by the
        // task and cancelled fetches are expected to go nowhere; in both
        // cases there is nothing to show and the slot keeps its placeholder.
        let deliveries = self.deliveries.clone();
        tokio::spawn(async move {
            if let Ok(Ok(payload)) = channel.await {
                deliveries.send(Delivery { slot, id, payload }).ok();
            }
        });
    }

    /// Releases a slot's interest in its pending photo.
    ///
    /// Invoked when a cell is reused or scrolls out of view before its fetch
    /// completed. The slot is unbound, so a late completion can no longer
    /// touch it; the fetch itself is aborted once no other slot is waiting
    /// for it. Cancelling a slot whose fetch already completed is a no-op.
    pub fn cancel(&self, slot: SlotId) {
        let previous = self.consumer.bindings.lock().remove(&slot);
        if let Some(id) = previous {
            tracing::debug!(slot = %slot, id = %id, "Cancelling");
            self.registry.cancel(id);
        }
    }

    /// The payload cache backing this pipeline.
    pub fn cache(&self) -> &PhotoCache {
        &self.cache
    }

    /// The number of fetches currently in flight.
    pub fn in_flight_fetches(&self) -> usize {
        self.registry.len()
    }

    fn render(&self) -> &dyn RenderTarget {
        &*self.consumer.render
    }
}
