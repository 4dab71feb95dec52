use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;

use photogrid_service::download::{FetchError, ImageFetch};
use photogrid_service::pipeline::{RenderTarget, SlotId};
use photogrid_sources::PhotoReference;
use photogrid_test as test;

/// Waits until `condition` holds, panicking if it takes unreasonably long.
pub async fn wait_for(description: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {description}");
}

/// Gives spawned deliveries a chance to run before negative assertions.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// An in-memory [`ImageFetch`] whose completion is gated by the test.
///
/// Every fetch counts its invocation, then waits until the gate is opened
/// before producing the deterministic payload for its photo id (or an error,
/// for ids marked as failing). Keeping the gate closed holds all fetches
/// in-flight, which makes deduplication and cancellation timing fully
/// deterministic.
#[derive(Clone)]
pub struct TestFetch {
    calls: Arc<AtomicUsize>,
    gate: watch::Receiver<bool>,
    failing: HashSet<u64>,
}

/// Opens the gate of the [`TestFetch`] it came from when told to.
pub struct Gate(watch::Sender<bool>);

impl Gate {
    pub fn open(&self) {
        self.0.send(true).ok();
    }
}

impl TestFetch {
    /// Creates a fetcher with a closed gate.
    pub fn gated() -> (Self, Gate) {
        let (sender, receiver) = watch::channel(false);
        let fetch = Self {
            calls: Default::default(),
            gate: receiver,
            failing: Default::default(),
        };
        (fetch, Gate(sender))
    }

    /// Creates a fetcher that completes immediately.
    pub fn open() -> Self {
        let (fetch, gate) = Self::gated();
        gate.open();
        fetch
    }

    /// Marks the given photo id as failing with a download error.
    pub fn failing(mut self, id: u64) -> Self {
        self.failing.insert(id);
        self
    }

    /// The number of times the fetch capability was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageFetch for TestFetch {
    async fn fetch_image(&self, reference: &PhotoReference) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.gate.clone();
        gate.wait_for(|open| *open).await.ok();

        if self.failing.contains(&reference.id.0) {
            Err(FetchError::Download("500 Internal Server Error".into()))
        } else {
            Ok(Bytes::from(test::image_bytes(reference.id.0)))
        }
    }
}

/// A [`RenderTarget`] that records everything it is told to show.
#[derive(Clone, Default)]
pub struct RecordingRender {
    displays: Arc<Mutex<Vec<(SlotId, Bytes)>>>,
    clears: Arc<Mutex<Vec<SlotId>>>,
}

impl RecordingRender {
    /// All recorded displays, in order.
    pub fn displays(&self) -> Vec<(SlotId, Bytes)> {
        self.displays.lock().unwrap().clone()
    }

    /// The most recent payload displayed in the given slot.
    pub fn displayed(&self, slot: SlotId) -> Option<Bytes> {
        self.displays
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(s, _)| *s == slot)
            .map(|(_, payload)| payload.clone())
    }

    /// All recorded clears, in order.
    pub fn clears(&self) -> Vec<SlotId> {
        self.clears.lock().unwrap().clone()
    }
}

impl RenderTarget for RecordingRender {
    fn display(&self, slot: SlotId, payload: Bytes) {
        self.displays.lock().unwrap().push((slot, payload));
    }

    fn clear(&self, slot: SlotId) {
        self.clears.lock().unwrap().push(slot);
    }
}

/// A photo reference for tests that never hit the network.
pub fn local_reference(id: u64) -> PhotoReference {
    use photogrid_sources::{CameraInfo, PhotoId};

    PhotoReference {
        id: PhotoId::new(id),
        sol: 1000,
        camera: CameraInfo {
            name: "FHAZ".into(),
            full_name: "Front Hazard Avoidance Camera".into(),
        },
        img_src: format!("http://localhost:1/photos/{id}.jpg").parse().unwrap(),
        earth_date: "2015-05-30".into(),
    }
}
