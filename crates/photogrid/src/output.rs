//! A render target that writes delivered photos to disk.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

use photogrid_service::pipeline::{RenderTarget, SlotId};
use photogrid_sources::PhotoId;

/// Writes every delivered payload into the output directory, named by the
/// photo id.
///
/// Slots are indices into the photo listing the pipeline was driven with.
pub struct DirectoryRender {
    output: PathBuf,
    ids: Vec<PhotoId>,
    written: AtomicUsize,
}

impl DirectoryRender {
    /// Creates a render target writing into `output`.
    ///
    /// `ids` maps slot indices to photo ids.
    pub fn new(output: PathBuf, ids: Vec<PhotoId>) -> Self {
        Self {
            output,
            ids,
            written: AtomicUsize::new(0),
        }
    }

    /// The number of photos written so far.
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }
}

impl RenderTarget for DirectoryRender {
    fn display(&self, slot: SlotId, payload: Bytes) {
        let Some(id) = self.ids.get(slot.0 as usize) else {
            return;
        };

        let path = self.output.join(format!("{id}.jpg"));
        match std::fs::write(&path, &payload) {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(
                    error = &e as &dyn std::error::Error,
                    path = %path.display(),
                    "Failed to write image",
                );
            }
        }
    }

    fn clear(&self, _slot: SlotId) {}
}
