//! Downloading of photo listings and image payloads.
//!
//! This module owns the HTTP side of the service: the [`RoverClient`] that
//! talks to the rover photo API, and the [`ImageDownloader`] that fetches the
//! actual image bytes. The [`ImageFetch`] trait is the seam between the
//! pipeline and the network; tests substitute their own implementations.

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use photogrid_sources::PhotoReference;

mod api;
mod http;

pub use api::RoverClient;
pub use http::ImageDownloader;

/// The user agent sent with every outgoing request.
pub const USER_AGENT: &str = concat!("photogrid/", env!("CARGO_PKG_VERSION"));

/// An error that happens when fetching a payload from a remote location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The photo was not found at the remote source.
    #[error("not found")]
    NotFound,
    /// The download did not complete within the configured timeout.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// The download failed due to another problem, like connection loss,
    /// DNS resolution, or a 5xx server response.
    ///
    /// The attached string contains the remote source's response.
    #[error("download failed: {0}")]
    Download(String),
    /// The payload was fetched successfully, but is invalid in some way.
    #[error("malformed: {0}")]
    Malformed(String),
    /// The fetch was cancelled before its result was needed.
    ///
    /// This is the expected outcome for cells that scroll away; it is never
    /// treated as a failure.
    #[error("fetch was cancelled")]
    Cancelled,
}

impl FetchError {
    fn download_error(mut error: &dyn Error) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }

        let mut error_string = error.to_string();

        // Special-case a few error strings
        if error_string.contains("certificate verify failed") {
            error_string = "certificate verify failed".to_string();
        }

        if error_string.contains("SSL routines") {
            error_string = "SSL error".to_string();
        }

        Self::Download(error_string)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Malformed(error.to_string())
        } else {
            Self::download_error(&error)
        }
    }
}

/// The capability to fetch the image bytes behind a [`PhotoReference`].
///
/// Implementations perform one retrieval attempt and report its outcome;
/// retry policy, caching and deduplication all live above this trait.
pub trait ImageFetch: Send + Sync + 'static {
    /// Fetches the image payload for the given photo.
    fn fetch_image(
        &self,
        reference: &PhotoReference,
    ) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}
