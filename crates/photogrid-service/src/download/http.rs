//! Support to download image payloads over HTTP.

use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use url::Url;

use photogrid_sources::PhotoReference;

use crate::config::DownloadTimeouts;

use super::{FetchError, ImageFetch, USER_AGENT};

/// Downloader for the image files referenced by a photo listing.
#[derive(Debug)]
pub struct ImageDownloader {
    client: Client,
    timeouts: DownloadTimeouts,
}

impl ImageDownloader {
    /// Creates a new downloader with the given timeouts.
    pub fn new(timeouts: DownloadTimeouts) -> Self {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .build()
            .unwrap_or_default();

        Self { client, timeouts }
    }

    /// Creates a downloader that shares an existing [`Client`].
    pub fn with_client(client: Client, timeouts: DownloadTimeouts) -> Self {
        Self { client, timeouts }
    }

    async fn download(&self, url: &Url) -> Result<Bytes, FetchError> {
        tracing::debug!("Fetching image from `{}`", url);

        let request = self
            .client
            .get(url.clone())
            .header(header::USER_AGENT, USER_AGENT)
            .send();

        let download = async {
            let response = request.await?;

            match response.status() {
                StatusCode::NOT_FOUND => Err(FetchError::NotFound),
                status if !status.is_success() => Err(FetchError::Download(status.to_string())),
                _ => Ok(response.bytes().await?),
            }
        };

        match tokio::time::timeout(self.timeouts.max_download, download).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeouts.max_download)),
        }
    }
}

impl ImageFetch for ImageDownloader {
    async fn fetch_image(&self, reference: &PhotoReference) -> Result<Bytes, FetchError> {
        self.download(&reference.img_src).await
    }
}
