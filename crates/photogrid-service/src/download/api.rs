//! Client for the rover photo API.
//!
//! This resolves a `(rover, sol)` pair into the list of photo references for
//! that sol, and fetches rover mission manifests. Listings are held in a
//! TTL-bounded in-memory index cache so that scrolling back and forth within
//! a sol does not hammer the API.

use std::sync::Arc;

use reqwest::{Client, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use photogrid_sources::{PhotoReference, Rover, RoverApiConfig, Sol};

use crate::config::{DownloadTimeouts, InMemoryCacheConfig};

use super::{FetchError, USER_AGENT};

#[derive(Clone, Debug, Deserialize)]
struct PhotosResponse {
    photos: Vec<PhotoReference>,
}

#[derive(Clone, Debug, Deserialize)]
struct ManifestResponse {
    photo_manifest: Rover,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct IndexQuery {
    rover: String,
    sol: Sol,
}

/// An LRU cache for photo listings, keyed by rover and sol.
type PhotoIndexCache =
    moka::future::Cache<IndexQuery, Result<Arc<[PhotoReference]>, FetchError>>;

/// Client for the rover photo API.
pub struct RoverClient {
    client: Client,
    config: RoverApiConfig,
    timeouts: DownloadTimeouts,
    index_cache: PhotoIndexCache,
}

impl std::fmt::Debug for RoverClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoverClient")
            .field("config", &self.config)
            .field("index_cache", &self.index_cache.entry_count())
            .finish()
    }
}

impl RoverClient {
    /// Creates a new API client.
    pub fn new(
        config: RoverApiConfig,
        timeouts: DownloadTimeouts,
        in_memory: &InMemoryCacheConfig,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .build()
            .unwrap_or_default();
        let index_cache = PhotoIndexCache::builder()
            .max_capacity(in_memory.index_capacity)
            .time_to_live(in_memory.index_ttl)
            .build();

        Self {
            client,
            config,
            timeouts,
            index_cache,
        }
    }

    /// Make a request to the API and parse the response as JSON.
    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn fetch_json<T>(&self, url: Url) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let mut request = self
            .client
            .get(url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/json");

        for (key, value) in &self.config.headers {
            if let Ok(key) = header::HeaderName::from_bytes(key.as_bytes()) {
                request = request.header(key, value.as_str());
            }
        }

        let request = async {
            let response = request.send().await?;

            if response.status().is_success() {
                tracing::trace!("Success fetching from the rover API");
                Ok(response.json().await?)
            } else {
                tracing::warn!("Rover API returned status code {}", response.status());
                Err(FetchError::Download(response.status().to_string()))
            }
        };

        match tokio::time::timeout(self.timeouts.max_download, request).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeouts.max_download)),
        }
    }

    /// Fetches the mission manifest for the given rover.
    pub async fn rover(&self, name: &str) -> Result<Rover, FetchError> {
        let url = self.config.manifest_url(name);
        tracing::debug!("Fetching manifest for rover `{name}`");

        let response: ManifestResponse = self.fetch_json(url).await?;
        Ok(response.photo_manifest)
    }

    /// Lists the photos the given rover took on the given sol.
    ///
    /// Listings are served from the index cache when possible; errors are
    /// kept in the cache only until the next request for the same sol.
    pub async fn list_photos(
        &self,
        rover: &str,
        sol: Sol,
    ) -> Result<Arc<[PhotoReference]>, FetchError> {
        let query = IndexQuery {
            rover: rover.to_lowercase(),
            sol,
        };

        metric!(counter("source.api.photo_query.access") += 1);

        let init = Box::pin(async {
            metric!(counter("source.api.photo_query.computation") += 1);
            tracing::debug!("Fetching photo list for rover `{rover}` on sol {sol}");

            let url = self.config.photos_url(&query.rover, sol);
            let response: Result<PhotosResponse, _> = self.fetch_json(url).await;

            response.map(|r| Arc::from(r.photos))
        });

        self.index_cache
            .entry_by_ref(&query)
            .or_insert_with_if(init, |entry| entry.is_err())
            .await
            .into_value()
    }
}
