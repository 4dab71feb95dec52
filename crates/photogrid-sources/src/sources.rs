use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// The default public rover photo API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.nasa.gov/mars-photos/api/v1/";

/// Configuration for the rover photo HTTP API.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RoverApiConfig {
    /// Absolute base URL of the API.
    pub url: Url,

    /// API key appended to every request.
    ///
    /// The public endpoint accepts `DEMO_KEY` with a low rate limit.
    pub api_key: String,

    /// Additional headers to be sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for RoverApiConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_API_URL).unwrap(),
            api_key: "DEMO_KEY".into(),
            headers: Default::default(),
        }
    }
}

impl RoverApiConfig {
    /// Returns the manifest URL for the given rover.
    pub fn manifest_url(&self, rover: &str) -> Url {
        let mut url = self
            .url
            .join(&format!("manifests/{rover}"))
            .unwrap_or_else(|_| self.url.clone());
        url.query_pairs_mut().append_pair("api_key", &self.api_key);
        url
    }

    /// Returns the photo listing URL for the given rover and sol.
    pub fn photos_url(&self, rover: &str, sol: crate::Sol) -> Url {
        let mut url = self
            .url
            .join(&format!("rovers/{rover}/photos"))
            .unwrap_or_else(|_| self.url.clone());
        url.query_pairs_mut()
            .append_pair("sol", &sol.to_string())
            .append_pair("api_key", &self.api_key);
        url
    }
}
