use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use photogrid_sources::RoverApiConfig;

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other).
    Auto,
    /// With colors.
    Pretty,
    /// Simplified log output.
    Simplified,
    /// Dump out JSON lines.
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance.
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: std::env::var("STATSD_SERVER").ok(),
            prefix: "photogrid".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Capacities of the in-memory caches.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct InMemoryCacheConfig {
    /// Capacity of the photo payload cache, in bytes.
    ///
    /// Entries are weighed by their payload size, so this bounds the total
    /// memory spent on cached images.
    ///
    /// Defaults to `64 MiB`.
    pub photo_capacity: u64,

    /// Capacity of the photo index cache, in entries.
    ///
    /// The index cache holds the photo listings returned by the rover API,
    /// keyed by rover and sol.
    ///
    /// Defaults to `1_000`.
    pub index_capacity: u64,

    /// The TTL for photo index entries.
    ///
    /// Defaults to `1h`.
    #[serde(with = "humantime_serde")]
    pub index_ttl: Duration,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            photo_capacity: 64 * 1024 * 1024,
            index_capacity: 1_000,
            index_ttl: Duration::from_secs(3600),
        }
    }
}

/// Timeouts for remote downloads.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct DownloadTimeouts {
    /// The timeout for establishing a connection.
    #[serde(with = "humantime_serde")]
    pub connect: Duration,
    /// Global timeout for one download.
    #[serde(with = "humantime_serde")]
    pub max_download: Duration,
}

impl Default for DownloadTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(500),
            max_download: Duration::from_secs(60),
        }
    }
}

/// The service configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which log level and format to use.
    pub logging: Logging,

    /// Statsd metrics settings.
    pub metrics: Metrics,

    /// In-memory cache capacities.
    pub in_memory: InMemoryCacheConfig,

    /// Timeouts for image and API downloads.
    pub timeouts: DownloadTimeouts,

    /// The maximum number of image fetches that run concurrently.
    ///
    /// Further fetches wait for a free worker slot; waiting fetches can
    /// still be cancelled.
    ///
    /// Defaults to `8`.
    pub max_concurrent_fetches: usize,

    /// The rover photo API to talk to.
    pub api: RoverApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: Default::default(),
            metrics: Default::default(),
            in_memory: Default::default(),
            timeouts: Default::default(),
            max_concurrent_fetches: 8,
            api: Default::default(),
        }
    }
}

impl Config {
    /// Loads the config from a YAML file, or the defaults if no path is given.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        serde_yaml::from_reader(reader).context("failed to parse YAML")
    }
}

fn deserialize_level_filter<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}
