//! The photogrid core service.
//!
//! This crate implements the on-demand image loading pipeline behind a photo
//! grid: a bounded in-memory cache of image payloads, HTTP downloaders for
//! the rover photo API and the images themselves, and the
//! [`ImagePipeline`](pipeline::ImagePipeline) that deduplicates concurrent
//! fetches per photo, cancels work for cells that scroll away, and protects
//! reused cells from stale deliveries.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod download;
pub mod logging;
pub mod pipeline;
pub mod utils;
