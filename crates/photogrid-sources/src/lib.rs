//! Identity and model types for the rover photo API.
//!
//! Includes the photo identifier used as cache and deduplication key, the
//! JSON models returned by the photos and manifest endpoints, and the
//! configuration describing the remote API itself.

#![warn(missing_docs)]

mod photos;
mod sources;
mod types;

pub use photos::*;
pub use sources::*;
pub use types::*;
