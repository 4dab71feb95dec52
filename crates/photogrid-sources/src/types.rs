use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a single rover photo.
///
/// Photo ids are globally unique across rovers and sols and are stable: the
/// same id always refers to the same image. They are used as the key for
/// caching and in-flight request deduplication.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PhotoId(pub u64);

impl PhotoId {
    /// Creates a new [`PhotoId`] from its raw numeric value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for PhotoId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for PhotoId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// A martian day, counted from the rover's landing.
pub type Sol = u32;
