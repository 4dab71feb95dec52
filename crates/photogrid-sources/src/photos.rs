use serde::{Deserialize, Serialize};
use url::Url;

use crate::{PhotoId, Sol};

/// The camera that took a photo.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CameraInfo {
    /// Short camera code, e.g. `FHAZ`.
    pub name: String,

    /// Human readable camera name.
    #[serde(default)]
    pub full_name: String,
}

/// A reference to one photo as returned by the photos endpoint.
///
/// This carries everything needed to fetch the actual image bytes; the image
/// itself lives behind [`img_src`](Self::img_src).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PhotoReference {
    /// The globally unique photo id.
    pub id: PhotoId,

    /// The sol on which the photo was taken.
    pub sol: Sol,

    /// The camera that took the photo.
    pub camera: CameraInfo,

    /// Absolute URL of the image file.
    pub img_src: Url,

    /// The earth date corresponding to the sol, as `YYYY-MM-DD`.
    pub earth_date: String,
}

/// Per-sol summary from the rover's mission manifest.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SolDescription {
    /// The sol being described.
    pub sol: Sol,

    /// The earth date corresponding to the sol, as `YYYY-MM-DD`.
    pub earth_date: String,

    /// Number of photos taken on this sol.
    pub total_photos: u64,

    /// Camera codes that were active on this sol.
    #[serde(default)]
    pub cameras: Vec<String>,
}

/// The mission manifest of a rover.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Rover {
    /// The rover's name, e.g. `Curiosity`.
    pub name: String,

    /// Mission status, e.g. `active` or `complete`.
    #[serde(default)]
    pub status: String,

    /// The most recent sol with photos.
    pub max_sol: Sol,

    /// Total number of photos taken by this rover.
    #[serde(default)]
    pub total_photos: u64,

    /// Per-sol photo summaries, in ascending sol order.
    #[serde(rename = "photos", default)]
    pub sol_descriptions: Vec<SolDescription>,
}

impl Rover {
    /// Looks up the [`SolDescription`] for the given sol.
    pub fn sol_description(&self, sol: Sol) -> Option<&SolDescription> {
        self.sol_descriptions.iter().find(|d| d.sol == sol)
    }
}
