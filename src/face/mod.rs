//! Mouth locators.
//!
//! A locator turns a still frame into an ordered mouth polygon in pixel coordinates, or
//! `None` when no face is found. Two strategies exist:
//!
//! - [`LandmarkLocator`] reads a face-mesh landmark file and takes a fixed index range as the
//!   lip contour.
//! - [`HeuristicLocator`] runs a face-rectangle detector and synthesizes an octagon in the
//!   lower part of the largest rectangle. No mouth-specific signal is involved.
//!
//! [`LocatorChain`] tries the configured strategies in order and falls through to the next
//! one when a strategy is unavailable or finds nothing.

mod heuristic;
mod landmarks;
mod polygon;
mod skin;

use std::path::PathBuf;

pub use heuristic::{FaceDetector, HeuristicLocator, mouth_octagon};
pub use landmarks::{LIP_RANGE, LandmarkLocator, LandmarkSet};
pub use polygon::MouthPolygon;
pub use skin::{SkinToneDetector, SkinToneParams};

use crate::foundation::core::{FaceBox, Frame};
use crate::foundation::error::ToonsyncResult;

/// Which strategy produced a [`MouthLocation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    Landmarks,
    Heuristic,
}

impl LocatorStrategy {
    /// Number of points every polygon of this strategy carries.
    pub fn point_count(self) -> usize {
        match self {
            Self::Landmarks => LIP_RANGE.len(),
            Self::Heuristic => 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MouthLocation {
    pub polygon: MouthPolygon,
    /// Face rectangle, when the strategy has one.
    pub face: Option<FaceBox>,
    pub strategy: LocatorStrategy,
}

pub trait MouthLocator: Send + Sync {
    fn strategy(&self) -> LocatorStrategy;

    /// `Ok(None)` means "no face"; errors mean the strategy itself could not run.
    fn locate(&self, frame: &Frame) -> ToonsyncResult<Option<MouthLocation>>;
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Face-mesh landmark file for the photo. When absent only the heuristic runs.
    pub landmarks: Option<PathBuf>,
    pub skin: SkinToneParams,
}

/// Ordered list of strategies, most precise first.
pub struct LocatorChain {
    locators: Vec<Box<dyn MouthLocator>>,
}

impl LocatorChain {
    pub fn new(locators: Vec<Box<dyn MouthLocator>>) -> Self {
        Self { locators }
    }

    /// Build the chain from configuration, skipping strategies whose inputs are unusable.
    pub fn from_config(cfg: &LocatorConfig) -> Self {
        let mut locators: Vec<Box<dyn MouthLocator>> = Vec::new();
        if let Some(path) = cfg.landmarks.as_deref() {
            match LandmarkLocator::from_path(path) {
                Ok(l) => locators.push(Box::new(l)),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    "landmark file unusable, using face-box heuristic: {e}"
                ),
            }
        }
        locators.push(Box::new(HeuristicLocator::new(SkinToneDetector::new(
            cfg.skin,
        ))));
        Self { locators }
    }

    pub fn strategies(&self) -> Vec<LocatorStrategy> {
        self.locators.iter().map(|l| l.strategy()).collect()
    }

    #[tracing::instrument(skip_all)]
    pub fn locate(&self, frame: &Frame) -> Option<MouthLocation> {
        for locator in &self.locators {
            match locator.locate(frame) {
                Ok(Some(found)) => {
                    tracing::debug!(
                        strategy = ?found.strategy,
                        points = found.polygon.len(),
                        "mouth located"
                    );
                    return Some(found);
                }
                Ok(None) => {
                    tracing::debug!(strategy = ?locator.strategy(), "no face found");
                }
                Err(e) => {
                    tracing::warn!(strategy = ?locator.strategy(), "locator failed: {e}");
                }
            }
        }
        None
    }
}
