use std::ops::Range;
use std::path::Path;

use anyhow::Context as _;

use crate::face::{LocatorStrategy, MouthLocation, MouthLocator, MouthPolygon};
use crate::foundation::core::{Frame, PointI};
use crate::foundation::error::{ToonsyncError, ToonsyncResult};

/// Face-mesh indices taken as the lip contour.
pub const LIP_RANGE: Range<usize> = 61..88;

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawPoint {
    Seq(Vec<f64>),
    Named { x: f64, y: f64 },
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawFile {
    Wrapped { faces: Vec<Vec<RawPoint>> },
    Bare(Vec<Vec<RawPoint>>),
}

/// Normalized `[0, 1]` face-mesh landmarks, one point list per face.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkSet {
    pub faces: Vec<Vec<(f64, f64)>>,
}

impl LandmarkSet {
    /// Accepts `{"faces": [[...]]}` or a bare `[[...]]`, points as `[x, y(, z)]` or
    /// `{"x": .., "y": ..}`.
    pub fn from_json(s: &str) -> ToonsyncResult<Self> {
        let raw: RawFile = serde_json::from_str(s).context("parse landmark JSON")?;
        let faces = match raw {
            RawFile::Wrapped { faces } | RawFile::Bare(faces) => faces,
        };
        let faces = faces
            .into_iter()
            .map(|face| {
                face.into_iter()
                    .map(|p| match p {
                        RawPoint::Seq(v) if v.len() >= 2 => Ok((v[0], v[1])),
                        RawPoint::Seq(_) => Err(ToonsyncError::validation(
                            "landmark point needs at least two coordinates",
                        )),
                        RawPoint::Named { x, y } => Ok((x, y)),
                    })
                    .collect::<ToonsyncResult<Vec<_>>>()
            })
            .collect::<ToonsyncResult<Vec<_>>>()?;
        Ok(Self { faces })
    }

    pub fn from_path(path: &Path) -> ToonsyncResult<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read landmark file '{}'", path.display()))?;
        Self::from_json(&s)
    }
}

/// Lip contour from a precomputed face-mesh result.
pub struct LandmarkLocator {
    set: LandmarkSet,
}

impl LandmarkLocator {
    pub fn new(set: LandmarkSet) -> Self {
        Self { set }
    }

    pub fn from_path(path: &Path) -> ToonsyncResult<Self> {
        Ok(Self::new(LandmarkSet::from_path(path)?))
    }
}

impl MouthLocator for LandmarkLocator {
    fn strategy(&self) -> LocatorStrategy {
        LocatorStrategy::Landmarks
    }

    fn locate(&self, frame: &Frame) -> ToonsyncResult<Option<MouthLocation>> {
        let Some(face) = self.set.faces.first() else {
            return Ok(None);
        };
        if face.len() < LIP_RANGE.end {
            return Err(ToonsyncError::validation(format!(
                "landmark face has {} points, expected at least {}",
                face.len(),
                LIP_RANGE.end
            )));
        }

        let (w, h) = (f64::from(frame.width), f64::from(frame.height));
        let points = face[LIP_RANGE]
            .iter()
            .map(|&(x, y)| {
                PointI::new((x * w).floor() as i32, (y * h).floor() as i32)
                    .clamp_to(frame.width, frame.height)
            })
            .collect();

        Ok(Some(MouthLocation {
            polygon: MouthPolygon::new(points),
            face: None,
            strategy: LocatorStrategy::Landmarks,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_json(n: usize, wrapped: bool) -> String {
        let pts: Vec<String> = (0..n)
            .map(|i| {
                let t = i as f64 / n as f64;
                format!("[{t}, {}, 0.0]", 1.0 - t)
            })
            .collect();
        let face = format!("[{}]", pts.join(","));
        if wrapped {
            format!("{{\"faces\": [{face}]}}")
        } else {
            format!("[{face}]")
        }
    }

    #[test]
    fn parses_both_layouts() {
        let a = LandmarkSet::from_json(&mesh_json(468, true)).unwrap();
        let b = LandmarkSet::from_json(&mesh_json(468, false)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.faces[0].len(), 468);
    }

    #[test]
    fn parses_named_points() {
        let set = LandmarkSet::from_json(r#"[[{"x": 0.5, "y": 0.25, "z": 0.1}]]"#).unwrap();
        assert_eq!(set.faces[0], vec![(0.5, 0.25)]);
    }

    #[test]
    fn picks_lip_range_in_pixels_and_in_bounds() {
        let loc = LandmarkLocator::new(LandmarkSet::from_json(&mesh_json(468, true)).unwrap());
        let frame = Frame::new(640, 480, [0, 0, 0, 255]).unwrap();
        let found = loc.locate(&frame).unwrap().unwrap();
        assert_eq!(found.polygon.len(), 27);
        assert_eq!(found.strategy, LocatorStrategy::Landmarks);
        assert!(found.polygon.within(640, 480));

        let t = 61.0 / 468.0;
        let first = found.polygon.points()[0];
        assert_eq!(first.x, (t * 640.0_f64).floor() as i32);
        assert_eq!(first.y, ((1.0 - t) * 480.0_f64).floor() as i32);
    }

    #[test]
    fn coordinate_of_one_is_clamped() {
        let mut pts = vec![(0.5, 0.5); 468];
        pts[61] = (1.0, 1.0);
        let loc = LandmarkLocator::new(LandmarkSet { faces: vec![pts] });
        let frame = Frame::new(100, 50, [0, 0, 0, 255]).unwrap();
        let found = loc.locate(&frame).unwrap().unwrap();
        assert_eq!(found.polygon.points()[0], PointI::new(99, 49));
    }

    #[test]
    fn empty_face_list_is_no_face_and_short_face_is_error() {
        let frame = Frame::new(10, 10, [0, 0, 0, 255]).unwrap();
        let none = LandmarkLocator::new(LandmarkSet::default());
        assert!(none.locate(&frame).unwrap().is_none());

        let short = LandmarkLocator::new(LandmarkSet {
            faces: vec![vec![(0.5, 0.5); 40]],
        });
        assert!(short.locate(&frame).is_err());
    }
}
