use crate::face::{LocatorStrategy, MouthLocation, MouthLocator, MouthPolygon};
use crate::foundation::core::{FaceBox, Frame, PointI};
use crate::foundation::error::ToonsyncResult;

/// Frontal face rectangle detector.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Vec<FaceBox>;
}

/// Face box in, guessed mouth octagon out.
pub struct HeuristicLocator<D> {
    detector: D,
}

impl<D: FaceDetector> HeuristicLocator<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }
}

impl<D: FaceDetector> MouthLocator for HeuristicLocator<D> {
    fn strategy(&self) -> LocatorStrategy {
        LocatorStrategy::Heuristic
    }

    fn locate(&self, frame: &Frame) -> ToonsyncResult<Option<MouthLocation>> {
        let faces = self.detector.detect(frame);
        let Some(face) = faces.into_iter().max_by_key(|f| f.area()) else {
            return Ok(None);
        };
        let face = face.clamp_to(frame.width, frame.height);
        if face.is_empty() {
            return Ok(None);
        }
        Ok(Some(MouthLocation {
            polygon: mouth_octagon(face, frame.width, frame.height),
            face: Some(face),
            strategy: LocatorStrategy::Heuristic,
        }))
    }
}

/// Eight points in the lower 40% of `face`, clamped into the image.
pub fn mouth_octagon(face: FaceBox, width: u32, height: u32) -> MouthPolygon {
    let (w, h) = (f64::from(face.width), f64::from(face.height));
    let my = face.y + (h * 0.6) as i32;
    let mh = (h * 0.4) as i32;
    let mx = face.x + (w * 0.2) as i32;
    let mw = (w * 0.6) as i32;

    let points = [
        (mx, my + mh / 3),
        (mx + mw / 4, my),
        (mx + mw / 2, my),
        (mx + 3 * mw / 4, my),
        (mx + mw, my + mh / 3),
        (mx + 3 * mw / 4, my + 2 * mh / 3),
        (mx + mw / 2, my + mh),
        (mx + mw / 4, my + 2 * mh / 3),
    ]
    .into_iter()
    .map(|(x, y)| PointI::new(x, y).clamp_to(width, height))
    .collect();
    MouthPolygon::new(points)
}
