use kurbo::Shape as _;

use crate::foundation::core::{FaceBox, PointI};

/// Closed ring of integer points approximating the lip boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MouthPolygon {
    points: Vec<PointI>,
}

impl MouthPolygon {
    pub fn new(points: Vec<PointI>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[PointI] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_bez_path(&self) -> kurbo::BezPath {
        let mut path = kurbo::BezPath::new();
        let mut it = self.points.iter();
        if let Some(first) = it.next() {
            path.move_to((f64::from(first.x), f64::from(first.y)));
            for p in it {
                path.line_to((f64::from(p.x), f64::from(p.y)));
            }
            path.close_path();
        }
        path
    }

    /// Absolute enclosed area in square pixels.
    pub fn area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        self.to_bez_path().area().abs()
    }

    /// Fewer than three points or (nearly) zero area: rasterizes to nothing.
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 3 || self.area() < 0.5
    }

    pub fn bounding_box(&self) -> Option<FaceBox> {
        let first = self.points.first()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        Some(FaceBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
    }

    pub fn within(&self, width: u32, height: u32) -> bool {
        self.points
            .iter()
            .all(|p| p.x >= 0 && p.y >= 0 && (p.x as u32) < width && (p.y as u32) < height)
    }

    /// Shift lower-half points (by ordinal index, `j > len / 2`) down by `lower` pixels and
    /// the rest up by `upper` pixels.
    pub fn displaced(&self, lower: i32, upper: i32) -> Self {
        let half = self.points.len() / 2;
        let points = self
            .points
            .iter()
            .enumerate()
            .map(|(j, p)| {
                if j > half {
                    PointI::new(p.x, p.y + lower)
                } else {
                    PointI::new(p.x, p.y - upper)
                }
            })
            .collect();
        Self { points }
    }
}
