use crate::face::MouthPolygon;
use crate::foundation::error::{ToonsyncError, ToonsyncResult};

/// 8-bit coverage of a polygon, one byte per pixel, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverageMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl CoverageMask {
    pub fn coverage(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Number of pixels with any coverage.
    pub fn covered_pixels(&self) -> usize {
        self.data.iter().filter(|&&c| c != 0).count()
    }
}

/// Anti-aliased scan conversion of `polygon` through `vello_cpu`.
pub fn rasterize_polygon(
    polygon: &MouthPolygon,
    width: u32,
    height: u32,
) -> ToonsyncResult<CoverageMask> {
    let w: u16 = width
        .try_into()
        .map_err(|_| ToonsyncError::evaluation("mask width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| ToonsyncError::evaluation("mask height exceeds u16"))?;

    let mut pixmap = vello_cpu::Pixmap::new(w, h);
    if !polygon.is_degenerate() {
        let mut ctx = vello_cpu::RenderContext::new(w, h);
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
        ctx.fill_path(&bezpath_to_cpu(&polygon.to_bez_path()));
        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);
    }

    let data = pixmap
        .data_as_u8_slice()
        .chunks_exact(4)
        .map(|px| px[3])
        .collect();
    Ok(CoverageMask {
        width,
        height,
        data,
    })
}

fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

fn point_to_cpu(p: kurbo::Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::PointI;

    #[test]
    fn square_covers_its_interior_only() {
        let poly = MouthPolygon::new(vec![
            PointI::new(4, 4),
            PointI::new(12, 4),
            PointI::new(12, 12),
            PointI::new(4, 12),
        ]);
        let mask = rasterize_polygon(&poly, 16, 16).unwrap();
        assert_eq!(mask.coverage(8, 8), 255);
        assert_eq!(mask.coverage(1, 1), 0);
        assert_eq!(mask.coverage(14, 14), 0);
        let covered = mask.covered_pixels();
        assert!((60..=90).contains(&covered), "covered = {covered}");
    }

    #[test]
    fn degenerate_polygon_covers_nothing() {
        let poly = MouthPolygon::new(vec![PointI::new(1, 1), PointI::new(9, 9)]);
        let mask = rasterize_polygon(&poly, 10, 10).unwrap();
        assert_eq!(mask.covered_pixels(), 0);
    }
}
