//! CPU rasterization of mouth polygons.

pub mod mask;

pub use mask::{CoverageMask, rasterize_polygon};
