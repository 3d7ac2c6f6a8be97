//! CPU image filters: the cartoon stylization and the smaller kernels the mouth animation
//! needs (Gaussian smoothing, region erosion).

pub mod blur;
pub mod cartoon;
pub mod morph;

pub use blur::gaussian_blur;
pub use cartoon::{CartoonParams, cartoonize};
pub use morph::{darken_region, erode_region};
