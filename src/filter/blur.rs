//! Separable Gaussian smoothing for the blended mouth.

use crate::foundation::core::Frame;
use crate::foundation::error::{ToonsyncError, ToonsyncResult};

/// Normalized one-dimensional Gaussian taps, centre tap in the middle.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    taps: Vec<f32>,
}

impl Kernel {
    /// `width` is the full, odd tap count. A `sigma` that is not positive is derived from the
    /// width the way OpenCV does.
    pub fn gaussian(width: u32, sigma: f32) -> ToonsyncResult<Self> {
        if width.is_multiple_of(2) {
            return Err(ToonsyncError::validation("blur kernel must be odd"));
        }
        let sigma = if sigma > 0.0 && sigma.is_finite() {
            sigma
        } else {
            0.3 * ((width as f32 - 1.0) * 0.5 - 1.0) + 0.8
        };
        let r = (width / 2) as i32;
        let two_var = 2.0 * sigma * sigma;
        let raw: Vec<f32> = (-r..=r)
            .map(|i| (-((i * i) as f32) / two_var).exp())
            .collect();
        let total: f32 = raw.iter().sum();
        Ok(Self {
            taps: raw.into_iter().map(|w| w / total).collect(),
        })
    }

    pub fn radius(&self) -> u32 {
        (self.taps.len() / 2) as u32
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Gaussian blur over the color channels of `frame`; alpha is kept.
///
/// `kernel` is the full (odd) kernel width, see [`Kernel::gaussian`].
pub fn gaussian_blur(frame: &Frame, kernel: u32, sigma: f32) -> ToonsyncResult<Frame> {
    let kernel = Kernel::gaussian(kernel, sigma)?;
    if kernel.radius() == 0 {
        return Ok(frame.clone());
    }
    let rows = convolve(frame, &kernel, Axis::Horizontal);
    Ok(convolve(&rows, &kernel, Axis::Vertical))
}

/// One pass along `axis`, edges clamped.
fn convolve(src: &Frame, kernel: &Kernel, axis: Axis) -> Frame {
    let mut out = src.clone();
    let (w, h) = (i64::from(src.width), i64::from(src.height));
    let r = i64::from(kernel.radius());
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for (k, &tap) in kernel.taps.iter().enumerate() {
                let d = k as i64 - r;
                let (sx, sy) = match axis {
                    Axis::Horizontal => ((x + d).clamp(0, w - 1), y),
                    Axis::Vertical => (x, (y + d).clamp(0, h - 1)),
                };
                let px = src.pixel(sx as u32, sy as u32);
                for (a, &v) in acc.iter_mut().zip(&px[..3]) {
                    *a += tap * f32::from(v);
                }
            }
            let alpha = src.pixel(x as u32, y as u32)[3];
            let [red, green, blue] = acc.map(|v| v.round().clamp(0.0, 255.0) as u8);
            out.set_pixel(x as u32, y as u32, [red, green, blue, alpha]);
        }
    }
    out
}
