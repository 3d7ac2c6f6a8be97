use crate::foundation::core::Frame;
use crate::foundation::error::{ToonsyncError, ToonsyncResult};
use crate::foundation::math::luma601;

/// Tunables of the cartoon stylization.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CartoonParams {
    /// Median kernel applied to the luma plane before edge extraction (odd).
    pub median_kernel: u32,
    /// Neighborhood of the adaptive mean threshold (odd).
    pub threshold_block: u32,
    /// Constant subtracted from the local mean.
    pub threshold_c: i32,
    /// Bilateral filter diameter.
    pub bilateral_diameter: u32,
    pub sigma_color: f64,
    pub sigma_space: f64,
}

impl Default for CartoonParams {
    fn default() -> Self {
        Self {
            median_kernel: 5,
            threshold_block: 9,
            threshold_c: 9,
            bilateral_diameter: 9,
            sigma_color: 250.0,
            sigma_space: 250.0,
        }
    }
}

impl CartoonParams {
    pub fn validate(&self) -> ToonsyncResult<()> {
        if self.median_kernel.is_multiple_of(2) || self.threshold_block.is_multiple_of(2) {
            return Err(ToonsyncError::validation(
                "cartoon median kernel and threshold block must be odd",
            ));
        }
        if self.threshold_block < 3 {
            return Err(ToonsyncError::validation(
                "cartoon threshold block must be at least 3",
            ));
        }
        if !(self.sigma_color > 0.0 && self.sigma_space > 0.0) {
            return Err(ToonsyncError::validation("bilateral sigmas must be > 0"));
        }
        Ok(())
    }
}

/// Edge-extraction plus color smoothing, composited into a flat "drawn" look.
#[tracing::instrument(skip(frame), fields(width = frame.width, height = frame.height))]
pub fn cartoonize(frame: &Frame, params: &CartoonParams) -> ToonsyncResult<Frame> {
    params.validate()?;
    let (w, h) = frame.dimensions();

    let gray = grayscale(frame);
    let gray = median_blur(&gray, w, h, params.median_kernel);
    let edges = adaptive_mean_threshold(&gray, w, h, params.threshold_block, params.threshold_c);
    let color = bilateral_filter(
        frame,
        params.bilateral_diameter,
        params.sigma_color,
        params.sigma_space,
    );

    let mut out = color;
    for (px, &m) in out.data.chunks_exact_mut(4).zip(edges.iter()) {
        if m == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
        }
    }
    Ok(out)
}

pub fn grayscale(frame: &Frame) -> Vec<u8> {
    frame
        .data
        .chunks_exact(4)
        .map(|px| luma601(px[0], px[1], px[2]))
        .collect()
}

pub fn median_blur(gray: &[u8], width: u32, height: u32, kernel: u32) -> Vec<u8> {
    let r = (kernel / 2) as i32;
    if r == 0 {
        return gray.to_vec();
    }
    let (w, h) = (width as i32, height as i32);
    let mut window = Vec::with_capacity(kernel as usize * kernel as usize);
    let mut out = vec![0u8; gray.len()];
    for y in 0..h {
        for x in 0..w {
            window.clear();
            for dy in -r..=r {
                let sy = (y + dy).clamp(0, h - 1);
                for dx in -r..=r {
                    let sx = (x + dx).clamp(0, w - 1);
                    window.push(gray[(sy * w + sx) as usize]);
                }
            }
            let mid = window.len() / 2;
            let (_, m, _) = window.select_nth_unstable(mid);
            out[(y * w + x) as usize] = *m;
        }
    }
    out
}

/// Binary mask: 255 where `pixel > round(local_mean) - c`, else 0.
pub fn adaptive_mean_threshold(gray: &[u8], width: u32, height: u32, block: u32, c: i32) -> Vec<u8> {
    let r = (block / 2) as i32;
    let (w, h) = (width as i32, height as i32);
    let area = block * block;

    let mut rows = vec![0u32; gray.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for dx in -r..=r {
                let sx = (x + dx).clamp(0, w - 1);
                acc += u32::from(gray[(y * w + sx) as usize]);
            }
            rows[(y * w + x) as usize] = acc;
        }
    }

    let mut out = vec![0u8; gray.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for dy in -r..=r {
                let sy = (y + dy).clamp(0, h - 1);
                acc += rows[(sy * w + x) as usize];
            }
            let mean = ((acc + area / 2) / area) as i32;
            let idx = (y * w + x) as usize;
            out[idx] = if i32::from(gray[idx]) > mean - c { 255 } else { 0 };
        }
    }
    out
}

/// Edge-preserving smoothing with a circular window of `diameter`.
pub fn bilateral_filter(frame: &Frame, diameter: u32, sigma_color: f64, sigma_space: f64) -> Frame {
    let r = (diameter / 2) as i32;
    if r == 0 {
        return frame.clone();
    }

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let mut taps = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = f64::from(dx * dx + dy * dy);
            if d2.sqrt() > f64::from(r) {
                continue;
            }
            taps.push((dx, dy, (d2 * space_coeff).exp()));
        }
    }

    // Color distance is the L1 sum over the three channels.
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let color_lut: Vec<f64> = (0..=255 * 3)
        .map(|d| {
            let d = f64::from(d);
            (d * d * color_coeff).exp()
        })
        .collect();

    let (w, h) = (frame.width as i32, frame.height as i32);
    let src = &frame.data;
    let mut out = frame.clone();
    for y in 0..h {
        for x in 0..w {
            let ci = ((y * w + x) as usize) * 4;
            let center = [src[ci], src[ci + 1], src[ci + 2]];
            let mut acc = [0.0f64; 3];
            let mut wsum = 0.0f64;
            for &(dx, dy, ws) in &taps {
                let sx = (x + dx).clamp(0, w - 1);
                let sy = (y + dy).clamp(0, h - 1);
                let si = ((sy * w + sx) as usize) * 4;
                let diff = center[0].abs_diff(src[si]) as usize
                    + center[1].abs_diff(src[si + 1]) as usize
                    + center[2].abs_diff(src[si + 2]) as usize;
                let wt = ws * color_lut[diff];
                for c in 0..3 {
                    acc[c] += wt * f64::from(src[si + c]);
                }
                wsum += wt;
            }
            for c in 0..3 {
                out.data[ci + c] = (acc[c] / wsum).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_image_keeps_its_color() {
        let f = Frame::new(12, 10, [120, 80, 60, 255]).unwrap();
        let out = cartoonize(&f, &CartoonParams::default()).unwrap();
        assert_eq!(out.dimensions(), (12, 10));
        assert!(out.data.chunks_exact(4).all(|px| px == [120, 80, 60, 255]));
    }

    #[test]
    fn strong_edge_is_inked_black() {
        // Left half dark, right half bright: the dark side of the boundary falls
        // below its local mean and gets inked.
        let mut f = Frame::new(20, 10, [30, 30, 30, 255]).unwrap();
        for y in 0..10 {
            for x in 10..20 {
                f.set_pixel(x, y, [230, 230, 230, 255]);
            }
        }
        let out = cartoonize(&f, &CartoonParams::default()).unwrap();
        assert_eq!(&out.pixel(9, 5)[..3], &[0, 0, 0]);
        assert_ne!(&out.pixel(15, 5)[..3], &[0, 0, 0]);
        assert_ne!(&out.pixel(0, 5)[..3], &[0, 0, 0]);
    }

    #[test]
    fn median_removes_salt_noise() {
        let mut g = vec![50u8; 25];
        g[12] = 255;
        let out = median_blur(&g, 5, 5, 5);
        assert_eq!(out[12], 50);
    }

    #[test]
    fn threshold_of_flat_plane_is_all_white() {
        let g = vec![77u8; 36];
        assert!(adaptive_mean_threshold(&g, 6, 6, 9, 9).iter().all(|&m| m == 255));
    }

    #[test]
    fn even_kernels_are_rejected() {
        let f = Frame::new(4, 4, [0, 0, 0, 255]).unwrap();
        let params = CartoonParams {
            median_kernel: 4,
            ..CartoonParams::default()
        };
        assert!(cartoonize(&f, &params).is_err());
    }
}
