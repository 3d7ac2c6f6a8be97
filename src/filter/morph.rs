use crate::foundation::core::{FaceBox, Frame};
use crate::foundation::math::scale_u8;

/// Rectangular min filter (grayscale erosion per channel) restricted to `region`.
///
/// Samples outside the region are clamped to its edge, so pixels outside `region` are never
/// read or written.
pub fn erode_region(frame: &mut Frame, region: FaceBox, kernel: u32) {
    let region = region.clamp_to(frame.width, frame.height);
    if region.is_empty() || kernel <= 1 {
        return;
    }

    // OpenCV anchors even kernels at k/2, so the window spans [-k/2, k - 1 - k/2].
    let lo = -((kernel / 2) as i32);
    let hi = kernel as i32 - 1 + lo;
    let (x0, y0, x1, y1) = (region.x, region.y, region.right() - 1, region.bottom() - 1);
    let w = frame.width as i32;

    let src = frame.data.clone();
    let mut tmp = src.clone();
    for y in y0..=y1 {
        for x in x0..=x1 {
            let mut m = [255u8; 3];
            for dx in lo..=hi {
                let sx = (x + dx).clamp(x0, x1);
                let i = ((y * w + sx) as usize) * 4;
                for c in 0..3 {
                    m[c] = m[c].min(src[i + c]);
                }
            }
            let o = ((y * w + x) as usize) * 4;
            tmp[o..o + 3].copy_from_slice(&m);
        }
    }
    for y in y0..=y1 {
        for x in x0..=x1 {
            let mut m = [255u8; 3];
            for dy in lo..=hi {
                let sy = (y + dy).clamp(y0, y1);
                let i = ((sy * w + x) as usize) * 4;
                for c in 0..3 {
                    m[c] = m[c].min(tmp[i + c]);
                }
            }
            let o = ((y * w + x) as usize) * 4;
            frame.data[o..o + 3].copy_from_slice(&m);
        }
    }
}

/// Multiply the color channels inside `region` by `factor`.
pub fn darken_region(frame: &mut Frame, region: FaceBox, factor: f32) {
    let region = region.clamp_to(frame.width, frame.height);
    if region.is_empty() {
        return;
    }
    for y in region.y..region.bottom() {
        for x in region.x..region.right() {
            let mut px = frame.pixel(x as u32, y as u32);
            for c in px.iter_mut().take(3) {
                *c = scale_u8(*c, factor);
            }
            frame.set_pixel(x as u32, y as u32, px);
        }
    }
}
