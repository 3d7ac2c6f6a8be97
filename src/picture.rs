use std::path::Path;

use anyhow::Context as _;
use image::ImageEncoder as _;

use crate::{
    encode::ensure_parent_dir,
    foundation::core::Frame,
    foundation::error::{ToonsyncError, ToonsyncResult},
};

/// Read a still photo into an opaque RGBA frame.
pub fn load_frame(path: &Path) -> ToonsyncResult<Frame> {
    let bytes = std::fs::read(path)
        .map_err(|e| ToonsyncError::input(format!("cannot read image '{}': {e}", path.display())))?;
    decode_frame(&bytes)
        .map_err(|e| ToonsyncError::input(format!("cannot decode image '{}': {e}", path.display())))
}

pub fn decode_frame(bytes: &[u8]) -> ToonsyncResult<Frame> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let mut rgba = dyn_img.to_rgba8();
    for px in rgba.pixels_mut() {
        px.0[3] = 255;
    }
    let frame = Frame::from_rgba_image(rgba);
    if frame.width == 0 || frame.height == 0 {
        return Err(ToonsyncError::input("image has zero width or height"));
    }
    Ok(frame)
}

pub fn save_jpeg(frame: &Frame, path: &Path, quality: u8) -> ToonsyncResult<()> {
    ensure_parent_dir(path)?;
    let bytes = encode_jpeg(frame, quality)?;
    std::fs::write(path, bytes).with_context(|| format!("write jpeg '{}'", path.display()))?;
    Ok(())
}

/// Baseline JPEG bytes of `frame` with alpha dropped.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> ToonsyncResult<Vec<u8>> {
    let rgb = frame.to_rgb_bytes();
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .write_image(
            &rgb,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )
        .context("encode jpeg")?;
    Ok(out)
}

pub fn save_png(frame: &Frame, path: &Path) -> ToonsyncResult<()> {
    ensure_parent_dir(path)?;
    image::save_buffer_with_format(
        path,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}

pub(crate) const SAMPLE_BACKGROUND: [u8; 4] = [70, 90, 110, 255];
pub(crate) const SAMPLE_SKIN: [u8; 4] = [224, 172, 140, 255];

/// Deterministic frontal face drawing used as the bundled sample.
///
/// A skin-tone ellipse centered in the frame with dark eyes, brows and red lips
/// on a cool gray background.
pub fn sample_portrait(width: u32, height: u32) -> ToonsyncResult<Frame> {
    let mut frame = Frame::new(width, height, SAMPLE_BACKGROUND)?;
    let (w, h) = (f64::from(width), f64::from(height));
    let (cx, cy) = (w * 0.5, h * 0.5);
    let (rx, ry) = (w * 0.19, h * 0.33);

    fill_ellipse(&mut frame, cx, cy, rx, ry, SAMPLE_SKIN);

    let eye = [40, 30, 30, 255];
    let brow = [60, 40, 30, 255];
    for side in [-1.0, 1.0] {
        let ex = cx + side * rx * 0.38;
        fill_ellipse(&mut frame, ex, cy - ry * 0.22, rx * 0.11, ry * 0.06, eye);
        fill_ellipse(&mut frame, ex, cy - ry * 0.38, rx * 0.2, ry * 0.03, brow);
    }
    fill_ellipse(&mut frame, cx, cy + ry * 0.1, rx * 0.06, ry * 0.1, [200, 150, 120, 255]);
    fill_ellipse(&mut frame, cx, cy + ry * 0.5, rx * 0.35, ry * 0.08, [170, 60, 70, 255]);
    Ok(frame)
}

fn fill_ellipse(frame: &mut Frame, cx: f64, cy: f64, rx: f64, ry: f64, rgba: [u8; 4]) {
    if rx <= 0.0 || ry <= 0.0 {
        return;
    }
    let y0 = (cy - ry).floor().max(0.0) as u32;
    let y1 = ((cy + ry).ceil() as u32).min(frame.height);
    let x0 = (cx - rx).floor().max(0.0) as u32;
    let x1 = ((cx + rx).ceil() as u32).min(frame.width);
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = (f64::from(x) + 0.5 - cx) / rx;
            let dy = (f64::from(y) + 0.5 - cy) / ry;
            if dx * dx + dy * dy <= 1.0 {
                frame.set_pixel(x, y, rgba);
            }
        }
    }
}
