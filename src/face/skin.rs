use crate::face::FaceDetector;
use crate::foundation::core::{FaceBox, Frame};

/// Thresholds for the skin-tone face detector.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SkinToneParams {
    pub cb_range: (u8, u8),
    pub cr_range: (u8, u8),
    /// Smallest component kept, as a fraction of the image area.
    pub min_area_fraction: f64,
    /// Accepted `width / height` of a component's bounding box.
    pub aspect_range: (f64, f64),
    /// Smallest `pixels / bounding box area` of a component.
    pub min_fill: f64,
}

impl Default for SkinToneParams {
    fn default() -> Self {
        Self {
            cb_range: (77, 127),
            cr_range: (133, 173),
            min_area_fraction: 0.01,
            aspect_range: (0.4, 1.6),
            min_fill: 0.35,
        }
    }
}

/// Face boxes from connected regions of skin-colored pixels.
///
/// Cheap and easily fooled (hands, warm backgrounds), which is fine for a face-box guess.
#[derive(Clone, Copy, Debug, Default)]
pub struct SkinToneDetector {
    params: SkinToneParams,
}

impl SkinToneDetector {
    pub fn new(params: SkinToneParams) -> Self {
        Self { params }
    }

    pub(crate) fn skin_mask(&self, frame: &Frame) -> Vec<bool> {
        let p = &self.params;
        frame
            .data
            .chunks_exact(4)
            .map(|px| {
                let (cb, cr) = chroma(px[0], px[1], px[2]);
                (p.cb_range.0..=p.cb_range.1).contains(&cb)
                    && (p.cr_range.0..=p.cr_range.1).contains(&cr)
            })
            .collect()
    }
}

impl FaceDetector for SkinToneDetector {
    #[tracing::instrument(skip_all, fields(width = frame.width, height = frame.height))]
    fn detect(&self, frame: &Frame) -> Vec<FaceBox> {
        let mask = self.skin_mask(frame);
        let (w, h) = (frame.width as usize, frame.height as usize);
        let min_pixels = ((w * h) as f64 * self.params.min_area_fraction).ceil() as usize;

        let mut seen = vec![false; mask.len()];
        let mut stack = Vec::new();
        let mut faces = Vec::new();

        for start in 0..mask.len() {
            if !mask[start] || seen[start] {
                continue;
            }
            seen[start] = true;
            stack.push(start);
            let (mut x0, mut y0, mut x1, mut y1) = (w, h, 0usize, 0usize);
            let mut count = 0usize;

            while let Some(i) = stack.pop() {
                let (x, y) = (i % w, i / w);
                count += 1;
                x0 = x0.min(x);
                y0 = y0.min(y);
                x1 = x1.max(x);
                y1 = y1.max(y);

                let mut visit = |j: usize| {
                    if mask[j] && !seen[j] {
                        seen[j] = true;
                        stack.push(j);
                    }
                };
                if x > 0 {
                    visit(i - 1);
                }
                if x + 1 < w {
                    visit(i + 1);
                }
                if y > 0 {
                    visit(i - w);
                }
                if y + 1 < h {
                    visit(i + w);
                }
            }

            if count < min_pixels {
                continue;
            }
            let (bw, bh) = (x1 - x0 + 1, y1 - y0 + 1);
            let aspect = bw as f64 / bh as f64;
            let fill = count as f64 / (bw * bh) as f64;
            if aspect < self.params.aspect_range.0
                || aspect > self.params.aspect_range.1
                || fill < self.params.min_fill
            {
                tracing::debug!(bw, bh, fill, "skin region rejected");
                continue;
            }
            faces.push(FaceBox::new(x0 as i32, y0 as i32, bw as i32, bh as i32));
        }
        faces
    }
}

/// JPEG-style YCbCr chroma of an RGB pixel.
fn chroma(r: u8, g: u8, b: u8) -> (u8, u8) {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    (
        cb.round().clamp(0.0, 255.0) as u8,
        cr.round().clamp(0.0, 255.0) as u8,
    )
}
