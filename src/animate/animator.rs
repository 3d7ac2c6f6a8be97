use crate::animate::{ApertureProfile, ApertureSchedule};
use crate::encode::{FrameSink, SinkConfig};
use crate::face::MouthPolygon;
use crate::filter::gaussian_blur;
use crate::foundation::core::{Frame, FrameIndex};
use crate::foundation::error::{ToonsyncError, ToonsyncResult};
use crate::foundation::math::{mul_div255, scale_u8};
use crate::render::{CoverageMask, rasterize_polygon};
use crate::status::{Status, StatusSink};

/// How the displaced mouth polygon is painted.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MouthStyle {
    /// Solid fill, a dark mouth cavity.
    Fill { rgb: [u8; 3] },
    /// Darken under the polygon, then smooth the whole frame.
    Blend { darken: f32, blur_kernel: u32 },
}

impl MouthStyle {
    pub const FILL: Self = Self::Fill { rgb: [0, 0, 0] };
    pub const BLEND: Self = Self::Blend {
        darken: 0.9,
        blur_kernel: 7,
    };

    /// Aperture profile paired with this style.
    pub fn default_profile(&self) -> ApertureProfile {
        match self {
            Self::Fill { .. } => ApertureProfile::PLAIN,
            Self::Blend { .. } => ApertureProfile::BLEND,
        }
    }

    pub fn validate(&self) -> ToonsyncResult<()> {
        match *self {
            Self::Fill { .. } => Ok(()),
            Self::Blend {
                darken,
                blur_kernel,
            } => {
                if !(0.0..=1.0).contains(&darken) {
                    return Err(ToonsyncError::validation("blend darken must be in [0, 1]"));
                }
                if blur_kernel % 2 == 0 {
                    return Err(ToonsyncError::validation("blend blur kernel must be odd"));
                }
                Ok(())
            }
        }
    }
}

impl Default for MouthStyle {
    fn default() -> Self {
        Self::FILL
    }
}

/// Points past the middle of the list (the lower lip) move down by `lower`, the rest up by
/// `upper`.
pub fn displace(polygon: &MouthPolygon, lower: i32, upper: i32) -> MouthPolygon {
    polygon.displaced(lower, upper)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Animator {
    pub profile: ApertureProfile,
    pub style: MouthStyle,
}

impl Animator {
    pub fn new(profile: ApertureProfile, style: MouthStyle) -> Self {
        Self { profile, style }
    }

    /// Style with its usual aperture profile.
    pub fn for_style(style: MouthStyle) -> Self {
        Self::new(style.default_profile(), style)
    }

    /// One animated frame.
    pub fn frame_at(
        &self,
        base: &Frame,
        polygon: &MouthPolygon,
        schedule: &ApertureSchedule,
        idx: FrameIndex,
    ) -> ToonsyncResult<Frame> {
        if polygon.is_degenerate() {
            return Ok(base.clone());
        }
        let (lower, upper) = schedule.displacement(idx);
        let moved = displace(polygon, lower, upper);
        let mask = rasterize_polygon(&moved, base.width, base.height)?;
        let mut out = base.clone();
        match self.style {
            MouthStyle::Fill { rgb } => paint(&mut out, &mask, |_| rgb),
            MouthStyle::Blend {
                darken,
                blur_kernel,
            } => {
                paint(&mut out, &mask, |px| {
                    [
                        scale_u8(px[0], darken),
                        scale_u8(px[1], darken),
                        scale_u8(px[2], darken),
                    ]
                });
                out = gaussian_blur(&out, blur_kernel, 0.0)?;
            }
        }
        Ok(out)
    }

    /// Push `frames_count` frames of `frame` with a moving mouth into `sink`.
    #[tracing::instrument(skip_all, fields(frames_count, fps, points = polygon.len()))]
    pub fn render(
        &self,
        frame: &Frame,
        polygon: &MouthPolygon,
        frames_count: u64,
        fps: u32,
        sink: &mut dyn FrameSink,
        status: &dyn StatusSink,
    ) -> ToonsyncResult<()> {
        if frames_count == 0 {
            return Err(ToonsyncError::validation("frames_count must be at least 1"));
        }
        self.style.validate()?;
        let schedule = ApertureSchedule::new(frames_count, self.profile)?;
        if polygon.is_degenerate() {
            tracing::warn!("mouth polygon is degenerate, frames stay unchanged");
        }

        sink.begin(SinkConfig::new(frame.width, frame.height, fps))?;
        let step = (frames_count / 20).max(1);
        for i in 0..frames_count {
            let out = self.frame_at(frame, polygon, &schedule, FrameIndex(i))?;
            sink.push_frame(FrameIndex(i), &out)?;
            let done = i + 1;
            if done % step == 0 || done == frames_count {
                status.emit(Status::Progress {
                    done,
                    total: frames_count,
                });
            }
        }
        sink.end()?;
        tracing::debug!(frames_count, "animation rendered");
        Ok(())
    }
}

/// Mix `color(px)` over each pixel by its mask coverage.
fn paint(frame: &mut Frame, mask: &CoverageMask, color: impl Fn([u8; 3]) -> [u8; 3]) {
    for (px, &cov) in frame.data.chunks_exact_mut(4).zip(&mask.data) {
        if cov == 0 {
            continue;
        }
        let c = color([px[0], px[1], px[2]]);
        let a = u16::from(cov);
        for k in 0..3 {
            px[k] = (mul_div255(u16::from(px[k]), 255 - a) + mul_div255(u16::from(c[k]), a))
                .min(255) as u8;
        }
    }
}
