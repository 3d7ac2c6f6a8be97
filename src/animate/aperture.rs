use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ToonsyncError, ToonsyncResult};

/// Shape of the synthetic mouth-opening wave.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ApertureProfile {
    /// The wave period is `frames_count / period_divisor`.
    pub period_divisor: u32,
    /// Peak downward shift of lower lip points, in pixels.
    pub lower_gain: f64,
    /// Peak upward shift of upper lip points, in pixels.
    pub upper_gain: f64,
}

impl ApertureProfile {
    /// Period of a third of the clip; the upper lip moves half as far as the lower one.
    pub const PLAIN: Self = Self {
        period_divisor: 3,
        lower_gain: 8.0,
        upper_gain: 4.0,
    };

    /// Period of half the clip; the upper lip moves three eighths as far as the lower one.
    pub const BLEND: Self = Self {
        period_divisor: 2,
        lower_gain: 8.0,
        upper_gain: 3.0,
    };

    pub fn validate(&self) -> ToonsyncResult<()> {
        if self.period_divisor == 0 {
            return Err(ToonsyncError::validation(
                "aperture period divisor must be non-zero",
            ));
        }
        if !(self.lower_gain.is_finite() && self.upper_gain.is_finite()) {
            return Err(ToonsyncError::validation("aperture gains must be finite"));
        }
        Ok(())
    }
}

impl Default for ApertureProfile {
    fn default() -> Self {
        Self::PLAIN
    }
}

/// Triangular wave over frame indices, bouncing between 0 and 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ApertureSchedule {
    profile: ApertureProfile,
    period: u64,
    half: u64,
}

impl ApertureSchedule {
    pub fn new(frames_count: u64, profile: ApertureProfile) -> ToonsyncResult<Self> {
        profile.validate()?;
        let period = (frames_count / u64::from(profile.period_divisor)).max(1);
        Ok(Self {
            profile,
            period,
            half: period / 2,
        })
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    /// Opening in `[0, 1]`: 1 at the start of every period, 0 in its middle.
    pub fn level(&self, frame: FrameIndex) -> f64 {
        let phase = (frame.0 % self.period) as f64;
        let half = self.half as f64;
        (phase - half).abs() / half.max(1.0)
    }

    /// `(lower, upper)` pixel shifts for `frame`, truncated toward zero.
    pub fn displacement(&self, frame: FrameIndex) -> (i32, i32) {
        let a = self.level(frame);
        (
            (a * self.profile.lower_gain) as i32,
            (a * self.profile.upper_gain) as i32,
        )
    }
}
