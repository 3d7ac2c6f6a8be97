//! Synthetic mouth motion.
//!
//! [`ApertureSchedule`] turns a frame index into lip displacements; [`Animator`] moves the
//! polygon accordingly and paints it onto copies of the still frame.

mod animator;
mod aperture;

pub use animator::{Animator, MouthStyle, displace};
pub use aperture::{ApertureProfile, ApertureSchedule};
