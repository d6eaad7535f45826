//! Audio input and output backends.
//!
//! - [`wav`] - WAV file input and a recording output, always available
//! - [`device`] - System microphone and speaker via CPAL (`device-audio`
//!   feature)

pub mod wav;

#[cfg(feature = "device-audio")]
pub mod device;

#[cfg(feature = "device-audio")]
pub use device::{CpalInput, CpalOutput};
pub use wav::{RecordedSegment, WavFileInput, WavRecorderOutput};
