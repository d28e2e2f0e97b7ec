//! Voice sample recording, playback and upload.
//!
//! # Components
//! - `recorder`: one capture session at a time, restores the playback route on exit
//! - `playback`: one loaded resource at a time, generation-tagged status updates
//! - `upload`: blob storage and profile record kept in step
//! - `setup`: the record → review → save flow built from the three above
//! - `time`: `m:ss` strings and progress fractions

pub mod playback;
pub mod recorder;
pub mod setup;
pub mod time;
pub mod upload;

pub use playback::{PlaybackController, PlaybackState, PlaybackView};
pub use recorder::{RecorderController, RecorderState};
pub use setup::{VoiceSetup, SAMPLE_SENTENCE};
pub use upload::UploadCoordinator;
