//! The voice setup flow: record, review, save.
//!
//! Owns one recorder and one preview player for the lifetime of the screen and hands
//! the finished recording to the upload coordinator.

use std::sync::Arc;

use super::playback::{PlaybackController, PlaybackView};
use super::recorder::{RecorderController, RecorderState};
use super::upload::UploadCoordinator;
use crate::error::{Result, VoiceError};
use crate::media::AudioDriver;
use crate::profile::VoiceAsset;

/// Text the user reads aloud while recording.
pub const SAMPLE_SENTENCE: &str = "The quick brown fox jumps over the lazy dog. \
This sentence contains various sounds that help create a voice profile.";

pub struct VoiceSetup {
    recorder: RecorderController,
    player: PlaybackController,
    uploads: Arc<UploadCoordinator>,
    uid: String,
}

impl VoiceSetup {
    pub fn new(driver: Arc<dyn AudioDriver>, uploads: Arc<UploadCoordinator>, uid: String) -> Self {
        Self {
            recorder: RecorderController::new(Arc::clone(&driver)),
            player: PlaybackController::new(driver),
            uploads,
            uid,
        }
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.recorder.state()
    }

    pub fn playback(&self) -> PlaybackView {
        self.player.view()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploads.is_uploading_voice()
    }

    pub async fn start_recording(&mut self) -> Result<()> {
        self.recorder.start_recording().await
    }

    /// Stops the capture and makes the recording the preview player's source.
    pub async fn stop_recording(&mut self) -> Result<()> {
        let uri = self.recorder.stop_recording().await?.uri.clone();
        self.player.set_default_source(Some(uri));
        Ok(())
    }

    pub async fn play_pause(&mut self) -> Result<()> {
        self.require_recording("play/pause")?;
        self.player.play_pause().await
    }

    /// Moves the preview by `delta_seconds` from the current position.
    pub async fn skip(&mut self, delta_seconds: f64) -> Result<()> {
        let current = self.player.view().position_ms as f64 / 1000.0;
        self.player.seek(current + delta_seconds).await
    }

    pub async fn rewind(&mut self) -> Result<()> {
        self.player.reset().await
    }

    /// Throws the recording away so a new one can be made.
    pub fn rerecord(&mut self) -> Result<()> {
        self.recorder.reset(&mut self.player)?;
        self.player.teardown();
        self.player.set_default_source(None);
        Ok(())
    }

    /// Uploads the recording. On success the screen is back to a fresh state.
    pub async fn save(&mut self) -> Result<VoiceAsset> {
        let handle = self.require_recording("save")?.clone();
        let asset = self.uploads.upload_voice(&handle, &self.uid).await?;
        self.player.teardown();
        self.player.set_default_source(None);
        self.recorder.clear();
        Ok(asset)
    }

    /// Applies queued playback status updates.
    pub async fn refresh(&mut self) -> Result<()> {
        self.player.pump().await
    }

    /// Screen exit: abandons any capture and releases the preview.
    pub async fn leave(&mut self) {
        self.recorder.abandon().await;
        self.player.teardown();
        tracing::debug!("Voice setup closed");
    }

    fn require_recording(&self, operation: &'static str) -> Result<&crate::media::AudioHandle> {
        self.recorder.handle().ok_or(VoiceError::InvalidState {
            operation,
            state: "no recording is available",
        })
    }
}
