//! Recorder controller: idle → recording → stopping → stopped, one session at a time.
//!
//! Starting a capture switches the shared audio route to capture mode; every path
//! out of a capture puts it back into playback mode before anything else can touch
//! the player.

use std::sync::Arc;

use super::playback::PlaybackController;
use crate::error::{Result, VoiceError};
use crate::media::{AudioDriver, AudioHandle, AudioMode, Capability, CaptureId, Permission};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Stopping,
    Stopped,
}

impl RecorderState {
    fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

pub struct RecorderController {
    driver: Arc<dyn AudioDriver>,
    state: RecorderState,
    capture: Option<CaptureId>,
    handle: Option<AudioHandle>,
}

impl RecorderController {
    pub fn new(driver: Arc<dyn AudioDriver>) -> Self {
        Self {
            driver,
            state: RecorderState::Idle,
            capture: None,
            handle: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// The finished recording, present only while `Stopped`.
    pub fn handle(&self) -> Option<&AudioHandle> {
        self.handle.as_ref()
    }

    pub async fn start_recording(&mut self) -> Result<()> {
        self.expect(RecorderState::Idle, "start recording")?;

        if self.driver.request_permission(Capability::Microphone).await? == Permission::Denied {
            tracing::warn!("Microphone permission denied");
            return Err(VoiceError::PermissionDenied(Capability::Microphone));
        }

        self.driver.set_audio_mode(AudioMode::Capture).await?;
        match self.driver.start_capture().await {
            Ok(id) => {
                self.capture = Some(id);
                self.state = RecorderState::Recording;
                tracing::info!("Recording started");
                Ok(())
            }
            Err(err) => {
                tracing::error!("Failed to start recording: {}", err);
                self.restore_playback_route().await;
                Err(err)
            }
        }
    }

    pub async fn stop_recording(&mut self) -> Result<&AudioHandle> {
        self.expect(RecorderState::Recording, "stop recording")?;
        let Some(id) = self.capture.take() else {
            self.state = RecorderState::Idle;
            return Err(VoiceError::RecordingUnavailable);
        };

        self.state = RecorderState::Stopping;
        let finished = self.driver.stop_capture(id).await;
        self.restore_playback_route().await;

        match finished {
            Ok(Some(handle)) => {
                tracing::info!("Recording stopped: {}", handle.uri);
                self.state = RecorderState::Stopped;
                Ok(self.handle.insert(handle))
            }
            Ok(None) => {
                tracing::warn!("Recording stopped without an audio file");
                self.state = RecorderState::Idle;
                Err(VoiceError::RecordingUnavailable)
            }
            Err(err) => {
                tracing::error!("Failed to stop recording: {}", err);
                self.state = RecorderState::Idle;
                Err(err)
            }
        }
    }

    /// Discards the recording and any player bound to it.
    pub fn reset(&mut self, playback: &mut PlaybackController) -> Result<()> {
        self.expect(RecorderState::Stopped, "reset")?;
        if let Some(handle) = self.handle.take() {
            playback.release_if_source(&handle.uri);
        }
        self.state = RecorderState::Idle;
        tracing::debug!("Recorder reset");
        Ok(())
    }

    /// Drops whatever is in progress, used when the screen goes away.
    pub async fn abandon(&mut self) {
        if let Some(id) = self.capture.take() {
            if let Err(err) = self.driver.stop_capture(id).await {
                tracing::warn!("Failed to stop abandoned capture: {}", err);
            }
            self.restore_playback_route().await;
        }
        self.handle = None;
        self.state = RecorderState::Idle;
    }

    /// Called after the recording has been uploaded.
    pub(crate) fn clear(&mut self) {
        self.handle = None;
        self.capture = None;
        self.state = RecorderState::Idle;
    }

    fn expect(&self, wanted: RecorderState, operation: &'static str) -> Result<()> {
        if self.state == wanted {
            Ok(())
        } else {
            Err(VoiceError::InvalidState {
                operation,
                state: self.state.label(),
            })
        }
    }

    async fn restore_playback_route(&self) {
        if let Err(err) = self.driver.set_audio_mode(AudioMode::Playback).await {
            tracing::error!("Failed to restore playback route: {}", err);
        }
    }
}
