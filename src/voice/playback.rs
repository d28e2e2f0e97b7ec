//! Playback controller: one loaded resource, position tracking, play/pause/seek/reset.
//!
//! Each `load` bumps a generation counter. Driver status updates are forwarded into
//! the controller's own channel tagged with the generation that was current when the
//! resource was loaded; updates carrying an older generation are dropped. The loaded
//! resource is an owned [`PlaybackResource`] whose release runs exactly once, either
//! explicitly or from `Drop`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::time;
use crate::error::{Result, VoiceError};
use crate::media::{AudioDriver, AudioMode, DriverStatus, ResourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Unloaded,
    Loading,
    Ready,
    Error,
}

impl PlaybackState {
    fn label(self) -> &'static str {
        match self {
            Self::Unloaded => "nothing is loaded",
            Self::Loading => "audio is loading",
            Self::Ready => "audio is ready",
            Self::Error => "audio failed to load",
        }
    }
}

/// Driver status tagged with the generation of the resource that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    pub generation: u64,
    pub status: DriverStatus,
}

/// What the UI renders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackView {
    pub state: PlaybackState,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl PlaybackView {
    pub fn progress(&self) -> f64 {
        time::progress(self.position_ms, self.duration_ms)
    }

    pub fn elapsed(&self) -> String {
        time::format_time(self.position_ms)
    }

    pub fn total(&self) -> String {
        time::format_time(self.duration_ms)
    }
}

/// A loaded driver resource together with its status forwarder.
pub struct PlaybackResource {
    driver: Arc<dyn AudioDriver>,
    id: ResourceId,
    source: String,
    forwarder: JoinHandle<()>,
    released: bool,
}

impl PlaybackResource {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Stops the status forwarder, then unloads the driver resource.
    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.forwarder.abort();
        self.driver.unload(self.id);
        tracing::debug!("Released playback resource {} ({})", self.id, self.source);
    }
}

impl Drop for PlaybackResource {
    fn drop(&mut self) {
        self.release_now();
    }
}

pub struct PlaybackController {
    driver: Arc<dyn AudioDriver>,
    default_source: Option<String>,
    resource: Option<PlaybackResource>,
    state: PlaybackState,
    is_playing: bool,
    position_ms: u64,
    duration_ms: u64,
    generation: u64,
    events_tx: mpsc::UnboundedSender<StatusEvent>,
    events_rx: mpsc::UnboundedReceiver<StatusEvent>,
}

impl PlaybackController {
    pub fn new(driver: Arc<dyn AudioDriver>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            driver,
            default_source: None,
            resource: None,
            state: PlaybackState::Unloaded,
            is_playing: false,
            position_ms: 0,
            duration_ms: 0,
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    /// Source that `play_pause` loads when nothing is loaded yet.
    pub fn set_default_source(&mut self, source: Option<String>) {
        self.default_source = source;
    }

    pub fn view(&self) -> PlaybackView {
        PlaybackView {
            state: self.state,
            is_playing: self.is_playing,
            position_ms: self.position_ms,
            duration_ms: self.duration_ms,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn resource(&self) -> Option<&PlaybackResource> {
        self.resource.as_ref()
    }

    /// Loads `uri`, releasing whatever was loaded before.
    pub async fn load(&mut self, uri: &str) -> Result<()> {
        self.release_resource();
        self.generation += 1;
        self.state = PlaybackState::Loading;
        tracing::debug!("Loading {} (generation {})", uri, self.generation);

        let loaded = match self.acquire(uri).await {
            Ok(loaded) => loaded,
            Err(err) => {
                self.state = PlaybackState::Error;
                tracing::error!("Failed to load {}: {}", uri, err);
                return Err(match err {
                    VoiceError::AudioLoadFailed(_) => err,
                    other => VoiceError::AudioLoadFailed(other.to_string()),
                });
            }
        };

        let generation = self.generation;
        let events = self.events_tx.clone();
        let mut feed = loaded.status;
        let forwarder = tokio::spawn(async move {
            while let Some(status) = feed.recv().await {
                if events.send(StatusEvent { generation, status }).is_err() {
                    break;
                }
            }
        });

        self.resource = Some(PlaybackResource {
            driver: Arc::clone(&self.driver),
            id: loaded.id,
            source: uri.to_string(),
            forwarder,
            released: false,
        });
        self.state = PlaybackState::Ready;
        self.duration_ms = loaded.duration_ms;
        self.position_ms = 0;
        self.is_playing = false;
        Ok(())
    }

    async fn acquire(&self, uri: &str) -> Result<crate::media::LoadedAudio> {
        self.driver.set_audio_mode(AudioMode::Playback).await?;
        self.driver.load(uri).await
    }

    /// Toggles playback based on what the driver reports right now.
    pub async fn play_pause(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Loading => {
                return Err(VoiceError::InvalidState {
                    operation: "play/pause",
                    state: self.state.label(),
                })
            }
            PlaybackState::Unloaded | PlaybackState::Error => {
                let source = self.default_source.clone().ok_or_else(|| {
                    VoiceError::AudioLoadFailed("no audio source to play".to_string())
                })?;
                self.load(&source).await?;
            }
            PlaybackState::Ready => {}
        }

        let id = self.loaded_id("play/pause")?;
        let (wanted_play, attempt) = match self.driver.status(id).await {
            Ok(status) => (!status.is_playing, self.toggle(id, status).await),
            Err(err) => (true, Err(err)),
        };

        match attempt {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!("Play/pause failed ({}), reloading source", err);
                let source = self.resource.as_ref().map(|r| r.source.clone());
                let source = source.or_else(|| self.default_source.clone());
                let Some(source) = source else {
                    return Err(err);
                };
                // A fresh resource starts paused at 0, which already satisfies a pause.
                self.load(&source).await?;
                if !wanted_play {
                    return Ok(());
                }
                let id = self.loaded_id("play/pause")?;
                let status = self.driver.status(id).await?;
                self.toggle(id, status).await
            }
        }
    }

    async fn toggle(&mut self, id: ResourceId, status: DriverStatus) -> Result<()> {
        if status.is_playing {
            self.driver.pause(id).await?;
            self.is_playing = false;
            self.position_ms = status.position_ms;
            return Ok(());
        }

        let at_end = status.duration_ms > 0 && status.position_ms >= status.duration_ms;
        if status.did_just_finish || at_end {
            self.driver.seek(id, 0).await?;
            self.position_ms = 0;
        }
        self.driver.play(id).await?;
        self.is_playing = true;
        Ok(())
    }

    /// Jumps to `offset_seconds`, clamped to the track.
    pub async fn seek(&mut self, offset_seconds: f64) -> Result<()> {
        let id = self.loaded_id("seek")?;
        let requested = if offset_seconds.is_finite() {
            (offset_seconds * 1000.0).round().max(0.0) as u64
        } else {
            0
        };
        let target = requested.min(self.duration_ms);
        self.driver.seek(id, target).await?;
        self.position_ms = target;
        Ok(())
    }

    /// Rewinds to the start. Progress is zeroed immediately, not on the next status.
    pub async fn reset(&mut self) -> Result<()> {
        let id = self.loaded_id("reset")?;
        self.driver.seek(id, 0).await?;
        self.position_ms = 0;
        Ok(())
    }

    /// Applies one status event. Returns `false` when the event was stale.
    pub async fn handle_status(&mut self, event: StatusEvent) -> Result<bool> {
        let Some(id) = self.resource.as_ref().map(|r| r.id) else {
            return Ok(false);
        };
        if event.generation != self.generation {
            tracing::debug!(
                "Dropping status from generation {} (current {})",
                event.generation,
                self.generation
            );
            return Ok(false);
        }

        let status = event.status;
        self.duration_ms = status.duration_ms;
        if status.did_just_finish {
            self.is_playing = false;
            self.position_ms = 0;
            self.driver.seek(id, 0).await?;
        } else {
            self.is_playing = status.is_playing;
            self.position_ms = status.position_ms;
        }
        Ok(true)
    }

    /// Applies every status event already queued.
    pub async fn pump(&mut self) -> Result<()> {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_status(event).await?;
        }
        Ok(())
    }

    /// Releases the resource only if it was loaded from `uri`.
    pub fn release_if_source(&mut self, uri: &str) {
        if self.resource.as_ref().is_some_and(|r| r.source == uri) {
            self.teardown();
        }
    }

    /// Unconditional release for screen exit or replacement.
    ///
    /// Bumps the generation first so anything still queued is ignored.
    pub fn teardown(&mut self) {
        self.generation += 1;
        self.release_resource();
        while self.events_rx.try_recv().is_ok() {}
        self.state = PlaybackState::Unloaded;
        self.is_playing = false;
        self.position_ms = 0;
        self.duration_ms = 0;
    }

    fn release_resource(&mut self) {
        if let Some(resource) = self.resource.take() {
            resource.release();
        }
    }

    fn loaded_id(&self, operation: &'static str) -> Result<ResourceId> {
        match (&self.resource, self.state) {
            (Some(resource), PlaybackState::Ready) => Ok(resource.id),
            _ => Err(VoiceError::InvalidState {
                operation,
                state: self.state.label(),
            }),
        }
    }
}
