//! Platform audio driver interface.
//!
//! The recorder and playback controllers talk to the device only through
//! [`AudioDriver`]. The production implementation lives in [`device`]; tests use
//! the scriptable driver in `fake`.

pub mod device;
pub mod ffmpeg;

#[cfg(test)]
pub mod fake;

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

pub use device::DeviceDriver;

/// A capability the platform must grant before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Microphone,
    PhotoLibrary,
    Camera,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Microphone => write!(f, "microphone"),
            Self::PhotoLibrary => write!(f, "photo library"),
            Self::Camera => write!(f, "camera"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Shared audio route. Capture and playback are mutually exclusive at the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioMode {
    Capture,
    #[default]
    Playback,
}

/// Opaque id of an active capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureId(pub u64);

/// Opaque id of a loaded playback resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Local audio file produced by a finished capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHandle {
    pub uri: String,
}

/// Status snapshot reported by the driver for a loaded resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverStatus {
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
    pub did_just_finish: bool,
}

/// A freshly loaded resource and its periodic status feed.
///
/// The feed ends when the resource is unloaded.
pub struct LoadedAudio {
    pub id: ResourceId,
    pub duration_ms: u64,
    pub status: mpsc::UnboundedReceiver<DriverStatus>,
}

#[async_trait]
pub trait AudioDriver: Send + Sync {
    async fn request_permission(&self, capability: Capability) -> Result<Permission>;

    async fn set_audio_mode(&self, mode: AudioMode) -> Result<()>;

    async fn start_capture(&self) -> Result<CaptureId>;

    /// Finalizes the capture. `None` means no file was produced.
    async fn stop_capture(&self, id: CaptureId) -> Result<Option<AudioHandle>>;

    async fn load(&self, uri: &str) -> Result<LoadedAudio>;

    /// Current driver-side state of a loaded resource.
    async fn status(&self, id: ResourceId) -> Result<DriverStatus>;

    async fn play(&self, id: ResourceId) -> Result<()>;

    async fn pause(&self, id: ResourceId) -> Result<()>;

    async fn seek(&self, id: ResourceId, position_ms: u64) -> Result<()>;

    /// Releases a resource. Never blocks, so it can run from `Drop`.
    fn unload(&self, id: ResourceId);
}
