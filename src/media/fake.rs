//! Scriptable in-memory [`AudioDriver`] for controller tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    AudioDriver, AudioHandle, AudioMode, Capability, CaptureId, DriverStatus, LoadedAudio,
    Permission, ResourceId,
};
use crate::error::{Result, VoiceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Permission(Capability),
    Mode(AudioMode),
    StartCapture,
    StopCapture,
    Load(String),
    Play(ResourceId),
    Pause(ResourceId),
    Seek(ResourceId, u64),
    Unload(ResourceId),
}

struct FakeResource {
    status: DriverStatus,
    feed: mpsc::UnboundedSender<DriverStatus>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    mode: AudioMode,
    captures: Vec<CaptureId>,
    resources: HashMap<ResourceId, FakeResource>,
    max_open: usize,
    calls: Vec<Call>,
}

pub struct FakeDriver {
    pub permission: Mutex<Permission>,
    pub capture_handle: Mutex<Option<String>>,
    pub fail_load: Mutex<bool>,
    /// Number of upcoming `pause` calls that fail.
    pub fail_pauses: Mutex<u32>,
    pub duration_ms: Mutex<u64>,
    inner: Mutex<Inner>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self {
            permission: Mutex::new(Permission::Granted),
            capture_handle: Mutex::new(Some("/tmp/voice-sample.m4a".to_string())),
            fail_load: Mutex::new(false),
            fail_pauses: Mutex::new(0),
            duration_ms: Mutex::new(3000),
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl FakeDriver {
    pub fn deny(&self) {
        *self.permission.lock().unwrap() = Permission::Denied;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn mode(&self) -> AudioMode {
        self.inner.lock().unwrap().mode
    }

    pub fn open_resources(&self) -> usize {
        self.inner.lock().unwrap().resources.len()
    }

    /// Highest number of simultaneously open resources seen so far.
    pub fn max_open_resources(&self) -> usize {
        self.inner.lock().unwrap().max_open
    }

    pub fn active_captures(&self) -> usize {
        self.inner.lock().unwrap().captures.len()
    }

    /// Overwrites the driver-side state without emitting a status event.
    pub fn set_state(&self, id: ResourceId, position_ms: u64, is_playing: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(resource) = inner.resources.get_mut(&id) {
            resource.status.position_ms = position_ms;
            resource.status.is_playing = is_playing;
        }
    }

    /// Pushes a status event on the resource's feed, as the device would.
    pub fn emit(&self, id: ResourceId, status: DriverStatus) {
        let inner = self.inner.lock().unwrap();
        if let Some(resource) = inner.resources.get(&id) {
            let _ = resource.feed.send(status);
        }
    }

    /// Simulates natural end of track: driver stops and emits `did_just_finish`.
    pub fn finish(&self, id: ResourceId) {
        let status = {
            let mut inner = self.inner.lock().unwrap();
            let Some(resource) = inner.resources.get_mut(&id) else {
                return;
            };
            resource.status.position_ms = resource.status.duration_ms;
            resource.status.is_playing = false;
            DriverStatus {
                did_just_finish: true,
                ..resource.status
            }
        };
        self.emit(id, status);
    }

    pub fn driver_status(&self, id: ResourceId) -> Option<DriverStatus> {
        self.inner
            .lock()
            .unwrap()
            .resources
            .get(&id)
            .map(|r| r.status)
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl AudioDriver for FakeDriver {
    async fn request_permission(&self, capability: Capability) -> Result<Permission> {
        self.record(Call::Permission(capability));
        Ok(*self.permission.lock().unwrap())
    }

    async fn set_audio_mode(&self, mode: AudioMode) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mode = mode;
        inner.calls.push(Call::Mode(mode));
        Ok(())
    }

    async fn start_capture(&self) -> Result<CaptureId> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::StartCapture);
        if inner.mode != AudioMode::Capture {
            return Err(VoiceError::Driver("capture requested in playback mode".into()));
        }
        inner.next_id += 1;
        let id = CaptureId(inner.next_id);
        inner.captures.push(id);
        Ok(id)
    }

    async fn stop_capture(&self, id: CaptureId) -> Result<Option<AudioHandle>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::StopCapture);
        inner.captures.retain(|c| *c != id);
        Ok(self
            .capture_handle
            .lock()
            .unwrap()
            .clone()
            .map(|uri| AudioHandle { uri }))
    }

    async fn load(&self, uri: &str) -> Result<LoadedAudio> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Load(uri.to_string()));
        if inner.mode != AudioMode::Playback {
            return Err(VoiceError::AudioLoadFailed("route is in capture mode".into()));
        }
        if *self.fail_load.lock().unwrap() {
            return Err(VoiceError::AudioLoadFailed(format!("cannot decode {uri}")));
        }
        inner.next_id += 1;
        let id = ResourceId(inner.next_id);
        let duration_ms = *self.duration_ms.lock().unwrap();
        let (feed, status) = mpsc::unbounded_channel();
        inner.resources.insert(
            id,
            FakeResource {
                status: DriverStatus {
                    duration_ms,
                    ..DriverStatus::default()
                },
                feed,
            },
        );
        inner.max_open = inner.max_open.max(inner.resources.len());
        Ok(LoadedAudio {
            id,
            duration_ms,
            status,
        })
    }

    async fn status(&self, id: ResourceId) -> Result<DriverStatus> {
        self.driver_status(id)
            .ok_or_else(|| VoiceError::Driver(format!("resource {id} is not loaded")))
    }

    async fn play(&self, id: ResourceId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Play(id));
        let resource = inner
            .resources
            .get_mut(&id)
            .ok_or_else(|| VoiceError::Driver("not loaded".into()))?;
        resource.status.is_playing = resource.status.position_ms < resource.status.duration_ms;
        Ok(())
    }

    async fn pause(&self, id: ResourceId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Pause(id));
        let mut failing = self.fail_pauses.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(VoiceError::Driver("pause glitch".into()));
        }
        if let Some(resource) = inner.resources.get_mut(&id) {
            resource.status.is_playing = false;
        }
        Ok(())
    }

    async fn seek(&self, id: ResourceId, position_ms: u64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Seek(id, position_ms));
        let resource = inner
            .resources
            .get_mut(&id)
            .ok_or_else(|| VoiceError::Driver("not loaded".into()))?;
        if position_ms > resource.status.duration_ms {
            return Err(VoiceError::Driver("seek past end".into()));
        }
        resource.status.position_ms = position_ms;
        Ok(())
    }

    fn unload(&self, id: ResourceId) {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Unload(id));
        inner.resources.remove(&id);
    }
}
