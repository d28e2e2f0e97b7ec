//! cpal-backed audio driver.
//!
//! `cpal::Stream` is not `Send`, so every stream lives on one dedicated audio thread
//! and the async [`AudioDriver`] methods talk to it over a command channel. Capture
//! collects mono i16 PCM, which is written to WAV with hound and encoded with ffmpeg.
//! Playback decodes the source with ffmpeg and feeds an output stream from memory;
//! a per-resource tokio task publishes [`DriverStatus`] at a fixed cadence.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use hound::{WavReader, WavSpec, WavWriter};
use tokio::sync::{mpsc, oneshot};

use super::{
    ffmpeg, AudioDriver, AudioHandle, AudioMode, Capability, CaptureId, DriverStatus, LoadedAudio,
    Permission, ResourceId,
};
use crate::config::AudioConfig;
use crate::error::{Result, VoiceError};

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// Playback state shared between the output callback, the status task and the driver.
struct Player {
    samples: Vec<f32>,
    sample_rate: u32,
    cursor: AtomicUsize,
    playing: AtomicBool,
    finished: AtomicBool,
    released: AtomicBool,
}

impl Player {
    fn ms_for(&self, frames: usize) -> u64 {
        frames as u64 * 1000 / u64::from(self.sample_rate.max(1))
    }

    fn duration_ms(&self) -> u64 {
        self.ms_for(self.samples.len())
    }

    fn snapshot(&self, consume_finish: bool) -> DriverStatus {
        let did_just_finish = if consume_finish {
            self.finished.swap(false, Ordering::SeqCst)
        } else {
            self.finished.load(Ordering::SeqCst)
        };
        DriverStatus {
            position_ms: self.ms_for(self.cursor.load(Ordering::SeqCst)),
            duration_ms: self.duration_ms(),
            is_playing: self.playing.load(Ordering::SeqCst),
            did_just_finish,
        }
    }

    /// Fills one output buffer. Reaching the end stops playback and flags the finish.
    fn fill<T>(&self, data: &mut [T], channels: usize)
    where
        T: Sample + FromSample<f32>,
    {
        for frame in data.chunks_mut(channels.max(1)) {
            let mut value = 0.0f32;
            if self.playing.load(Ordering::Relaxed) {
                let cursor = self.cursor.load(Ordering::Relaxed);
                if cursor < self.samples.len() {
                    value = self.samples[cursor];
                    self.cursor.store(cursor + 1, Ordering::Relaxed);
                } else {
                    self.playing.store(false, Ordering::SeqCst);
                    self.finished.store(true, Ordering::SeqCst);
                }
            }
            for out in frame.iter_mut() {
                *out = T::from_sample(value);
            }
        }
    }
}

enum Command {
    ProbeInput {
        reply: oneshot::Sender<bool>,
    },
    StartCapture {
        id: CaptureId,
        reply: oneshot::Sender<anyhow::Result<()>>,
    },
    StopCapture {
        id: CaptureId,
        reply: oneshot::Sender<Option<(Vec<i16>, u32)>>,
    },
    OutputRate {
        reply: oneshot::Sender<anyhow::Result<u32>>,
    },
    OpenOutput {
        id: ResourceId,
        player: Arc<Player>,
        reply: oneshot::Sender<anyhow::Result<()>>,
    },
    CloseOutput {
        id: ResourceId,
    },
}

/// Production [`AudioDriver`] on top of cpal, hound and ffmpeg.
pub struct DeviceDriver {
    commands: Mutex<std_mpsc::Sender<Command>>,
    mode: Mutex<AudioMode>,
    players: Mutex<HashMap<ResourceId, Arc<Player>>>,
    next_id: AtomicU64,
    output_format: String,
    status_interval: Duration,
    work_dir: PathBuf,
}

impl DeviceDriver {
    /// Spawns the audio thread. `work_dir` receives encoded recordings.
    pub fn new(audio: &AudioConfig, work_dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&work_dir)?;
        let (tx, rx) = std_mpsc::channel();
        let device_name = audio.device.clone();
        let requested_rate = audio.sample_rate;
        std::thread::Builder::new()
            .name("audio-device".to_string())
            .spawn(move || audio_thread(rx, device_name, requested_rate))?;

        Ok(Self {
            commands: Mutex::new(tx),
            mode: Mutex::new(AudioMode::Playback),
            players: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            output_format: audio.output_format.clone(),
            status_interval: Duration::from_millis(audio.status_interval_ms.max(10)),
            work_dir,
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .lock()
            .map_err(|_| VoiceError::Driver("audio command channel poisoned".into()))?
            .send(command)
            .map_err(|_| VoiceError::Driver("audio thread has stopped".into()))
    }

    fn mode(&self) -> AudioMode {
        self.mode.lock().map(|m| *m).unwrap_or_default()
    }

    fn require_mode(&self, wanted: AudioMode, operation: &'static str) -> Result<()> {
        if self.mode() == wanted {
            return Ok(());
        }
        Err(VoiceError::InvalidState {
            operation,
            state: match wanted {
                AudioMode::Capture => "the audio route is in playback mode",
                AudioMode::Playback => "the audio route is in capture mode",
            },
        })
    }

    fn player(&self, id: ResourceId) -> Result<Arc<Player>> {
        self.players
            .lock()
            .ok()
            .and_then(|players| players.get(&id).cloned())
            .ok_or_else(|| VoiceError::Driver(format!("resource {id} is not loaded")))
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn spawn_status_feed(&self, player: Arc<Player>) -> mpsc::UnboundedReceiver<DriverStatus> {
        let (tx, rx) = mpsc::unbounded_channel();
        let interval = self.status_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if player.released.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(player.snapshot(true)).is_err() {
                    break;
                }
            }
        });
        rx
    }
}

async fn await_reply<T>(reply: oneshot::Receiver<T>) -> Result<T> {
    reply
        .await
        .map_err(|_| VoiceError::Driver("audio thread dropped the request".into()))
}

#[async_trait]
impl AudioDriver for DeviceDriver {
    async fn request_permission(&self, capability: Capability) -> Result<Permission> {
        let granted = match capability {
            Capability::Microphone => {
                let (reply, rx) = oneshot::channel();
                self.send(Command::ProbeInput { reply })?;
                await_reply(rx).await?
            }
            // Images come from the local filesystem on this platform.
            Capability::PhotoLibrary => true,
            Capability::Camera => {
                tracing::warn!("Camera capture is not supported on this platform");
                false
            }
        };
        tracing::debug!("Permission for {}: granted={}", capability, granted);
        Ok(if granted { Permission::Granted } else { Permission::Denied })
    }

    async fn set_audio_mode(&self, mode: AudioMode) -> Result<()> {
        let mut current = self
            .mode
            .lock()
            .map_err(|_| VoiceError::Driver("audio mode lock poisoned".into()))?;
        if *current != mode {
            tracing::debug!("Audio route switched to {:?}", mode);
        }
        *current = mode;
        Ok(())
    }

    async fn start_capture(&self) -> Result<CaptureId> {
        self.require_mode(AudioMode::Capture, "start capture")?;
        let id = CaptureId(self.next_id());
        let (reply, rx) = oneshot::channel();
        self.send(Command::StartCapture { id, reply })?;
        await_reply(rx)
            .await?
            .map_err(|e| VoiceError::Driver(e.to_string()))?;
        Ok(id)
    }

    async fn stop_capture(&self, id: CaptureId) -> Result<Option<AudioHandle>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StopCapture { id, reply })?;
        let Some((samples, sample_rate)) = await_reply(rx).await? else {
            return Ok(None);
        };
        if samples.is_empty() {
            tracing::warn!("Capture stopped with no samples");
            return Ok(None);
        }

        let temp_wav = self.work_dir.join(format!("capture-{}.wav", id.0));
        let output = self.work_dir.join(format!(
            "voice-sample-{}.{}",
            id.0,
            ffmpeg::extension_for_format(&self.output_format)
        ));
        let format = self.output_format.clone();
        let encoded = output.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let spec = WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = WavWriter::create(&temp_wav, spec)?;
            for sample in &samples {
                writer.write_sample(*sample)?;
            }
            writer.finalize()?;
            let result = ffmpeg::encode(&temp_wav, &encoded, &format);
            if let Err(e) = std::fs::remove_file(&temp_wav) {
                tracing::debug!("Failed to remove temp file: {}", e);
            }
            result
        })
        .await
        .map_err(|e| VoiceError::Driver(e.to_string()))?
        .map_err(|e| VoiceError::Driver(e.to_string()))?;

        tracing::info!("Capture saved: {}", output.display());
        Ok(Some(AudioHandle {
            uri: output.to_string_lossy().to_string(),
        }))
    }

    async fn load(&self, uri: &str) -> Result<LoadedAudio> {
        self.require_mode(AudioMode::Playback, "load audio")?;
        let id = ResourceId(self.next_id());

        let (reply, rx) = oneshot::channel();
        self.send(Command::OutputRate { reply })?;
        let sample_rate = await_reply(rx)
            .await?
            .map_err(|e| VoiceError::AudioLoadFailed(e.to_string()))?;

        let source = uri.strip_prefix("file://").unwrap_or(uri).to_string();
        let decoded = self.work_dir.join(format!("playback-{}.wav", id.0));
        let samples = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<f32>> {
            ffmpeg::decode_to_wav(&source, &decoded, sample_rate)?;
            let samples = WavReader::open(&decoded)?
                .into_samples::<i16>()
                .map(|s| s.map(|v| f32::from_sample(v)))
                .collect::<Result<Vec<_>, _>>();
            let _ = std::fs::remove_file(&decoded);
            Ok(samples?)
        })
        .await
        .map_err(|e| VoiceError::AudioLoadFailed(e.to_string()))?
        .map_err(|e| VoiceError::AudioLoadFailed(e.to_string()))?;

        let player = Arc::new(Player {
            samples,
            sample_rate,
            cursor: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            released: AtomicBool::new(false),
        });

        let (reply, rx) = oneshot::channel();
        self.send(Command::OpenOutput {
            id,
            player: Arc::clone(&player),
            reply,
        })?;
        await_reply(rx)
            .await?
            .map_err(|e| VoiceError::AudioLoadFailed(e.to_string()))?;

        if let Ok(mut players) = self.players.lock() {
            players.insert(id, Arc::clone(&player));
        }
        let duration_ms = player.duration_ms();
        tracing::info!("Loaded {} as resource {} ({} ms)", uri, id, duration_ms);

        Ok(LoadedAudio {
            id,
            duration_ms,
            status: self.spawn_status_feed(player),
        })
    }

    async fn status(&self, id: ResourceId) -> Result<DriverStatus> {
        Ok(self.player(id)?.snapshot(false))
    }

    async fn play(&self, id: ResourceId) -> Result<()> {
        self.require_mode(AudioMode::Playback, "play")?;
        let player = self.player(id)?;
        player.finished.store(false, Ordering::SeqCst);
        player.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self, id: ResourceId) -> Result<()> {
        self.player(id)?.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn seek(&self, id: ResourceId, position_ms: u64) -> Result<()> {
        let player = self.player(id)?;
        let frame = (position_ms * u64::from(player.sample_rate) / 1000) as usize;
        player
            .cursor
            .store(frame.min(player.samples.len()), Ordering::SeqCst);
        Ok(())
    }

    fn unload(&self, id: ResourceId) {
        let removed = self.players.lock().ok().and_then(|mut p| p.remove(&id));
        if let Some(player) = removed {
            player.playing.store(false, Ordering::SeqCst);
            player.released.store(true, Ordering::SeqCst);
        }
        if self.send(Command::CloseOutput { id }).is_err() {
            tracing::debug!("Audio thread gone while unloading {}", id);
        }
    }
}

struct CaptureSession {
    _stream: cpal::Stream,
    samples: Arc<Mutex<Vec<i16>>>,
    sample_rate: u32,
}

/// Owns every cpal stream. Exits when the driver is dropped.
fn audio_thread(commands: std_mpsc::Receiver<Command>, device_name: String, requested_rate: u32) {
    let mut captures: HashMap<CaptureId, CaptureSession> = HashMap::new();
    let mut outputs: HashMap<ResourceId, cpal::Stream> = HashMap::new();

    while let Ok(command) = commands.recv() {
        match command {
            Command::ProbeInput { reply } => {
                let found = suppress_alsa_warnings(|| input_device(&device_name)).is_ok();
                let _ = reply.send(found);
            }
            Command::StartCapture { id, reply } => {
                let result = open_capture(&device_name, requested_rate).map(|session| {
                    captures.insert(id, session);
                });
                let _ = reply.send(result);
            }
            Command::StopCapture { id, reply } => {
                let finished = captures.remove(&id).map(|session| {
                    let samples = session
                        .samples
                        .lock()
                        .map(|s| s.clone())
                        .unwrap_or_default();
                    let duration = samples.len() as f32 / session.sample_rate.max(1) as f32;
                    tracing::info!("Capture {} stopped: {:.2}s", id.0, duration);
                    (samples, session.sample_rate)
                });
                let _ = reply.send(finished);
            }
            Command::OutputRate { reply } => {
                let rate = suppress_alsa_warnings(output_device).and_then(|device| {
                    Ok(device.default_output_config()?.sample_rate().0)
                });
                let _ = reply.send(rate);
            }
            Command::OpenOutput { id, player, reply } => {
                let result = open_output(player).map(|stream| {
                    outputs.insert(id, stream);
                });
                let _ = reply.send(result);
            }
            Command::CloseOutput { id } => {
                if outputs.remove(&id).is_some() {
                    tracing::debug!("Output stream for {} closed", id);
                }
            }
        }
    }
    tracing::debug!("Audio thread exiting");
}

fn open_capture(device_name: &str, requested_rate: u32) -> anyhow::Result<CaptureSession> {
    let device = suppress_alsa_warnings(|| input_device(device_name))?;
    tracing::info!(
        "Recording device: {}",
        device.name().unwrap_or_else(|_| "Unknown device".to_string())
    );

    let supported = device.default_input_config()?;
    let sample_rate = supported.sample_rate().0;
    if sample_rate != requested_rate {
        tracing::info!(
            "Requested {}Hz, device records at {}Hz",
            requested_rate,
            sample_rate
        );
    }
    let channels = supported.channels() as usize;
    let config = supported.config();
    let samples = Arc::new(Mutex::new(Vec::new()));

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => {
            build_input::<f32>(&device, &config, channels, Arc::clone(&samples))?
        }
        cpal::SampleFormat::I16 => {
            build_input::<i16>(&device, &config, channels, Arc::clone(&samples))?
        }
        cpal::SampleFormat::U16 => {
            build_input::<u16>(&device, &config, channels, Arc::clone(&samples))?
        }
        other => return Err(anyhow!("Unsupported input sample format: {other:?}")),
    };
    stream.play()?;

    Ok(CaptureSession {
        _stream: stream,
        samples,
        sample_rate,
    })
}

/// Input callback downmixes every frame to mono i16.
fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    samples: Arc<Mutex<Vec<i16>>>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let Ok(mut samples) = samples.lock() else {
                return;
            };
            for frame in data.chunks_exact(channels.max(1)) {
                let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
                samples.push(i16::from_sample(sum / frame.len() as f32));
            }
        },
        |err| tracing::error!("Audio input stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

fn open_output(player: Arc<Player>) -> anyhow::Result<cpal::Stream> {
    let device = suppress_alsa_warnings(output_device)?;
    let supported = device.default_output_config()?;
    let channels = supported.channels() as usize;
    let config = supported.config();

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, channels, player)?,
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, channels, player)?,
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, channels, player)?,
        other => return Err(anyhow!("Unsupported output sample format: {other:?}")),
    };
    stream.play()?;
    Ok(stream)
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    player: Arc<Player>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| player.fill(data, channels),
        |err| tracing::error!("Audio output stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

fn output_device() -> anyhow::Result<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| anyhow!("No audio output device available"))
}

/// Resolves "default", a numeric index, or an exact device name.
fn input_device(device_spec: &str) -> anyhow::Result<cpal::Device> {
    let host = cpal::default_host();
    if device_spec == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| anyhow!("No audio input device available"));
    }

    let mut devices = host
        .input_devices()
        .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?;

    if let Ok(index) = device_spec.parse::<usize>() {
        return devices
            .nth(index)
            .ok_or_else(|| anyhow!("Device index {index} is out of range"));
    }

    devices
        .find(|device| device.name().map(|n| n == device_spec).unwrap_or(false))
        .ok_or_else(|| anyhow!("Audio input device '{device_spec}' not found"))
}

/// Temporarily redirects stderr to /dev/null so ALSA probing noise stays off the TUI.
#[cfg(target_os = "linux")]
fn suppress_alsa_warnings<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| anyhow!("Failed to open /dev/null: {e}"))?;

    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved == -1 {
        return f();
    }
    if unsafe { libc::dup2(dev_null.as_raw_fd(), libc::STDERR_FILENO) } == -1 {
        unsafe { libc::close(saved) };
        return f();
    }

    let result = f();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }
    result
}

#[cfg(not(target_os = "linux"))]
fn suppress_alsa_warnings<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    f()
}
