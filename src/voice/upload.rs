//! Upload coordinator: moves recorded audio and profile photos into blob storage
//! and keeps the profile record in step with what is stored.
//!
//! Ordering is what keeps the record honest:
//! - upload: blob first, record second. A failed blob write never touches the record.
//! - delete: blob first, record second. A failed blob delete never touches the record.
//!
//! The one accepted gap is a blob written whose record update then fails. The blob
//! key is fixed per user, so the next upload overwrites it.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use crate::backend::{
    profile_photo_path, voice_sample_path, BlobStore, DocumentStore, Fields, USERS,
};
use crate::error::{Result, VoiceError};
use crate::media::AudioHandle;
use crate::profile::VoiceAsset;

const VOICE_CONTENT_TYPE: &str = "audio/mp4";
const PHOTO_CONTENT_TYPE: &str = "image/jpeg";

/// Raised while an operation is in flight, lowered on every exit path.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool, operation: &'static str) -> Result<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            return Err(VoiceError::InvalidState {
                operation,
                state: "uploading",
            });
        }
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct UploadCoordinator {
    blobs: Arc<dyn BlobStore>,
    documents: Arc<dyn DocumentStore>,
    timeout: Duration,
    uploading_voice: AtomicBool,
    uploading_photo: AtomicBool,
}

impl UploadCoordinator {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        documents: Arc<dyn DocumentStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            blobs,
            documents,
            timeout,
            uploading_voice: AtomicBool::new(false),
            uploading_photo: AtomicBool::new(false),
        }
    }

    /// True while a voice upload or delete is running.
    pub fn is_uploading_voice(&self) -> bool {
        self.uploading_voice.load(Ordering::SeqCst)
    }

    pub fn is_uploading_photo(&self) -> bool {
        self.uploading_photo.load(Ordering::SeqCst)
    }

    /// Stores the recording as the user's voice sample and marks the voice ready.
    pub async fn upload_voice(&self, handle: &AudioHandle, uid: &str) -> Result<VoiceAsset> {
        let _flight = InFlight::enter(&self.uploading_voice, "upload voice")?;
        let path = voice_sample_path(uid);
        tracing::info!("Uploading voice sample for {} to {}", uid, path);

        let bytes = read_local(&handle.uri).await?;
        let url = self
            .store_blob(&path, bytes, VOICE_CONTENT_TYPE, "voice upload")
            .await?;

        let asset = VoiceAsset::ready(url, Utc::now());
        self.merge(uid, asset.to_fields(), "voice upload")
            .await
            .inspect_err(|_| {
                tracing::warn!(
                    "Voice blob {} is stored but the profile still has the previous voice fields",
                    path
                );
            })?;

        tracing::info!("Voice sample saved for {}", uid);
        Ok(asset)
    }

    /// Removes the stored sample, then clears the voice fields together.
    pub async fn delete_voice(&self, uid: &str) -> Result<VoiceAsset> {
        let _flight = InFlight::enter(&self.uploading_voice, "delete voice")?;
        let path = voice_sample_path(uid);
        tracing::info!("Deleting voice sample {}", path);

        self.bounded(self.blobs.delete(&path), "voice delete")
            .await?
            .map_err(|e| {
                tracing::error!("Failed to delete {}: {}", path, e);
                VoiceError::DeleteFailed(e.to_string())
            })?;

        let asset = VoiceAsset::cleared();
        self.merge(uid, asset.to_fields(), "voice delete").await?;
        tracing::info!("Voice sample deleted for {}", uid);
        Ok(asset)
    }

    /// Stores a profile picture and points `photoURL` at it. No other field is written.
    pub async fn upload_photo(&self, image: &Path, uid: &str) -> Result<String> {
        let _flight = InFlight::enter(&self.uploading_photo, "upload photo")?;
        let path = profile_photo_path(uid);
        tracing::info!("Uploading profile photo {} to {}", image.display(), path);

        let bytes = tokio::fs::read(image).await.map_err(|e| {
            tracing::error!("Failed to read {}: {}", image.display(), e);
            VoiceError::UploadFailed(format!("cannot read {}: {e}", image.display()))
        })?;
        let url = self
            .store_blob(&path, bytes, PHOTO_CONTENT_TYPE, "photo upload")
            .await?;

        let mut fields = Fields::new();
        fields.insert("photoURL".into(), Value::String(url.clone()));
        self.merge(uid, fields, "photo upload").await?;

        tracing::info!("Profile photo updated for {}", uid);
        Ok(url)
    }

    async fn store_blob(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        what: &'static str,
    ) -> Result<String> {
        let size = bytes.len();
        self.bounded(self.blobs.put(path, bytes, content_type), what)
            .await?
            .map_err(|e| {
                tracing::error!("Blob write to {} failed: {}", path, e);
                VoiceError::UploadFailed(e.to_string())
            })?;
        tracing::debug!("Wrote {} bytes to {}", size, path);

        self.bounded(self.blobs.url(path), what)
            .await?
            .map_err(|e| {
                tracing::error!("Could not resolve URL for {}: {}", path, e);
                VoiceError::UploadFailed(e.to_string())
            })
    }

    async fn merge(&self, uid: &str, fields: Fields, what: &'static str) -> Result<()> {
        self.bounded(self.documents.set(USERS, uid, fields, true), what)
            .await?
            .map_err(|e| {
                tracing::error!("Profile update for {} failed: {}", uid, e);
                VoiceError::ProfileUpdateFailed(e.to_string())
            })
    }

    async fn bounded<T>(&self, step: impl Future<Output = T>, what: &'static str) -> Result<T> {
        tokio::time::timeout(self.timeout, step).await.map_err(|_| {
            tracing::error!("{} exceeded {:?}", what, self.timeout);
            VoiceError::Timeout(what)
        })
    }
}

async fn read_local(uri: &str) -> Result<Vec<u8>> {
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    tokio::fs::read(path).await.map_err(|e| {
        tracing::error!("Failed to read recording {}: {}", path, e);
        VoiceError::UploadFailed(format!("cannot read recording: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{Event, MemoryBackend, Op};
    use crate::profile::VoiceStatus;
    use serde_json::json;
    use std::io::Write;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        uploads: Arc<UploadCoordinator>,
        recording: tempfile::NamedTempFile,
    }

    fn fixture(timeout: Duration) -> Fixture {
        let backend = Arc::new(MemoryBackend::default());
        let uploads = Arc::new(UploadCoordinator::new(
            backend.clone(),
            backend.clone(),
            timeout,
        ));
        let mut recording = tempfile::NamedTempFile::new().unwrap();
        recording.write_all(b"m4a-bytes").unwrap();
        Fixture {
            backend,
            uploads,
            recording,
        }
    }

    impl Fixture {
        fn handle(&self) -> AudioHandle {
            AudioHandle {
                uri: format!("file://{}", self.recording.path().display()),
            }
        }

        fn seed_ready_profile(&self) {
            let mut fields = VoiceAsset::ready("https://old".into(), Utc::now()).to_fields();
            fields.insert("email".into(), json!("a@example.com"));
            self.backend.insert_doc(USERS, "u1", fields);
            self.backend
                .insert_blob(&voice_sample_path("u1"), b"old-bytes");
        }
    }

    #[tokio::test]
    async fn upload_writes_blob_then_ready_record() {
        let fx = fixture(Duration::from_secs(5));
        let asset = fx.uploads.upload_voice(&fx.handle(), "u1").await.unwrap();

        assert_eq!(asset.status, VoiceStatus::Ready);
        assert_eq!(
            fx.backend.blob("voices/u1/voice-sample.m4a").unwrap(),
            b"m4a-bytes"
        );
        let doc = fx.backend.doc(USERS, "u1").unwrap();
        assert_eq!(doc["voiceStatus"], json!("ready"));
        assert_eq!(
            doc["voiceRecordingURL"],
            json!("https://blobs.test/voices/u1/voice-sample.m4a?token=t")
        );
        assert!(doc["voiceRecordedAt"].is_string());
        assert!(!fx.uploads.is_uploading_voice());

        let journal = fx.backend.journal();
        let put = journal.iter().position(|e| matches!(e, Event::Put(..)));
        let set = journal.iter().position(|e| matches!(e, Event::Set { .. }));
        assert!(put < set);
    }

    #[tokio::test]
    async fn blob_failure_leaves_record_untouched() {
        let fx = fixture(Duration::from_secs(5));
        fx.seed_ready_profile();
        let before = fx.backend.doc(USERS, "u1");
        fx.backend.fail(Op::Put);

        let err = fx.uploads.upload_voice(&fx.handle(), "u1").await.unwrap_err();
        assert!(matches!(err, VoiceError::UploadFailed(_)));
        assert_eq!(fx.backend.doc(USERS, "u1"), before);
        assert!(!fx
            .backend
            .journal()
            .iter()
            .any(|e| matches!(e, Event::Set { .. })));
        assert!(!fx.uploads.is_uploading_voice());
    }

    #[tokio::test]
    async fn unreadable_recording_is_an_upload_failure() {
        let fx = fixture(Duration::from_secs(5));
        let handle = AudioHandle {
            uri: "/nonexistent/voice.m4a".into(),
        };
        let err = fx.uploads.upload_voice(&handle, "u1").await.unwrap_err();
        assert!(matches!(err, VoiceError::UploadFailed(_)));
        assert!(fx.backend.journal().is_empty());
    }

    #[tokio::test]
    async fn record_failure_after_blob_write_is_reported() {
        let fx = fixture(Duration::from_secs(5));
        fx.backend.fail(Op::Set);

        let err = fx.uploads.upload_voice(&fx.handle(), "u1").await.unwrap_err();
        assert!(matches!(err, VoiceError::ProfileUpdateFailed(_)));
        assert!(fx.backend.blob("voices/u1/voice-sample.m4a").is_some());
        assert!(fx.backend.doc(USERS, "u1").is_none());

        // Retrying overwrites the same key and completes the record.
        fx.backend.heal();
        fx.uploads.upload_voice(&fx.handle(), "u1").await.unwrap();
        assert_eq!(
            fx.backend.doc(USERS, "u1").unwrap()["voiceStatus"],
            json!("ready")
        );
    }

    #[tokio::test]
    async fn delete_clears_all_voice_fields() {
        let fx = fixture(Duration::from_secs(5));
        fx.seed_ready_profile();

        let asset = fx.uploads.delete_voice("u1").await.unwrap();
        assert_eq!(asset, VoiceAsset::cleared());
        assert!(fx.backend.blob("voices/u1/voice-sample.m4a").is_none());

        let doc = fx.backend.doc(USERS, "u1").unwrap();
        assert_eq!(doc["voiceStatus"], json!("not_ready"));
        assert_eq!(doc["voiceRecordingURL"], Value::Null);
        assert_eq!(doc["voiceRecordedAt"], Value::Null);
        assert_eq!(doc["email"], json!("a@example.com"));
    }

    #[tokio::test]
    async fn failed_blob_delete_keeps_ready_record() {
        let fx = fixture(Duration::from_secs(5));
        fx.seed_ready_profile();
        let before = fx.backend.doc(USERS, "u1");
        fx.backend.fail(Op::Delete);

        let err = fx.uploads.delete_voice("u1").await.unwrap_err();
        assert!(matches!(err, VoiceError::DeleteFailed(_)));
        assert_eq!(fx.backend.doc(USERS, "u1"), before);
    }

    #[tokio::test]
    async fn photo_upload_touches_only_photo_url() {
        let fx = fixture(Duration::from_secs(5));
        fx.seed_ready_profile();
        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(b"jpeg").unwrap();

        let url = fx.uploads.upload_photo(image.path(), "u1").await.unwrap();
        assert_eq!(url, "https://blobs.test/profilePhotos/u1/photo.jpg?token=t");

        let written: Vec<Fields> = fx
            .backend
            .journal()
            .into_iter()
            .filter_map(|e| match e {
                Event::Set { fields, merge, .. } => {
                    assert!(merge);
                    Some(fields)
                }
                _ => None,
            })
            .collect();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].keys().collect::<Vec<_>>(), vec!["photoURL"]);
        assert_eq!(
            fx.backend.doc(USERS, "u1").unwrap()["voiceStatus"],
            json!("ready")
        );
        assert!(!fx.uploads.is_uploading_photo());
    }

    #[tokio::test]
    async fn hung_blob_write_times_out_and_lowers_flag() {
        let fx = fixture(Duration::from_millis(20));
        fx.backend.stall(Op::Put);

        let err = fx.uploads.upload_voice(&fx.handle(), "u1").await.unwrap_err();
        assert!(matches!(err, VoiceError::Timeout("voice upload")));
        assert!(!fx.uploads.is_uploading_voice());
        assert!(fx.backend.doc(USERS, "u1").is_none());
    }

    #[tokio::test]
    async fn flag_is_raised_while_in_flight() {
        let fx = fixture(Duration::from_secs(5));
        fx.backend.stall(Op::Put);
        let uploads = fx.uploads.clone();
        let handle = fx.handle();
        let task = tokio::spawn(async move { uploads.upload_voice(&handle, "u1").await });

        for _ in 0..50 {
            if fx.uploads.is_uploading_voice() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(fx.uploads.is_uploading_voice());

        let err = fx.uploads.delete_voice("u1").await.unwrap_err();
        assert!(matches!(err, VoiceError::InvalidState { .. }));

        task.abort();
        let _ = task.await;
        assert!(!fx.uploads.is_uploading_voice());
    }
}
