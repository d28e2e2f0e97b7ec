//! Profile commands: the profile view with the stored voice sample, rename and photo.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::DateTime;
use cliclack::{input, intro, outro, spinner};
use console::style;

use super::voice::run_voice_setup;
use super::{quiet_interrupts, surface, AppContext};
use crate::error::{Result, VoiceError};
use crate::media::{AudioDriver, Capability, Permission};
use crate::profile::{ProfileService, UserProfile, VoiceStatus};
use crate::session::SessionContext;
use crate::ui::{ScreenCommand, ScreenModel, VoiceScreen, SKIP_SECONDS};
use crate::voice::{PlaybackController, UploadCoordinator, VoiceSetup};

const HINTS: &str = " space play/pause · ←/→ skip · 0 restart · v recalibrate · d delete · q quit";

/// State behind the profile screen: the loaded record and one player for its voice sample.
pub struct ProfilePage {
    profiles: ProfileService,
    uploads: Arc<UploadCoordinator>,
    player: PlaybackController,
    uid: String,
    profile: Option<UserProfile>,
    confirm_delete: bool,
}

impl ProfilePage {
    pub fn new(
        profiles: ProfileService,
        uploads: Arc<UploadCoordinator>,
        driver: Arc<dyn AudioDriver>,
        uid: String,
    ) -> Self {
        Self {
            profiles,
            uploads,
            player: PlaybackController::new(driver),
            uid,
            profile: None,
            confirm_delete: false,
        }
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    /// Releases the player, reloads the record and loads the sample if one is ready.
    pub async fn enter(&mut self) -> Result<()> {
        self.player.teardown();
        self.player.set_default_source(None);
        self.confirm_delete = false;

        self.profile = self.profiles.load(&self.uid).await?;
        let Some(url) = self.sample_url() else {
            return Ok(());
        };
        self.player.set_default_source(Some(url.clone()));
        self.player.load(&url).await
    }

    pub async fn play_pause(&mut self) -> Result<()> {
        self.require_sample("play/pause")?;
        self.player.play_pause().await
    }

    pub async fn skip(&mut self, delta_seconds: f64) -> Result<()> {
        let current = self.player.view().position_ms as f64 / 1000.0;
        self.player.seek(current + delta_seconds).await
    }

    pub async fn rewind(&mut self) -> Result<()> {
        self.player.reset().await
    }

    /// Drops the player before the voice setup screen takes over the audio route.
    pub fn recalibrate(&mut self) {
        self.player.teardown();
    }

    /// First call asks for confirmation, the second deletes.
    pub async fn delete_voice(&mut self) -> Result<bool> {
        self.require_sample("delete voice")?;
        if !self.confirm_delete {
            self.confirm_delete = true;
            return Ok(false);
        }
        self.confirm_delete = false;

        let previous = self.sample_url();
        self.uploads.delete_voice(&self.uid).await?;
        if let Some(url) = previous {
            self.player.release_if_source(&url);
        }
        self.enter().await?;
        Ok(true)
    }

    pub fn cancel_delete(&mut self) {
        self.confirm_delete = false;
    }

    pub async fn refresh(&mut self) -> Result<()> {
        self.player.pump().await
    }

    pub fn leave(&mut self) {
        self.player.teardown();
    }

    pub fn model(&self) -> ScreenModel {
        let mut model = ScreenModel::new("Profile", HINTS);
        let Some(profile) = &self.profile else {
            model.status = "No profile record yet.".to_string();
            return model;
        };

        let photo = if profile.photo_url.is_empty() {
            "none".to_string()
        } else {
            profile.photo_url.clone()
        };
        model.details = vec![
            ("Name".to_string(), profile.shown_name().to_string()),
            ("Email".to_string(), profile.email.clone()),
            ("Photo".to_string(), photo),
            ("Joined".to_string(), day(&profile.created_at)),
        ];

        match profile.voice.status {
            VoiceStatus::Ready => {
                let recorded = profile
                    .voice
                    .recorded_at
                    .as_deref()
                    .map(day)
                    .unwrap_or_default();
                model.status = format!("AI voice ready · recorded {recorded}");
                model.playback = Some(self.player.view());
            }
            VoiceStatus::NotReady => {
                model.status = "No AI voice yet. Press v to record one.".to_string();
            }
        }
        if self.confirm_delete {
            model.message = Some(
                "Delete Voice? This will remove your AI voice data. Press d again to confirm."
                    .to_string(),
            );
        }
        model
    }

    fn sample_url(&self) -> Option<String> {
        self.profile
            .as_ref()
            .and_then(|p| p.voice.playable_url())
            .map(str::to_string)
    }

    fn require_sample(&self, operation: &'static str) -> Result<()> {
        match self.sample_url() {
            Some(_) => Ok(()),
            None => Err(VoiceError::InvalidState {
                operation,
                state: "no voice sample is saved",
            }),
        }
    }
}

/// `YYYY-MM-DD` of an ISO timestamp, or the raw text when it does not parse.
fn day(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Shows the profile and plays the stored voice sample.
pub async fn handle_profile(ctx: &mut AppContext) -> anyhow::Result<()> {
    let uid = ctx.uid()?;
    let driver = ctx.audio_driver()?;
    let mut page = ProfilePage::new(
        ctx.session.profiles().clone(),
        Arc::clone(&ctx.uploads),
        Arc::clone(&driver),
        uid.clone(),
    );

    let mut screen = VoiceScreen::new()?;
    let outcome = profile_loop(&mut screen, &mut page, ctx, &driver, &uid).await;
    page.leave();
    screen.cleanup()?;
    outcome
}

async fn profile_loop(
    screen: &mut VoiceScreen,
    page: &mut ProfilePage,
    ctx: &mut AppContext,
    driver: &Arc<dyn AudioDriver>,
    uid: &str,
) -> anyhow::Result<()> {
    let mut message = match reenter(page, &mut ctx.session).await {
        Ok(()) => None,
        Err(e) => surface(screen, &e)?,
    };

    loop {
        if let Err(e) = page.refresh().await {
            message = surface(screen, &e)?;
        }
        let mut model = page.model();
        if model.message.is_none() {
            model.message = message.clone();
        }
        screen.render(&model)?;

        let command = screen.handle_input()?;
        if command == ScreenCommand::Continue {
            continue;
        }
        message = None;
        if command != ScreenCommand::Delete {
            page.cancel_delete();
        }

        let result = match command {
            ScreenCommand::Quit => return Ok(()),
            ScreenCommand::Recalibrate => {
                page.recalibrate();
                let mut setup =
                    VoiceSetup::new(Arc::clone(driver), Arc::clone(&ctx.uploads), uid.to_string());
                if let Err(e) = run_voice_setup(screen, &mut setup, &mut ctx.session).await {
                    tracing::error!("Voice setup failed: {:#}", e);
                    message = Some(format!("Voice setup failed: {e}"));
                }
                reenter(page, &mut ctx.session).await
            }
            other => match apply(page, &mut ctx.session, other).await {
                Ok(line) => {
                    message = line;
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };
        if let Err(e) = result {
            message = surface(screen, &e)?;
        }
    }
}

/// Reloads the record with a session that is still valid.
async fn reenter(page: &mut ProfilePage, session: &mut SessionContext) -> Result<()> {
    session.ensure_fresh().await?;
    page.enter().await
}

/// Runs one key command against the page and returns the line to show afterwards.
async fn apply(
    page: &mut ProfilePage,
    session: &mut SessionContext,
    command: ScreenCommand,
) -> Result<Option<String>> {
    match command {
        ScreenCommand::TogglePlay => page.play_pause().await?,
        ScreenCommand::SkipBack => page.skip(-SKIP_SECONDS).await?,
        ScreenCommand::SkipForward => page.skip(SKIP_SECONDS).await?,
        ScreenCommand::Rewind => page.rewind().await?,
        ScreenCommand::Delete => {
            session.ensure_fresh().await?;
            if page.delete_voice().await? {
                return Ok(Some("Your AI voice has been deleted.".to_string()));
            }
        }
        _ => {}
    }
    Ok(None)
}

pub async fn handle_rename(ctx: &mut AppContext, name: Option<String>) -> anyhow::Result<()> {
    let uid = ctx.uid()?;
    let name = match name {
        Some(name) => name,
        None => {
            quiet_interrupts();
            intro(style(" rename ").on_white().black())?;
            ctx.session.ensure_fresh().await?;
            let current = ctx
                .session
                .profiles()
                .load(&uid)
                .await?
                .map(|p| p.shown_name().to_string())
                .unwrap_or_default();
            input("Name:").default_input(&current).interact()?
        }
    };

    ctx.session.ensure_fresh().await?;
    let saved = ctx.session.profiles().rename(&uid, &name).await?;
    println!("Name updated to {saved}.");
    Ok(())
}

/// Uploads `file` as the profile photo.
pub async fn handle_photo(ctx: &mut AppContext, file: PathBuf, camera: bool) -> anyhow::Result<()> {
    let uid = ctx.uid()?;
    let driver = ctx.audio_driver()?;
    let capability = if camera {
        Capability::Camera
    } else {
        Capability::PhotoLibrary
    };

    ctx.session.ensure_fresh().await?;
    let mut progress = spinner();
    progress.start("Uploading photo...");
    match change_photo(driver.as_ref(), &ctx.uploads, &uid, &file, capability).await {
        Ok(url) => {
            progress.stop("Profile photo updated");
            outro(url)?;
            Ok(())
        }
        Err(e) => {
            progress.error(e.notice());
            Err(e.into())
        }
    }
}

async fn change_photo(
    driver: &dyn AudioDriver,
    uploads: &UploadCoordinator,
    uid: &str,
    file: &Path,
    capability: Capability,
) -> Result<String> {
    if driver.request_permission(capability).await? == Permission::Denied {
        tracing::warn!("{} permission denied", capability);
        return Err(VoiceError::PermissionDenied(capability));
    }
    if !file.is_file() {
        return Err(VoiceError::Validation(format!(
            "{} is not an image file.",
            file.display()
        )));
    }
    uploads.upload_photo(file, uid).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{Event, MemoryAuth, MemoryBackend, Op};
    use crate::backend::{voice_sample_path, USERS};
    use crate::media::fake::{Call, FakeDriver};
    use crate::profile::VoiceAsset;
    use crate::session::SessionStore;
    use crate::voice::PlaybackState;
    use chrono::Utc;
    use serde_json::json;
    use std::io::Write;
    use std::time::Duration;

    struct Fixture {
        driver: Arc<FakeDriver>,
        backend: Arc<MemoryBackend>,
        uploads: Arc<UploadCoordinator>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::default());
        let uploads = Arc::new(UploadCoordinator::new(
            backend.clone(),
            backend.clone(),
            Duration::from_secs(5),
        ));
        Fixture {
            driver: Arc::new(FakeDriver::default()),
            backend,
            uploads,
        }
    }

    impl Fixture {
        fn page(&self) -> ProfilePage {
            ProfilePage::new(
                ProfileService::new(self.backend.clone(), Duration::from_secs(5)),
                self.uploads.clone(),
                self.driver.clone(),
                "u1".to_string(),
            )
        }

        fn seed(&self, voice: VoiceAsset) {
            let mut fields = voice.to_fields();
            fields.insert("uid".into(), json!("u1"));
            fields.insert("email".into(), json!("a@example.com"));
            fields.insert("createdAt".into(), json!("2025-03-04T05:06:07.000Z"));
            self.backend.insert_doc(USERS, "u1", fields);
        }

        fn loads(&self) -> Vec<String> {
            self.driver
                .calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Load(uri) => Some(uri),
                    _ => None,
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn entering_loads_only_a_ready_sample() {
        let fx = fixture();
        fx.seed(VoiceAsset::cleared());
        let mut page = fx.page();
        page.enter().await.unwrap();
        assert!(fx.loads().is_empty());
        assert!(page.model().playback.is_none());

        fx.seed(VoiceAsset::ready("https://blobs.test/v".into(), Utc::now()));
        page.enter().await.unwrap();
        assert_eq!(fx.loads(), vec!["https://blobs.test/v".to_string()]);
        let view = page.model().playback.unwrap();
        assert_eq!(view.state, PlaybackState::Ready);
        assert_eq!(view.duration_ms, 3000);
    }

    #[tokio::test]
    async fn reentering_replaces_the_player() {
        let fx = fixture();
        fx.seed(VoiceAsset::ready("https://blobs.test/v".into(), Utc::now()));
        let mut page = fx.page();
        page.enter().await.unwrap();
        page.enter().await.unwrap();
        assert_eq!(fx.driver.open_resources(), 1);
        assert_eq!(fx.driver.max_open_resources(), 1);

        page.leave();
        assert_eq!(fx.driver.open_resources(), 0);
    }

    #[tokio::test]
    async fn recalibrate_frees_the_route_for_recording() {
        let fx = fixture();
        fx.seed(VoiceAsset::ready("https://blobs.test/v".into(), Utc::now()));
        let mut page = fx.page();
        page.enter().await.unwrap();
        page.play_pause().await.unwrap();

        page.recalibrate();
        assert_eq!(fx.driver.open_resources(), 0);
        assert_eq!(page.model().playback.unwrap().position_ms, 0);
    }

    #[tokio::test]
    async fn play_without_sample_is_rejected() {
        let fx = fixture();
        fx.seed(VoiceAsset::cleared());
        let mut page = fx.page();
        page.enter().await.unwrap();
        assert!(matches!(
            page.play_pause().await.unwrap_err(),
            VoiceError::InvalidState { .. }
        ));
    }

    #[tokio::test]
    async fn delete_needs_confirmation_then_clears_voice() {
        let fx = fixture();
        fx.seed(VoiceAsset::ready("https://blobs.test/v".into(), Utc::now()));
        fx.backend.insert_blob(&voice_sample_path("u1"), b"voice");
        let mut page = fx.page();
        page.enter().await.unwrap();

        assert!(!page.delete_voice().await.unwrap());
        assert!(page.model().message.is_some());
        assert!(fx.backend.blob(&voice_sample_path("u1")).is_some());

        assert!(page.delete_voice().await.unwrap());
        assert!(fx.backend.blob(&voice_sample_path("u1")).is_none());
        assert_eq!(fx.driver.open_resources(), 0);
        let profile = page.profile().unwrap();
        assert_eq!(profile.voice, VoiceAsset::cleared());
        assert!(page.model().playback.is_none());
    }

    #[tokio::test]
    async fn other_keys_cancel_a_pending_delete() {
        let fx = fixture();
        fx.seed(VoiceAsset::ready("https://blobs.test/v".into(), Utc::now()));
        let mut page = fx.page();
        page.enter().await.unwrap();

        assert!(!page.delete_voice().await.unwrap());
        page.cancel_delete();
        assert!(!page.delete_voice().await.unwrap());
        assert!(!fx
            .backend
            .journal()
            .iter()
            .any(|e| matches!(e, Event::Delete(_))));
    }

    #[tokio::test]
    async fn delete_refreshes_a_session_that_expired_on_screen() {
        let fx = fixture();
        let auth = Arc::new(MemoryAuth::with_account("a@example.com", "secret1", "u1"));
        *auth.token_lifetime.lock().unwrap() = Some(chrono::Duration::seconds(30));
        let dir = tempfile::tempdir().unwrap();
        let mut session = SessionContext::new(
            auth.clone(),
            ProfileService::new(fx.backend.clone(), Duration::from_secs(5)),
            SessionStore::new(dir.path()),
        );
        session.sign_in("a@example.com", "secret1").await.unwrap();

        fx.seed(VoiceAsset::ready("https://blobs.test/v".into(), Utc::now()));
        fx.backend.insert_blob(&voice_sample_path("u1"), b"voice");
        let mut page = fx.page();
        page.enter().await.unwrap();

        let first = apply(&mut page, &mut session, ScreenCommand::Delete).await;
        assert_eq!(first.unwrap(), None);
        let second = apply(&mut page, &mut session, ScreenCommand::Delete).await;
        assert_eq!(
            second.unwrap().as_deref(),
            Some("Your AI voice has been deleted.")
        );

        assert_eq!(*auth.refreshes.lock().unwrap(), 1);
        assert!(fx.backend.blob(&voice_sample_path("u1")).is_none());
        assert_eq!(page.profile().unwrap().voice, VoiceAsset::cleared());
    }

    #[tokio::test]
    async fn model_shows_record_details() {
        let fx = fixture();
        fx.seed(VoiceAsset::ready(
            "https://blobs.test/v".into(),
            "2025-06-01T10:00:00Z".parse().unwrap(),
        ));
        let mut page = fx.page();
        page.enter().await.unwrap();

        let model = page.model();
        assert!(model
            .details
            .contains(&("Name".to_string(), "a@example.com".to_string())));
        assert!(model
            .details
            .contains(&("Joined".to_string(), "2025-03-04".to_string())));
        assert!(model.status.contains("2025-06-01"));
    }

    #[tokio::test]
    async fn photo_change_requires_permission() {
        let fx = fixture();
        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(b"jpeg").unwrap();

        fx.driver.deny();
        let err = change_photo(
            fx.driver.as_ref(),
            &fx.uploads,
            "u1",
            image.path(),
            Capability::PhotoLibrary,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            VoiceError::PermissionDenied(Capability::PhotoLibrary)
        ));
        assert!(fx.backend.journal().is_empty());
    }

    #[tokio::test]
    async fn photo_change_writes_photo_url() {
        let fx = fixture();
        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(b"jpeg").unwrap();

        let url = change_photo(
            fx.driver.as_ref(),
            &fx.uploads,
            "u1",
            image.path(),
            Capability::PhotoLibrary,
        )
        .await
        .unwrap();
        assert_eq!(fx.backend.doc(USERS, "u1").unwrap()["photoURL"], json!(url));

        fx.backend.fail(Op::Put);
        let missing = change_photo(
            fx.driver.as_ref(),
            &fx.uploads,
            "u1",
            Path::new("/nonexistent/photo.jpg"),
            Capability::PhotoLibrary,
        )
        .await
        .unwrap_err();
        assert!(matches!(missing, VoiceError::Validation(_)));
    }
}
