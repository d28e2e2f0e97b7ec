//! Application command handlers for readaloud.
//!
//! # Commands
//! - `auth`: sign up, sign in (email/password or Google id token), sign out
//! - `profile`: profile view with the stored voice sample, rename, photo upload
//! - `voice`: record, review and save the voice sample; delete it
//! - `config`: open the configuration file in the user's editor
//! - `logs`: display recent log entries

pub mod auth;
pub mod config;
pub mod logs;
pub mod profile;
pub mod voice;

pub use auth::{handle_login, handle_logout, handle_signup};
pub use config::handle_config;
pub use logs::handle_logs;
pub use profile::{handle_photo, handle_profile, handle_rename};
pub use voice::{handle_voice_delete, handle_voice_setup};

use std::path::PathBuf;
use std::sync::Arc;

use cliclack::{input, intro, note, outro};
use console::style;

use crate::backend::firebase::FirebaseClient;
use crate::config::{self as app_config, BackendConfig, ReadaloudConfig};
use crate::error::VoiceError;
use crate::media::{AudioDriver, DeviceDriver};
use crate::profile::ProfileService;
use crate::session::{SessionContext, SessionStore};
use crate::ui::VoiceScreen;
use crate::voice::UploadCoordinator;

/// Collaborators shared by the commands of one run.
pub struct AppContext {
    pub config: ReadaloudConfig,
    pub data_dir: PathBuf,
    pub session: SessionContext,
    pub uploads: Arc<UploadCoordinator>,
}

impl AppContext {
    /// Loads the config, connects the backend and restores any saved session.
    pub async fn open() -> anyhow::Result<Self> {
        let config_path = app_config::config_path()?;
        let mut config = ReadaloudConfig::load_from(&config_path)?;
        if !config.backend.missing().is_empty() {
            prompt_backend(&mut config.backend)?;
            config.save_to(&config_path)?;
        }

        let data_dir = app_config::data_dir()?;
        let firebase = Arc::new(FirebaseClient::new(config.backend.clone())?);
        let timeout = config.network.timeout();

        let profiles = ProfileService::new(firebase.clone(), timeout);
        let mut session =
            SessionContext::new(firebase.clone(), profiles, SessionStore::new(&data_dir));
        session.restore().await?;

        let uploads = Arc::new(UploadCoordinator::new(firebase.clone(), firebase, timeout));

        Ok(Self {
            config,
            data_dir,
            session,
            uploads,
        })
    }

    /// Opens the audio device. Only the commands that record or play call this.
    pub fn audio_driver(&self) -> anyhow::Result<Arc<dyn AudioDriver>> {
        let driver = DeviceDriver::new(&self.config.audio, self.data_dir.join("recordings"))?;
        Ok(Arc::new(driver))
    }

    pub fn uid(&self) -> Result<String, VoiceError> {
        Ok(self.session.require_user()?.uid.clone())
    }
}

/// Asks for the backend settings the config file is missing.
fn prompt_backend(backend: &mut BackendConfig) -> anyhow::Result<()> {
    quiet_interrupts();
    intro(style(" backend ").on_white().black())?;
    note(
        "Firebase project",
        "Find these values in the Firebase console under Project settings.",
    )?;

    if backend.api_key.is_empty() {
        backend.api_key = input("Web API key:").interact()?;
    }
    if backend.project_id.is_empty() {
        backend.project_id = input("Project ID:").interact()?;
    }
    if backend.storage_bucket.is_empty() {
        let suggested = format!("{}.appspot.com", backend.project_id);
        backend.storage_bucket = input("Storage bucket:")
            .default_input(&suggested)
            .interact()?;
    }

    outro("Backend settings saved.")?;
    Ok(())
}

/// Ctrl-C during a prompt comes back from cliclack as an interrupted error.
fn quiet_interrupts() {
    if let Err(e) = ctrlc::set_handler(|| {}) {
        tracing::debug!("Ctrl-C handler already installed: {}", e);
    }
}

/// Logs a failure raised on a screen and returns the line to show under the status.
///
/// Permission refusals take over the whole screen until a key is pressed.
fn surface(screen: &mut VoiceScreen, error: &VoiceError) -> anyhow::Result<Option<String>> {
    tracing::error!("{}", error);
    if let VoiceError::PermissionDenied(_) = error {
        screen.show_notice(&error.notice())?;
        return Ok(None);
    }
    Ok(Some(error.notice()))
}
