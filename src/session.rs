//! The signed-in context.
//!
//! Established by sign-in or sign-up, torn down by sign-out, and persisted between
//! runs so each command does not have to sign in again. Controllers receive the
//! user from here rather than looking it up globally.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::backend::{AuthProvider, AuthSession, AuthUser};
use crate::error::{Result, VoiceError};
use crate::profile::ProfileService;

/// `session.json` in the data directory, readable only by the owner.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("session.json"),
        }
    }

    pub fn load(&self) -> anyhow::Result<Option<AuthSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&content) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable session file: {}", e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &AuthSession) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(session)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct SessionContext {
    auth: Arc<dyn AuthProvider>,
    profiles: ProfileService,
    store: SessionStore,
    current: Option<AuthSession>,
}

impl SessionContext {
    pub fn new(auth: Arc<dyn AuthProvider>, profiles: ProfileService, store: SessionStore) -> Self {
        Self {
            auth,
            profiles,
            store,
            current: None,
        }
    }

    pub fn profiles(&self) -> &ProfileService {
        &self.profiles
    }

    pub fn current_user(&self) -> Option<&AuthUser> {
        self.current.as_ref().map(|s| &s.user)
    }

    pub fn require_user(&self) -> Result<&AuthUser> {
        self.current_user().ok_or(VoiceError::NotSignedIn)
    }

    /// Picks up the session saved by an earlier run, refreshing an expired token.
    pub async fn restore(&mut self) -> Result<Option<&AuthUser>> {
        let saved = self.store.load().map_err(|e| VoiceError::Backend(e.to_string()))?;
        let Some(mut session) = saved else {
            return Ok(None);
        };

        if session.credentials.is_expired(Utc::now()) {
            tracing::info!("Refreshing expired session for {}", session.user.uid);
            session = match self.auth.refresh(&session).await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    tracing::warn!("Session refresh failed, signing out: {}", e);
                    self.sign_out()?;
                    return Ok(None);
                }
            };
            self.persist(&session)?;
        }

        self.auth.activate(Some(&session));
        tracing::debug!("Restored session for {}", session.user.uid);
        Ok(Some(&self.current.insert(session).user))
    }

    /// Refreshes the id token if it expires within the next minute.
    ///
    /// Called before backend work that may run long after the session was restored.
    /// Without a session this does nothing.
    pub async fn ensure_fresh(&mut self) -> Result<()> {
        let Some(session) = &self.current else {
            return Ok(());
        };
        if !session.credentials.is_expired(Utc::now()) {
            return Ok(());
        }

        tracing::info!("Refreshing session for {}", session.user.uid);
        let refreshed = self.auth.refresh(session).await.inspect_err(|e| {
            tracing::error!("Session refresh failed: {}", e);
        })?;
        self.auth.activate(Some(&refreshed));
        self.persist(&refreshed)?;
        self.current = Some(refreshed);
        Ok(())
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<&AuthUser> {
        let (email, password) = credentials(email, password)?;
        let session = self.auth.sign_in(email, password).await.inspect_err(|e| {
            tracing::error!("Sign-in failed: {}", e);
        })?;
        self.establish(session).await
    }

    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<&AuthUser> {
        if password != confirm_password {
            return Err(VoiceError::Validation("Passwords do not match.".to_string()));
        }
        let (email, password) = credentials(email, password)?;
        let session = self.auth.sign_up(email, password).await.inspect_err(|e| {
            tracing::error!("Sign-up failed: {}", e);
        })?;
        self.establish(session).await
    }

    /// Signs in with a Google id token.
    pub async fn sign_in_with_google(&mut self, id_token: &str) -> Result<&AuthUser> {
        let id_token = id_token.trim();
        if id_token.is_empty() {
            return Err(VoiceError::Validation("No ID token provided.".to_string()));
        }
        let session = self
            .auth
            .sign_in_with_federated_credential(id_token)
            .await
            .inspect_err(|e| tracing::error!("Google sign-in failed: {}", e))?;
        self.establish(session).await
    }

    /// Drops the in-memory context and the persisted session.
    pub fn sign_out(&mut self) -> Result<()> {
        if let Some(session) = self.current.take() {
            tracing::info!("Signed out {}", session.user.uid);
        }
        self.auth.activate(None);
        self.store
            .clear()
            .map_err(|e| VoiceError::Backend(format!("cannot remove session: {e}")))
    }

    async fn establish(&mut self, session: AuthSession) -> Result<&AuthUser> {
        self.auth.activate(Some(&session));
        self.persist(&session)?;
        if let Err(e) = self.profiles.ensure_profile(&session.user).await {
            tracing::warn!("Could not create profile for {}: {}", session.user.uid, e);
        }
        tracing::info!("Signed in as {}", session.user.uid);
        Ok(&self.current.insert(session).user)
    }

    fn persist(&self, session: &AuthSession) -> Result<()> {
        self.store
            .save(session)
            .map_err(|e| VoiceError::Backend(format!("cannot save session: {e}")))
    }
}

fn credentials<'a>(email: &'a str, password: &'a str) -> Result<(&'a str, &'a str)> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(VoiceError::Validation(
            "Please enter your email and password.".to_string(),
        ));
    }
    Ok((email, password))
}
