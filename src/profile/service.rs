use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use super::model::UserProfile;
use crate::backend::{AuthUser, DocumentStore, Fields, USERS};
use crate::error::{Result, VoiceError};

/// Reads and edits the `users/{uid}` record.
#[derive(Clone)]
pub struct ProfileService {
    documents: Arc<dyn DocumentStore>,
    timeout: Duration,
}

impl ProfileService {
    pub fn new(documents: Arc<dyn DocumentStore>, timeout: Duration) -> Self {
        Self { documents, timeout }
    }

    /// Creates the record on first sign-in. An existing record is never overwritten.
    pub async fn ensure_profile(&self, user: &AuthUser) -> Result<()> {
        if self.fetch(&user.uid).await?.is_some() {
            tracing::debug!("Profile for {} already exists", user.uid);
            return Ok(());
        }

        let profile = UserProfile::bootstrap(user, Utc::now());
        self.write(&user.uid, profile.bootstrap_fields(), false, "profile creation")
            .await?;
        tracing::info!("Created profile for {}", user.uid);
        Ok(())
    }

    /// Loads the record. A missing record reads as `None`.
    pub async fn load(&self, uid: &str) -> Result<Option<UserProfile>> {
        let Some(fields) = self.fetch(uid).await? else {
            return Ok(None);
        };
        let profile = UserProfile::from_fields(fields)
            .map_err(|e| VoiceError::Backend(format!("malformed profile record: {e}")))?;
        if !profile.voice.is_consistent() {
            tracing::warn!(
                "Profile {} has inconsistent voice fields: {:?}",
                uid,
                profile.voice
            );
        }
        Ok(Some(profile))
    }

    /// Sets the display name. Only the `name` field is written.
    pub async fn rename(&self, uid: &str, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VoiceError::Validation("Please enter a valid name.".to_string()));
        }

        let mut fields = Fields::new();
        fields.insert("name".into(), Value::String(name.to_string()));
        self.write(uid, fields, true, "name update").await?;
        tracing::info!("Updated name for {}", uid);
        Ok(name.to_string())
    }

    async fn fetch(&self, uid: &str) -> Result<Option<Fields>> {
        tokio::time::timeout(self.timeout, self.documents.get(USERS, uid))
            .await
            .map_err(|_| VoiceError::Timeout("profile read"))?
    }

    async fn write(
        &self,
        uid: &str,
        fields: Fields,
        merge: bool,
        what: &'static str,
    ) -> Result<()> {
        tokio::time::timeout(self.timeout, self.documents.set(USERS, uid, fields, merge))
            .await
            .map_err(|_| VoiceError::Timeout(what))?
            .map_err(|e| {
                tracing::error!("Profile write ({}) failed: {}", what, e);
                VoiceError::ProfileUpdateFailed(e.to_string())
            })
    }
}
