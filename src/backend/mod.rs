//! Backend collaborators: identity, document records and blob storage.
//!
//! The core only talks to these traits. [`firebase`] implements all three over REST;
//! tests use the in-memory doubles in `memory`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod firebase;
#[cfg(test)]
pub mod memory;

/// Collection holding one profile record per user.
pub const USERS: &str = "users";

/// A document's fields, as a flat JSON object.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Blob key of the single voice sample kept per user.
pub fn voice_sample_path(uid: &str) -> String {
    format!("voices/{uid}/voice-sample.m4a")
}

/// Blob key of the single profile picture kept per user.
pub fn profile_photo_path(uid: &str) -> String {
    format!("profilePhotos/{uid}/photo.jpg")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    /// True when the id token expires within the next minute.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - chrono::Duration::seconds(60) <= now
    }
}

/// A signed-in user together with the tokens that authorise backend calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: AuthUser,
    pub credentials: Credentials,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Signs in with an identity token issued by an external provider (Google).
    async fn sign_in_with_federated_credential(&self, id_token: &str) -> Result<AuthSession>;

    /// Exchanges the refresh token for a fresh id token.
    async fn refresh(&self, session: &AuthSession) -> Result<AuthSession>;

    /// Makes `session` the one used to authorise document and blob calls.
    fn activate(&self, session: Option<&AuthSession>);
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Fields>>;

    /// Writes `fields`. With `merge`, only the given fields are touched; otherwise the
    /// record is replaced.
    async fn set(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> Result<()>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Durable retrieval URL for a stored blob.
    async fn url(&self, path: &str) -> Result<String>;

    /// Removes a blob. Deleting a missing blob succeeds.
    async fn delete(&self, path: &str) -> Result<()>;
}
