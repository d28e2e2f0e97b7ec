//! Cloud Storage for Firebase objects.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{status_error, FirebaseClient};
use crate::backend::BlobStore;
use crate::error::{Result, VoiceError};

const STORAGE: &str = "https://firebasestorage.googleapis.com/v0/b";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    #[serde(default)]
    download_tokens: Option<String>,
}

impl FirebaseClient {
    fn object_url(&self, path: &str) -> String {
        format!(
            "{STORAGE}/{}/o/{}",
            self.config.storage_bucket,
            urlencoding::encode(path)
        )
    }

    fn storage_auth(&self) -> Result<String> {
        Ok(format!("Firebase {}", self.token()?))
    }
}

/// Public download URL built from the object's first download token.
fn download_url(object_url: &str, metadata: &ObjectMetadata) -> Option<String> {
    let token = metadata
        .download_tokens
        .as_deref()?
        .split(',')
        .next()
        .filter(|t| !t.is_empty())?;
    Some(format!("{object_url}?alt=media&token={token}"))
}

#[async_trait]
impl BlobStore for FirebaseClient {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = format!(
            "{STORAGE}/{}/o?name={}",
            self.config.storage_bucket,
            urlencoding::encode(path)
        );
        let size = bytes.len();
        let request = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.storage_auth()?)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);

        tracing::debug!("Storage upload {} ({} bytes, {})", path, size, content_type);
        let response = self.send(request, "Firebase Storage").await?;
        if !response.status().is_success() {
            return Err(status_error(response, "Firebase Storage").await);
        }
        Ok(())
    }

    async fn url(&self, path: &str) -> Result<String> {
        let object_url = self.object_url(path);
        let request = self
            .http
            .get(&object_url)
            .header(reqwest::header::AUTHORIZATION, self.storage_auth()?);
        let response = self.send(request, "Firebase Storage").await?;
        if !response.status().is_success() {
            return Err(status_error(response, "Firebase Storage").await);
        }

        let metadata: ObjectMetadata = response.json().await.map_err(|e| {
            VoiceError::Backend(format!("Failed to parse Storage metadata: {e}"))
        })?;
        download_url(&object_url, &metadata)
            .ok_or_else(|| VoiceError::Backend(format!("{path} has no download token")))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let request = self
            .http
            .delete(self.object_url(path))
            .header(reqwest::header::AUTHORIZATION, self.storage_auth()?);
        let response = self.send(request, "Firebase Storage").await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::warn!("Storage object {} was already gone", path);
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(status_error(response, "Firebase Storage").await);
        }
        Ok(())
    }
}
