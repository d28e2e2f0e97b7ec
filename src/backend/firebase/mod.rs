//! Firebase REST backend.
//!
//! One client implements all three collaborators:
//! - `auth`: Identity Toolkit email/password and Google sign-in, Secure Token refresh
//! - `firestore`: `users/{uid}` records through the Firestore REST API
//! - `storage`: voice samples and profile photos in Cloud Storage for Firebase
//!
//! Document and blob calls are authorised with the id token of the active session.

mod auth;
mod firestore;
mod storage;

use std::sync::RwLock;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::config::BackendConfig;
use crate::error::{Result, VoiceError};

pub struct FirebaseClient {
    http: reqwest::Client,
    config: BackendConfig,
    id_token: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl FirebaseClient {
    pub fn new(config: BackendConfig) -> anyhow::Result<Self> {
        let missing = config.missing();
        if !missing.is_empty() {
            return Err(anyhow::anyhow!(
                "Backend is not configured (missing {}). Run 'readaloud config' to set it up.",
                missing.join(", ")
            ));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            config,
            id_token: RwLock::new(None),
        })
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.id_token.write() {
            *slot = token;
        }
    }

    fn token(&self) -> Result<String> {
        self.id_token
            .read()
            .ok()
            .and_then(|t| t.clone())
            .ok_or(VoiceError::NotSignedIn)
    }

    /// Sends `request`, turning transport failures into readable errors.
    async fn send(&self, request: RequestBuilder, service: &str) -> Result<Response> {
        request.send().await.map_err(|e| {
            let message = if e.is_connect() {
                format!("Failed to connect to {service}. Check your internet connection.")
            } else if e.is_timeout() {
                format!("Request to {service} timed out.")
            } else if e.is_builder() {
                format!("Failed to build {service} request: {e}")
            } else {
                format!("{service} network error: {e}")
            };
            tracing::error!("{}", message);
            VoiceError::Backend(message)
        })
    }
}

/// Maps a non-success response to a readable error.
async fn status_error(response: Response, service: &str) -> VoiceError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let detail = provider_message(&body).unwrap_or(body);

    let message = match status {
        StatusCode::UNAUTHORIZED => {
            format!("{service} rejected the session. Please run 'readaloud login' again.")
        }
        StatusCode::FORBIDDEN => format!("{service} denied access: {detail}"),
        StatusCode::TOO_MANY_REQUESTS => {
            format!("Too many requests to {service}. Please wait and try again.")
        }
        s if s.is_server_error() => {
            format!("{service} is experiencing issues ({status}). Please try again later.")
        }
        _ => format!("{service} error (status {status}): {detail}"),
    };
    tracing::error!("{}", message);
    VoiceError::Backend(message)
}

/// The `error.message` field of a Google API error body.
fn provider_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
        .filter(|m| !m.is_empty())
}
