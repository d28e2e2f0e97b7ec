use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{provider_message, status_error, FirebaseClient};
use crate::backend::{AuthProvider, AuthSession, AuthUser, Credentials};
use crate::error::{AuthErrorCode, Result, VoiceError};

const IDENTITY_TOOLKIT: &str = "https://identitytoolkit.googleapis.com/v1/accounts";
const SECURE_TOKEN: &str = "https://securetoken.googleapis.com/v1/token";

/// Sign-in, sign-up and IdP responses share these fields.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

fn expiry(expires_in: &str) -> chrono::DateTime<Utc> {
    let seconds = expires_in.parse::<i64>().unwrap_or(3600);
    Utc::now() + Duration::seconds(seconds)
}

impl AccountResponse {
    fn into_session(self) -> AuthSession {
        AuthSession {
            credentials: Credentials {
                expires_at: expiry(&self.expires_in),
                id_token: self.id_token,
                refresh_token: self.refresh_token,
            },
            user: AuthUser {
                uid: self.local_id,
                email: self.email,
                display_name: self.display_name.filter(|n| !n.is_empty()),
                photo_url: self.photo_url.filter(|p| !p.is_empty()),
            },
        }
    }
}

impl FirebaseClient {
    async fn account_call(&self, endpoint: &str, body: serde_json::Value) -> Result<AuthSession> {
        let url = format!("{IDENTITY_TOOLKIT}:{endpoint}?key={}", self.config.api_key);
        tracing::debug!("Identity Toolkit call: accounts:{}", endpoint);
        let response = self
            .send(self.http.post(&url).json(&body), "Firebase Auth")
            .await?;

        if !response.status().is_success() {
            return Err(auth_error(response).await);
        }

        let account: AccountResponse = response.json().await.map_err(|e| {
            VoiceError::Backend(format!("Failed to parse Firebase Auth response: {e}"))
        })?;
        Ok(account.into_session())
    }
}

/// Identity Toolkit reports failures as `error.message` codes.
async fn auth_error(response: reqwest::Response) -> VoiceError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match provider_message(&body) {
        Some(message) if status.is_client_error() => {
            let code = AuthErrorCode::from_provider_message(&message);
            tracing::warn!("Firebase Auth rejected the request: {}", message);
            VoiceError::Auth(code)
        }
        _ => {
            tracing::error!("Firebase Auth error (status {}): {}", status, body);
            VoiceError::Backend(format!("Firebase Auth error (status {status})"))
        }
    }
}

#[async_trait]
impl AuthProvider for FirebaseClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.account_call(
            "signInWithPassword",
            json!({ "email": email, "password": password, "returnSecureToken": true }),
        )
        .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.account_call(
            "signUp",
            json!({ "email": email, "password": password, "returnSecureToken": true }),
        )
        .await
    }

    async fn sign_in_with_federated_credential(&self, id_token: &str) -> Result<AuthSession> {
        let post_body = format!(
            "id_token={}&providerId=google.com",
            urlencoding::encode(id_token)
        );
        self.account_call(
            "signInWithIdp",
            json!({
                "postBody": post_body,
                "requestUri": "http://localhost",
                "returnIdpCredential": true,
                "returnSecureToken": true,
            }),
        )
        .await
    }

    async fn refresh(&self, session: &AuthSession) -> Result<AuthSession> {
        let url = format!("{SECURE_TOKEN}?key={}", self.config.api_key);
        let body = json!({
            "grant_type": "refresh_token",
            "refresh_token": session.credentials.refresh_token,
        });
        let response = self
            .send(self.http.post(&url).json(&body), "Firebase Secure Token")
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response, "Firebase Secure Token").await);
        }

        let tokens: TokenResponse = response.json().await.map_err(|e| {
            VoiceError::Backend(format!("Failed to parse token refresh response: {e}"))
        })?;
        Ok(AuthSession {
            user: session.user.clone(),
            credentials: Credentials {
                expires_at: expiry(&tokens.expires_in),
                id_token: tokens.id_token,
                refresh_token: tokens.refresh_token,
            },
        })
    }

    fn activate(&self, session: Option<&AuthSession>) {
        self.set_token(session.map(|s| s.credentials.id_token.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_response_becomes_session() {
        let account: AccountResponse = serde_json::from_str(
            r#"{
                "kind": "identitytoolkit#VerifyPasswordResponse",
                "localId": "u1",
                "email": "a@example.com",
                "displayName": "",
                "idToken": "id",
                "registered": true,
                "refreshToken": "refresh",
                "expiresIn": "3600"
            }"#,
        )
        .unwrap();
        let session = account.into_session();
        assert_eq!(session.user.uid, "u1");
        assert_eq!(session.user.display_name, None);
        assert!(!session.credentials.is_expired(Utc::now()));
    }

    #[test]
    fn idp_response_keeps_profile_details() {
        let account: AccountResponse = serde_json::from_str(
            r#"{
                "localId": "g1",
                "email": "g@example.com",
                "displayName": "Grace",
                "photoUrl": "https://photo",
                "idToken": "id",
                "refreshToken": "refresh",
                "expiresIn": "3600"
            }"#,
        )
        .unwrap();
        let session = account.into_session();
        assert_eq!(session.user.display_name.as_deref(), Some("Grace"));
        assert_eq!(session.user.photo_url.as_deref(), Some("https://photo"));
    }
}
