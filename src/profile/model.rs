use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::backend::{AuthUser, Fields};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStatus {
    Ready,
    #[default]
    NotReady,
}

/// The voice sample fields of a profile record. They are always written together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceAsset {
    #[serde(rename = "voiceStatus", default)]
    pub status: VoiceStatus,
    #[serde(rename = "voiceRecordingURL", default)]
    pub remote_url: Option<String>,
    #[serde(rename = "voiceRecordedAt", default)]
    pub recorded_at: Option<String>,
}

impl VoiceAsset {
    pub fn ready(remote_url: String, recorded_at: DateTime<Utc>) -> Self {
        Self {
            status: VoiceStatus::Ready,
            remote_url: Some(remote_url),
            recorded_at: Some(timestamp(recorded_at)),
        }
    }

    pub fn cleared() -> Self {
        Self::default()
    }

    /// `ready` exactly when both the URL and the timestamp are present.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            VoiceStatus::Ready => self.remote_url.is_some() && self.recorded_at.is_some(),
            VoiceStatus::NotReady => self.remote_url.is_none() && self.recorded_at.is_none(),
        }
    }

    /// URL to play, only when the asset is ready.
    pub fn playable_url(&self) -> Option<&str> {
        match self.status {
            VoiceStatus::Ready => self.remote_url.as_deref(),
            VoiceStatus::NotReady => None,
        }
    }

    /// All three fields, nulls included, for a merge write.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "voiceStatus".into(),
            Value::String(
                match self.status {
                    VoiceStatus::Ready => "ready",
                    VoiceStatus::NotReady => "not_ready",
                }
                .into(),
            ),
        );
        fields.insert(
            "voiceRecordingURL".into(),
            self.remote_url.clone().map_or(Value::Null, Value::String),
        );
        fields.insert(
            "voiceRecordedAt".into(),
            self.recorded_at.clone().map_or(Value::Null, Value::String),
        );
        fields
    }
}

/// The `users/{uid}` record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(rename = "photoURL", default, deserialize_with = "null_as_default")]
    pub photo_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub voice: VoiceAsset,
}

impl UserProfile {
    /// Initial record written the first time a user signs in.
    pub fn bootstrap(user: &AuthUser, now: DateTime<Utc>) -> Self {
        Self {
            uid: user.uid.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone().unwrap_or_default(),
            photo_url: user.photo_url.clone().unwrap_or_default(),
            created_at: timestamp(now),
            name: None,
            voice: VoiceAsset::default(),
        }
    }

    /// Fields of a freshly created record. Voice fields and `name` are left unset.
    pub fn bootstrap_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("uid".into(), Value::String(self.uid.clone()));
        fields.insert("email".into(), Value::String(self.email.clone()));
        fields.insert("displayName".into(), Value::String(self.display_name.clone()));
        fields.insert("photoURL".into(), Value::String(self.photo_url.clone()));
        fields.insert("createdAt".into(), Value::String(self.created_at.clone()));
        fields
    }

    pub fn from_fields(fields: Fields) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(fields))
    }

    /// Name shown in the UI: the edited name, then the provider's, then the email.
    pub fn shown_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(Some(self.display_name.as_str()).filter(|n| !n.is_empty()))
            .unwrap_or(&self.email)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// ISO 8601 with milliseconds and a `Z` suffix.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
