//! Error taxonomy for the account, profile and voice layers.
//!
//! Every operation in the core returns [`VoiceError`]. Command handlers catch it at
//! the operation boundary, log it, and show [`VoiceError::notice`] to the user.

use std::fmt;

use thiserror::Error;

use crate::media::Capability;

/// Provider-specific authentication failures, normalised to the codes the UI knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorCode {
    UserNotFound,
    WrongPassword,
    EmailAlreadyInUse,
    WeakPassword,
    InvalidEmail,
    /// Anything else the provider reports, kept verbatim for the log.
    Other(String),
}

impl AuthErrorCode {
    /// Short stable code, used in logs.
    pub fn code(&self) -> &str {
        match self {
            Self::UserNotFound => "user-not-found",
            Self::WrongPassword => "wrong-password",
            Self::EmailAlreadyInUse => "email-already-in-use",
            Self::WeakPassword => "weak-password",
            Self::InvalidEmail => "invalid-email",
            Self::Other(code) => code,
        }
    }

    /// Maps an Identity Toolkit error message (e.g. `WEAK_PASSWORD : Password should be...`).
    pub fn from_provider_message(message: &str) -> Self {
        let code = message.split(':').next().unwrap_or_default().trim();
        match code {
            "EMAIL_NOT_FOUND" | "USER_DISABLED" => Self::UserNotFound,
            "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => Self::WrongPassword,
            "EMAIL_EXISTS" => Self::EmailAlreadyInUse,
            "WEAK_PASSWORD" => Self::WeakPassword,
            "INVALID_EMAIL" | "MISSING_EMAIL" => Self::InvalidEmail,
            other => Self::Other(other.to_string()),
        }
    }

    /// Message shown to the user.
    pub fn message(&self) -> &'static str {
        match self {
            Self::UserNotFound => "No account exists for this email.",
            Self::WrongPassword => "Invalid email or password.",
            Self::EmailAlreadyInUse => "This email is already in use.",
            Self::WeakPassword => "Password should be at least 6 characters.",
            Self::InvalidEmail => "Invalid email format.",
            Self::Other(_) => "Something went wrong. Please try again.",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("permission denied: {0}")]
    PermissionDenied(Capability),

    #[error("recording unavailable: the driver produced no audio file")]
    RecordingUnavailable,

    #[error("audio load failed: {0}")]
    AudioLoadFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("profile update failed: {0}")]
    ProfileUpdateFailed(String),

    #[error("delete failed: {0}")]
    DeleteFailed(String),

    #[error("authentication failed: {0}")]
    Auth(AuthErrorCode),

    #[error("{0}")]
    Validation(String),

    #[error("{operation} is not valid while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("audio driver error: {0}")]
    Driver(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("not signed in")]
    NotSignedIn,
}

impl VoiceError {
    /// Human-readable notice for the user.
    pub fn notice(&self) -> String {
        match self {
            Self::PermissionDenied(Capability::Microphone) => {
                "We need microphone permission to record your voice.".to_string()
            }
            Self::PermissionDenied(Capability::PhotoLibrary) => {
                "We need access to your photo library to change your profile picture.".to_string()
            }
            Self::PermissionDenied(Capability::Camera) => {
                "We need camera access to take a photo.".to_string()
            }
            Self::RecordingUnavailable => {
                "Failed to save the recording. Please try again.".to_string()
            }
            Self::AudioLoadFailed(_) => "Could not load the audio sample.".to_string(),
            Self::UploadFailed(_) => "Failed to upload. Please try again.".to_string(),
            Self::ProfileUpdateFailed(_) => {
                "Failed to update your profile. Please try again.".to_string()
            }
            Self::DeleteFailed(_) => {
                "Failed to delete the voice sample. Please try again.".to_string()
            }
            Self::Auth(code) => code.message().to_string(),
            Self::Validation(message) => message.clone(),
            Self::InvalidState { .. } => "That action is not available right now.".to_string(),
            Self::Timeout(operation) => {
                format!("The {operation} took too long. Check your connection and try again.")
            }
            Self::Driver(_) => "The audio device reported an error.".to_string(),
            Self::Backend(_) => "Could not reach the server. Please try again.".to_string(),
            Self::NotSignedIn => "Please sign in first: readaloud login".to_string(),
        }
    }
}

pub type Result<T, E = VoiceError> = std::result::Result<T, E>;
