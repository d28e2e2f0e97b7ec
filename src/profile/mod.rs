//! User profile records.

pub mod model;
pub mod service;

pub use model::{UserProfile, VoiceAsset, VoiceStatus};
pub use service::ProfileService;
