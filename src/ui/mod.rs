//! Terminal screens.

pub mod error;
pub mod voice;

pub use voice::{ScreenCommand, ScreenModel, VoiceScreen, SKIP_SECONDS};
