//! Voice commands: record/review/save the AI voice sample, or delete it.

use std::sync::Arc;

use cliclack::{confirm, intro, outro, outro_cancel};
use console::style;

use super::{quiet_interrupts, surface, AppContext};
use crate::error::Result;
use crate::profile::VoiceAsset;
use crate::session::SessionContext;
use crate::ui::{ScreenCommand, ScreenModel, VoiceScreen, SKIP_SECONDS};
use crate::voice::{RecorderState, VoiceSetup, SAMPLE_SENTENCE};

const HINTS: &str =
    " r record · s stop · space play/pause · ←/→ skip · 0 restart · x re-record · enter save · q quit";

/// Frame for the current recorder and preview state.
pub fn setup_model(setup: &VoiceSetup) -> ScreenModel {
    let mut model = ScreenModel::new("Set up your AI voice", HINTS);
    model.details = vec![
        (String::new(), "Read this sentence aloud:".to_string()),
        (String::new(), String::new()),
        (String::new(), SAMPLE_SENTENCE.to_string()),
    ];

    model.status = match setup.recorder_state() {
        RecorderState::Idle => "Press r and read the sentence aloud.".to_string(),
        RecorderState::Recording => {
            model.recording = true;
            "Recording... press s when you are done.".to_string()
        }
        RecorderState::Stopping => "Finishing the recording...".to_string(),
        RecorderState::Stopped => {
            model.playback = Some(setup.playback());
            "Review your recording. Enter saves it, x records again.".to_string()
        }
    };
    if setup.is_uploading() {
        model.busy = Some("Uploading voice sample...".to_string());
    }
    model
}

/// Drives the setup screen until the sample is saved or the user quits.
///
/// The capture and the preview player are released on every way out.
pub async fn run_voice_setup(
    screen: &mut VoiceScreen,
    setup: &mut VoiceSetup,
    session: &mut SessionContext,
) -> anyhow::Result<Option<VoiceAsset>> {
    let outcome = setup_loop(screen, setup, session).await;
    setup.leave().await;
    outcome
}

async fn setup_loop(
    screen: &mut VoiceScreen,
    setup: &mut VoiceSetup,
    session: &mut SessionContext,
) -> anyhow::Result<Option<VoiceAsset>> {
    let mut message: Option<String> = None;

    loop {
        if let Err(e) = setup.refresh().await {
            message = surface(screen, &e)?;
        }
        let mut model = setup_model(setup);
        model.message = message.clone();
        screen.render(&model)?;

        let command = screen.handle_input()?;
        if command == ScreenCommand::Continue {
            continue;
        }
        message = None;

        let result = match command {
            ScreenCommand::Quit => return Ok(None),
            ScreenCommand::Record => setup.start_recording().await,
            ScreenCommand::Stop => setup.stop_recording().await,
            ScreenCommand::TogglePlay => setup.play_pause().await,
            ScreenCommand::SkipBack => setup.skip(-SKIP_SECONDS).await,
            ScreenCommand::SkipForward => setup.skip(SKIP_SECONDS).await,
            ScreenCommand::Rewind => setup.rewind().await,
            ScreenCommand::Rerecord => setup.rerecord(),
            ScreenCommand::Save => {
                model.busy = Some("Uploading voice sample...".to_string());
                screen.render(&model)?;
                match save_fresh(setup, session).await {
                    Ok(asset) => return Ok(Some(asset)),
                    Err(e) => Err(e),
                }
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            message = surface(screen, &e)?;
        }
    }
}

/// Uploads the recording once the session is known to be valid.
async fn save_fresh(setup: &mut VoiceSetup, session: &mut SessionContext) -> Result<VoiceAsset> {
    session.ensure_fresh().await?;
    setup.save().await
}

pub async fn handle_voice_setup(ctx: &mut AppContext) -> anyhow::Result<()> {
    let uid = ctx.uid()?;
    let driver = ctx.audio_driver()?;
    let mut setup = VoiceSetup::new(driver, Arc::clone(&ctx.uploads), uid);

    let mut screen = VoiceScreen::new()?;
    let saved = run_voice_setup(&mut screen, &mut setup, &mut ctx.session).await;
    screen.cleanup()?;

    if saved?.is_some() {
        println!("Your AI voice sample is saved.");
    }
    Ok(())
}

/// Asks for confirmation, then removes the sample and clears the voice fields.
pub async fn handle_voice_delete(ctx: &mut AppContext) -> anyhow::Result<()> {
    let uid = ctx.uid()?;
    quiet_interrupts();
    intro(style(" delete voice ").on_white().black())?;

    let confirmed = confirm("Delete Voice? This will remove your AI voice data.")
        .initial_value(false)
        .interact()?;
    if !confirmed {
        outro_cancel("Kept your AI voice.")?;
        return Ok(());
    }

    ctx.session.ensure_fresh().await?;
    ctx.uploads.delete_voice(&uid).await?;
    outro("Your AI voice has been deleted.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::media::fake::FakeDriver;
    use crate::voice::UploadCoordinator;
    use std::time::Duration;

    fn setup() -> VoiceSetup {
        let backend = Arc::new(MemoryBackend::default());
        let uploads = Arc::new(UploadCoordinator::new(
            backend.clone(),
            backend,
            Duration::from_secs(5),
        ));
        VoiceSetup::new(Arc::new(FakeDriver::default()), uploads, "u1".to_string())
    }

    #[tokio::test]
    async fn model_follows_recorder_state() {
        let mut setup = setup();
        let idle = setup_model(&setup);
        assert!(idle.details.iter().any(|(_, v)| v == SAMPLE_SENTENCE));
        assert!(!idle.recording);
        assert!(idle.playback.is_none());

        setup.start_recording().await.unwrap();
        assert!(setup_model(&setup).recording);

        setup.stop_recording().await.unwrap();
        let stopped = setup_model(&setup);
        assert!(!stopped.recording);
        assert!(stopped.playback.is_some());
        assert!(stopped.busy.is_none());

        setup.leave().await;
    }
}
