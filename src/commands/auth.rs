//! Account commands: sign up, sign in, sign out.
//!
//! Prompts use cliclack. Failures from the auth provider are shown as their
//! user-facing notice and the prompt is offered again.

use cliclack::{input, intro, log, outro, password};
use console::style;

use super::{quiet_interrupts, AppContext};
use crate::error::VoiceError;

const ATTEMPTS: usize = 3;

/// Creates an account with email and password.
pub async fn handle_signup(ctx: &mut AppContext) -> anyhow::Result<()> {
    tracing::info!("=== readaloud sign-up ===");
    quiet_interrupts();
    intro(style(" sign up ").on_white().black())?;

    for _ in 0..ATTEMPTS {
        let email: String = input("Email:").placeholder("you@example.com").interact()?;
        let secret: String = password("Password:").mask('▪').interact()?;
        let confirm: String = password("Confirm password:").mask('▪').interact()?;

        match ctx.session.sign_up(&email, &secret, &confirm).await {
            Ok(user) => {
                outro(format!("Welcome, {}. Run 'readaloud voice setup' next.", user.email))?;
                return Ok(());
            }
            Err(e) => retry_or_fail(e)?,
        }
    }
    Err(anyhow::anyhow!("Sign-up failed after {ATTEMPTS} attempts"))
}

/// Signs in with email and password, or with a Google id token.
pub async fn handle_login(ctx: &mut AppContext, google_token: Option<String>) -> anyhow::Result<()> {
    tracing::info!("=== readaloud sign-in ===");
    quiet_interrupts();
    intro(style(" login ").on_white().black())?;

    if let Some(user) = ctx.session.current_user() {
        log::info(format!("Currently signed in as {}", user.email))?;
    }

    if let Some(token) = google_token {
        let user = ctx.session.sign_in_with_google(&token).await?;
        outro(format!("Signed in with Google as {}", user.email))?;
        return Ok(());
    }

    for _ in 0..ATTEMPTS {
        let email: String = input("Email:").placeholder("you@example.com").interact()?;
        let secret: String = password("Password:").mask('▪').interact()?;

        match ctx.session.sign_in(&email, &secret).await {
            Ok(user) => {
                outro(format!("Signed in as {}", user.email))?;
                return Ok(());
            }
            Err(e) => retry_or_fail(e)?,
        }
    }
    Err(anyhow::anyhow!("Sign-in failed after {ATTEMPTS} attempts"))
}

pub fn handle_logout(ctx: &mut AppContext) -> anyhow::Result<()> {
    let email = ctx.session.current_user().map(|u| u.email.clone());
    ctx.session.sign_out()?;
    match email {
        Some(email) => println!("Signed out {email}."),
        None => println!("Not signed in."),
    }
    Ok(())
}

/// Form and credential errors let the user try again; anything else ends the command.
fn retry_or_fail(error: VoiceError) -> anyhow::Result<()> {
    match error {
        VoiceError::Validation(_) | VoiceError::Auth(_) => {
            log::error(error.notice())?;
            Ok(())
        }
        other => Err(other.into()),
    }
}
