//! Application orchestration and command routing.
//!
//! Parses the command line, prepares logging and the config file, then hands off to
//! the command handlers. Every failure is logged and shown as a user-facing notice.

use std::io;
use std::process;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

use crate::commands::{self, AppContext};
use crate::config;
use crate::error::VoiceError;
use crate::logging;
use crate::setup;

/// Account, profile and AI voice sample setup for readaloud
#[derive(Parser)]
#[command(name = "readaloud")]
#[command(version)]
#[command(about = "Account, profile and AI voice sample setup for readaloud")]
#[command(long_about = "Account, profile and AI voice sample setup for readaloud.\n\n\
Sign in, record a short voice sample by reading a sentence aloud, review it and\n\
save it to your profile so the reader can narrate books in your voice.\n\n\
EXAMPLES:\n    \
    # Create an account, then record your voice\n    \
    $ readaloud signup\n    \
    $ readaloud voice setup\n\n    \
    # Listen to the stored sample\n    \
    $ readaloud profile\n\n    \
    # Change the name shown in the reader\n    \
    $ readaloud rename \"Ada Lovelace\"")]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/readaloud/readaloud.toml\n    Session:            ~/.local/share/readaloud/session.json\n    Logs:               ~/.local/state/readaloud/readaloud.log.*"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account with email and password
    Signup,

    /// Sign in with email and password, or with a Google ID token
    #[command(visible_alias = "signin")]
    Login {
        /// Google ID token obtained from Google Sign-In
        #[arg(long, value_name = "ID_TOKEN")]
        google: Option<String>,
    },

    /// Sign out and forget the saved session
    Logout,

    /// Show your profile and play the stored voice sample
    ///
    /// Space plays or pauses, ←/→ skip five seconds, 0 restarts, v records a new
    /// sample, d deletes it, q quits.
    #[command(visible_alias = "p")]
    Profile,

    /// Change the name shown in the reader
    Rename {
        /// New name; prompts when omitted
        name: Option<String>,
    },

    /// Upload a new profile photo
    Photo {
        /// JPEG image to upload
        #[arg(value_name = "FILE")]
        file: std::path::PathBuf,

        /// Treat the image as a fresh camera capture
        #[arg(long)]
        camera: bool,
    },

    /// Record, review and save or delete your AI voice sample
    #[command(subcommand)]
    Voice(VoiceCommand),

    /// Open the configuration file in your preferred editor
    #[command(visible_alias = "c")]
    Config,

    /// Show recent log entries
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   readaloud completions bash > readaloud.bash
    ///   readaloud completions zsh > _readaloud
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum VoiceCommand {
    /// Read the sample sentence aloud, review the recording and save it
    ///
    /// r records, s stops, space plays or pauses the preview, ←/→ skip, 0 restarts,
    /// x records again, Enter saves, q quits.
    Setup,

    /// Remove the stored voice sample
    Delete,
}

/// Runs the application.
///
/// # Exit Codes
/// - 0: Success or a cancelled prompt
/// - 1: The command failed
/// - 2: Usage error (invalid arguments)
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that need neither logging nor the config file.
    match &cli.command {
        Commands::Completions { shell } => {
            generate(*shell, &mut Cli::command(), "readaloud", &mut io::stdout());
            return Ok(());
        }
        Commands::Logs => {
            if let Err(e) = commands::handle_logs() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            return Ok(());
        }
        _ => {}
    }

    logging::init_logging()?;
    setup::check_and_run_setup(&config::config_path()?)?;

    if let Err(e) = dispatch(cli.command).await {
        if is_cancelled(&e) {
            tracing::info!("Cancelled by user");
            process::exit(0);
        }
        tracing::error!("Command failed: {:#}", e);
        eprintln!("{}", notice(&e));
        process::exit(1);
    }
    Ok(())
}

async fn dispatch(command: Commands) -> anyhow::Result<()> {
    if let Commands::Config = command {
        return commands::handle_config();
    }

    let mut ctx = AppContext::open().await?;
    match command {
        Commands::Signup => commands::handle_signup(&mut ctx).await,
        Commands::Login { google } => commands::handle_login(&mut ctx, google).await,
        Commands::Logout => commands::handle_logout(&mut ctx),
        Commands::Profile => commands::handle_profile(&mut ctx).await,
        Commands::Rename { name } => commands::handle_rename(&mut ctx, name).await,
        Commands::Photo { file, camera } => commands::handle_photo(&mut ctx, file, camera).await,
        Commands::Voice(VoiceCommand::Setup) => commands::handle_voice_setup(&mut ctx).await,
        Commands::Voice(VoiceCommand::Delete) => commands::handle_voice_delete(&mut ctx).await,
        Commands::Config | Commands::Logs | Commands::Completions { .. } => {
            unreachable!("handled before the context is opened")
        }
    }
}

/// cliclack reports Esc and Ctrl-C as an interrupted io error.
fn is_cancelled(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::Interrupted)
}

/// The message shown for a failed command.
fn notice(error: &anyhow::Error) -> String {
    match error.downcast_ref::<VoiceError>() {
        Some(e) => e.notice(),
        None => format!("Error: {error}"),
    }
}
