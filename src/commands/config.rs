//! `readaloud config`: edit the config file, then check it still loads.
//!
//! When the file no longer loads, the user is offered another round in the editor.

use std::path::Path;
use std::process::Command;

use cliclack::{confirm, log};

use super::quiet_interrupts;
use crate::config::{self, ReadaloudConfig};

const FALLBACK_EDITORS: [&str; 2] = ["nano", "vi"];

pub fn handle_config() -> anyhow::Result<()> {
    let config_path = config::config_path()?;
    let editor = pick_editor(
        std::env::var("VISUAL").ok(),
        std::env::var("EDITOR").ok(),
        on_path,
    )
    .ok_or_else(|| anyhow::anyhow!("No editor found. Set $EDITOR and try again."))?;
    tracing::info!("Editing {} with {}", config_path.display(), editor.join(" "));

    quiet_interrupts();
    loop {
        edit(&editor, &config_path)?;

        match ReadaloudConfig::load_from(&config_path) {
            Ok(edited) => {
                let missing = edited.backend.missing();
                if missing.is_empty() {
                    log::success("Configuration saved.")?;
                } else {
                    log::warning(format!(
                        "Backend settings still missing: {}. You will be asked for them on the next command.",
                        missing.join(", ")
                    ))?;
                }
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Edited config does not load: {:#}", e);
                log::error(format!("{e:#}"))?;
                if !confirm("Open the editor again?").initial_value(true).interact()? {
                    return Err(e);
                }
            }
        }
    }
}

fn edit(editor: &[String], path: &Path) -> anyhow::Result<()> {
    let Some((program, args)) = editor.split_first() else {
        return Err(anyhow::anyhow!("Editor command is empty"));
    };
    let status = Command::new(program)
        .args(args)
        .arg(path)
        .status()
        .map_err(|e| anyhow::anyhow!("Could not start '{program}': {e}"))?;
    if !status.success() {
        return Err(anyhow::anyhow!(
            "'{program}' exited with status {}",
            status.code().unwrap_or(-1)
        ));
    }
    Ok(())
}

/// `$VISUAL`, then `$EDITOR`, then the first fallback editor found.
///
/// The variables may carry arguments (`code --wait`), so the result is split on
/// whitespace.
fn pick_editor(
    visual: Option<String>,
    editor: Option<String>,
    available: impl Fn(&str) -> bool,
) -> Option<Vec<String>> {
    let from_env = [visual, editor]
        .into_iter()
        .flatten()
        .map(|value| {
            value
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .find(|words| !words.is_empty());
    from_env.or_else(|| {
        FALLBACK_EDITORS
            .into_iter()
            .find(|name| available(name))
            .map(|name| vec![name.to_string()])
    })
}

fn on_path(program: &str) -> bool {
    std::env::var_os("PATH")
        .is_some_and(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visual_wins_and_keeps_its_arguments() {
        let picked = pick_editor(
            Some("code --wait".into()),
            Some("vim".into()),
            |_| true,
        );
        assert_eq!(picked.unwrap(), vec!["code", "--wait"]);
    }

    #[test]
    fn blank_variables_fall_through() {
        let picked = pick_editor(Some("  ".into()), Some("hx".into()), |_| true);
        assert_eq!(picked.unwrap(), vec!["hx"]);

        let picked = pick_editor(None, Some(String::new()), |name| name == "vi");
        assert_eq!(picked.unwrap(), vec!["vi"]);
    }

    #[test]
    fn no_editor_at_all() {
        assert!(pick_editor(None, None, |_| false).is_none());
    }
}
