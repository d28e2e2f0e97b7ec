//! ffmpeg helpers for the device driver.
//!
//! Captured PCM is encoded to the configured output codec, and anything the player
//! loads (local recordings or remote retrieval URLs) is decoded back to mono PCM WAV.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Result};

/// Locates the ffmpeg binary: well-known install locations first, then `PATH`.
pub fn find_ffmpeg() -> Result<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &["/opt/homebrew/bin/ffmpeg", "/usr/local/bin/ffmpeg", "/usr/bin/ffmpeg"]
    } else if cfg!(target_os = "linux") {
        &["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg", "/snap/bin/ffmpeg"]
    } else if cfg!(target_os = "windows") {
        &[
            "C:\\ffmpeg\\bin\\ffmpeg.exe",
            "C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe",
        ]
    } else {
        &[]
    };

    if let Some(path) = candidates.iter().map(PathBuf::from).find(|p| p.exists()) {
        tracing::debug!("Found ffmpeg at: {}", path.display());
        return Ok(path);
    }

    let search_cmd = if cfg!(target_os = "windows") { "where" } else { "which" };
    let output = Command::new(search_cmd)
        .arg("ffmpeg")
        .output()
        .map_err(|e| anyhow!("Failed to search PATH for ffmpeg: {e}"))?;

    let found = String::from_utf8_lossy(&output.stdout);
    let path = PathBuf::from(found.lines().next().unwrap_or_default().trim());
    if output.status.success() && !path.as_os_str().is_empty() {
        tracing::debug!("Found ffmpeg in PATH at: {}", path.display());
        return Ok(path);
    }

    Err(anyhow!(
        "ffmpeg not found. Please install ffmpeg:\n\
         macOS: brew install ffmpeg\n\
         Linux: apt install ffmpeg (Debian/Ubuntu) or dnf install ffmpeg (Fedora)"
    ))
}

/// File extension matching the codec at the head of an output format string.
pub fn extension_for_format(format: &str) -> &str {
    match format.split_whitespace().next().unwrap_or("aac") {
        "aac" | "libfdk_aac" => "m4a",
        "libopus" | "libvorbis" => "ogg",
        "libmp3lame" | "mp3" => "mp3",
        "flac" => "flac",
        "pcm_s16le" => "wav",
        other => other,
    }
}

/// Encodes a WAV file with a format string such as `"aac -b:a 128k"`.
pub fn encode(input_wav: &Path, output: &Path, format: &str) -> Result<()> {
    let mut parts = format.split_whitespace();
    let codec = parts
        .next()
        .ok_or_else(|| anyhow!("Invalid output format: empty"))?;

    let mut cmd = Command::new(find_ffmpeg()?);
    cmd.args(["-loglevel", "error", "-y", "-i"])
        .arg(input_wav)
        .args(["-acodec", codec, "-ac", "1"])
        .args(parts)
        .arg(output);

    run(cmd, "encoding")?;
    tracing::debug!("Encoded {} as {}", output.display(), codec);
    Ok(())
}

/// Decodes any source ffmpeg understands (path or http(s) URL) to mono 16-bit WAV.
pub fn decode_to_wav(source: &str, output_wav: &Path, sample_rate: u32) -> Result<()> {
    let mut cmd = Command::new(find_ffmpeg()?);
    cmd.args(["-loglevel", "error", "-y", "-i", source])
        .args(["-f", "wav", "-acodec", "pcm_s16le", "-ac", "1", "-ar"])
        .arg(sample_rate.to_string())
        .arg(output_wav);

    run(cmd, "decoding")
}

fn run(mut cmd: Command, what: &str) -> Result<()> {
    let output = cmd.output()?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    tracing::error!("ffmpeg {} failed: {}", what, stderr);
    Err(anyhow!("Audio {what} failed: {}", stderr.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_follows_codec() {
        assert_eq!(extension_for_format("aac -b:a 128k"), "m4a");
        assert_eq!(extension_for_format("libopus"), "ogg");
        assert_eq!(extension_for_format("pcm_s16le"), "wav");
        assert_eq!(extension_for_format(""), "m4a");
    }
}
