//! MP3 encoding through the ffmpeg command-line tool
//!
//! ffmpeg is an external dependency located on `PATH` at use time; jobs
//! that need it check for it before doing any work.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Locate the ffmpeg binary on `PATH`
pub fn locate() -> Option<PathBuf> {
    which::which("ffmpeg").ok()
}

/// Encode `input` (any format ffmpeg reads) to MP3 at `bitrate` (e.g. "192k")
pub fn encode_mp3(ffmpeg: &Path, input: &Path, output: &Path, bitrate: &str) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let result = Command::new(ffmpeg)
        .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(input)
        .args(["-vn", "-codec:a", "libmp3lame", "-b:a", bitrate])
        .arg(output)
        .output()
        .with_context(|| format!("Failed to run {}", ffmpeg.display()))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        bail!(
            "ffmpeg exited with {} while encoding {}: {}",
            result.status,
            input.display(),
            stderr.trim()
        );
    }

    tracing::debug!(
        input = %input.display(),
        output = %output.display(),
        bitrate,
        "Encoded MP3"
    );
    Ok(())
}

/// `<dir>/<stem>_preview.mp3` next to a WAV artifact
pub fn preview_path(wav: &Path) -> PathBuf {
    let stem = wav
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    wav.with_file_name(format!("{}_preview.mp3", stem))
}
