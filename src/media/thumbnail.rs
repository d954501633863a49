use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::foundation::error::{Error, Result};
use crate::media::normalize::staged_path;
use crate::media::probe::probe_media;
use crate::media::run;

/// Default extraction point as a fraction of the video duration. Deliberately
/// not frame 0, which is often black or mid-fade.
pub const DEFAULT_TIMESTAMP_FRACTION: f64 = 0.25;

/// Extract one representative still frame from a video.
///
/// `at_secs` picks the timestamp; when omitted, a quarter of the way in. A
/// timestamp beyond the video's length clamps to the last frame instead of
/// failing. The output format follows the output path's extension.
pub fn extract_thumbnail(
    input: &Path,
    output: &Path,
    at_secs: Option<f64>,
    timeout_secs: u64,
) -> Result<()> {
    let info = probe_media(input)?;
    if !info.has_video {
        return Err(Error::unreadable(
            input.display().to_string(),
            "input has no video stream",
        ));
    }

    let duration = info.duration_secs;
    let requested = at_secs.unwrap_or_else(|| {
        duration.map(|d| d * DEFAULT_TIMESTAMP_FRACTION).unwrap_or(0.0)
    });
    if requested < 0.0 || !requested.is_finite() {
        return Err(Error::config(format!(
            "thumbnail timestamp must be finite and >= 0 (got {requested})"
        )));
    }

    // Clamp into the video; seeking from EOF grabs the true last frame when
    // the request points past the end.
    let past_end = duration.map(|d| requested >= d).unwrap_or(false);

    let staged = staged_path(output)?;
    let result = run_extract(input, &staged, requested, past_end, timeout_secs);
    match result {
        Ok(()) => {
            run::move_into_place(&staged, output)?;
            info!(input = %input.display(), output = %output.display(), "thumbnail extracted");
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&staged);
            Err(e)
        }
    }
}

fn run_extract(
    input: &Path,
    staged: &Path,
    at_secs: f64,
    past_end: bool,
    timeout_secs: u64,
) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-y", "-loglevel", "error"]);
    if past_end {
        cmd.args(["-sseof", "-0.2"]);
    } else {
        cmd.args(["-ss", &format!("{at_secs:.3}")]);
    }
    cmd.arg("-i")
        .arg(input)
        .args(["-frames:v", "1", "-update", "1"])
        .arg(staged);

    run::run_captured(cmd, timeout_secs)?;
    if !staged.exists() {
        return Err(Error::encode(format!(
            "no frame could be extracted from '{}'",
            input.display()
        )));
    }
    Ok(())
}
