use std::path::{Path, PathBuf};
use std::process::Command;

use crate::foundation::error::{Error, Result};
use crate::media::run;

/// Basic metadata about a media file, as reported by `ffprobe`.
#[derive(Clone, Debug)]
pub struct MediaInfo {
    /// Absolute source path used for probing/decoding.
    pub source_path: PathBuf,
    /// Video width in pixels (0 when no video stream exists).
    pub width: u32,
    /// Video height in pixels (0 when no video stream exists).
    pub height: u32,
    /// Container duration in seconds, when the demuxer reports one.
    pub duration_secs: Option<f64>,
    /// Whether at least one audio stream exists.
    pub has_audio: bool,
    /// Whether at least one video stream exists.
    pub has_video: bool,
}

/// Probe a media file through `ffprobe`.
///
/// Unreadable or corrupt input maps to [`Error::UnreadableMedia`] and is
/// never retried: probing is deterministic for a given file.
pub fn probe_media(source_path: &Path) -> Result<MediaInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_streams",
        "-show_format",
    ])
    .arg(source_path);

    let stdout = run::run_captured(cmd, run::DEFAULT_TIMEOUT_SECS).map_err(|e| match e {
        Error::Encode(msg) => Error::unreadable(source_path.display().to_string(), msg),
        other => other,
    })?;

    let parsed: ProbeOut = serde_json::from_slice(&stdout).map_err(|e| {
        Error::unreadable(
            source_path.display().to_string(),
            format!("ffprobe json parse failed: {e}"),
        )
    })?;

    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    if video_stream.is_none() && !has_audio {
        return Err(Error::unreadable(
            source_path.display().to_string(),
            "no audio or video streams found",
        ));
    }

    let duration_secs = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(MediaInfo {
        source_path: source_path.to_path_buf(),
        width: video_stream.and_then(|s| s.width).unwrap_or(0),
        height: video_stream.and_then(|s| s.height).unwrap_or(0),
        duration_secs,
        has_audio,
        has_video: video_stream.is_some(),
    })
}

/// Count the video frames in a file by decoding it (`-count_frames`).
pub fn count_video_frames(source_path: &Path) -> Result<u64> {
    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-count_frames",
        "-show_entries",
        "stream=nb_read_frames",
        "-print_format",
        "default=noprint_wrappers=1:nokey=1",
    ])
    .arg(source_path);

    let stdout = run::run_captured(cmd, run::DEFAULT_TIMEOUT_SECS).map_err(|e| match e {
        Error::Encode(msg) => Error::unreadable(source_path.display().to_string(), msg),
        other => other,
    })?;

    let text = String::from_utf8_lossy(&stdout);
    text.trim().parse::<u64>().map_err(|_| {
        Error::unreadable(
            source_path.display().to_string(),
            format!("ffprobe frame count unparseable: '{}'", text.trim()),
        )
    })
}
