use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::foundation::core::Fps;
use crate::foundation::error::{Error, Result};
use crate::media::probe::probe_media;
use crate::media::run;

/// Options for [`normalize_video`].
#[derive(Clone, Debug)]
pub struct NormalizeOpts {
    /// Target constant frame rate.
    pub fps: Fps,
    /// libx264 constant rate factor.
    pub crf: u8,
    /// Wall-clock budget for the re-encode.
    pub timeout_secs: u64,
}

impl Default for NormalizeOpts {
    fn default() -> Self {
        Self {
            fps: Fps { num: 30, den: 1 },
            crf: 18,
            timeout_secs: run::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Re-encode an arbitrary input into a well-behaved container: strictly
/// constant frame rate, yuv420p with tagged limited color range, and the
/// index relocated up front (`+faststart`) for progressive playback.
///
/// Variable-frame-rate inputs (common from generative/upstream sources)
/// break fixed-duration concatenation math downstream; this pass gives them
/// a defined frame count. A 30s input at 30 fps comes out with exactly 900
/// frames.
pub fn normalize_video(input: &Path, output: &Path, opts: &NormalizeOpts) -> Result<()> {
    let info = probe_media(input)?;
    if !info.has_video {
        return Err(Error::unreadable(
            input.display().to_string(),
            "input has no video stream to normalize",
        ));
    }

    let staged = staged_path(output)?;
    let result = run_normalize(input, &staged, info.has_audio, opts);
    match result {
        Ok(()) => {
            run::move_into_place(&staged, output)?;
            info!(input = %input.display(), output = %output.display(), "normalized video");
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&staged);
            Err(e)
        }
    }
}

fn run_normalize(input: &Path, staged: &Path, has_audio: bool, opts: &NormalizeOpts) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-y", "-loglevel", "error", "-i"])
        .arg(input)
        .args([
            "-vf",
            &format!("fps={}/{}", opts.fps.num, opts.fps.den),
            "-fps_mode",
            "cfr",
            "-pix_fmt",
            "yuv420p",
            "-color_range",
            "tv",
            "-colorspace",
            "bt709",
            "-color_primaries",
            "bt709",
            "-color_trc",
            "bt709",
            "-c:v",
            "libx264",
            "-crf",
            &opts.crf.to_string(),
        ]);
    if has_audio {
        cmd.args(["-c:a", "aac"]);
    } else {
        cmd.arg("-an");
    }
    cmd.args(["-movflags", "+faststart"]).arg(staged);

    run::run_captured(cmd, opts.timeout_secs)?;
    if !staged.exists() {
        return Err(Error::encode(format!(
            "ffmpeg reported success but produced no output for '{}'",
            input.display()
        )));
    }
    Ok(())
}

/// Stage work products next to the destination under a hidden name; they are
/// renamed into place only on full success.
pub(crate) fn staged_path(output: &Path) -> Result<PathBuf> {
    let name = output
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::config(format!("output path '{}' has no file name", output.display())))?;
    let staged_name = format!(".{name}.partial{}", extension_suffix(output));
    Ok(output.with_file_name(staged_name))
}

fn extension_suffix(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        // Keep the extension on the staged name too, so the muxer picks the
        // same container format it will have at the destination.
        Some(ext) => format!(".{ext}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_path_stays_in_destination_dir() {
        let staged = staged_path(Path::new("/tmp/out/video.mp4")).unwrap();
        assert_eq!(staged.parent(), Some(Path::new("/tmp/out")));
        let name = staged.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with('.'));
        assert!(name.ends_with(".mp4"));
        assert_ne!(staged, Path::new("/tmp/out/video.mp4"));
    }

    #[test]
    fn unreadable_input_is_surfaced_not_retried() {
        if !run::is_ffprobe_on_path() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.mp4");
        std::fs::write(&bad, b"junk").unwrap();
        let out = dir.path().join("out.mp4");
        let err = normalize_video(&bad, &out, &NormalizeOpts::default()).unwrap_err();
        assert!(matches!(err, Error::UnreadableMedia { .. }));
        assert!(!out.exists());
    }
}
