use std::path::{Path, PathBuf};

use tracing::info;

use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{Error, Result};
use crate::media::normalize::staged_path;
use crate::media::run;
use crate::preset::{EncodePreset, apply_policy};
use crate::render::frame::FrameRgba;
use crate::render::scene::{affine_to_cpu, decode_image_premul, fit_affine, pixmap_from_premul_bytes};
use crate::scene::model::FitMode;

/// A printf-style numbered frame pattern, e.g. `frame_%05d.png`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramePattern {
    prefix: String,
    digits: usize,
    suffix: String,
}

impl FramePattern {
    /// Parse `prefix%0Nd suffix` (or bare `%d`).
    pub fn parse(pattern: &str) -> Result<Self> {
        let start = pattern
            .find('%')
            .ok_or_else(|| Error::config(format!("frame pattern '{pattern}' has no % directive")))?;
        let rest = &pattern[start + 1..];
        let d_pos = rest
            .find('d')
            .ok_or_else(|| Error::config(format!("frame pattern '{pattern}' has no %d directive")))?;
        let width_spec = &rest[..d_pos];
        let digits = if width_spec.is_empty() {
            0
        } else {
            let spec = width_spec.strip_prefix('0').unwrap_or(width_spec);
            spec.parse::<usize>().map_err(|_| {
                Error::config(format!("frame pattern '{pattern}' has invalid width '{width_spec}'"))
            })?
        };
        Ok(Self {
            prefix: pattern[..start].to_string(),
            digits,
            suffix: rest[d_pos + 1..].to_string(),
        })
    }

    /// File name for frame `index`.
    pub fn file_name(&self, index: u64) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.suffix,
            width = self.digits
        )
    }

    /// Parse a file name back into a frame index, if it matches.
    fn index_of(&self, name: &str) -> Option<u64> {
        let digits = name.strip_prefix(self.prefix.as_str())?.strip_suffix(self.suffix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

/// Scan `dir` for frames matching `pattern` and verify contiguity from 0.
///
/// Returns the ordered file paths. A gap fails with [`Error::MissingFrame`]
/// naming the first missing index, before any encoding starts: silently
/// dropping frames would desynchronize any accompanying audio.
pub fn collect_contiguous_frames(dir: &Path, pattern: &FramePattern) -> Result<Vec<PathBuf>> {
    use anyhow::Context as _;

    let mut indices = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read frame directory '{}'", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| "failed to read frame directory entry")?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(idx) = pattern.index_of(name) {
            indices.push(idx);
        }
    }

    if indices.is_empty() {
        return Err(Error::config(format!(
            "no frames matching '{}' found in '{}'",
            pattern.file_name(0),
            dir.display()
        )));
    }

    indices.sort_unstable();
    indices.dedup();
    let Some(&max) = indices.last() else {
        return Err(Error::config("no frame indices parsed (unexpected)"));
    };
    let mut expected = 0u64;
    for &idx in &indices {
        if idx != expected {
            return Err(Error::MissingFrame {
                index: expected,
                pattern: pattern.file_name(expected),
            });
        }
        expected += 1;
    }
    debug_assert_eq!(expected, max + 1);

    Ok((0..=max).map(|i| dir.join(pattern.file_name(i))).collect())
}

/// Encode a contiguously-numbered still sequence into one video.
///
/// Output frame count equals the input frame count and the frame rate comes
/// from the preset. Stills are letterboxed onto the preset canvas so nothing
/// is cropped away.
pub fn encode_frames(
    dir: &Path,
    pattern: &str,
    preset: &EncodePreset,
    output: &Path,
    timeout_secs: u64,
) -> Result<()> {
    let pattern = FramePattern::parse(pattern)?;
    let files = collect_contiguous_frames(dir, &pattern)?;
    let canvas = preset.canvas();
    canvas.validate_for_encode()?;

    let staged = staged_path(output)?;
    let mut opts = FfmpegSinkOpts::new(&staged);
    opts.finish_timeout_secs = timeout_secs;
    apply_policy(&mut opts, &preset.policy);
    let mut sink = FfmpegSink::new(opts);

    let result = (|| -> Result<()> {
        sink.begin(SinkConfig {
            width: canvas.width,
            height: canvas.height,
            fps: preset.fps,
            audio: None,
        })?;

        let w16: u16 = canvas
            .width
            .try_into()
            .map_err(|_| Error::config("preset width exceeds u16"))?;
        let h16: u16 = canvas
            .height
            .try_into()
            .map_err(|_| Error::config("preset height exceeds u16"))?;
        let mut ctx = vello_cpu::RenderContext::new(w16, h16);
        let mut pixmap = vello_cpu::Pixmap::new(w16, h16);

        for (i, file) in files.iter().enumerate() {
            let bytes = std::fs::read(file)
                .map_err(|e| Error::asset(format!("failed to read '{}': {e}", file.display())))?;
            let (data, iw, ih) = decode_image_premul(&bytes)?;
            let src = pixmap_from_premul_bytes(&data, iw, ih)?;
            let paint = vello_cpu::Image {
                image: vello_cpu::ImageSource::Pixmap(std::sync::Arc::new(src)),
                sampler: vello_cpu::peniko::ImageSampler::default(),
            };

            ctx.reset();
            ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_transform(affine_to_cpu(fit_affine(FitMode::Contain, iw, ih, canvas)));
            ctx.set_paint(paint);
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, iw as f64, ih as f64));
            ctx.flush();
            ctx.render_to_pixmap(&mut pixmap);

            let frame = FrameRgba {
                width: canvas.width,
                height: canvas.height,
                data: pixmap.data_as_u8_slice().to_vec(),
            };
            sink.push_frame(FrameIndex(i as u64), &frame)?;
        }
        sink.end()
    })();

    match result {
        Ok(()) => {
            run::move_into_place(&staged, output)?;
            info!(
                frames = files.len(),
                preset = %preset.name,
                output = %output.display(),
                "frame sequence encoded"
            );
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&staged);
            Err(e)
        }
    }
}
