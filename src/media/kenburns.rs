use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;

use crate::audio::pcm::{self, MIX_SAMPLE_RATE};
use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
use crate::encode::sink::{AudioInput, FrameSink, SinkConfig};
use crate::foundation::core::{Affine, FrameIndex};
use crate::foundation::error::{Error, Result};
use crate::media::normalize::staged_path;
use crate::media::run;
use crate::preset::{EncodePreset, apply_policy};
use crate::render::frame::FrameRgba;
use crate::render::scene::{affine_to_cpu, decode_image_premul, fit_affine, pixmap_from_premul_bytes};
use crate::scene::model::FitMode;

/// Pan/zoom trajectory applied across the clip. The default is a slow
/// centered push-in.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct PanZoomPath {
    pub zoom_start: f64,
    pub zoom_end: f64,
    /// Horizontal drift of the image center over the clip, as a fraction of
    /// canvas width (positive pans the view right).
    pub pan_x: f64,
    /// Vertical drift, as a fraction of canvas height.
    pub pan_y: f64,
}

impl Default for PanZoomPath {
    fn default() -> Self {
        Self {
            zoom_start: 1.0,
            zoom_end: 1.12,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl PanZoomPath {
    fn validate(&self) -> Result<()> {
        for z in [self.zoom_start, self.zoom_end] {
            if !(z.is_finite() && z >= 1.0) {
                return Err(Error::config(format!(
                    "kenburns zoom must be >= 1.0 (got {z}); zooming out would expose the canvas edge"
                )));
            }
        }
        Ok(())
    }
}

/// Options for [`generate_kenburns`].
#[derive(Clone, Debug)]
pub struct KenBurnsOpts {
    /// Requested clip duration; ignored when `audio` is supplied (the audio
    /// duration is authoritative, and the pan/zoom path rescales to finish
    /// within it).
    pub duration_secs: f64,
    /// Optional narration/music track muxed into the output.
    pub audio: Option<PathBuf>,
    pub path: PanZoomPath,
    pub timeout_secs: u64,
}

/// Synthesize a pan/zoom clip from a single still image.
///
/// Without audio the output runs exactly `duration_secs` (within one frame
/// period). With audio, output duration equals the audio duration.
pub fn generate_kenburns(
    image: &Path,
    output: &Path,
    preset: &EncodePreset,
    opts: &KenBurnsOpts,
) -> Result<()> {
    opts.path.validate()?;
    let canvas = preset.canvas();
    canvas.validate_for_encode()?;

    let bytes = std::fs::read(image)
        .map_err(|e| Error::asset(format!("failed to read image '{}': {e}", image.display())))?;
    let (data, iw, ih) = decode_image_premul(&bytes)?;

    // Audio, when present, dictates the clip length.
    let workdir = tempfile::tempdir().with_context(|| "failed to create kenburns workdir")?;
    let mut audio_input = None;
    let duration_secs = match opts.audio.as_deref() {
        None => opts.duration_secs,
        Some(audio_path) => {
            let pcm = pcm::decode_audio_f32_stereo(audio_path, MIX_SAMPLE_RATE)?;
            if pcm.interleaved_f32.is_empty() {
                return Err(Error::unreadable(
                    audio_path.display().to_string(),
                    "audio track decodes to zero samples",
                ));
            }
            let pcm_path = workdir.path().join("audio.f32le");
            pcm::write_f32le_file(&pcm, &pcm_path)?;
            audio_input = Some(AudioInput {
                path: pcm_path,
                sample_rate: MIX_SAMPLE_RATE,
                channels: pcm.channels,
            });
            pcm.duration_secs()
        }
    };
    if !(duration_secs.is_finite() && duration_secs > 0.0) {
        return Err(Error::config(format!(
            "kenburns duration must be > 0 (got {duration_secs})"
        )));
    }
    let total_frames = preset.fps.secs_to_frames_round(duration_secs).max(1);

    let staged = staged_path(output)?;
    let mut sink_opts = FfmpegSinkOpts::new(&staged);
    sink_opts.finish_timeout_secs = opts.timeout_secs;
    apply_policy(&mut sink_opts, &preset.policy);
    let mut sink = FfmpegSink::new(sink_opts);

    let result = render_frames(
        &mut sink,
        &data,
        iw,
        ih,
        canvas,
        preset,
        total_frames,
        &opts.path,
        audio_input,
    );
    match result {
        Ok(()) => {
            run::move_into_place(&staged, output)?;
            info!(
                frames = total_frames,
                duration = duration_secs,
                output = %output.display(),
                "kenburns clip generated"
            );
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&staged);
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn render_frames(
    sink: &mut FfmpegSink,
    data: &[u8],
    iw: u32,
    ih: u32,
    canvas: crate::foundation::core::Canvas,
    preset: &EncodePreset,
    total_frames: u64,
    path: &PanZoomPath,
    audio: Option<AudioInput>,
) -> Result<()> {
    sink.begin(SinkConfig {
        width: canvas.width,
        height: canvas.height,
        fps: preset.fps,
        audio,
    })?;

    let src = pixmap_from_premul_bytes(data, iw, ih)?;
    let paint = vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(src)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    };

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

    let base = fit_affine(FitMode::Cover, iw, ih, canvas);
    let (cw, ch) = (canvas.width as f64, canvas.height as f64);
    let center = (cw / 2.0, ch / 2.0);

    for i in 0..total_frames {
        // Progress hits 1.0 exactly on the last frame, so the path always
        // completes within the clip regardless of its rescaled duration.
        let t = if total_frames > 1 {
            i as f64 / (total_frames - 1) as f64
        } else {
            0.0
        };
        let zoom = path.zoom_start + (path.zoom_end - path.zoom_start) * t;
        let dx = path.pan_x * cw * t;
        let dy = path.pan_y * ch * t;

        let tr = Affine::translate((center.0 - dx, center.1 - dy))
            * Affine::scale(zoom)
            * Affine::translate((-center.0, -center.1))
            * base;

        ctx.reset();
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_transform(affine_to_cpu(tr));
        ctx.set_paint(paint.clone());
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, iw as f64, ih as f64));
        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);

        let frame = FrameRgba {
            width: canvas.width,
            height: canvas.height,
            data: pixmap.data_as_u8_slice().to_vec(),
        };
        sink.push_frame(FrameIndex(i), &frame)?;
    }

    sink.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_below_one_is_rejected() {
        let path = PanZoomPath {
            zoom_start: 0.8,
            ..PanZoomPath::default()
        };
        assert!(path.validate().is_err());
        assert!(PanZoomPath::default().validate().is_ok());
    }

    #[test]
    fn frame_count_tracks_requested_duration() {
        let preset = crate::preset::resolve_preset("preview").unwrap();
        assert_eq!(preset.fps.secs_to_frames_round(15.0), 450);
        // One frame period of tolerance either way.
        assert_eq!(preset.fps.secs_to_frames_round(15.01), 450);
    }
}
