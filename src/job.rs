use std::path::PathBuf;

use anyhow::Context as _;
use rayon::prelude::*;
use tracing::{info, info_span};

use crate::audio::pcm::{self, AudioPcm, MIX_SAMPLE_RATE};
use crate::audio::tempo;
use crate::compose::composite_timeline;
use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
use crate::encode::sink::AudioInput;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{Error, Result};
use crate::media::run;
use crate::preset::BitratePolicy;
use crate::render::scene::{SceneRenderOpts, SceneRenderer};
use crate::scene::model::{BackgroundRef, FitMode, Scene};
use crate::scene::theme::Theme;
use crate::script::segment_script;
use crate::subtitle::{cues_from_plan, write_srt};
use crate::synth::{SpeechSynthesizer, synthesize_with_retry};
use crate::timing::{TimingConfig, estimate_duration, plan_timeline};

/// Where per-scene narration audio comes from.
pub enum NarrationSource {
    /// No narration: scene durations fall back to the reading-speed estimate
    /// and the output carries no audio track.
    None,
    /// Pre-synthesized audio files, one per scene in scene order.
    PerSceneFiles(Vec<PathBuf>),
    /// Synthesize narration through the collaborator.
    Synthesize {
        synthesizer: Box<dyn SpeechSynthesizer>,
        language: String,
        voice_speed: f64,
    },
}

/// Everything a render run needs, assembled up front.
pub struct RenderRequest {
    pub script: String,
    pub output: PathBuf,
    /// Write a sibling `.srt` next to the output.
    pub subtitles: bool,
    pub theme: Theme,
    pub canvas: Canvas,
    pub fps: Fps,
    pub timing: TimingConfig,
    /// Speaking-rate factor applied to narration (pitch-preserving).
    pub tempo: f64,
    pub fit: FitMode,
    /// Per-scene backgrounds, assigned in scene order; scenes beyond the list
    /// fall back to the theme gradient.
    pub backgrounds: Vec<BackgroundRef>,
    pub logo: Option<PathBuf>,
    pub font: Option<PathBuf>,
    pub policy: BitratePolicy,
    pub timeout_secs: u64,
}

/// What a successful run produced.
#[derive(Clone, Debug)]
pub struct RenderArtifacts {
    pub video: PathBuf,
    pub subtitles: Option<PathBuf>,
    pub scene_count: usize,
    pub total_frames: u64,
    pub duration_secs: f64,
}

/// Run the whole pipeline for one job: segment, narrate, time, render,
/// composite, mux, and (optionally) emit subtitles.
///
/// Job state lives in this function's locals and a private temp directory;
/// nothing is process-global, so concurrent jobs cannot interfere. The temp
/// directory is removed on every exit path (drop), and artifacts reach the
/// destination only via rename-on-success.
pub fn run_render_job(request: RenderRequest, narration: NarrationSource) -> Result<RenderArtifacts> {
    // Fail-fast validation, before any synthesis or rendering.
    request.canvas.validate_for_encode()?;
    request.timing.validate()?;
    request.theme.validate()?;
    tempo::validate_factor(request.tempo)?;
    let scene_texts = segment_script(&request.script)?;
    let span = info_span!("render_job", scenes = scene_texts.len());
    let _guard = span.enter();

    let workdir = tempfile::tempdir().with_context(|| "failed to create job workdir")?;

    // Narration: decode (or synthesize), then tempo-adjust. The adjusted
    // audio's length is what the visual timeline tracks.
    let per_scene_audio = gather_narration(&scene_texts, &narration, &request, workdir.path())?;

    let durations: Vec<f64> = scene_texts
        .iter()
        .zip(per_scene_audio.iter())
        .map(|(text, audio)| {
            estimate_duration(
                text,
                audio.as_ref().map(AudioPcm::duration_secs),
                &request.timing,
            )
        })
        .collect();

    let plan = plan_timeline(&durations, request.fps, &request.timing)?;
    info!(
        total_frames = plan.total_frames,
        duration_secs = plan.total_secs(),
        "timeline planned"
    );

    let scenes: Vec<Scene> = scene_texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let p = &plan.placements[i];
            // The scene carries its frame-quantized duration: that is what
            // actually renders, and it keeps the fade-sum invariant exact.
            Scene {
                index: i,
                text: text.clone(),
                background: request.backgrounds.get(i).cloned(),
                duration_secs: request.fps.frames_to_secs(p.dur_frames()),
                fade_in_secs: request.fps.frames_to_secs(p.fade_in_frames),
                fade_out_secs: request.fps.frames_to_secs(p.fade_out_frames),
            }
        })
        .collect();

    // Independent scenes render in parallel; collect() preserves scene order
    // regardless of which worker finishes first.
    let render_opts = SceneRenderOpts {
        canvas: request.canvas,
        fit: request.fit,
        logo: request.logo.clone(),
        font: request.font.clone(),
    };
    let clips = scenes
        .par_iter()
        .map(|scene| {
            let mut renderer = SceneRenderer::new(request.theme.clone(), &render_opts)?;
            renderer.render_clip(scene, plan.placements[scene.index].dur_frames(), request.fps)
        })
        .collect::<Result<Vec<_>>>()?;

    // Master narration track, padded with silence to the exact video length.
    let audio_input = if per_scene_audio.iter().any(Option::is_some) {
        let master = pcm::mix_master_track(&plan, &per_scene_audio)?;
        let pcm_path = workdir.path().join("master.f32le");
        pcm::write_f32le_file(&master, &pcm_path)?;
        Some(AudioInput {
            path: pcm_path,
            sample_rate: MIX_SAMPLE_RATE,
            channels: master.channels,
        })
    } else {
        None
    };

    // Encode into the workdir, then move into place on success only.
    let staged_video = workdir.path().join("render.mp4");
    let mut sink_opts = FfmpegSinkOpts::new(&staged_video);
    sink_opts.finish_timeout_secs = request.timeout_secs;
    crate::preset::apply_policy(&mut sink_opts, &request.policy);
    let mut sink = FfmpegSink::new(sink_opts);
    let total_frames =
        composite_timeline(&plan, &clips, request.canvas, audio_input, &mut sink)?;

    let subtitles = if request.subtitles {
        let cues = cues_from_plan(&plan, &scene_texts)?;
        let staged_srt = workdir.path().join("render.srt");
        write_srt(&cues, &staged_srt)?;
        let dest = request.output.with_extension("srt");
        run::move_into_place(&staged_srt, &dest)?;
        Some(dest)
    } else {
        None
    };

    run::move_into_place(&staged_video, &request.output)?;
    info!(output = %request.output.display(), "render job finished");

    Ok(RenderArtifacts {
        video: request.output.clone(),
        subtitles,
        scene_count: scene_texts.len(),
        total_frames,
        duration_secs: plan.total_secs(),
    })
}

fn gather_narration(
    scene_texts: &[String],
    narration: &NarrationSource,
    request: &RenderRequest,
    workdir: &std::path::Path,
) -> Result<Vec<Option<AudioPcm>>> {
    match narration {
        NarrationSource::None => Ok(vec![None; scene_texts.len()]),
        NarrationSource::PerSceneFiles(files) => {
            if files.len() != scene_texts.len() {
                return Err(Error::config(format!(
                    "narration file count ({}) does not match scene count ({})",
                    files.len(),
                    scene_texts.len()
                )));
            }
            files
                .iter()
                .map(|f| {
                    let pcm = pcm::decode_audio_f32_stereo(f, MIX_SAMPLE_RATE)?;
                    if pcm.interleaved_f32.is_empty() {
                        return Err(Error::unreadable(
                            f.display().to_string(),
                            "narration file decodes to zero samples",
                        ));
                    }
                    tempo::adjust_tempo(&pcm, request.tempo).map(Some)
                })
                .collect()
        }
        NarrationSource::Synthesize {
            synthesizer,
            language,
            voice_speed,
        } => scene_texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let out_path = workdir.join(format!("tts_{i:04}.wav"));
                synthesize_with_retry(synthesizer.as_ref(), text, language, *voice_speed, &out_path)?;
                let pcm = pcm::decode_audio_f32_stereo(&out_path, MIX_SAMPLE_RATE)?;
                if pcm.interleaved_f32.is_empty() {
                    return Err(Error::synthesis(format!(
                        "scene {i}: synthesized audio decodes to zero samples"
                    )));
                }
                tempo::adjust_tempo(&pcm, request.tempo).map(Some)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::theme::resolve_theme;

    fn request(script: &str, out: PathBuf) -> RenderRequest {
        RenderRequest {
            script: script.to_string(),
            output: out,
            subtitles: false,
            theme: resolve_theme("dusk").unwrap(),
            canvas: Canvas {
                width: 64,
                height: 64,
            },
            fps: Fps::new(30, 1).unwrap(),
            timing: TimingConfig::default(),
            tempo: 1.0,
            fit: FitMode::Cover,
            backgrounds: Vec::new(),
            logo: None,
            font: None,
            policy: BitratePolicy::Crf(28),
            timeout_secs: 120,
        }
    }

    #[test]
    fn empty_script_fails_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let req = request("  \n \n ", dir.path().join("out.mp4"));
        let err = run_render_job(req, NarrationSource::None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!dir.path().join("out.mp4").exists());
    }

    #[test]
    fn out_of_band_tempo_fails_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request("Hello world", dir.path().join("out.mp4"));
        req.tempo = 3.0;
        let err = run_render_job(req, NarrationSource::None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTempoFactor { .. }));
    }

    #[test]
    fn narration_count_mismatch_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let req = request("one\n\ntwo", dir.path().join("out.mp4"));
        let err = run_render_job(
            req,
            NarrationSource::PerSceneFiles(vec![PathBuf::from("only_one.wav")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
