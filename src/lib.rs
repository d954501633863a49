//! scriptreel turns a plain-text script into a narrated video.
//!
//! The pipeline: split the script into scenes, obtain per-scene narration
//! (pre-rendered files or an external synthesizer), derive frame-accurate
//! scene durations from the audio, render each scene (background + overlay
//! text + logo), cross-blend scenes into one continuous timeline, and mux the
//! result with the narration through the system `ffmpeg`. Subtitles are
//! derived from the same timeline plan, so they cannot drift from the video.
//!
//! A second command surface normalizes media: `encode-frames` (numbered
//! stills to video), `kenburns` (pan/zoom from one image), `fix-video`
//! (constant frame rate + streamable container) and `thumbnail`.
#![forbid(unsafe_code)]

pub mod audio;
pub mod compose;
pub mod encode;
pub mod foundation;
pub mod job;
pub mod media;
pub mod preset;
pub mod render;
pub mod scene;
pub mod script;
pub mod subtitle;
pub mod synth;
pub mod timing;

pub use crate::foundation::core::{Canvas, Fps, FrameIndex, FrameRange, Rgba8Premul};
pub use crate::foundation::error::{Error, Result};

pub use crate::compose::composite_timeline;
pub use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
pub use crate::encode::sink::{AudioInput, FrameSink, InMemorySink, SinkConfig};
pub use crate::job::{NarrationSource, RenderArtifacts, RenderRequest, run_render_job};
pub use crate::media::kenburns::{KenBurnsOpts, PanZoomPath, generate_kenburns};
pub use crate::media::normalize::{NormalizeOpts, normalize_video};
pub use crate::media::thumbnail::extract_thumbnail;
pub use crate::preset::{BitratePolicy, EncodePreset, resolve_preset};
pub use crate::render::frame::FrameRgba;
pub use crate::render::scene::{SceneClip, SceneRenderOpts, SceneRenderer};
pub use crate::scene::model::{BackgroundRef, FitMode, Scene};
pub use crate::scene::theme::{Theme, resolve_aspect, resolve_theme};
pub use crate::script::segment_script;
pub use crate::subtitle::{SubtitleCue, cues_from_plan, render_srt};
pub use crate::synth::{CommandSynthesizer, SpeechSynthesizer};
pub use crate::timing::{ScenePlacement, TimelinePlan, TimingConfig, plan_timeline};
