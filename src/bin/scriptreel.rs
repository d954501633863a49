use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use scriptreel::media::frames;
use scriptreel::media::run::DEFAULT_TIMEOUT_SECS;
use scriptreel::{
    BackgroundRef, BitratePolicy, Canvas, CommandSynthesizer, FitMode, Fps, KenBurnsOpts,
    NarrationSource, NormalizeOpts, PanZoomPath, RenderRequest, TimingConfig, extract_thumbnail,
    generate_kenburns, normalize_video, resolve_aspect, resolve_preset, resolve_theme,
    run_render_job,
};

#[derive(Parser, Debug)]
#[command(name = "scriptreel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a narrated video from a plain-text script.
    Render(RenderArgs),
    /// Encode a numbered still-frame sequence into a video.
    EncodeFrames(EncodeFramesArgs),
    /// Synthesize a pan/zoom clip from a single image.
    Kenburns(KenburnsArgs),
    /// Re-encode a video to constant frame rate with a streamable container.
    FixVideo(FixVideoArgs),
    /// Extract one representative frame as a still image.
    Thumbnail(ThumbnailArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Script file; blank lines separate scenes.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Theme name (dusk, paper, moss, violet, sunset).
    #[arg(long, default_value = "dusk")]
    theme: String,

    /// Output aspect (16:9, 9:16, 1:1).
    #[arg(long, default_value = "16:9")]
    aspect: String,

    /// Output frame rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Speaking-rate factor applied to narration, pitch-preserving.
    #[arg(long, default_value_t = 1.0)]
    tempo: f64,

    /// Narration language passed to the synthesizer.
    #[arg(long, default_value = "en")]
    language: String,

    /// Voice speed passed to the synthesizer.
    #[arg(long, default_value_t = 1.0)]
    voice_speed: f64,

    /// Directory of pre-synthesized narration files, one per scene in name
    /// order. Mutually exclusive with --synth-cmd.
    #[arg(long)]
    narration_dir: Option<PathBuf>,

    /// External TTS command template with {text} {lang} {speed} {out}
    /// placeholders.
    #[arg(long)]
    synth_cmd: Option<String>,

    /// Write a sibling .srt subtitle file.
    #[arg(long, default_value_t = false)]
    subtitles: bool,

    /// Directory of background images/videos, assigned to scenes in name
    /// order.
    #[arg(long)]
    backgrounds: Option<PathBuf>,

    /// Logo image composited top-right on every scene.
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Overlay font path (.ttf); system fonts are probed when omitted.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Background fit mode.
    #[arg(long, value_enum, default_value_t = FitArg::Cover)]
    fit: FitArg,

    /// Minimum per-scene duration in seconds.
    #[arg(long, default_value_t = 1.5)]
    min_scene_secs: f64,

    /// Fade window per scene side in seconds.
    #[arg(long, default_value_t = 0.4)]
    fade_secs: f64,

    /// libx264 constant rate factor.
    #[arg(long, default_value_t = 18)]
    crf: u8,

    /// Per-invocation timeout for external encoder calls, in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FitArg {
    Cover,
    Contain,
}

impl From<FitArg> for FitMode {
    fn from(v: FitArg) -> Self {
        match v {
            FitArg::Cover => FitMode::Cover,
            FitArg::Contain => FitMode::Contain,
        }
    }
}

#[derive(Parser, Debug)]
struct EncodeFramesArgs {
    /// Directory containing the numbered frames.
    #[arg(long = "in")]
    in_dir: PathBuf,

    /// printf-style frame name pattern, e.g. frame_%05d.png.
    #[arg(long, default_value = "frame_%05d.png")]
    pattern: String,

    /// Encode preset name (1080p, 720p, vertical, square, preview).
    #[arg(long, default_value = "1080p")]
    preset: String,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

#[derive(Parser, Debug)]
struct KenburnsArgs {
    /// Source still image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Clip duration in seconds; overridden by --audio when given.
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    /// Audio track; its duration becomes the clip duration.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Encode preset name.
    #[arg(long, default_value = "1080p")]
    preset: String,

    /// Zoom at the start of the clip.
    #[arg(long, default_value_t = 1.0)]
    zoom_start: f64,

    /// Zoom at the end of the clip.
    #[arg(long, default_value_t = 1.12)]
    zoom_end: f64,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

#[derive(Parser, Debug)]
struct FixVideoArgs {
    /// Input video of unknown/variable frame timing.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Target constant frame rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// libx264 constant rate factor.
    #[arg(long, default_value_t = 18)]
    crf: u8,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

#[derive(Parser, Debug)]
struct ThumbnailArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output image path (format from extension).
    #[arg(long)]
    out: PathBuf,

    /// Timestamp in seconds; defaults to 25% into the video. Values past the
    /// end clamp to the last frame.
    #[arg(long)]
    at: Option<f64>,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::EncodeFrames(args) => cmd_encode_frames(args),
        Command::Kenburns(args) => cmd_kenburns(args),
        Command::FixVideo(args) => cmd_fix_video(args),
        Command::Thumbnail(args) => cmd_thumbnail(args),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let script = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read script '{}'", args.in_path.display()))?;
    let (width, height) = resolve_aspect(&args.aspect)?;
    let theme = resolve_theme(&args.theme)?;

    let narration = match (&args.narration_dir, &args.synth_cmd) {
        (Some(_), Some(_)) => {
            anyhow::bail!("--narration-dir and --synth-cmd are mutually exclusive")
        }
        (Some(dir), None) => NarrationSource::PerSceneFiles(sorted_files(dir, &AUDIO_EXTS)?),
        (None, Some(template)) => NarrationSource::Synthesize {
            synthesizer: Box::new(CommandSynthesizer::new(template, args.timeout_secs)?),
            language: args.language.clone(),
            voice_speed: args.voice_speed,
        },
        (None, None) => NarrationSource::None,
    };

    let backgrounds = match &args.backgrounds {
        None => Vec::new(),
        Some(dir) => sorted_files(dir, &VISUAL_EXTS)?
            .into_iter()
            .map(|p| {
                if has_ext(&p, &VIDEO_EXTS) {
                    BackgroundRef::VideoLoop(p)
                } else {
                    BackgroundRef::Image(p)
                }
            })
            .collect(),
    };

    let request = RenderRequest {
        script,
        output: args.out,
        subtitles: args.subtitles,
        theme,
        canvas: Canvas { width, height },
        fps: Fps::new(args.fps, 1)?,
        timing: TimingConfig {
            min_scene_secs: args.min_scene_secs,
            default_fade_secs: args.fade_secs,
            ..TimingConfig::default()
        },
        tempo: args.tempo,
        fit: args.fit.into(),
        backgrounds,
        logo: args.logo,
        font: args.font,
        policy: BitratePolicy::Crf(args.crf),
        timeout_secs: args.timeout_secs,
    };

    let artifacts = run_render_job(request, narration)?;
    eprintln!(
        "wrote {} ({} scenes, {:.1}s)",
        artifacts.video.display(),
        artifacts.scene_count,
        artifacts.duration_secs
    );
    if let Some(srt) = artifacts.subtitles {
        eprintln!("wrote {}", srt.display());
    }
    Ok(())
}

fn cmd_encode_frames(args: EncodeFramesArgs) -> anyhow::Result<()> {
    let preset = resolve_preset(&args.preset)?;
    frames::encode_frames(&args.in_dir, &args.pattern, &preset, &args.out, args.timeout_secs)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_kenburns(args: KenburnsArgs) -> anyhow::Result<()> {
    let preset = resolve_preset(&args.preset)?;
    let opts = KenBurnsOpts {
        duration_secs: args.duration,
        audio: args.audio,
        path: PanZoomPath {
            zoom_start: args.zoom_start,
            zoom_end: args.zoom_end,
            ..PanZoomPath::default()
        },
        timeout_secs: args.timeout_secs,
    };
    generate_kenburns(&args.in_path, &args.out, &preset, &opts)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_fix_video(args: FixVideoArgs) -> anyhow::Result<()> {
    let opts = NormalizeOpts {
        fps: Fps::new(args.fps, 1)?,
        crf: args.crf,
        timeout_secs: args.timeout_secs,
    };
    normalize_video(&args.in_path, &args.out, &opts)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_thumbnail(args: ThumbnailArgs) -> anyhow::Result<()> {
    extract_thumbnail(&args.in_path, &args.out, args.at, args.timeout_secs)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

const AUDIO_EXTS: [&str; 6] = ["wav", "mp3", "m4a", "aac", "ogg", "flac"];
const VIDEO_EXTS: [&str; 4] = ["mp4", "mov", "mkv", "webm"];
const VISUAL_EXTS: [&str; 9] = [
    "png", "jpg", "jpeg", "webp", "bmp", "mp4", "mov", "mkv", "webm",
];

fn has_ext(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| exts.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Files in `dir` with one of `exts`, sorted by name for stable scene order.
fn sorted_files(dir: &Path, exts: &[&str]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read directory '{}'", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_ext(p, exts))
        .collect();
    files.sort();
    Ok(files)
}
