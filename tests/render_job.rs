use std::path::Path;
use std::process::Command;

use scriptreel::media::probe::probe_media;
use scriptreel::media::run::{is_ffmpeg_on_path, is_ffprobe_on_path};
use scriptreel::render::text::load_font_bytes;
use scriptreel::{
    BitratePolicy, Canvas, FitMode, Fps, NarrationSource, RenderRequest, TimingConfig,
    resolve_theme, run_render_job,
};

fn environment_ready() -> bool {
    if !is_ffmpeg_on_path() || !is_ffprobe_on_path() {
        eprintln!("skipping: ffmpeg/ffprobe not on PATH");
        return false;
    }
    if load_font_bytes(None).is_err() {
        eprintln!("skipping: no system font available for overlay text");
        return false;
    }
    true
}

fn synth_wav(path: &Path, secs: f64) {
    let status = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=330:sample_rate=48000",
            "-t",
            &format!("{secs}"),
            "-c:a",
            "pcm_s16le",
        ])
        .arg(path)
        .status()
        .unwrap();
    assert!(status.success());
}

fn base_request(script: &str, out: std::path::PathBuf) -> RenderRequest {
    RenderRequest {
        script: script.to_string(),
        output: out,
        subtitles: true,
        theme: resolve_theme("dusk").unwrap(),
        canvas: Canvas {
            width: 128,
            height: 72,
        },
        fps: Fps::new(30, 1).unwrap(),
        timing: TimingConfig::default(),
        tempo: 1.0,
        fit: FitMode::Cover,
        backgrounds: Vec::new(),
        logo: None,
        font: None,
        policy: BitratePolicy::Crf(30),
        timeout_secs: 300,
    }
}

#[test]
fn renders_two_scene_script_with_narration_and_subtitles() {
    if !environment_ready() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let narration_dir = dir.path().join("narration");
    std::fs::create_dir_all(&narration_dir).unwrap();
    synth_wav(&narration_dir.join("scene_00.wav"), 2.0);
    synth_wav(&narration_dir.join("scene_01.wav"), 3.0);

    let out = dir.path().join("story.mp4");
    let request = base_request("Hello world\n\nSecond scene", out.clone());
    let narration = NarrationSource::PerSceneFiles(vec![
        narration_dir.join("scene_00.wav"),
        narration_dir.join("scene_01.wav"),
    ]);

    let artifacts = run_render_job(request, narration).unwrap();
    assert_eq!(artifacts.scene_count, 2);
    assert!(out.exists());

    // Container duration matches the planned timeline within a frame or two
    // of mux rounding.
    let info = probe_media(&out).unwrap();
    assert!(info.has_video && info.has_audio);
    let d = info.duration_secs.unwrap();
    assert!(
        (d - artifacts.duration_secs).abs() < 0.2,
        "container {d}s vs plan {}s",
        artifacts.duration_secs
    );

    // Subtitles landed next to the video with two cues locked to the plan.
    let srt_path = artifacts.subtitles.unwrap();
    assert_eq!(srt_path, out.with_extension("srt"));
    let srt = std::fs::read_to_string(&srt_path).unwrap();
    assert!(srt.starts_with("1\n00:00:00,000 --> "));
    assert!(srt.contains("\n2\n"));
    assert!(srt.contains("Hello world"));
    assert!(srt.contains("Second scene"));
}

#[test]
fn renders_without_narration_using_reading_speed() {
    if !environment_ready() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("silent.mp4");
    let mut request = base_request("Just one scene of a few words", out.clone());
    request.subtitles = false;

    let artifacts = run_render_job(request, NarrationSource::None).unwrap();
    assert_eq!(artifacts.scene_count, 1);
    // Seven words at 160 wpm is under the floor; the floor wins.
    assert!(artifacts.duration_secs >= 1.5);

    let info = probe_media(&out).unwrap();
    assert!(info.has_video);
    assert!(!info.has_audio);
}

#[test]
fn failed_job_leaves_no_artifact_at_destination() {
    if !environment_ready() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("never.mp4");
    let request = base_request("one\n\ntwo", out.clone());
    // Narration list length mismatch fails after validation but before any
    // encode; either way the destination must stay clean.
    run_render_job(
        request,
        NarrationSource::PerSceneFiles(vec![dir.path().join("missing.wav")]),
    )
    .unwrap_err();
    assert!(!out.exists());
    assert!(!out.with_extension("srt").exists());
}
