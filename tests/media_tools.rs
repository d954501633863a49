use std::path::Path;
use std::process::Command;

use scriptreel::media::probe::{count_video_frames, probe_media};
use scriptreel::media::run::{is_ffmpeg_on_path, is_ffprobe_on_path};
use scriptreel::{KenBurnsOpts, NormalizeOpts, PanZoomPath, extract_thumbnail, generate_kenburns,
    normalize_video, resolve_preset};

fn tools_available() -> bool {
    is_ffmpeg_on_path() && is_ffprobe_on_path()
}

fn synth_video(path: &Path, rate: u32, secs: u32) -> anyhow::Result<()> {
    let status = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            &format!("testsrc=size=64x64:rate={rate}"),
            "-t",
            &secs.to_string(),
            "-pix_fmt",
            "yuv420p",
            "-c:v",
            "libx264",
        ])
        .arg(path)
        .status()?;
    anyhow::ensure!(status.success(), "ffmpeg failed creating fixture video");
    Ok(())
}

fn synth_audio(path: &Path, secs: f64) -> anyhow::Result<()> {
    let status = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:sample_rate=48000",
            "-t",
            &format!("{secs}"),
            "-c:a",
            "pcm_s16le",
        ])
        .arg(path)
        .status()?;
    anyhow::ensure!(status.success(), "ffmpeg failed creating fixture audio");
    Ok(())
}

#[test]
fn fix_video_retimes_to_exact_cfr_frame_count() {
    if !tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("vfr-ish.mp4");
    // 30s at a mismatched input rate; the normalizer must retime it to a
    // strict 30 fps grid: exactly 900 frames.
    synth_video(&input, 12, 30).unwrap();

    let output = dir.path().join("fixed.mp4");
    normalize_video(&input, &output, &NormalizeOpts::default()).unwrap();

    assert_eq!(count_video_frames(&output).unwrap(), 900);
    let info = probe_media(&output).unwrap();
    assert!(info.has_video);
    // No stray staging file left next to the output.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains("partial"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn kenburns_duration_follows_request_then_audio() {
    if !tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let still = dir.path().join("still.png");
    image::RgbaImage::from_pixel(320, 200, image::Rgba([40, 80, 160, 255]))
        .save(&still)
        .unwrap();

    let preset = resolve_preset("preview").unwrap();
    let frame_period = preset.fps.frame_duration_secs();

    // No audio: the requested duration wins.
    let out = dir.path().join("kb.mp4");
    let opts = KenBurnsOpts {
        duration_secs: 3.0,
        audio: None,
        path: PanZoomPath::default(),
        timeout_secs: 300,
    };
    generate_kenburns(&still, &out, &preset, &opts).unwrap();
    let d = probe_media(&out).unwrap().duration_secs.unwrap();
    assert!((d - 3.0).abs() <= frame_period + 0.05, "duration {d}");

    // With audio: the audio duration is authoritative.
    let wav = dir.path().join("tone.wav");
    synth_audio(&wav, 4.0).unwrap();
    let out2 = dir.path().join("kb-audio.mp4");
    let opts2 = KenBurnsOpts {
        duration_secs: 3.0,
        audio: Some(wav),
        path: PanZoomPath::default(),
        timeout_secs: 300,
    };
    generate_kenburns(&still, &out2, &preset, &opts2).unwrap();
    let info = probe_media(&out2).unwrap();
    assert!(info.has_audio);
    let d2 = info.duration_secs.unwrap();
    assert!((d2 - 4.0).abs() <= frame_period + 0.1, "duration {d2}");
}

#[test]
fn thumbnail_clamps_past_end_of_video() {
    if !tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("clip.mp4");
    synth_video(&input, 30, 2).unwrap();

    // Far beyond the 2s duration: clamps to the last frame, does not fail.
    let out = dir.path().join("thumb.png");
    extract_thumbnail(&input, &out, Some(99.0), 300).unwrap();
    let img = image::open(&out).unwrap();
    assert_eq!((img.width(), img.height()), (64, 64));

    // Default timestamp also works.
    let out2 = dir.path().join("thumb-default.png");
    extract_thumbnail(&input, &out2, None, 300).unwrap();
    assert!(out2.exists());
}

#[test]
fn encode_frames_preserves_frame_count() {
    if !tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    for i in 0u32..10 {
        let shade = (i * 25) as u8;
        image::RgbaImage::from_pixel(64, 64, image::Rgba([shade, shade, shade, 255]))
            .save(dir.path().join(format!("frame_{i:05}.png")))
            .unwrap();
    }

    let preset = resolve_preset("preview").unwrap();
    let out = dir.path().join("frames.mp4");
    scriptreel::media::frames::encode_frames(dir.path(), "frame_%05d.png", &preset, &out, 300)
        .unwrap();

    assert_eq!(count_video_frames(&out).unwrap(), 10);
}
