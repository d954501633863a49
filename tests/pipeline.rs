use scriptreel::{
    Canvas, FrameRgba, InMemorySink, SceneClip, TimingConfig, composite_timeline, cues_from_plan,
    plan_timeline, segment_script,
};

fn fps30() -> scriptreel::Fps {
    scriptreel::Fps::new(30, 1).unwrap()
}

fn solid_clip(index: usize, level: u8, canvas: Canvas) -> SceneClip {
    let mut frame = FrameRgba::new(canvas.width, canvas.height);
    frame.data.fill(level);
    for px in frame.data.chunks_exact_mut(4) {
        px[3] = 255;
    }
    SceneClip::from_static_frame(index, frame)
}

#[test]
fn hello_world_scenario_two_scenes_with_locked_cues() {
    // The canonical two-scene script: one blank-line separator.
    let scenes = segment_script("Hello world\n\nSecond scene").unwrap();
    assert_eq!(scenes.len(), 2);

    // Narration durations stand in for synthesized audio.
    let cfg = TimingConfig::default();
    let durations: Vec<f64> = [2.1f64, 3.4]
        .iter()
        .zip(scenes.iter())
        .map(|(d, text)| scriptreel::timing::estimate_duration(text, Some(*d), &cfg))
        .collect();
    assert_eq!(durations, vec![2.1, 3.4]);

    let plan = plan_timeline(&durations, fps30(), &cfg).unwrap();
    assert_eq!(plan.placements.len(), 2);

    // Default fades produce a crossfade between the two scenes.
    assert!(plan.placements[0].overlap_out_frames > 0);

    // Subtitles derive from the same plan and tile it exactly.
    let cues = cues_from_plan(&plan, &scenes).unwrap();
    assert_eq!(cues.len(), 2);
    assert_eq!(cues[0].start_secs, 0.0);
    assert_eq!(
        cues[1].start_secs,
        plan.fps.frames_to_secs(plan.placements[1].range.start.0)
    );
    assert!((cues[0].end_secs - cues[1].start_secs).abs() < 1e-9);
    assert!((cues[1].end_secs - plan.total_secs()).abs() < 1e-9);

    // And the composited stream carries exactly the planned frame count.
    let canvas = Canvas {
        width: 8,
        height: 8,
    };
    let clips = vec![solid_clip(0, 200, canvas), solid_clip(1, 80, canvas)];
    let mut sink = InMemorySink::new();
    let frames = composite_timeline(&plan, &clips, canvas, None, &mut sink).unwrap();
    assert_eq!(frames, plan.total_frames);
    assert_eq!(sink.frames().len() as u64, plan.total_frames);
}

#[test]
fn timeline_invariant_holds_across_scene_counts() {
    let cfg = TimingConfig::default();
    for n in 1..=8 {
        let durations: Vec<f64> = (0..n).map(|i| 1.5 + 0.9 * i as f64).collect();
        let plan = plan_timeline(&durations, fps30(), &cfg).unwrap();

        let sum_dur: u64 = plan.placements.iter().map(|p| p.dur_frames()).sum();
        let sum_ov: u64 = plan.placements.iter().map(|p| p.overlap_out_frames).sum();
        assert_eq!(plan.total_frames, sum_dur - sum_ov, "n={n}");

        // Offsets strictly increase and cues tile the whole span.
        for w in plan.placements.windows(2) {
            assert!(w[1].range.start.0 > w[0].range.start.0);
        }
        let texts: Vec<String> = (0..n).map(|i| format!("s{i}")).collect();
        let cues = cues_from_plan(&plan, &texts).unwrap();
        for w in cues.windows(2) {
            assert!((w[0].end_secs - w[1].start_secs).abs() < 1e-9);
        }
    }
}

#[test]
fn srt_scenario_output_shape() {
    let scenes = segment_script("Hello world\n\nSecond scene").unwrap();
    let plan = plan_timeline(&[2.0, 2.0], fps30(), &TimingConfig::default()).unwrap();
    let cues = cues_from_plan(&plan, &scenes).unwrap();
    let srt = scriptreel::render_srt(&cues);

    let blocks: Vec<&str> = srt.trim_end().split("\n\n").collect();
    assert_eq!(blocks.len(), 2);
    assert!(blocks[0].starts_with("1\n00:00:00,000 --> "));
    assert!(blocks[0].ends_with("Hello world"));
    assert!(blocks[1].starts_with("2\n"));
    assert!(blocks[1].contains(" --> "));
}
