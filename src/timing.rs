use crate::foundation::core::{Fps, FrameIndex, FrameRange};
use crate::foundation::error::{Error, Result};
use crate::script::word_count;

/// Pipeline-level timing knobs.
///
/// The defaults are product defaults, not invariants: any combination that
/// keeps durations positive and fades within their scene is valid.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct TimingConfig {
    /// Minimum display duration per scene, in seconds.
    pub min_scene_secs: f64,
    /// Reading speed used when a scene has no narration audio.
    pub words_per_minute: f64,
    /// Default fade window applied on both sides of every scene.
    pub default_fade_secs: f64,
    /// Upper bound on the cross-blend window between adjacent scenes.
    pub max_overlap_secs: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_scene_secs: 1.5,
            words_per_minute: 160.0,
            default_fade_secs: 0.4,
            max_overlap_secs: 1.0,
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_scene_secs > 0.0) {
            return Err(Error::config("min_scene_secs must be > 0"));
        }
        if !(self.words_per_minute > 0.0) {
            return Err(Error::config("words_per_minute must be > 0"));
        }
        if self.default_fade_secs < 0.0 || self.max_overlap_secs < 0.0 {
            return Err(Error::config("fade/overlap windows must be >= 0"));
        }
        Ok(())
    }
}

/// Compute a scene's display duration in seconds.
///
/// With narration present the audio length is authoritative (visual duration
/// tracks it so video and speech never drift); otherwise a words-per-minute
/// estimate stands in. The floor applies to both paths.
pub fn estimate_duration(text: &str, narration_secs: Option<f64>, cfg: &TimingConfig) -> f64 {
    let base = match narration_secs {
        Some(d) if d.is_finite() && d > 0.0 => d,
        _ => {
            let words = word_count(text) as f64;
            words * 60.0 / cfg.words_per_minute
        }
    };
    base.max(cfg.min_scene_secs)
}

/// One scene's slot on the global frame timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScenePlacement {
    /// Scene ordinal, matching segmenter output order.
    pub index: usize,
    /// Absolute frame range `[start, start + dur)` this scene occupies.
    pub range: FrameRange,
    /// Fade-in window in frames (cross-blend with the previous scene, or a
    /// ramp from the flatten background for the first scene).
    pub fade_in_frames: u64,
    /// Fade-out window in frames.
    pub fade_out_frames: u64,
    /// Cross-blend window shared with the next scene; 0 for the last scene.
    pub overlap_out_frames: u64,
}

impl ScenePlacement {
    pub fn dur_frames(&self) -> u64 {
        self.range.len_frames()
    }
}

/// The planned global timeline: placements plus the exact output frame count.
#[derive(Clone, Debug)]
pub struct TimelinePlan {
    pub fps: Fps,
    pub placements: Vec<ScenePlacement>,
    pub total_frames: u64,
}

impl TimelinePlan {
    pub fn total_secs(&self) -> f64 {
        self.fps.frames_to_secs(self.total_frames)
    }
}

/// Plan the timeline for an ordered list of scene durations.
///
/// All arithmetic is in integer frames at `fps` so cut points are exact:
/// `start[i+1] = start[i] + dur[i] - overlap[i]` with
/// `overlap[i] = min(fade_out[i], fade_in[i+1], max_overlap)`. Fades are
/// clamped to half their scene so `fade_in + fade_out <= dur` always holds
/// and offsets strictly increase.
pub fn plan_timeline(durations_secs: &[f64], fps: Fps, cfg: &TimingConfig) -> Result<TimelinePlan> {
    cfg.validate()?;
    if durations_secs.is_empty() {
        return Err(Error::config("cannot plan a timeline with zero scenes"));
    }

    let n = durations_secs.len();
    let mut dur_frames = Vec::with_capacity(n);
    let mut fade_frames = Vec::with_capacity(n);
    for (i, &secs) in durations_secs.iter().enumerate() {
        if !(secs.is_finite() && secs > 0.0) {
            return Err(Error::config(format!(
                "scene {i} has non-positive duration {secs}"
            )));
        }
        let d = fps.secs_to_frames_round(secs).max(1);
        let fade = fps
            .secs_to_frames_round(cfg.default_fade_secs)
            .min(d / 2);
        dur_frames.push(d);
        fade_frames.push(fade);
    }

    let cap = fps.secs_to_frames_round(cfg.max_overlap_secs);
    let mut placements = Vec::with_capacity(n);
    let mut start = 0u64;
    for i in 0..n {
        let overlap_out = if i + 1 < n {
            fade_frames[i].min(fade_frames[i + 1]).min(cap)
        } else {
            0
        };
        let range = FrameRange::new(
            FrameIndex(start),
            FrameIndex(start + dur_frames[i]),
        )?;
        placements.push(ScenePlacement {
            index: i,
            range,
            fade_in_frames: fade_frames[i],
            fade_out_frames: fade_frames[i],
            overlap_out_frames: overlap_out,
        });
        start = start + dur_frames[i] - overlap_out;
    }

    // start now holds the exclusive end of the last scene minus its (zero)
    // overlap, i.e. the total timeline length.
    let total_frames = start;
    debug_assert_eq!(
        total_frames,
        dur_frames.iter().sum::<u64>()
            - placements
                .iter()
                .map(|p| p.overlap_out_frames)
                .sum::<u64>()
    );

    Ok(TimelinePlan {
        fps,
        placements,
        total_frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fps30() -> Fps {
        Fps::new(30, 1).unwrap()
    }

    #[test]
    fn narration_duration_is_authoritative_with_floor() {
        let cfg = TimingConfig::default();
        assert_eq!(estimate_duration("hi", Some(4.2), &cfg), 4.2);
        // Below the floor, the floor wins.
        assert_eq!(estimate_duration("hi", Some(0.3), &cfg), cfg.min_scene_secs);
    }

    #[test]
    fn wpm_fallback_scales_with_word_count() {
        let cfg = TimingConfig::default();
        let short = estimate_duration("one two three", None, &cfg);
        let long = estimate_duration(&"word ".repeat(100), None, &cfg);
        assert!(long > short);
        // 160 wpm => 100 words take 37.5s.
        assert!((long - 37.5).abs() < 1e-9);
    }

    #[test]
    fn total_equals_sum_minus_overlaps() {
        let cfg = TimingConfig::default();
        for n in 1..=6 {
            let durations: Vec<f64> = (0..n).map(|i| 2.0 + i as f64 * 0.7).collect();
            let plan = plan_timeline(&durations, fps30(), &cfg).unwrap();
            let sum_dur: u64 = plan.placements.iter().map(|p| p.dur_frames()).sum();
            let sum_overlap: u64 = plan.placements.iter().map(|p| p.overlap_out_frames).sum();
            assert_eq!(plan.total_frames, sum_dur - sum_overlap);
        }
    }

    #[test]
    fn offsets_strictly_increase() {
        let cfg = TimingConfig::default();
        let plan = plan_timeline(&[1.5, 1.5, 1.5, 1.5], fps30(), &cfg).unwrap();
        for w in plan.placements.windows(2) {
            assert!(w[1].range.start.0 > w[0].range.start.0);
            assert_eq!(
                w[1].range.start.0,
                w[0].range.start.0 + w[0].dur_frames() - w[0].overlap_out_frames
            );
        }
    }

    #[test]
    fn overlap_bounded_by_fades_and_cap() {
        let cfg = TimingConfig {
            default_fade_secs: 2.0,
            max_overlap_secs: 0.5,
            ..TimingConfig::default()
        };
        let plan = plan_timeline(&[10.0, 10.0], fps30(), &cfg).unwrap();
        // Cap (15 frames) is tighter than the fade windows (60 frames).
        assert_eq!(plan.placements[0].overlap_out_frames, 15);
        assert_eq!(plan.placements[1].overlap_out_frames, 0);
    }

    #[test]
    fn tiny_scene_clamps_fades_and_keeps_one_frame() {
        let cfg = TimingConfig::default();
        let plan = plan_timeline(&[0.01, 0.01], fps30(), &cfg).unwrap();
        for p in &plan.placements {
            assert!(p.dur_frames() >= 1);
            assert!(p.fade_in_frames + p.fade_out_frames <= p.dur_frames());
        }
    }

    #[test]
    fn single_scene_has_no_overlap() {
        let cfg = TimingConfig::default();
        let plan = plan_timeline(&[3.0], fps30(), &cfg).unwrap();
        assert_eq!(plan.placements.len(), 1);
        assert_eq!(plan.placements[0].overlap_out_frames, 0);
        assert_eq!(plan.total_frames, 90);
    }
}
