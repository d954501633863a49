use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::{Error, Result};
use crate::timing::TimelinePlan;

/// One subtitle cue, derived from a scene's timeline placement.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SubtitleCue {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// Derive one cue per scene from the timeline plan.
///
/// Cues take their timing from the plan alone, so subtitles and video stay in
/// lock-step by construction. Each cue ends where the next scene's cue starts
/// (the cross-blend window is attributed to the incoming scene); the last cue
/// ends at the timeline end. The result is ordered, non-overlapping and tiles
/// the timeline without gaps.
pub fn cues_from_plan(plan: &TimelinePlan, scene_texts: &[String]) -> Result<Vec<SubtitleCue>> {
    if scene_texts.len() != plan.placements.len() {
        return Err(Error::config(format!(
            "scene text count {} does not match planned scene count {}",
            scene_texts.len(),
            plan.placements.len()
        )));
    }

    let mut cues = Vec::with_capacity(plan.placements.len());
    for (i, p) in plan.placements.iter().enumerate() {
        let start = plan.fps.frames_to_secs(p.range.start.0);
        let end_frame = match plan.placements.get(i + 1) {
            Some(next) => next.range.start.0,
            None => plan.total_frames,
        };
        cues.push(SubtitleCue {
            start_secs: start,
            end_secs: plan.fps.frames_to_secs(end_frame),
            text: scene_texts[i].replace('\n', " "),
        });
    }
    Ok(cues)
}

/// Format seconds as an SRT timestamp (`HH:MM:SS,mmm`).
fn srt_timestamp(seconds: f64) -> String {
    let mut ms = (seconds * 1000.0).round().max(0.0) as u64;
    let h = ms / 3_600_000;
    ms -= h * 3_600_000;
    let m = ms / 60_000;
    ms -= m * 60_000;
    let s = ms / 1000;
    ms -= s * 1000;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

/// Render cues as an SRT document: sequential 1-based numbering,
/// `start --> end` ranges, one blank line between cues.
pub fn render_srt(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            srt_timestamp(cue.start_secs),
            srt_timestamp(cue.end_secs),
            cue.text.trim()
        ));
    }
    out
}

/// Write an SRT file for the given cues.
pub fn write_srt(cues: &[SubtitleCue], path: &Path) -> Result<()> {
    std::fs::write(path, render_srt(cues))
        .with_context(|| format!("failed to write subtitle file '{}'", path.display()))?;
    Ok(())
}
