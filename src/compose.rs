use tracing::info;

use crate::encode::sink::{AudioInput, FrameSink, SinkConfig};
use crate::foundation::core::{Canvas, FrameIndex};
use crate::foundation::error::{Error, Result};
use crate::foundation::math::{scale_premul, weighted_sum_premul};
use crate::render::frame::FrameRgba;
use crate::render::scene::SceneClip;
use crate::timing::{ScenePlacement, TimelinePlan};

/// Concatenate rendered scene clips into one continuous frame stream.
///
/// Walks the global timeline once; for every output frame the contributing
/// scenes are cross-blended by weighted pixel sum (weights linear across the
/// overlap window, summing to one), so seams have no gaps and no duplicated
/// frames. The first scene fades in from the flatten background and the last
/// fades out to it. Returns the number of frames pushed, which always equals
/// `plan.total_frames`.
pub fn composite_timeline(
    plan: &TimelinePlan,
    clips: &[SceneClip],
    canvas: Canvas,
    audio: Option<AudioInput>,
    sink: &mut dyn FrameSink,
) -> Result<u64> {
    if clips.len() != plan.placements.len() {
        return Err(Error::config(format!(
            "clip count {} does not match planned scene count {}",
            clips.len(),
            plan.placements.len()
        )));
    }
    for (i, clip) in clips.iter().enumerate() {
        if clip.index != i {
            return Err(Error::config(
                "clips must be ordered by scene index before compositing",
            ));
        }
    }

    sink.begin(SinkConfig {
        width: canvas.width,
        height: canvas.height,
        fps: plan.fps,
        audio,
    })?;

    let mut scratch = FrameRgba::new(canvas.width, canvas.height);
    let expected_len = scratch.data.len();

    // Scenes are ordered by start offset, so a moving cursor finds the
    // active window without scanning the whole plan per frame.
    let mut first_active = 0usize;
    for g in 0..plan.total_frames {
        while first_active + 1 < plan.placements.len()
            && !plan.placements[first_active].range.contains(FrameIndex(g))
        {
            first_active += 1;
        }

        let mut contributions: [(usize, u16); 2] = [(0, 0); 2];
        let mut n_contrib = 0usize;
        for (i, p) in plan
            .placements
            .iter()
            .enumerate()
            .skip(first_active)
            .take(2)
        {
            if !p.range.contains(FrameIndex(g)) {
                continue;
            }
            let w = blend_weight(plan, i, g);
            contributions[n_contrib] = (i, w);
            n_contrib += 1;
        }

        match n_contrib {
            0 => {
                return Err(Error::config(format!(
                    "no scene covers timeline frame {g} (planner bug)"
                )));
            }
            1 => {
                let (i, w) = contributions[0];
                let frame = clip_frame(clips, plan, i, g, expected_len)?;
                if w == 255 {
                    scratch.data.copy_from_slice(&frame.data);
                } else {
                    scale_premul(&mut scratch.data, &frame.data, w);
                }
            }
            _ => {
                let (ia, wa) = contributions[0];
                let (ib, wb) = contributions[1];
                let fa = clip_frame(clips, plan, ia, g, expected_len)?;
                let fb = clip_frame(clips, plan, ib, g, expected_len)?;
                weighted_sum_premul(&mut scratch.data, &fa.data, &fb.data, wa, wb);
            }
        }

        sink.push_frame(FrameIndex(g), &scratch)?;
    }

    sink.end()?;
    info!(frames = plan.total_frames, "timeline composited");
    Ok(plan.total_frames)
}

fn clip_frame<'a>(
    clips: &'a [SceneClip],
    plan: &TimelinePlan,
    i: usize,
    g: u64,
    expected_len: usize,
) -> Result<&'a FrameRgba> {
    let local = g - plan.placements[i].range.start.0;
    let frame = clips[i].frame_at(local);
    if frame.data.len() != expected_len {
        return Err(Error::config(format!(
            "scene {i} produced a frame of unexpected size"
        )));
    }
    Ok(frame)
}

/// Opacity weight (0..=255) of scene `i` at global frame `g`.
///
/// Cross-blend ramps span the overlap window shared with the neighbor; the
/// outer edges of the video ramp against the flatten background over the
/// scene's own fade window. Ramp positions use `(k + 1) / (len + 1)` so the
/// two sides of a cross-blend always sum to full weight and a single-frame
/// overlap lands on a 50/50 blend.
fn blend_weight(plan: &TimelinePlan, i: usize, g: u64) -> u16 {
    let p: &ScenePlacement = &plan.placements[i];
    let local = g - p.range.start.0;
    let remaining = p.range.end.0 - g; // 1..=dur

    let mut w = 1.0f64;

    if i > 0 {
        let ov_in = plan.placements[i - 1].overlap_out_frames;
        if ov_in > 0 && local < ov_in {
            w *= (local + 1) as f64 / (ov_in + 1) as f64;
        }
    } else if p.fade_in_frames > 0 && local < p.fade_in_frames {
        w *= (local + 1) as f64 / (p.fade_in_frames + 1) as f64;
    }

    if i + 1 < plan.placements.len() {
        let ov_out = p.overlap_out_frames;
        if ov_out > 0 && remaining <= ov_out {
            w *= remaining as f64 / (ov_out + 1) as f64;
        }
    } else if p.fade_out_frames > 0 && remaining <= p.fade_out_frames {
        w *= remaining as f64 / (p.fade_out_frames + 1) as f64;
    }

    (w * 255.0).round().clamp(0.0, 255.0) as u16
}
