use std::path::Path;
use std::process::Command;

use anyhow::Context as _;

use crate::foundation::core::Fps;
use crate::foundation::error::{Error, Result};
use crate::media::run;
use crate::timing::TimelinePlan;

/// Internal mixing sample rate used across decode/mix/encode.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Channel count of the mixed master track.
pub const MIX_CHANNELS: u16 = 2;

/// Decoded interleaved floating-point PCM.
#[derive(Clone, Debug)]
pub struct AudioPcm {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Interleaved `f32` PCM samples.
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> u64 {
        (self.interleaved_f32.len() / usize::from(self.channels.max(1))) as u64
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate.max(1))
    }
}

/// Decode any audio-bearing media file to stereo interleaved `f32` PCM at
/// `sample_rate`, through the system `ffmpeg`.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> Result<AudioPcm> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            &MIX_CHANNELS.to_string(),
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ]);

    let stdout = match run::run_captured(cmd, run::DEFAULT_TIMEOUT_SECS) {
        Ok(out) => out,
        Err(Error::Encode(msg)) => {
            // ffmpeg reports "no audio stream" as an error; treat it as empty
            // PCM so silent videos pass through.
            if msg.contains("matches no streams")
                || msg.contains("Stream specifier")
                || msg.contains("does not contain any stream")
            {
                return Ok(AudioPcm {
                    sample_rate,
                    channels: MIX_CHANNELS,
                    interleaved_f32: Vec::new(),
                });
            }
            return Err(Error::unreadable(path.display().to_string(), msg));
        }
        Err(other) => return Err(other),
    };

    if !stdout.len().is_multiple_of(4) {
        return Err(Error::unreadable(
            path.display().to_string(),
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let mut pcm = Vec::<f32>::with_capacity(stdout.len() / 4);
    for chunk in stdout.chunks_exact(4) {
        pcm.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Ok(AudioPcm {
        sample_rate,
        channels: MIX_CHANNELS,
        interleaved_f32: pcm,
    })
}

/// Convert a frame delta to the nearest sample index at `sample_rate`.
pub fn frame_to_sample(frame_delta: u64, fps: Fps, sample_rate: u32) -> u64 {
    let num = u128::from(frame_delta) * u128::from(sample_rate) * u128::from(fps.den);
    let den = u128::from(fps.num);
    ((num + (den / 2)) / den) as u64
}

/// Mix per-scene narration into one master track aligned with the timeline.
///
/// Each scene's PCM is placed at its scene's timeline offset and added in;
/// tails overlapping a crossfade sum with the incoming scene's narration.
/// The buffer length is exactly the video length in samples, so the muxed
/// streams never need `-shortest`: video longer than speech gets trailing
/// silence instead of truncation.
pub fn mix_master_track(plan: &TimelinePlan, per_scene: &[Option<AudioPcm>]) -> Result<AudioPcm> {
    if per_scene.len() != plan.placements.len() {
        return Err(Error::config(format!(
            "narration count {} does not match planned scene count {}",
            per_scene.len(),
            plan.placements.len()
        )));
    }

    let total_samples = frame_to_sample(plan.total_frames, plan.fps, MIX_SAMPLE_RATE);
    let ch = usize::from(MIX_CHANNELS);
    let mut out = vec![0.0f32; total_samples as usize * ch];

    for (p, pcm) in plan.placements.iter().zip(per_scene.iter()) {
        let Some(pcm) = pcm else { continue };
        if pcm.channels != MIX_CHANNELS || pcm.sample_rate != MIX_SAMPLE_RATE {
            return Err(Error::config(format!(
                "scene {} narration must be {MIX_CHANNELS}ch @ {MIX_SAMPLE_RATE}Hz before mixing",
                p.index
            )));
        }
        let start = frame_to_sample(p.range.start.0, plan.fps, MIX_SAMPLE_RATE) as usize * ch;
        for (i, &s) in pcm.interleaved_f32.iter().enumerate() {
            let Some(slot) = out.get_mut(start + i) else {
                // Narration never outruns its scene's visual window by more
                // than rounding; drop the sub-sample excess.
                break;
            };
            *slot += s;
        }
    }

    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }

    Ok(AudioPcm {
        sample_rate: MIX_SAMPLE_RATE,
        channels: MIX_CHANNELS,
        interleaved_f32: out,
    })
}

/// Write interleaved `f32` PCM samples as a raw little-endian `.f32le` file.
pub fn write_f32le_file(pcm: &AudioPcm, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create audio output directory '{}'",
                parent.display()
            )
        })?;
    }

    let mut bytes = Vec::<u8>::with_capacity(pcm.interleaved_f32.len() * 4);
    for &sample in &pcm.interleaved_f32 {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes)
        .with_context(|| format!("failed to write audio file '{}'", out_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Fps;
    use crate::timing::{TimingConfig, plan_timeline};

    fn tone(frames: u64, value: f32) -> AudioPcm {
        AudioPcm {
            sample_rate: MIX_SAMPLE_RATE,
            channels: MIX_CHANNELS,
            interleaved_f32: vec![value; frames as usize * 2],
        }
    }

    #[test]
    fn frame_to_sample_uses_rational_fps() {
        let ntsc = Fps::new(30_000, 1001).unwrap();
        assert_eq!(frame_to_sample(0, ntsc, 48_000), 0);
        // One NTSC frame is 1601.6 samples; rounds to 1602.
        assert_eq!(frame_to_sample(1, ntsc, 48_000), 1602);
        let exact = Fps::new(30, 1).unwrap();
        assert_eq!(frame_to_sample(30, exact, 48_000), 48_000);
    }

    #[test]
    fn master_track_length_matches_video_exactly() {
        let fps = Fps::new(30, 1).unwrap();
        let plan = plan_timeline(&[2.0, 2.0], fps, &TimingConfig::default()).unwrap();
        let narr = vec![Some(tone(48_000, 0.25)), Some(tone(48_000, 0.25))];
        let master = mix_master_track(&plan, &narr).unwrap();
        assert_eq!(
            master.frames(),
            frame_to_sample(plan.total_frames, fps, MIX_SAMPLE_RATE)
        );
    }

    #[test]
    fn scenes_without_narration_leave_silence() {
        let fps = Fps::new(30, 1).unwrap();
        let plan = plan_timeline(&[2.0, 2.0], fps, &TimingConfig::default()).unwrap();
        let narr = vec![None, Some(tone(100, 0.5))];
        let master = mix_master_track(&plan, &narr).unwrap();
        // Start of scene 0 is silent; start of scene 1 carries the tone.
        assert_eq!(master.interleaved_f32[0], 0.0);
        let s1 = frame_to_sample(plan.placements[1].range.start.0, fps, MIX_SAMPLE_RATE) as usize;
        assert_eq!(master.interleaved_f32[s1 * 2], 0.5);
    }

    #[test]
    fn overlapping_tails_mix_and_clamp() {
        let fps = Fps::new(30, 1).unwrap();
        let plan = plan_timeline(&[2.0, 2.0], fps, &TimingConfig::default()).unwrap();
        // Both scenes full-scale: the crossfade region would sum to 1.6.
        let narr = vec![Some(tone(96_000, 0.8)), Some(tone(48_000, 0.8))];
        let master = mix_master_track(&plan, &narr).unwrap();
        let s1 = frame_to_sample(plan.placements[1].range.start.0, fps, MIX_SAMPLE_RATE) as usize;
        assert_eq!(master.interleaved_f32[s1 * 2], 1.0);
    }

    #[test]
    fn wrong_rate_narration_is_rejected() {
        let fps = Fps::new(30, 1).unwrap();
        let plan = plan_timeline(&[2.0], fps, &TimingConfig::default()).unwrap();
        let bad = AudioPcm {
            sample_rate: 44_100,
            channels: 2,
            interleaved_f32: vec![0.0; 100],
        };
        assert!(mix_master_track(&plan, &[Some(bad)]).is_err());
    }
}
