use crate::audio::pcm::AudioPcm;
use crate::foundation::error::{Error, Result};

/// Supported tempo band `[TEMPO_MIN, TEMPO_MAX)`. At and beyond the upper
/// bound, overlap-add time stretching degrades audibly, so the pipeline
/// refuses rather than silently clamping.
pub const TEMPO_MIN: f64 = 0.5;
pub const TEMPO_MAX: f64 = 2.0;

/// Analysis/synthesis window length in seconds.
const WINDOW_SECS: f64 = 0.030;
/// Tolerated deviation, in seconds, when hunting for the best-aligned
/// analysis window.
const SEEK_SECS: f64 = 0.0075;

/// Reject tempo factors outside the supported band.
///
/// Exposed separately so the pipeline can fail fast at configuration time,
/// before any synthesis or rendering starts.
pub fn validate_factor(factor: f64) -> Result<()> {
    if !factor.is_finite() || factor < TEMPO_MIN || factor >= TEMPO_MAX {
        return Err(Error::UnsupportedTempoFactor {
            factor,
            min: TEMPO_MIN,
            max: TEMPO_MAX,
        });
    }
    Ok(())
}

/// Time-stretch `pcm` by `factor` while preserving pitch.
///
/// `factor` is a speaking-rate multiplier: 1.5 speaks half again as fast
/// (two-thirds the duration), 0.5 half as fast. This is time-scale
/// modification by
/// waveform-similarity overlap-add, not resampling; the spectral content
/// stays put while the timeline contracts or dilates.
///
/// Output length is fixed up front to `round(input_frames / factor)` sample
/// frames, well inside the one-frame-period tolerance the pipeline promises.
pub fn adjust_tempo(pcm: &AudioPcm, factor: f64) -> Result<AudioPcm> {
    validate_factor(factor)?;
    if pcm.channels == 0 || pcm.sample_rate == 0 {
        return Err(Error::config("tempo input must have channels and a rate"));
    }
    if (factor - 1.0).abs() < 1e-3 || pcm.interleaved_f32.is_empty() {
        return Ok(pcm.clone());
    }

    let ch = usize::from(pcm.channels);
    let in_frames = pcm.frames() as usize;
    let out_frames = ((in_frames as f64) / factor).round() as usize;

    let win = ((f64::from(pcm.sample_rate) * WINDOW_SECS) as usize).max(64) & !1;
    let hop = win / 2;
    let seek = ((f64::from(pcm.sample_rate) * SEEK_SECS) as usize).max(1);

    // Mono guide used for waveform-similarity alignment; the chosen offsets
    // are applied to every channel identically so the stereo image survives.
    let mono: Vec<f32> = (0..in_frames)
        .map(|i| {
            let base = i * ch;
            let mut acc = 0.0f32;
            for c in 0..ch {
                acc += pcm.interleaved_f32[base + c];
            }
            acc / ch as f32
        })
        .collect();

    let window: Vec<f32> = (0..win)
        .map(|i| {
            let phase = std::f32::consts::TAU * (i as f32) / (win as f32);
            0.5 - 0.5 * phase.cos()
        })
        .collect();

    let padded = out_frames + win;
    let mut acc = vec![0.0f32; padded * ch];
    let mut weight = vec![0.0f32; padded];

    let mut prev_pos = 0usize;
    let mut k = 0usize;
    loop {
        let syn = k * hop;
        if syn >= out_frames {
            break;
        }

        let nominal = (syn as f64 * factor) as i64;
        let pos = if k == 0 {
            0
        } else {
            best_aligned_pos(&mono, nominal, prev_pos + hop, hop, seek)
        };

        for j in 0..win {
            let src = pos + j;
            if src >= in_frames {
                break;
            }
            let w = window[j];
            let dst = syn + j;
            weight[dst] += w;
            for c in 0..ch {
                acc[dst * ch + c] += pcm.interleaved_f32[src * ch + c] * w;
            }
        }

        prev_pos = pos;
        k += 1;
    }

    // Hann at 50% overlap sums to unity except at the edges; renormalize so
    // the first/last half-window keep full amplitude.
    let mut out = vec![0.0f32; out_frames * ch];
    for i in 0..out_frames {
        let w = weight[i];
        if w > 1e-6 {
            for c in 0..ch {
                out[i * ch + c] = (acc[i * ch + c] / w).clamp(-1.0, 1.0);
            }
        }
    }

    Ok(AudioPcm {
        sample_rate: pcm.sample_rate,
        channels: pcm.channels,
        interleaved_f32: out,
    })
}

/// Search `[nominal - seek, nominal + seek]` for the analysis offset whose
/// waveform best continues the previous block (`target` is where an unbroken
/// copy would resume). Plain normalized cross-correlation over one hop.
fn best_aligned_pos(mono: &[f32], nominal: i64, target: usize, overlap: usize, seek: usize) -> usize {
    let lo = (nominal - seek as i64).max(0) as usize;
    let hi = ((nominal + seek as i64).max(0) as usize).min(mono.len().saturating_sub(1));
    if lo >= hi {
        return lo.min(mono.len().saturating_sub(1));
    }

    let mut best_pos = lo;
    let mut best_score = f32::NEG_INFINITY;
    for cand in lo..=hi {
        let mut dot = 0.0f32;
        let mut energy = 1e-9f32;
        for j in 0..overlap {
            let a = sample_or_zero(mono, target + j);
            let b = sample_or_zero(mono, cand + j);
            dot += a * b;
            energy += b * b;
        }
        let score = dot / energy.sqrt();
        if score > best_score {
            best_score = score;
            best_pos = cand;
        }
    }
    best_pos
}

fn sample_or_zero(buf: &[f32], i: usize) -> f32 {
    buf.get(i).copied().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::{MIX_CHANNELS, MIX_SAMPLE_RATE};

    fn sine(freq: f64, secs: f64) -> AudioPcm {
        let frames = (f64::from(MIX_SAMPLE_RATE) * secs) as usize;
        let mut data = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let t = i as f64 / f64::from(MIX_SAMPLE_RATE);
            let v = (std::f64::consts::TAU * freq * t).sin() as f32 * 0.8;
            data.push(v);
            data.push(v);
        }
        AudioPcm {
            sample_rate: MIX_SAMPLE_RATE,
            channels: MIX_CHANNELS,
            interleaved_f32: data,
        }
    }

    fn zero_crossings_per_sec(pcm: &AudioPcm) -> f64 {
        let ch = usize::from(pcm.channels);
        let mono: Vec<f32> = pcm.interleaved_f32.iter().step_by(ch).copied().collect();
        let mut crossings = 0u64;
        for w in mono.windows(2) {
            if (w[0] >= 0.0) != (w[1] >= 0.0) {
                crossings += 1;
            }
        }
        crossings as f64 / pcm.duration_secs()
    }

    #[test]
    fn out_of_band_factors_are_refused() {
        let pcm = sine(220.0, 0.2);
        // The band is half-open: 2.0 itself is already out.
        for factor in [0.25, 0.49, 2.0, 2.01, 4.0, f64::NAN] {
            let err = adjust_tempo(&pcm, factor).unwrap_err();
            assert!(matches!(err, Error::UnsupportedTempoFactor { .. }), "{factor}");
        }
        assert!(adjust_tempo(&pcm, 0.5).is_ok());
        assert!(adjust_tempo(&pcm, 1.99).is_ok());
    }

    #[test]
    fn near_unity_factor_is_identity() {
        let pcm = sine(220.0, 0.1);
        let out = adjust_tempo(&pcm, 1.0).unwrap();
        assert_eq!(out.interleaved_f32, pcm.interleaved_f32);
    }

    #[test]
    fn output_duration_tracks_inverse_factor() {
        let pcm = sine(220.0, 1.0);
        for factor in [0.5, 0.8, 1.25, 1.5, 1.9] {
            let out = adjust_tempo(&pcm, factor).unwrap();
            let expected = pcm.duration_secs() / factor;
            let frame_period = 1.0 / 30.0;
            assert!(
                (out.duration_secs() - expected).abs() <= frame_period,
                "factor {factor}: got {:.4}s, want {:.4}s",
                out.duration_secs(),
                expected
            );
        }
    }

    #[test]
    fn pitch_survives_time_stretch() {
        let pcm = sine(220.0, 1.0);
        let base_rate = zero_crossings_per_sec(&pcm);
        let out = adjust_tempo(&pcm, 1.5).unwrap();
        let out_rate = zero_crossings_per_sec(&out);
        // Naive resampling would land near base_rate * 1.5; WSOLA keeps the
        // crossing rate (i.e. pitch) roughly constant.
        let rel = (out_rate - base_rate).abs() / base_rate;
        assert!(rel < 0.15, "crossing rate drifted {rel:.3} ({out_rate} vs {base_rate})");
    }

    #[test]
    fn empty_input_passes_through() {
        let pcm = AudioPcm {
            sample_rate: MIX_SAMPLE_RATE,
            channels: MIX_CHANNELS,
            interleaved_f32: Vec::new(),
        };
        let out = adjust_tempo(&pcm, 1.5).unwrap();
        assert!(out.interleaved_f32.is_empty());
    }
}
