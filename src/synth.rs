use std::path::Path;
use std::process::Command;

use tracing::{info, warn};

use crate::audio::pcm::{self, MIX_SAMPLE_RATE};
use crate::foundation::error::{Error, Result};
use crate::media::run;

/// Maximum automatic retries for a transient synthesis failure. Encode
/// failures are never retried; synthesis may be (it usually talks to a
/// network service).
pub const SYNTH_MAX_RETRIES: u32 = 2;

/// Narration synthesis collaborator.
///
/// Implementations write the synthesized audio for `text` to `out_path` and
/// return the audio duration in seconds. Failures surface as
/// [`Error::SynthesisUnavailable`].
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(
        &self,
        text: &str,
        language: &str,
        voice_speed: f64,
        out_path: &Path,
    ) -> Result<f64>;
}

/// Shell-command synthesizer adapter.
///
/// The command template is tokenized on whitespace; the placeholders
/// `{text}`, `{lang}`, `{speed}` and `{out}` are substituted per token, so an
/// external TTS engine can be plugged in without code changes, e.g.
/// `espeak-ng -v {lang} -s {speed} -w {out} {text}`.
pub struct CommandSynthesizer {
    template: Vec<String>,
    timeout_secs: u64,
}

impl CommandSynthesizer {
    pub fn new(template: &str, timeout_secs: u64) -> Result<Self> {
        let tokens: Vec<String> = template.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            return Err(Error::config("synthesis command template is empty"));
        }
        if !tokens.iter().any(|t| t.contains("{out}")) {
            return Err(Error::config(
                "synthesis command template must contain an {out} placeholder",
            ));
        }
        Ok(Self {
            template: tokens,
            timeout_secs,
        })
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn synthesize(
        &self,
        text: &str,
        language: &str,
        voice_speed: f64,
        out_path: &Path,
    ) -> Result<f64> {
        let out = out_path.display().to_string();
        let speed = format!("{voice_speed}");
        let args: Vec<String> = self.template[1..]
            .iter()
            .map(|t| {
                t.replace("{text}", text)
                    .replace("{lang}", language)
                    .replace("{speed}", &speed)
                    .replace("{out}", &out)
            })
            .collect();

        let mut cmd = Command::new(&self.template[0]);
        cmd.args(&args);
        match run::run_captured(cmd, self.timeout_secs) {
            Ok(_) => {}
            Err(Error::Encode(msg)) => return Err(Error::synthesis(msg)),
            Err(other) => return Err(other),
        }
        if !out_path.exists() {
            return Err(Error::synthesis(format!(
                "synthesis command produced no output at '{}'",
                out_path.display()
            )));
        }

        // Duration comes from actually decoding the result; container headers
        // from TTS engines are routinely wrong.
        let pcm = pcm::decode_audio_f32_stereo(out_path, MIX_SAMPLE_RATE)?;
        if pcm.interleaved_f32.is_empty() {
            return Err(Error::synthesis(format!(
                "synthesis output '{}' decodes to zero samples",
                out_path.display()
            )));
        }
        Ok(pcm.duration_secs())
    }
}

/// Call `synth` with bounded retries for transient failures.
///
/// Only [`Error::SynthesisUnavailable`] is retried, at most
/// [`SYNTH_MAX_RETRIES`] times; every other error surfaces immediately.
pub fn synthesize_with_retry(
    synth: &dyn SpeechSynthesizer,
    text: &str,
    language: &str,
    voice_speed: f64,
    out_path: &Path,
) -> Result<f64> {
    let mut attempt = 0;
    loop {
        match synth.synthesize(text, language, voice_speed, out_path) {
            Ok(duration) => {
                if attempt > 0 {
                    info!(attempt, "synthesis succeeded after retry");
                }
                return Ok(duration);
            }
            Err(Error::SynthesisUnavailable(msg)) if attempt < SYNTH_MAX_RETRIES => {
                attempt += 1;
                warn!(attempt, error = %msg, "synthesis failed, retrying");
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySynth {
        calls: AtomicU32,
        succeed_on: u32,
    }

    impl SpeechSynthesizer for FlakySynth {
        fn synthesize(&self, _: &str, _: &str, _: f64, _: &Path) -> Result<f64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.succeed_on {
                Ok(1.25)
            } else {
                Err(Error::synthesis("no network"))
            }
        }
    }

    #[test]
    fn transient_failures_are_retried_within_bound() {
        let synth = FlakySynth {
            calls: AtomicU32::new(0),
            succeed_on: 3,
        };
        let d = synthesize_with_retry(&synth, "hi", "en", 1.0, Path::new("/tmp/x.wav")).unwrap();
        assert_eq!(d, 1.25);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn persistent_failure_surfaces_after_bound() {
        let synth = FlakySynth {
            calls: AtomicU32::new(0),
            succeed_on: 10,
        };
        let err =
            synthesize_with_retry(&synth, "hi", "en", 1.0, Path::new("/tmp/x.wav")).unwrap_err();
        assert!(matches!(err, Error::SynthesisUnavailable(_)));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1 + SYNTH_MAX_RETRIES);
    }

    struct BrokenSynth;
    impl SpeechSynthesizer for BrokenSynth {
        fn synthesize(&self, _: &str, _: &str, _: f64, _: &Path) -> Result<f64> {
            Err(Error::encode("deterministic failure"))
        }
    }

    #[test]
    fn non_transient_errors_are_not_retried() {
        let err =
            synthesize_with_retry(&BrokenSynth, "hi", "en", 1.0, Path::new("/tmp/x.wav"))
                .unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }

    #[test]
    fn command_template_requires_out_placeholder() {
        assert!(CommandSynthesizer::new("say {text}", 30).is_err());
        assert!(CommandSynthesizer::new("", 30).is_err());
        assert!(CommandSynthesizer::new("say -o {out} {text}", 30).is_ok());
    }
}
