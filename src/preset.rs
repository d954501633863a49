use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{Error, Result};

/// Bitrate policy for an encode preset: constant quality or a bitrate target.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitratePolicy {
    /// Constant rate factor (libx264 `-crf`).
    Crf(u8),
    /// Average bitrate target, e.g. "4000k".
    Bitrate(String),
}

/// A named, immutable bundle of encode settings, resolved at invocation time.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EncodePreset {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    pub policy: BitratePolicy,
}

impl EncodePreset {
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }
}

/// Known preset names, resolvable through [`resolve_preset`].
pub const PRESET_NAMES: [&str; 5] = ["1080p", "720p", "vertical", "square", "preview"];

/// Resolve an encode preset by name. Unknown names fail fast with the list of
/// known presets, before any encoding starts.
pub fn resolve_preset(name: &str) -> Result<EncodePreset> {
    let fps30 = Fps { num: 30, den: 1 };
    let preset = match name.trim().to_ascii_lowercase().as_str() {
        "1080p" => EncodePreset {
            name: "1080p".to_string(),
            width: 1920,
            height: 1080,
            fps: fps30,
            policy: BitratePolicy::Crf(18),
        },
        "720p" => EncodePreset {
            name: "720p".to_string(),
            width: 1280,
            height: 720,
            fps: fps30,
            policy: BitratePolicy::Crf(20),
        },
        "vertical" => EncodePreset {
            name: "vertical".to_string(),
            width: 1080,
            height: 1920,
            fps: fps30,
            policy: BitratePolicy::Crf(18),
        },
        "square" => EncodePreset {
            name: "square".to_string(),
            width: 1080,
            height: 1080,
            fps: fps30,
            policy: BitratePolicy::Crf(18),
        },
        "preview" => EncodePreset {
            name: "preview".to_string(),
            width: 640,
            height: 360,
            fps: fps30,
            policy: BitratePolicy::Crf(28),
        },
        other => {
            return Err(Error::config(format!(
                "unknown encode preset '{other}' (known: {})",
                PRESET_NAMES.join(", ")
            )));
        }
    };
    Ok(preset)
}

/// Apply a preset's bitrate policy to ffmpeg sink options.
pub(crate) fn apply_policy(
    opts: &mut crate::encode::ffmpeg::FfmpegSinkOpts,
    policy: &BitratePolicy,
) {
    match policy {
        BitratePolicy::Crf(crf) => opts.crf = Some(*crf),
        BitratePolicy::Bitrate(rate) => opts.bitrate = Some(rate.clone()),
    }
}
