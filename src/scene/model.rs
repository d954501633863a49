use std::path::PathBuf;

use crate::foundation::error::{Error, Result};

/// Background source for one scene.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum BackgroundRef {
    /// Still image, scaled to the canvas per the fit mode.
    Image(PathBuf),
    /// Video whose frames are looped for the scene duration.
    VideoLoop(PathBuf),
}

impl BackgroundRef {
    pub fn path(&self) -> &PathBuf {
        match self {
            BackgroundRef::Image(p) | BackgroundRef::VideoLoop(p) => p,
        }
    }
}

/// How a background fills the output canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Scale to cover the whole canvas, cropping overflow.
    #[default]
    Cover,
    /// Scale to fit inside the canvas, letterboxing the rest.
    Contain,
}

/// One narrated segment of the output video.
///
/// Created by the segmenter (index, text), enriched by the duration estimator
/// before rendering, immutable afterwards.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Scene {
    pub index: usize,
    pub text: String,
    pub background: Option<BackgroundRef>,
    pub duration_secs: f64,
    pub fade_in_secs: f64,
    pub fade_out_secs: f64,
}

impl Scene {
    pub fn validate(&self) -> Result<()> {
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(Error::config(format!(
                "scene {}: duration must be > 0 (got {})",
                self.index, self.duration_secs
            )));
        }
        if self.fade_in_secs < 0.0 || self.fade_out_secs < 0.0 {
            return Err(Error::config(format!(
                "scene {}: fade windows must be >= 0",
                self.index
            )));
        }
        if self.fade_in_secs + self.fade_out_secs > self.duration_secs {
            return Err(Error::config(format!(
                "scene {}: fade_in + fade_out ({:.3}s) exceeds duration ({:.3}s)",
                self.index,
                self.fade_in_secs + self.fade_out_secs,
                self.duration_secs
            )));
        }
        Ok(())
    }
}
