use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::{Error, Result};

/// Straight-alpha RGB color used in theme definitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ThemeColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Visual styling for scene rendering: background gradient, overlay text and
/// the contrast backdrop behind it.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Theme {
    pub name: String,
    /// Vertical gradient, top then bottom.
    pub gradient: [ThemeColor; 2],
    pub text_color: ThemeColor,
    /// Color of the box drawn behind overlay text for contrast.
    pub backdrop_color: ThemeColor,
    /// Opacity of the backdrop box, 0-255.
    pub backdrop_opacity: u8,
    /// Font size as a fraction of canvas height.
    pub font_size_pct: f64,
    /// Padding around the text block, in pixels.
    pub padding_px: u32,
}

impl Theme {
    pub fn validate(&self) -> Result<()> {
        if !(self.font_size_pct > 0.0 && self.font_size_pct < 1.0) {
            return Err(Error::config(format!(
                "theme '{}': font_size_pct must be in (0, 1)",
                self.name
            )));
        }
        Ok(())
    }
}

fn builtin(name: &str, top: (u8, u8, u8), bottom: (u8, u8, u8)) -> Theme {
    Theme {
        name: name.to_string(),
        gradient: [
            ThemeColor {
                r: top.0,
                g: top.1,
                b: top.2,
            },
            ThemeColor {
                r: bottom.0,
                g: bottom.1,
                b: bottom.2,
            },
        ],
        text_color: ThemeColor {
            r: 255,
            g: 255,
            b: 255,
        },
        backdrop_color: ThemeColor { r: 0, g: 0, b: 0 },
        backdrop_opacity: 140,
        font_size_pct: 0.065,
        padding_px: 40,
    }
}

/// Built-in theme names, resolvable through [`resolve_theme`].
pub const THEME_NAMES: [&str; 5] = ["dusk", "paper", "moss", "violet", "sunset"];

/// Resolve a theme by name from the built-in table.
pub fn resolve_theme(name: &str) -> Result<Theme> {
    let theme = match name.trim().to_ascii_lowercase().as_str() {
        "dusk" => builtin("dusk", (15, 23, 42), (30, 41, 59)),
        "paper" => {
            let mut t = builtin("paper", (245, 246, 248), (225, 229, 235));
            // Light gradient needs dark text and a light backdrop.
            t.text_color = ThemeColor {
                r: 20,
                g: 24,
                b: 33,
            };
            t.backdrop_color = ThemeColor {
                r: 255,
                g: 255,
                b: 255,
            };
            t.backdrop_opacity = 90;
            t
        }
        "moss" => builtin("moss", (39, 57, 47), (98, 125, 103)),
        "violet" => builtin("violet", (45, 23, 66), (109, 74, 147)),
        "sunset" => builtin("sunset", (255, 94, 98), (255, 195, 113)),
        other => {
            return Err(Error::config(format!(
                "unknown theme '{other}' (known: {})",
                THEME_NAMES.join(", ")
            )));
        }
    };
    theme.validate()?;
    Ok(theme)
}

/// Load a theme override from a JSON file.
pub fn load_theme_file(path: &Path) -> Result<Theme> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read theme file '{}'", path.display()))?;
    let theme: Theme = serde_json::from_slice(&bytes)
        .map_err(|e| Error::config(format!("parse theme file '{}': {e}", path.display())))?;
    theme.validate()?;
    Ok(theme)
}

/// Resolve an output canvas by aspect name.
pub fn resolve_aspect(name: &str) -> Result<(u32, u32)> {
    match name.trim().to_ascii_lowercase().as_str() {
        "16:9" | "landscape" => Ok((1920, 1080)),
        "9:16" | "portrait" | "vertical" => Ok((1080, 1920)),
        "1:1" | "square" => Ok((1080, 1080)),
        other => Err(Error::config(format!(
            "unknown aspect '{other}' (known: 16:9, 9:16, 1:1)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_resolves_and_validates() {
        for name in THEME_NAMES {
            let theme = resolve_theme(name).unwrap();
            assert_eq!(theme.name, name);
        }
    }

    #[test]
    fn unknown_theme_lists_known_names() {
        let err = resolve_theme("neon").unwrap_err().to_string();
        assert!(err.contains("unknown theme"));
        assert!(err.contains("dusk"));
    }

    #[test]
    fn aspect_aliases() {
        assert_eq!(resolve_aspect("16:9").unwrap(), (1920, 1080));
        assert_eq!(resolve_aspect("vertical").unwrap(), (1080, 1920));
        assert!(resolve_aspect("4:3").is_err());
    }

    #[test]
    fn theme_roundtrips_through_json() {
        let theme = resolve_theme("dusk").unwrap();
        let json = serde_json::to_string(&theme).unwrap();
        let back: Theme = serde_json::from_str(&json).unwrap();
        assert_eq!(back.gradient, theme.gradient);
    }
}
