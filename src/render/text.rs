use std::path::{Path, PathBuf};

use crate::foundation::error::{Error, Result};

/// RGBA8 brush color carried through Parley text layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Well-known font locations probed when no explicit font path is given.
const FONT_SEARCH_PATHS: [&str; 5] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:/Windows/Fonts/arial.ttf",
];

/// Load overlay font bytes: an explicit path wins, otherwise the first hit in
/// the system search list. No font at all is an asset error (overlay text
/// cannot be rendered readably without one).
pub fn load_font_bytes(custom: Option<&Path>) -> Result<Vec<u8>> {
    if let Some(p) = custom {
        return std::fs::read(p)
            .map_err(|e| Error::asset(format!("failed to read font '{}': {e}", p.display())));
    }
    for candidate in FONT_SEARCH_PATHS {
        let p = PathBuf::from(candidate);
        if p.exists()
            && let Ok(bytes) = std::fs::read(&p)
        {
            return Ok(bytes);
        }
    }
    Err(Error::asset(
        "no usable overlay font found; pass an explicit --font path",
    ))
}

/// Stateful helper for building Parley text layouts from raw font bytes.
pub struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutEngine {
    /// Construct a new layout engine with fresh Parley contexts.
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Shape and lay out a centered text block wrapped to `max_width_px`.
    pub fn layout_block(
        &mut self,
        text: &str,
        font_bytes: &[u8],
        size_px: f32,
        brush: TextBrush,
        max_width_px: f32,
    ) -> Result<parley::Layout<TextBrush>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(Error::config("text size_px must be finite and > 0"));
        }
        if !max_width_px.is_finite() || max_width_px <= 0.0 {
            return Err(Error::config("text max_width_px must be finite and > 0"));
        }

        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.to_vec()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::asset("no font families registered from font bytes"))?;

        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| Error::asset("registered font family has no name"))?
            .to_string();

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        layout.break_all_lines(Some(max_width_px));
        layout.align(
            Some(max_width_px),
            parley::Alignment::Center,
            parley::AlignmentOptions::default(),
        );

        Ok(layout)
    }
}
