use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::foundation::core::{Affine, Canvas, Fps};
use crate::foundation::error::{Error, Result};
use crate::media::run;
use crate::render::frame::FrameRgba;
use crate::render::text::{TextBrush, TextLayoutEngine};
use crate::scene::model::{FitMode, Scene};
use crate::scene::theme::{Theme, ThemeColor};

/// Upper bound on decoded background-loop frames held in memory per scene.
/// Longer scenes cycle through the decoded window.
const MAX_LOOP_FRAMES: u64 = 300;

/// Everything the renderer needs besides the scene itself.
#[derive(Clone, Debug)]
pub struct SceneRenderOpts {
    pub canvas: Canvas,
    pub fit: FitMode,
    /// Optional logo overlay, composited top-right.
    pub logo: Option<std::path::PathBuf>,
    /// Optional explicit overlay font path.
    pub font: Option<std::path::PathBuf>,
}

/// A rendered scene: every frame the scene contributes, before transition
/// blending. Static scenes hold one shared frame; video-loop backgrounds
/// hold a decoded frame window that longer scenes cycle through.
#[derive(Clone, Debug)]
pub struct SceneClip {
    pub index: usize,
    frames: ClipFrames,
}

#[derive(Clone, Debug)]
enum ClipFrames {
    Static(Arc<FrameRgba>),
    Looped(Arc<Vec<FrameRgba>>),
}

impl SceneClip {
    /// Wrap a single pre-rendered frame as a static clip.
    pub fn from_static_frame(index: usize, frame: FrameRgba) -> Self {
        Self {
            index,
            frames: ClipFrames::Static(Arc::new(frame)),
        }
    }

    /// The frame shown at `local` frames into the scene.
    pub fn frame_at(&self, local: u64) -> &FrameRgba {
        match &self.frames {
            ClipFrames::Static(f) => f,
            ClipFrames::Looped(frames) => {
                let n = frames.len() as u64;
                &frames[(local % n.max(1)) as usize]
            }
        }
    }
}

/// Renders one scene into a [`SceneClip`]: background (image, looped video or
/// theme gradient), word-wrapped overlay text over a contrast backdrop, and
/// an optional logo. Rendering has no side effects; independent scenes render
/// in parallel, one renderer per worker.
pub struct SceneRenderer {
    canvas: Canvas,
    fit: FitMode,
    theme: Theme,
    text_engine: TextLayoutEngine,
    font_bytes: Vec<u8>,
    font: vello_cpu::peniko::FontData,
    logo: Option<ImagePaint>,
    gradient: Option<vello_cpu::Image>,
    ctx: Option<vello_cpu::RenderContext>,
}

#[derive(Clone)]
struct ImagePaint {
    paint: vello_cpu::Image,
    w: u32,
    h: u32,
}

impl SceneRenderer {
    pub fn new(theme: Theme, opts: &SceneRenderOpts) -> Result<Self> {
        opts.canvas.validate_for_encode()?;
        theme.validate()?;
        let font_bytes = crate::render::text::load_font_bytes(opts.font.as_deref())?;
        let font = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(font_bytes.clone()),
            0,
        );

        // Logo decode failures degrade to "no logo" rather than failing every
        // scene of the job.
        let logo = match opts.logo.as_deref() {
            None => None,
            Some(p) => match load_image_paint(p) {
                Ok(paint) => Some(paint),
                Err(e) => {
                    warn!(path = %p.display(), error = %e, "logo unusable, skipping overlay");
                    None
                }
            },
        };

        Ok(Self {
            canvas: opts.canvas,
            fit: opts.fit,
            theme,
            text_engine: TextLayoutEngine::new(),
            font_bytes,
            font,
            logo,
            gradient: None,
            ctx: None,
        })
    }

    /// Render `scene` into a clip of exactly `dur_frames` frames.
    pub fn render_clip(&mut self, scene: &Scene, dur_frames: u64, fps: Fps) -> Result<SceneClip> {
        scene.validate()?;
        if dur_frames == 0 {
            return Err(Error::config(format!(
                "scene {} renders zero frames",
                scene.index
            )));
        }

        let background = self.resolve_background(scene)?;
        debug!(scene = scene.index, frames = dur_frames, "rendering scene");

        let frames = match background {
            ResolvedBackground::Still(paint) => {
                let frame = self.compose_frame(Some(&paint), &scene.text)?;
                ClipFrames::Static(Arc::new(frame))
            }
            ResolvedBackground::Gradient => {
                let frame = self.compose_frame(None, &scene.text)?;
                ClipFrames::Static(Arc::new(frame))
            }
            ResolvedBackground::Loop(path) => {
                let count = dur_frames.min(MAX_LOOP_FRAMES);
                let decoded = decode_looped_frames(&path, fps, count)?;
                let mut out = Vec::with_capacity(decoded.frames.len());
                for raw in &decoded.frames {
                    let paint = image_paint_from_premul(raw, decoded.width, decoded.height)?;
                    out.push(self.compose_frame(Some(&paint), &scene.text)?);
                }
                ClipFrames::Looped(Arc::new(out))
            }
        };

        Ok(SceneClip {
            index: scene.index,
            frames,
        })
    }

    fn resolve_background(&mut self, scene: &Scene) -> Result<ResolvedBackground> {
        use crate::scene::model::BackgroundRef;
        match &scene.background {
            None => Ok(ResolvedBackground::Gradient),
            Some(BackgroundRef::Image(p)) => match load_image_paint(p) {
                Ok(paint) => Ok(ResolvedBackground::Still(paint)),
                Err(e) => {
                    // Missing/corrupt backgrounds never fail the render.
                    warn!(
                        scene = scene.index,
                        path = %p.display(),
                        error = %e,
                        "background unusable, falling back to theme gradient"
                    );
                    Ok(ResolvedBackground::Gradient)
                }
            },
            Some(BackgroundRef::VideoLoop(p)) => {
                if p.exists() {
                    Ok(ResolvedBackground::Loop(p.clone()))
                } else {
                    warn!(
                        scene = scene.index,
                        path = %p.display(),
                        "background video missing, falling back to theme gradient"
                    );
                    Ok(ResolvedBackground::Gradient)
                }
            }
        }
    }

    /// Draw one full frame: background, text block with backdrop, logo.
    fn compose_frame(&mut self, background: Option<&ImagePaint>, text: &str) -> Result<FrameRgba> {
        let canvas = self.canvas;
        let (cw, ch) = (canvas.width, canvas.height);
        let w16: u16 = cw
            .try_into()
            .map_err(|_| Error::config("canvas width exceeds u16"))?;
        let h16: u16 = ch
            .try_into()
            .map_err(|_| Error::config("canvas height exceeds u16"))?;

        let gradient = self.gradient_paint()?;
        let fit = self.fit;
        let theme = self.theme.clone();
        let font = self.font.clone();
        let logo = self.logo.clone();

        let font_size = (ch as f64 * theme.font_size_pct).max(18.0) as f32;
        let max_text_width = (cw.saturating_sub(2 * theme.padding_px)).max(16) as f32;
        let layout = self.text_engine.layout_block(
            text,
            &self.font_bytes,
            font_size,
            TextBrush {
                r: theme.text_color.r,
                g: theme.text_color.g,
                b: theme.text_color.b,
                a: 255,
            },
            max_text_width,
        )?;

        let mut pixmap = vello_cpu::Pixmap::new(w16, h16);
        self.with_ctx(w16, h16, |ctx| {
            ctx.set_blend_mode(vello_cpu::peniko::BlendMode::default());
            ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

            // Background fills the whole canvas.
            match background {
                Some(img) => {
                    let tr = fit_affine(fit, img.w, img.h, canvas);
                    ctx.set_transform(affine_to_cpu(tr));
                    ctx.set_paint(img.paint.clone());
                    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                        0.0,
                        0.0,
                        img.w as f64,
                        img.h as f64,
                    ));
                }
                None => {
                    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                    ctx.set_paint(gradient.clone());
                    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, cw as f64, ch as f64));
                }
            }

            // Centered text block over a contrast backdrop.
            let text_w = f64::from(layout.width()).min(f64::from(max_text_width));
            let text_h = f64::from(layout.height());
            let pad = f64::from(theme.padding_px);
            let x = (cw as f64 - f64::from(max_text_width)) / 2.0;
            let y = (ch as f64 - text_h) / 2.0;

            let bd = theme.backdrop_color;
            let box_x = (cw as f64 - text_w) / 2.0;
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                bd.r,
                bd.g,
                bd.b,
                theme.backdrop_opacity,
            ));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                (box_x - pad).max(0.0),
                (y - pad).max(0.0),
                (box_x + text_w + pad).min(cw as f64),
                (y + text_h + pad).min(ch as f64),
            ));

            ctx.set_transform(vello_cpu::kurbo::Affine::translate((x, y)));
            for line in layout.lines() {
                for item in line.items() {
                    let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                        continue;
                    };
                    let brush = run.style().brush;
                    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                        brush.r, brush.g, brush.b, brush.a,
                    ));
                    let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                        id: g.id,
                        x: g.x,
                        y: g.y,
                    });
                    ctx.glyph_run(&font)
                        .font_size(run.run().font_size())
                        .fill_glyphs(glyphs);
                }
            }

            // Logo top-right at 12% of canvas width.
            if let Some(logo) = logo.as_ref() {
                let target_w = (cw as f64 * 0.12).max(64.0);
                let scale = target_w / f64::from(logo.w);
                let margin = 20.0;
                let tx = cw as f64 - target_w - margin;
                let tr = Affine::translate((tx, margin)) * Affine::scale(scale);
                ctx.set_transform(affine_to_cpu(tr));
                ctx.set_paint(logo.paint.clone());
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(logo.w),
                    f64::from(logo.h),
                ));
            }

            ctx.flush();
            ctx.render_to_pixmap(&mut pixmap);
            Ok(())
        })?;

        Ok(FrameRgba {
            width: cw,
            height: ch,
            data: pixmap.data_as_u8_slice().to_vec(),
        })
    }

    fn with_ctx(
        &mut self,
        width: u16,
        height: u16,
        f: impl FnOnce(&mut vello_cpu::RenderContext) -> Result<()>,
    ) -> Result<()> {
        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == width && ctx.height() == height => ctx,
            _ => vello_cpu::RenderContext::new(width, height),
        };
        ctx.reset();
        let out = f(&mut ctx);
        self.ctx = Some(ctx);
        out
    }

    /// The theme's vertical gradient as a canvas-sized image paint, built once.
    fn gradient_paint(&mut self) -> Result<vello_cpu::Image> {
        if let Some(img) = self.gradient.clone() {
            return Ok(img);
        }
        let (w, h) = (self.canvas.width, self.canvas.height);
        let [top, bottom] = self.theme.gradient;
        let bytes = gradient_bytes(top, bottom, w, h);
        let img = image_paint_from_premul(&bytes, w, h)?.paint;
        self.gradient = Some(img.clone());
        Ok(img)
    }
}

enum ResolvedBackground {
    Still(ImagePaint),
    Loop(std::path::PathBuf),
    Gradient,
}

fn gradient_bytes(top: ThemeColor, bottom: ThemeColor, w: u32, h: u32) -> Vec<u8> {
    let mut bytes = vec![0u8; (w as usize) * (h as usize) * 4];
    let h1 = (h.max(1) - 1) as f32;
    for y in 0..h {
        let t = if h1 <= 0.0 { 0.0 } else { (y as f32) / h1 };
        let lerp = |a: u8, b: u8| -> u8 {
            let af = a as f32;
            let bf = b as f32;
            (af + (bf - af) * t).round().clamp(0.0, 255.0) as u8
        };
        let row = [lerp(top.r, bottom.r), lerp(top.g, bottom.g), lerp(top.b, bottom.b), 255];
        let off = (y as usize) * (w as usize) * 4;
        for px in bytes[off..off + (w as usize) * 4].chunks_exact_mut(4) {
            px.copy_from_slice(&row);
        }
    }
    bytes
}

/// Transform placing a `src_w`x`src_h` asset on the canvas per the fit mode,
/// centered either way.
pub(crate) fn fit_affine(fit: FitMode, src_w: u32, src_h: u32, canvas: Canvas) -> Affine {
    let (cw, ch) = (canvas.width as f64, canvas.height as f64);
    let (sw, sh) = (f64::from(src_w.max(1)), f64::from(src_h.max(1)));
    let scale = match fit {
        FitMode::Cover => (cw / sw).max(ch / sh),
        FitMode::Contain => (cw / sw).min(ch / sh),
    };
    let tx = (cw - sw * scale) / 2.0;
    let ty = (ch - sh * scale) / 2.0;
    Affine::translate((tx, ty)) * Affine::scale(scale)
}

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

/// Decode image bytes to premultiplied RGBA8.
pub(crate) fn decode_image_premul(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| Error::asset(format!("image decode failed: {e}")))?;
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut data = rgba.into_raw();
    premultiply_rgba8_in_place(&mut data);
    Ok((data, w, h))
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

fn load_image_paint(path: &Path) -> Result<ImagePaint> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::asset(format!("failed to read '{}': {e}", path.display())))?;
    let (data, w, h) = decode_image_premul(&bytes)?;
    image_paint_from_premul(&data, w, h)
}

fn image_paint_from_premul(bytes: &[u8], width: u32, height: u32) -> Result<ImagePaint> {
    let pixmap = pixmap_from_premul_bytes(bytes, width, height)?;
    Ok(ImagePaint {
        paint: vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        },
        w: width,
        h: height,
    })
}

pub(crate) fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> Result<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| Error::asset("pixmap width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| Error::asset("pixmap height exceeds u16"))?;
    if bytes.len() != (width as usize).saturating_mul(height as usize).saturating_mul(4) {
        return Err(Error::asset("pixmap byte len mismatch"));
    }
    let mut pixels = Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity(
        (width as usize) * (height as usize),
    );
    for px in bytes.chunks_exact(4) {
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, true))
}

/// Frames decoded from a background video, looped to `count` frames at `fps`.
struct DecodedLoop {
    width: u32,
    height: u32,
    frames: Vec<Vec<u8>>,
}

/// Batch-decode `count` frames from a (looping) background video at the
/// output frame rate, as raw RGBA.
fn decode_looped_frames(path: &Path, fps: Fps, count: u64) -> Result<DecodedLoop> {
    let info = crate::media::probe::probe_media(path)?;
    let (w, h) = (info.width, info.height);
    if w == 0 || h == 0 {
        return Err(Error::unreadable(
            path.display().to_string(),
            "background video has no valid dimensions",
        ));
    }

    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-stream_loop", "-1", "-i"])
        .arg(path)
        .args([
            "-frames:v",
            &count.to_string(),
            "-vf",
            &format!("fps={}/{}", fps.num, fps.den),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ]);
    let stdout = run::run_captured(cmd, run::DEFAULT_TIMEOUT_SECS)?;

    let frame_len = (w as usize) * (h as usize) * 4;
    if frame_len == 0 || stdout.len() < frame_len || !stdout.len().is_multiple_of(frame_len) {
        return Err(Error::unreadable(
            path.display().to_string(),
            format!(
                "decoded loop has invalid size: {} bytes, expected multiples of {frame_len}",
                stdout.len()
            ),
        ));
    }

    let available = (stdout.len() / frame_len).min(count as usize);
    let mut frames = Vec::with_capacity(available);
    for idx in 0..available {
        let off = idx * frame_len;
        frames.push(stdout[off..off + frame_len].to_vec());
    }
    Ok(DecodedLoop {
        width: w,
        height: h,
        frames,
    })
}
