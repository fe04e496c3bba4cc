//! Frame rasterization.

use std::path::Path;

use image::{ImageFormat, Rgba, RgbaImage};
use vcast_models::{AnimationMode, Background, Color};

use super::font::{FontCache, FontFace};
use crate::error::{MediaError, MediaResult};
use crate::storyboard::{FrameDescriptor, FrameScene, SceneWord, WordState};

/// Reference short side that template sizes are expressed against.
const REFERENCE_SHORT_SIDE: f32 = 1080.0;

/// Turns one frame descriptor into an image file.
///
/// Called from render pool threads; implementations must not depend on any
/// other frame.
pub trait FrameRasterizer: Send + Sync {
    fn rasterize(&self, frame: &FrameDescriptor, target: &Path) -> MediaResult<()>;
}

/// Draws the caption line over the template background as a PNG.
#[derive(Debug, Default)]
pub struct CaptionRasterizer {
    fonts: FontCache,
    fixed_face: Option<FontFace>,
}

impl CaptionRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always draw with `face`, ignoring template and environment fonts.
    pub fn with_face(face: FontFace) -> Self {
        Self {
            fonts: FontCache::new(),
            fixed_face: Some(face),
        }
    }

    /// Render a scene into memory.
    pub fn draw(&self, scene: &FrameScene) -> MediaResult<RgbaImage> {
        if scene.width == 0 || scene.height == 0 {
            return Err(MediaError::invalid_storyboard(format!(
                "canvas {}x{} has no area",
                scene.width, scene.height
            )));
        }

        let mut canvas = RgbaImage::new(scene.width, scene.height);
        paint_background(&mut canvas, &scene.background);

        if !scene.is_blank() {
            let face = match &self.fixed_face {
                Some(face) => face.clone(),
                None => self.fonts.resolve(scene.typography.font_path.as_deref()),
            };
            draw_caption(&mut canvas, scene, &face);
        }

        Ok(canvas)
    }
}

impl FrameRasterizer for CaptionRasterizer {
    fn rasterize(&self, frame: &FrameDescriptor, target: &Path) -> MediaResult<()> {
        let canvas = self.draw(&frame.scene)?;
        canvas.save_with_format(target, ImageFormat::Png)?;
        Ok(())
    }
}

/// A word placed on the canvas.
struct Placed<'a> {
    word: &'a SceneWord,
    /// Horizontal centre of the word's slot
    center_x: f32,
    /// Vertical centre of its line
    center_y: f32,
}

fn draw_caption(canvas: &mut RgbaImage, scene: &FrameScene, face: &FontFace) {
    let (width, height) = (scene.width as f32, scene.height as f32);
    let unit = width.min(height) / REFERENCE_SHORT_SIDE;
    let base_px = (scene.typography.font_size as f32 * unit).max(1.0);
    let padding = scene.layout.padding as f32 * unit;
    let space = base_px * 0.3;
    let max_line_width = (width - 2.0 * padding).max(base_px);

    // Wrap on unscaled widths so emphasis steps never reflow the line.
    let mut lines: Vec<Vec<(&SceneWord, f32)>> = vec![Vec::new()];
    let mut line_width = 0.0f32;
    for word in &scene.words {
        let (w, _) = face.measure(&word.text, base_px);
        let w = w as f32;
        let line_empty = lines.last().map_or(true, |l| l.is_empty());
        if !line_empty && line_width + space + w > max_line_width {
            lines.push(Vec::new());
            line_width = 0.0;
        }
        if let Some(line) = lines.last_mut() {
            if !line.is_empty() {
                line_width += space;
            }
            line_width += w;
            line.push((word, w));
        }
    }

    let line_height = base_px * scene.layout.line_spacing;
    let block_height = line_height * lines.len() as f32;
    let anchor_y = height * scene.layout.anchor.to_normalized();
    let top = (anchor_y - block_height / 2.0)
        .min(height - padding - block_height)
        .max(padding.min(height / 2.0));

    let mut placed = Vec::with_capacity(scene.words.len());
    for (row, line) in lines.iter().enumerate() {
        let total: f32 = line.iter().map(|(_, w)| *w).sum::<f32>()
            + space * line.len().saturating_sub(1) as f32;
        let mut x = (width - total) / 2.0;
        let center_y = top + line_height * (row as f32 + 0.5);
        for (word, w) in line {
            placed.push(Placed {
                word,
                center_x: x + w / 2.0,
                center_y,
            });
            x += w + space;
        }
    }

    let typography = &scene.typography;
    for p in &placed {
        let px = base_px * p.word.scale.max(0.1);
        let (w, h) = face.measure(&p.word.text, px);
        let left = p.center_x - w as f32 / 2.0;
        let top = p.center_y - h as f32 / 2.0;

        if p.word.state == WordState::Active && scene.animation == AnimationMode::Highlight {
            let pad = px * 0.18;
            fill_blended(
                canvas,
                (left - pad) as i32,
                (top - pad) as i32,
                (w as f32 + 2.0 * pad) as u32,
                (h as f32 + 2.0 * pad) as u32,
                typography.highlight_color,
                1.0,
            );
        }

        let color = match p.word.state {
            WordState::Spoken | WordState::Neutral => typography.spoken_color,
            WordState::Active => typography.active_color,
            WordState::Upcoming => typography.upcoming_color,
        };
        let backdrop = background_at(&scene.background, p.center_y / height);
        let ink = blend(backdrop, color, p.word.opacity);
        face.draw(canvas, ink, left.round() as i32, top.round() as i32, px, &p.word.text);
    }
}

fn paint_background(canvas: &mut RgbaImage, background: &Background) {
    let height = canvas.height().max(2) as f32;
    for (_, y, pixel) in canvas.enumerate_pixels_mut() {
        let t = y as f32 / (height - 1.0);
        let c = background_at(background, t);
        *pixel = Rgba([c.r, c.g, c.b, 255]);
    }
}

/// Background colour at normalized height `t`.
fn background_at(background: &Background, t: f32) -> Color {
    match background {
        Background::Solid { color } => *color,
        Background::Gradient { top, bottom } => {
            let t = t.clamp(0.0, 1.0);
            let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
            Color::rgb(mix(top.r, bottom.r), mix(top.g, bottom.g), mix(top.b, bottom.b))
        }
    }
}

/// `color` composited over an opaque `backdrop`.
fn blend(backdrop: Color, color: Color, opacity: f32) -> Rgba<u8> {
    let alpha = (color.a as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    let mix = |under: u8, over: u8| (under as f32 * (1.0 - alpha) + over as f32 * alpha).round() as u8;
    Rgba([
        mix(backdrop.r, color.r),
        mix(backdrop.g, color.g),
        mix(backdrop.b, color.b),
        255,
    ])
}

fn fill_blended(
    canvas: &mut RgbaImage,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    color: Color,
    opacity: f32,
) {
    if color.a == 0 || width == 0 || height == 0 {
        return;
    }
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = (x + width as i32).clamp(0, canvas.width() as i32) as u32;
    let y1 = (y + height as i32).clamp(0, canvas.height() as i32) as u32;

    for py in y0..y1 {
        for px in x0..x1 {
            let under = canvas.get_pixel(px, py).0;
            let backdrop = Color::rgb(under[0], under[1], under[2]);
            canvas.put_pixel(px, py, blend(backdrop, color, opacity));
        }
    }
}
