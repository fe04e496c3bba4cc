//! Caption font resolution.
//!
//! Lookup order: the template's font path, `VCAST_FONT_PATH`, then a few
//! common system locations. When nothing loads, text is drawn as glyph
//! blocks so exports still succeed on bare hosts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ab_glyph::{FontVec, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Environment variable naming a TTF/OTF file for captions.
pub const FONT_PATH_ENV: &str = "VCAST_FONT_PATH";

const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial.ttf",
];

/// A loaded font, or the block fallback.
#[derive(Clone)]
pub enum FontFace {
    Glyphs(Arc<FontVec>),
    Blocks,
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FontFace::Glyphs(_) => f.write_str("FontFace::Glyphs"),
            FontFace::Blocks => f.write_str("FontFace::Blocks"),
        }
    }
}

impl FontFace {
    pub fn is_fallback(&self) -> bool {
        matches!(self, FontFace::Blocks)
    }

    /// Rendered `(width, height)` of `text` at `px` pixels.
    pub fn measure(&self, text: &str, px: f32) -> (u32, u32) {
        match self {
            FontFace::Glyphs(font) => text_size(PxScale::from(px), font.as_ref(), text),
            FontFace::Blocks => {
                let chars = text.chars().count() as f32;
                ((chars * px * 0.6).ceil() as u32, (px * 0.75).ceil() as u32)
            }
        }
    }

    /// Draw `text` with its top-left corner at `(x, y)`.
    pub fn draw(&self, canvas: &mut RgbaImage, color: Rgba<u8>, x: i32, y: i32, px: f32, text: &str) {
        match self {
            FontFace::Glyphs(font) => {
                draw_text_mut(canvas, color, x, y, PxScale::from(px), font.as_ref(), text);
            }
            FontFace::Blocks => {
                let advance = px * 0.6;
                let width = ((advance * 0.8).round() as u32).max(1);
                let height = ((px * 0.75).round() as u32).max(1);
                for (i, ch) in text.chars().enumerate() {
                    if ch.is_whitespace() {
                        continue;
                    }
                    let left = x + (i as f32 * advance).round() as i32;
                    draw_filled_rect_mut(canvas, Rect::at(left, y).of_size(width, height), color);
                }
            }
        }
    }
}

/// Loads fonts once per path and hands out shared handles.
#[derive(Debug, Default)]
pub struct FontCache {
    loaded: Mutex<HashMap<PathBuf, FontFace>>,
}

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the face for a template, falling back to blocks.
    pub fn resolve(&self, template_path: Option<&str>) -> FontFace {
        for candidate in candidate_paths(template_path) {
            if let Some(face) = self.get(&candidate) {
                return face;
            }
        }
        FontFace::Blocks
    }

    fn get(&self, path: &Path) -> Option<FontFace> {
        let mut loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(face) = loaded.get(path) {
            return Some(face.clone());
        }
        if !path.is_file() {
            return None;
        }

        match load_font(path) {
            Ok(font) => {
                debug!("Loaded caption font {}", path.display());
                let face = FontFace::Glyphs(Arc::new(font));
                loaded.insert(path.to_path_buf(), face.clone());
                Some(face)
            }
            Err(e) => {
                warn!("Skipping unusable font {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn candidate_paths(template_path: Option<&str>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = template_path.filter(|p| !p.trim().is_empty()) {
        paths.push(PathBuf::from(path));
    }
    if let Ok(path) = std::env::var(FONT_PATH_ENV) {
        if !path.trim().is_empty() {
            paths.push(PathBuf::from(path));
        }
    }
    paths.extend(SYSTEM_FONT_PATHS.iter().map(PathBuf::from));
    paths
}

/// Read and parse a font file.
pub fn load_font(path: &Path) -> MediaResult<FontVec> {
    let bytes = std::fs::read(path)?;
    FontVec::try_from_vec(bytes)
        .map_err(|e| MediaError::font(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_font_falls_back_to_blocks() {
        let cache = FontCache::new();
        let face = cache.get(Path::new("/nonexistent/font.ttf"));
        assert!(face.is_none());
    }

    #[test]
    fn test_invalid_font_file_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a font").unwrap();

        assert!(load_font(file.path()).is_err());
        assert!(FontCache::new().get(file.path()).is_none());
    }

    #[test]
    fn test_template_path_comes_first() {
        let paths = candidate_paths(Some("/fonts/brand.ttf"));
        assert_eq!(paths[0], PathBuf::from("/fonts/brand.ttf"));
        assert!(paths.len() > SYSTEM_FONT_PATHS.len());

        let paths = candidate_paths(Some("  "));
        assert_ne!(paths[0], PathBuf::from("  "));
    }

    #[test]
    fn test_block_measure_and_draw() {
        let face = FontFace::Blocks;
        assert_eq!(face.measure("abcd", 100.0), (240, 75));

        let mut canvas = RgbaImage::from_pixel(300, 100, Rgba([0, 0, 0, 255]));
        face.draw(&mut canvas, Rgba([255, 255, 255, 255]), 10, 10, 100.0, "a b");
        assert_eq!(canvas.get_pixel(12, 12), &Rgba([255, 255, 255, 255]));
        // the space leaves a gap
        assert_eq!(canvas.get_pixel(80, 12), &Rgba([0, 0, 0, 255]));
    }
}
