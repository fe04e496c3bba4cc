//! Visual style templates for captioned exports.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum AspectRatio {
    /// Standard portrait (9:16) for TikTok/Reels
    #[default]
    #[serde(rename = "9:16")]
    Portrait,
    /// Square (1:1)
    #[serde(rename = "1:1")]
    Square,
    /// Instagram portrait (4:5)
    #[serde(rename = "4:5")]
    InstagramPortrait,
    /// Landscape (16:9)
    #[serde(rename = "16:9")]
    Landscape,
}

impl AspectRatio {
    pub const ALL: &'static [AspectRatio] = &[
        AspectRatio::Portrait,
        AspectRatio::Square,
        AspectRatio::InstagramPortrait,
        AspectRatio::Landscape,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
            AspectRatio::InstagramPortrait => "4:5",
            AspectRatio::Landscape => "16:9",
        }
    }

    /// Width and height ratio terms.
    pub fn terms(&self) -> (u32, u32) {
        match self {
            AspectRatio::Portrait => (9, 16),
            AspectRatio::Square => (1, 1),
            AspectRatio::InstagramPortrait => (4, 5),
            AspectRatio::Landscape => (16, 9),
        }
    }

    /// Canvas size in pixels for a given short side. Both sides are even
    /// so the result is always encodable as yuv420p.
    pub fn canvas_size(&self, short_side: u32) -> (u32, u32) {
        let (w, h) = self.terms();
        let short = short_side - short_side % 2;
        let long = |a: u32, b: u32| {
            let v = (short as u64 * a as u64 / b as u64) as u32;
            v - v % 2
        };
        if w <= h {
            (short, long(h, w))
        } else {
            (long(w, h), short)
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AspectRatio::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| AspectRatioParseError(s.to_string()))
    }
}

#[derive(Debug, Error)]
#[error("Unsupported aspect ratio: {0}, expected one of 9:16, 1:1, 4:5, 16:9")]
pub struct AspectRatioParseError(String);

/// RGBA colour written as `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| ColorParseError(s.to_string()))?;
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(ColorParseError(s.to_string()));
        }

        let byte = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ColorParseError(s.to_string()))
        };
        let a = if hex.len() == 8 { byte(6)? } else { 255 };
        Ok(Color::rgba(byte(0)?, byte(2)?, byte(4)?, a))
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl JsonSchema for Color {
    fn schema_name() -> String {
        "Color".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        <String as JsonSchema>::json_schema(gen)
    }
}

#[derive(Debug, Error)]
#[error("Invalid colour: {0}, expected #rrggbb or #rrggbbaa")]
pub struct ColorParseError(String);

/// Frame background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Background {
    Solid { color: Color },
    /// Vertical two-stop gradient
    Gradient { top: Color, bottom: Color },
}

impl Default for Background {
    fn default() -> Self {
        Background::Solid {
            color: Color::rgb(17, 17, 27),
        }
    }
}

/// Caption typography.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Typography {
    /// Font size in pixels at a 1080px short side
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    pub spoken_color: Color,
    pub active_color: Color,
    pub upcoming_color: Color,
    /// Pill drawn behind the active word
    pub highlight_color: Color,
    #[serde(default)]
    pub uppercase: bool,
    /// TTF/OTF file used instead of the system font
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_path: Option<String>,
}

fn default_font_size() -> u32 {
    72
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            spoken_color: Color::WHITE,
            active_color: Color::rgb(255, 214, 10),
            upcoming_color: Color::rgba(255, 255, 255, 110),
            highlight_color: Color::rgba(255, 255, 255, 40),
            uppercase: false,
            font_path: None,
        }
    }
}

/// Vertical placement of the caption block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAnchor {
    Top,
    #[default]
    Center,
    Bottom,
}

impl VerticalAnchor {
    /// Returns the normalized Y position of the caption block centre.
    pub fn to_normalized(&self) -> f32 {
        match self {
            VerticalAnchor::Top => 0.22,
            VerticalAnchor::Center => 0.50,
            VerticalAnchor::Bottom => 0.78,
        }
    }
}

/// Caption layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Layout {
    #[serde(default)]
    pub anchor: VerticalAnchor,
    /// Page size: words visible at once
    #[serde(default = "default_max_words")]
    pub max_words_per_line: usize,
    /// Horizontal padding in pixels at a 1080px short side
    #[serde(default = "default_padding")]
    pub padding: u32,
    /// Line height as a multiple of the font size
    #[serde(default = "default_line_spacing")]
    pub line_spacing: f32,
}

fn default_max_words() -> usize {
    4
}

fn default_padding() -> u32 {
    80
}

fn default_line_spacing() -> f32 {
    1.25
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            anchor: VerticalAnchor::default(),
            max_words_per_line: default_max_words(),
            padding: default_padding(),
            line_spacing: default_line_spacing(),
        }
    }
}

/// Per-word emphasis animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnimationMode {
    /// Colour change only
    None,
    /// Colour change plus a pill behind the active word
    #[default]
    Highlight,
    /// Active word scales down from 1.25x
    Pop,
    /// Active word fades in
    Fade,
}

impl AnimationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnimationMode::None => "none",
            AnimationMode::Highlight => "highlight",
            AnimationMode::Pop => "pop",
            AnimationMode::Fade => "fade",
        }
    }

    /// Whether word frames are split into emphasis sub-frames.
    pub fn has_sub_frames(&self) -> bool {
        matches!(self, AnimationMode::Pop | AnimationMode::Fade)
    }
}

impl fmt::Display for AnimationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Complete style for one export. Immutable once a job is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StyleTemplate {
    #[serde(default = "default_template_id")]
    pub id: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub background: Background,
    #[serde(default)]
    pub typography: Typography,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub animation: AnimationMode,
}

fn default_template_id() -> String {
    "custom".to_string()
}

impl Default for StyleTemplate {
    fn default() -> Self {
        Self {
            id: "classic".to_string(),
            aspect_ratio: AspectRatio::Portrait,
            background: Background::default(),
            typography: Typography::default(),
            layout: Layout::default(),
            animation: AnimationMode::Highlight,
        }
    }
}

impl StyleTemplate {
    /// Ids of the built-in catalog.
    pub const BUILTIN_IDS: &'static [&'static str] = &["classic", "bold", "minimal", "square"];

    /// Resolve a built-in template by id.
    pub fn builtin(id: &str) -> Result<Self, TemplateNotFound> {
        let template = match id.trim().to_lowercase().as_str() {
            "classic" => Self::default(),
            "bold" => Self {
                id: "bold".to_string(),
                background: Background::Gradient {
                    top: Color::rgb(98, 0, 234),
                    bottom: Color::rgb(236, 64, 122),
                },
                typography: Typography {
                    font_size: 96,
                    active_color: Color::rgb(255, 235, 59),
                    highlight_color: Color::rgba(0, 0, 0, 90),
                    uppercase: true,
                    ..Typography::default()
                },
                layout: Layout {
                    max_words_per_line: 3,
                    ..Layout::default()
                },
                animation: AnimationMode::Pop,
                ..Self::default()
            },
            "minimal" => Self {
                id: "minimal".to_string(),
                background: Background::Solid {
                    color: Color::rgb(250, 250, 250),
                },
                typography: Typography {
                    font_size: 64,
                    spoken_color: Color::rgb(33, 33, 33),
                    active_color: Color::rgb(0, 0, 0),
                    upcoming_color: Color::rgb(189, 189, 189),
                    highlight_color: Color::rgba(0, 0, 0, 0),
                    ..Typography::default()
                },
                layout: Layout {
                    anchor: VerticalAnchor::Bottom,
                    max_words_per_line: 6,
                    ..Layout::default()
                },
                animation: AnimationMode::Fade,
                ..Self::default()
            },
            "square" => Self {
                id: "square".to_string(),
                aspect_ratio: AspectRatio::Square,
                layout: Layout {
                    max_words_per_line: 3,
                    padding: 60,
                    ..Layout::default()
                },
                ..Self::default()
            },
            _ => return Err(TemplateNotFound(id.to_string())),
        };
        Ok(template)
    }

    /// Sanity-check numeric fields of an inline template.
    pub fn validate(&self) -> Result<(), String> {
        if !(12..=400).contains(&self.typography.font_size) {
            return Err(format!(
                "font_size {} out of range 12-400",
                self.typography.font_size
            ));
        }
        if self.layout.max_words_per_line == 0 {
            return Err("max_words_per_line must be at least 1".to_string());
        }
        if !(self.layout.line_spacing.is_finite() && self.layout.line_spacing > 0.0) {
            return Err("line_spacing must be positive".to_string());
        }
        if self.layout.padding >= 540 {
            return Err(format!("padding {} leaves no room for text", self.layout.padding));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
#[error("Unknown template: {0}")]
pub struct TemplateNotFound(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_parse() {
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait);
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::Landscape);
        assert!("3:2".parse::<AspectRatio>().is_err());

        let json = serde_json::to_string(&AspectRatio::InstagramPortrait).unwrap();
        assert_eq!(json, "\"4:5\"");
    }

    #[test]
    fn test_canvas_sizes() {
        assert_eq!(AspectRatio::Portrait.canvas_size(1080), (1080, 1920));
        assert_eq!(AspectRatio::Square.canvas_size(1080), (1080, 1080));
        assert_eq!(AspectRatio::InstagramPortrait.canvas_size(1080), (1080, 1350));
        assert_eq!(AspectRatio::Landscape.canvas_size(1080), (1920, 1080));
        // Odd sizes are rounded down to even
        let (w, h) = AspectRatio::Portrait.canvas_size(101);
        assert_eq!((w % 2, h % 2), (0, 0));
    }

    #[test]
    fn test_color_parse() {
        assert_eq!("#ff0000".parse::<Color>().unwrap(), Color::rgb(255, 0, 0));
        assert_eq!(
            "#00000080".parse::<Color>().unwrap(),
            Color::rgba(0, 0, 0, 128)
        );
        assert!("ff0000".parse::<Color>().is_err());
        assert!("#ff00".parse::<Color>().is_err());
        assert_eq!(Color::rgb(1, 2, 3).to_string(), "#010203");
    }

    #[test]
    fn test_builtin_catalog() {
        for id in StyleTemplate::BUILTIN_IDS {
            let template = StyleTemplate::builtin(id).unwrap();
            assert_eq!(template.id, *id);
            assert!(template.validate().is_ok());
        }
        assert!(StyleTemplate::builtin("neon").is_err());
        assert_eq!(
            StyleTemplate::builtin("square").unwrap().aspect_ratio,
            AspectRatio::Square
        );
    }

    #[test]
    fn test_inline_template_defaults() {
        let json = r##"{
            "aspect_ratio": "1:1",
            "background": {"type": "gradient", "top": "#000000", "bottom": "#ffffff"},
            "typography": {
                "spoken_color": "#ffffff",
                "active_color": "#ffcc00",
                "upcoming_color": "#ffffff80",
                "highlight_color": "#00000000"
            },
            "animation": "pop"
        }"##;
        let template: StyleTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.id, "custom");
        assert_eq!(template.typography.font_size, 72);
        assert_eq!(template.layout.max_words_per_line, 4);
        assert_eq!(template.animation, AnimationMode::Pop);
        assert!(template.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_words_per_line() {
        let mut template = StyleTemplate::default();
        template.layout.max_words_per_line = 0;
        assert!(template.validate().is_err());
    }
}
