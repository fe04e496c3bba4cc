//! Frame descriptors produced by the storyboard.

use serde::{Deserialize, Serialize};
use vcast_models::{AnimationMode, Background, Layout, Typography};

/// Why a frame exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Nothing being said: background only
    Idle,
    /// One word (or one emphasis step of a word) is active
    Word,
    /// Inside a segment, between words
    Pause,
    /// A segment without word timing, shown whole
    Segment,
    /// One carousel slide
    Slide,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Idle => "idle",
            FrameKind::Word => "word",
            FrameKind::Pause => "pause",
            FrameKind::Segment => "segment",
            FrameKind::Slide => "slide",
        }
    }
}

/// Treatment of a word on the current line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordState {
    Spoken,
    Active,
    Upcoming,
    /// No timing information; every word drawn alike
    Neutral,
}

/// A word as it appears in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneWord {
    pub text: String,
    pub state: WordState,
    /// Font scale relative to the template size
    pub scale: f32,
    /// Colour opacity multiplier
    pub opacity: f32,
}

impl SceneWord {
    pub fn new(text: impl Into<String>, state: WordState) -> Self {
        Self {
            text: text.into(),
            state,
            scale: 1.0,
            opacity: 1.0,
        }
    }
}

/// Everything needed to draw one frame, without reference to any other frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameScene {
    pub width: u32,
    pub height: u32,
    pub background: Background,
    pub typography: Typography,
    pub layout: Layout,
    pub animation: AnimationMode,
    /// The visible caption line, in reading order
    pub words: Vec<SceneWord>,
}

impl FrameScene {
    pub fn active_word(&self) -> Option<&SceneWord> {
        self.words.iter().find(|w| w.state == WordState::Active)
    }

    pub fn is_blank(&self) -> bool {
        self.words.is_empty()
    }
}

/// One timed still image of the storyboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    pub kind: FrameKind,
    pub scene: FrameScene,
}

impl FrameDescriptor {
    /// File name used for the rendered frame.
    pub fn file_name(&self) -> String {
        format!("frame_{:05}.png", self.index)
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}
