//! Word-timed transcript (timing manifest).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single timed word inside a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Word {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl Word {
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// A caption span, optionally broken down into timed words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Word>,
}

impl Segment {
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
            words: Vec::new(),
        }
    }

    pub fn with_words(mut self, words: Vec<Word>) -> Self {
        self.words = words;
        self
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub fn has_word_timing(&self) -> bool {
        !self.words.is_empty()
    }

    /// Words to display: the timed words, or the whitespace-split text.
    pub fn display_words(&self) -> Vec<String> {
        if self.words.is_empty() {
            self.text.split_whitespace().map(str::to_string).collect()
        } else {
            self.words.iter().map(|w| w.text.clone()).collect()
        }
    }
}

/// Timing manifest for an export.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Manifest {
    /// Total program duration. Probed from the audio when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Manifest {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            duration_ms: None,
            segments,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// End of the last segment, or 0 when there are none.
    pub fn last_end_ms(&self) -> u64 {
        self.segments.last().map(|s| s.end_ms).unwrap_or(0)
    }

    /// Declared duration, falling back to the last segment end.
    pub fn total_duration_ms(&self) -> u64 {
        self.duration_ms.unwrap_or_else(|| self.last_end_ms())
    }

    /// Duration used for rendering: declared, then probed, then last segment end.
    ///
    /// Never shorter than the last segment end.
    pub fn resolve_duration_ms(&self, probed_ms: Option<u64>) -> u64 {
        let base = self.duration_ms.or(probed_ms).unwrap_or(0);
        base.max(self.last_end_ms())
    }

    pub fn word_count(&self) -> usize {
        self.segments.iter().map(|s| s.display_words().len()).sum()
    }

    /// Check the duration ceiling, then ordering and containment.
    ///
    /// The ceiling goes first so an over-long program is always reported as
    /// such, even when a segment also runs past the declared duration.
    pub fn validate(&self, max_duration_ms: u64) -> Result<(), ManifestError> {
        let effective = self.total_duration_ms().max(self.last_end_ms());
        if effective > max_duration_ms {
            return Err(ManifestError::DurationExceeded {
                duration_ms: effective,
                max_ms: max_duration_ms,
            });
        }

        let mut prev_end: Option<u64> = None;

        for (index, segment) in self.segments.iter().enumerate() {
            if segment.start_ms >= segment.end_ms {
                return Err(ManifestError::InvertedSegment {
                    index,
                    start_ms: segment.start_ms,
                    end_ms: segment.end_ms,
                });
            }

            if let Some(end) = prev_end {
                if segment.start_ms < end {
                    return Err(ManifestError::OverlappingSegments { index });
                }
            }
            prev_end = Some(segment.end_ms);

            validate_words(index, segment)?;

            if let Some(duration) = self.duration_ms {
                if segment.end_ms > duration {
                    return Err(ManifestError::SegmentPastDuration {
                        index,
                        end_ms: segment.end_ms,
                        duration_ms: duration,
                    });
                }
            }
        }

        Ok(())
    }
}

fn validate_words(segment_index: usize, segment: &Segment) -> Result<(), ManifestError> {
    let mut prev_end: Option<u64> = None;

    for (word, w) in segment.words.iter().enumerate() {
        if w.start_ms >= w.end_ms {
            return Err(ManifestError::InvertedWord {
                segment: segment_index,
                word,
            });
        }

        if w.start_ms < segment.start_ms || w.end_ms > segment.end_ms {
            return Err(ManifestError::WordOutsideSegment {
                segment: segment_index,
                word,
            });
        }

        if let Some(end) = prev_end {
            if w.start_ms < end {
                return Err(ManifestError::OverlappingWords {
                    segment: segment_index,
                    word,
                });
            }
        }
        prev_end = Some(w.end_ms);
    }

    Ok(())
}

/// Manifest rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("Manifest has no segments")]
    Empty,

    #[error("Segment {index} ends before it starts ({start_ms}ms..{end_ms}ms)")]
    InvertedSegment {
        index: usize,
        start_ms: u64,
        end_ms: u64,
    },

    #[error("Segment {index} overlaps the previous segment")]
    OverlappingSegments { index: usize },

    #[error("Word {word} of segment {segment} ends before it starts")]
    InvertedWord { segment: usize, word: usize },

    #[error("Word {word} of segment {segment} overlaps the previous word")]
    OverlappingWords { segment: usize, word: usize },

    #[error("Word {word} lies outside segment {segment}")]
    WordOutsideSegment { segment: usize, word: usize },

    #[error("Segment {index} ends at {end_ms}ms, past the declared duration {duration_ms}ms")]
    SegmentPastDuration {
        index: usize,
        end_ms: u64,
        duration_ms: u64,
    },

    #[error("Export duration {duration_ms}ms exceeds the limit of {max_ms}ms")]
    DurationExceeded { duration_ms: u64, max_ms: u64 },
}
