//! Storyboard construction.
//!
//! The builder walks the manifest with a single time cursor. Every frame
//! starts where the previous one ended, so the sequence is contiguous from
//! zero; frames shorter than the minimum are stretched and the overshoot is
//! absorbed by whatever comes next.

use vcast_models::encoding::{
    GAP_THRESHOLD_MS, MAX_LEAD_SUB_FRAME_MS, MIN_FRAME_MS, MIN_SUB_FRAME_MS,
};
use vcast_models::{AnimationMode, Manifest, Segment, StyleTemplate};

use super::frame::{FrameDescriptor, FrameKind, FrameScene, SceneWord, WordState};
use crate::error::{MediaError, MediaResult};

const POP_SCALES: [f32; 3] = [1.25, 1.1, 1.0];
const FADE_OPACITIES: [f32; 3] = [0.45, 0.75, 1.0];

/// Storyboard tuning.
#[derive(Debug, Clone, Copy)]
pub struct StoryboardOptions {
    /// Short side of the canvas in pixels
    pub canvas_short_side: u32,
    /// Gaps at or below this are absorbed rather than given an idle frame
    pub gap_threshold_ms: u64,
    /// Minimum frame duration
    pub min_frame_ms: u64,
}

impl Default for StoryboardOptions {
    fn default() -> Self {
        Self {
            canvas_short_side: 1080,
            gap_threshold_ms: GAP_THRESHOLD_MS,
            min_frame_ms: MIN_FRAME_MS,
        }
    }
}

/// Ordered frames covering `0..total_duration_ms`.
#[derive(Debug, Clone)]
pub struct Storyboard {
    pub frames: Vec<FrameDescriptor>,
    pub total_duration_ms: u64,
    pub width: u32,
    pub height: u32,
}

impl Storyboard {
    /// Sum of all frame durations.
    pub fn frames_duration_ms(&self) -> u64 {
        self.frames.iter().map(|f| f.duration_ms).sum()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Build the karaoke storyboard for a video export.
pub fn build_storyboard(
    manifest: &Manifest,
    style: &StyleTemplate,
    total_duration_ms: u64,
    options: &StoryboardOptions,
) -> MediaResult<Storyboard> {
    let last_end = manifest.last_end_ms();
    if total_duration_ms < last_end {
        return Err(MediaError::invalid_storyboard(format!(
            "total duration {}ms is shorter than the last segment end {}ms",
            total_duration_ms, last_end
        )));
    }

    let mut builder = Builder::new(style, options);
    for segment in &manifest.segments {
        builder.fill_gap(segment.start_ms, FrameKind::Idle, Vec::new());
        if segment.has_word_timing() {
            builder.timed_segment(segment);
        } else {
            let words = builder.neutral_words(segment);
            builder.push(segment.end_ms, FrameKind::Segment, words);
        }
    }
    builder.finish(total_duration_ms);

    Ok(Storyboard {
        frames: builder.frames,
        total_duration_ms,
        width: builder.width,
        height: builder.height,
    })
}

/// One slide per segment, every word in the neutral treatment.
pub fn build_slides(
    manifest: &Manifest,
    style: &StyleTemplate,
    options: &StoryboardOptions,
) -> MediaResult<Vec<FrameDescriptor>> {
    if manifest.segments.is_empty() {
        return Err(MediaError::invalid_storyboard("carousel needs at least one segment"));
    }

    let builder = Builder::new(style, options);
    let slides = manifest
        .segments
        .iter()
        .enumerate()
        .map(|(index, segment)| FrameDescriptor {
            index,
            start_ms: segment.start_ms,
            end_ms: segment.end_ms,
            duration_ms: segment.duration_ms(),
            kind: FrameKind::Slide,
            scene: builder.scene(builder.neutral_words(segment)),
        })
        .collect();

    Ok(slides)
}

struct Builder<'a> {
    style: &'a StyleTemplate,
    options: &'a StoryboardOptions,
    width: u32,
    height: u32,
    cursor: u64,
    frames: Vec<FrameDescriptor>,
}

impl<'a> Builder<'a> {
    fn new(style: &'a StyleTemplate, options: &'a StoryboardOptions) -> Self {
        let (width, height) = style.aspect_ratio.canvas_size(options.canvas_short_side);
        Self {
            style,
            options,
            width,
            height,
            cursor: 0,
            frames: Vec::new(),
        }
    }

    /// Emit a frame from the cursor to `end_ms`, stretched to the minimum duration.
    fn push(&mut self, end_ms: u64, kind: FrameKind, words: Vec<SceneWord>) {
        let start_ms = self.cursor;
        let end_ms = end_ms.max(start_ms + self.options.min_frame_ms);
        self.frames.push(FrameDescriptor {
            index: self.frames.len(),
            start_ms,
            end_ms,
            duration_ms: end_ms - start_ms,
            kind,
            scene: self.scene(words),
        });
        self.cursor = end_ms;
    }

    /// Cover `cursor..until` with a filler frame when the gap is significant.
    /// Smaller gaps are left for the next frame, which starts at the cursor.
    fn fill_gap(&mut self, until: u64, kind: FrameKind, words: Vec<SceneWord>) {
        if until > self.cursor + self.options.gap_threshold_ms {
            self.push(until, kind, words);
        }
    }

    fn timed_segment(&mut self, segment: &Segment) {
        let texts = self.display_texts(segment);

        for (i, word) in segment.words.iter().enumerate() {
            // Before the first word the line is all upcoming; later pauses
            // keep the previous word's line with everything so far spoken.
            let pause = if i == 0 {
                self.line(&texts, 0, None, 0, 1.0, 1.0)
            } else {
                self.line(&texts, i - 1, None, i, 1.0, 1.0)
            };
            self.fill_gap(word.start_ms, FrameKind::Pause, pause);
            self.word_frames(&texts, i, word.end_ms);
        }

        if let Some(last) = segment.words.len().checked_sub(1) {
            let spoken = self.line(&texts, last, None, last + 1, 1.0, 1.0);
            self.fill_gap(segment.end_ms, FrameKind::Pause, spoken);
        }
    }

    /// One frame for the active word, or 2-3 emphasis sub-frames whose
    /// durations sum to the word's span.
    fn word_frames(&mut self, texts: &[String], i: usize, end_ms: u64) {
        let span = end_ms.saturating_sub(self.cursor);
        let steps = emphasis_steps(self.style.animation, span);

        let Some((last_step, lead_steps)) = steps.split_last() else {
            return;
        };

        if !lead_steps.is_empty() {
            let lead = (span / steps.len() as u64).min(MAX_LEAD_SUB_FRAME_MS);
            for &(scale, opacity) in lead_steps {
                let words = self.line(texts, i, Some(i), i, scale, opacity);
                self.push(self.cursor + lead, FrameKind::Word, words);
            }
        }

        let (scale, opacity) = *last_step;
        let words = self.line(texts, i, Some(i), i, scale, opacity);
        self.push(end_ms, FrameKind::Word, words);
    }

    fn finish(&mut self, total_ms: u64) {
        if total_ms > self.cursor + self.options.gap_threshold_ms || self.frames.is_empty() {
            self.push(total_ms, FrameKind::Idle, Vec::new());
            return;
        }

        // Land the last frame exactly on the total, never below the minimum.
        let min_frame_ms = self.options.min_frame_ms;
        if let Some(last) = self.frames.last_mut() {
            last.end_ms = total_ms.max(last.start_ms + min_frame_ms);
            last.duration_ms = last.end_ms - last.start_ms;
            self.cursor = last.end_ms;
        }
    }

    /// The page of the line containing `anchor`.
    ///
    /// Words before `spoken_before` are spoken, `active` is highlighted with
    /// the given emphasis, the rest are upcoming.
    fn line(
        &self,
        texts: &[String],
        anchor: usize,
        active: Option<usize>,
        spoken_before: usize,
        scale: f32,
        opacity: f32,
    ) -> Vec<SceneWord> {
        let per_line = self.style.layout.max_words_per_line.max(1);
        let start = (anchor / per_line) * per_line;
        let end = (start + per_line).min(texts.len());

        (start..end)
            .map(|j| {
                if Some(j) == active {
                    SceneWord {
                        text: texts[j].clone(),
                        state: WordState::Active,
                        scale,
                        opacity,
                    }
                } else if j < spoken_before {
                    SceneWord::new(texts[j].clone(), WordState::Spoken)
                } else {
                    SceneWord::new(texts[j].clone(), WordState::Upcoming)
                }
            })
            .collect()
    }

    fn neutral_words(&self, segment: &Segment) -> Vec<SceneWord> {
        self.display_texts(segment)
            .into_iter()
            .map(|text| SceneWord::new(text, WordState::Neutral))
            .collect()
    }

    fn display_texts(&self, segment: &Segment) -> Vec<String> {
        let words = segment.display_words();
        if self.style.typography.uppercase {
            words.into_iter().map(|w| w.to_uppercase()).collect()
        } else {
            words
        }
    }

    fn scene(&self, words: Vec<SceneWord>) -> FrameScene {
        FrameScene {
            width: self.width,
            height: self.height,
            background: self.style.background,
            typography: self.style.typography.clone(),
            layout: self.style.layout.clone(),
            animation: self.style.animation,
            words,
        }
    }
}

/// Emphasis (scale, opacity) per sub-frame for a word spanning `span_ms`.
fn emphasis_steps(animation: AnimationMode, span_ms: u64) -> Vec<(f32, f32)> {
    let count = if !animation.has_sub_frames() {
        1
    } else if span_ms >= 3 * MIN_SUB_FRAME_MS {
        3
    } else if span_ms >= 2 * MIN_SUB_FRAME_MS {
        2
    } else {
        1
    };

    // Two steps keep the strongest and the resting emphasis.
    let picks: &[usize] = match count {
        3 => &[0, 1, 2],
        2 => &[0, 2],
        _ => &[2],
    };

    picks
        .iter()
        .map(|&k| match animation {
            AnimationMode::Pop => (POP_SCALES[k], 1.0),
            AnimationMode::Fade => (1.0, FADE_OPACITIES[k]),
            AnimationMode::None | AnimationMode::Highlight => (1.0, 1.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vcast_models::Word;

    fn style(animation: AnimationMode) -> StyleTemplate {
        StyleTemplate {
            animation,
            ..StyleTemplate::default()
        }
    }

    fn assert_contiguous(board: &Storyboard) {
        let mut cursor = 0;
        for (i, frame) in board.frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(frame.start_ms, cursor, "gap before frame {i}");
            assert_eq!(frame.duration_ms, frame.end_ms - frame.start_ms);
            assert!(frame.duration_ms >= MIN_FRAME_MS);
            cursor = frame.end_ms;
        }
    }

    fn three_segments() -> Manifest {
        Manifest::new(vec![
            Segment::new("one two", 0, 1500),
            Segment::new("three four", 1600, 3200),
            Segment::new("five six", 3300, 5000),
        ])
        .with_duration(5000)
    }

    #[test]
    fn test_untimed_segments_with_idle_gaps() {
        let board = build_storyboard(
            &three_segments(),
            &style(AnimationMode::Highlight),
            5000,
            &StoryboardOptions::default(),
        )
        .unwrap();

        let kinds: Vec<_> = board.frames.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FrameKind::Segment,
                FrameKind::Idle,
                FrameKind::Segment,
                FrameKind::Idle,
                FrameKind::Segment,
            ]
        );
        assert_eq!(board.frames_duration_ms(), 5000);
        assert_contiguous(&board);
        assert!(board.frames[1].scene.is_blank());
        assert!(board.frames[0]
            .scene
            .words
            .iter()
            .all(|w| w.state == WordState::Neutral));
    }

    #[test]
    fn test_small_gap_absorbed_by_next_frame() {
        let manifest = Manifest::new(vec![
            Segment::new("a", 0, 1000),
            Segment::new("b", 1008, 2000),
        ]);
        let board =
            build_storyboard(&manifest, &StyleTemplate::default(), 2000, &StoryboardOptions::default())
                .unwrap();

        assert_eq!(board.len(), 2);
        assert_eq!(board.frames[1].start_ms, 1000);
        assert_eq!(board.frames[1].end_ms, 2000);
    }

    #[test]
    fn test_word_frames_with_pauses_and_trailing_idle() {
        let manifest = Manifest::new(vec![Segment::new("hi there", 100, 1000).with_words(vec![
            Word::new("hi", 200, 400),
            Word::new("there", 500, 900),
        ])]);
        let board = build_storyboard(
            &manifest,
            &style(AnimationMode::Highlight),
            1500,
            &StoryboardOptions::default(),
        )
        .unwrap();

        let kinds: Vec<_> = board.frames.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FrameKind::Idle,  // 0..100
                FrameKind::Pause, // 100..200, all upcoming
                FrameKind::Word,  // hi
                FrameKind::Pause, // 400..500, "hi" spoken
                FrameKind::Word,  // there
                FrameKind::Pause, // 900..1000, all spoken
                FrameKind::Idle,  // 1000..1500
            ]
        );
        assert_contiguous(&board);
        assert_eq!(board.frames_duration_ms(), 1500);

        let states = |i: usize| -> Vec<WordState> {
            board.frames[i].scene.words.iter().map(|w| w.state).collect()
        };
        assert_eq!(states(1), vec![WordState::Upcoming, WordState::Upcoming]);
        assert_eq!(states(2), vec![WordState::Active, WordState::Upcoming]);
        assert_eq!(states(3), vec![WordState::Spoken, WordState::Upcoming]);
        assert_eq!(states(4), vec![WordState::Spoken, WordState::Active]);
        assert_eq!(states(5), vec![WordState::Spoken, WordState::Spoken]);
    }

    #[test]
    fn test_pop_sub_frames_sum_to_word_duration() {
        let manifest = Manifest::new(vec![Segment::new("boom", 0, 300)
            .with_words(vec![Word::new("boom", 0, 300)])]);
        let board =
            build_storyboard(&manifest, &style(AnimationMode::Pop), 300, &StoryboardOptions::default())
                .unwrap();

        assert_eq!(board.len(), 3);
        let scales: Vec<f32> = board
            .frames
            .iter()
            .map(|f| f.scene.active_word().unwrap().scale)
            .collect();
        assert_eq!(scales, vec![1.25, 1.1, 1.0]);
        assert_eq!(board.frames[0].duration_ms, 80);
        assert_eq!(board.frames[1].duration_ms, 80);
        assert_eq!(board.frames[2].duration_ms, 140);
        assert_eq!(board.frames_duration_ms(), 300);
    }

    #[test]
    fn test_fade_two_sub_frames_for_short_words() {
        let manifest = Manifest::new(vec![Segment::new("hey", 0, 150)
            .with_words(vec![Word::new("hey", 0, 150)])]);
        let board =
            build_storyboard(&manifest, &style(AnimationMode::Fade), 150, &StoryboardOptions::default())
                .unwrap();

        let opacities: Vec<f32> = board
            .frames
            .iter()
            .map(|f| f.scene.active_word().unwrap().opacity)
            .collect();
        assert_eq!(opacities, vec![0.45, 1.0]);
        assert_eq!(board.frames[0].duration_ms, 75);
        assert_eq!(board.frames_duration_ms(), 150);
    }

    #[test]
    fn test_pagination_by_max_words_per_line() {
        let words: Vec<Word> = (0..5)
            .map(|i| Word::new(format!("w{i}"), i * 100, i * 100 + 90))
            .collect();
        let manifest = Manifest::new(vec![Segment::new("w0 w1 w2 w3 w4", 0, 500).with_words(words)]);
        let mut template = style(AnimationMode::None);
        template.layout.max_words_per_line = 2;

        let board =
            build_storyboard(&manifest, &template, 500, &StoryboardOptions::default()).unwrap();
        let word_frames: Vec<&FrameDescriptor> = board
            .frames
            .iter()
            .filter(|f| f.kind == FrameKind::Word)
            .collect();
        assert_eq!(word_frames.len(), 5);

        let texts = |f: &FrameDescriptor| -> Vec<String> {
            f.scene.words.iter().map(|w| w.text.clone()).collect()
        };
        assert_eq!(texts(word_frames[1]), vec!["w0", "w1"]);
        assert_eq!(texts(word_frames[2]), vec!["w2", "w3"]);
        assert_eq!(texts(word_frames[4]), vec!["w4"]);
        assert_eq!(word_frames[3].scene.words[0].state, WordState::Spoken);
    }

    #[test]
    fn test_uppercase_applied() {
        let mut template = StyleTemplate::default();
        template.typography.uppercase = true;
        let manifest = Manifest::new(vec![Segment::new("quiet words", 0, 1000)]);

        let board =
            build_storyboard(&manifest, &template, 1000, &StoryboardOptions::default()).unwrap();
        assert_eq!(board.frames[0].scene.words[0].text, "QUIET");
    }

    #[test]
    fn test_min_frame_clamp_and_drift_absorbed() {
        let manifest = Manifest::new(vec![Segment::new("a b c", 0, 1000).with_words(vec![
            Word::new("a", 0, 3),
            Word::new("b", 3, 6),
            Word::new("c", 6, 1000),
        ])]);
        let board = build_storyboard(&manifest, &StyleTemplate::default(), 1000, &StoryboardOptions::default())
            .unwrap();

        assert_eq!(board.frames[0].duration_ms, MIN_FRAME_MS);
        assert_eq!(board.frames[1].start_ms, MIN_FRAME_MS);
        assert_contiguous(&board);
        assert_eq!(board.frames_duration_ms(), 1000);
    }

    #[test]
    fn test_empty_manifest_yields_one_idle_frame() {
        let board = build_storyboard(
            &Manifest::new(Vec::new()),
            &StyleTemplate::default(),
            2000,
            &StoryboardOptions::default(),
        )
        .unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board.frames[0].kind, FrameKind::Idle);
        assert_eq!(board.frames[0].duration_ms, 2000);
    }

    #[test]
    fn test_total_shorter_than_manifest_rejected() {
        assert!(build_storyboard(
            &three_segments(),
            &StyleTemplate::default(),
            4000,
            &StoryboardOptions::default()
        )
        .is_err());
    }

    #[test]
    fn test_slides_one_per_segment() {
        let template = StyleTemplate::builtin("square").unwrap();
        let slides =
            build_slides(&three_segments(), &template, &StoryboardOptions::default()).unwrap();

        assert_eq!(slides.len(), 3);
        assert!(slides.iter().all(|s| s.kind == FrameKind::Slide));
        assert_eq!((slides[0].scene.width, slides[0].scene.height), (1080, 1080));
        assert_eq!(slides[2].scene.words.len(), 2);
        assert!(build_slides(&Manifest::default(), &template, &StoryboardOptions::default()).is_err());
    }

    fn animation_strategy() -> impl Strategy<Value = AnimationMode> {
        prop_oneof![
            Just(AnimationMode::None),
            Just(AnimationMode::Highlight),
            Just(AnimationMode::Pop),
            Just(AnimationMode::Fade),
        ]
    }

    /// (gap before segment, [(gap before word, word duration)], tail after last word)
    fn segments_strategy() -> impl Strategy<Value = Vec<(u64, Vec<(u64, u64)>, u64)>> {
        prop::collection::vec(
            (
                0u64..400,
                prop::collection::vec((0u64..200, MIN_FRAME_MS..800), 0..6),
                0u64..300,
            ),
            0..6,
        )
    }

    fn manifest_from(layout: &[(u64, Vec<(u64, u64)>, u64)]) -> Manifest {
        let mut cursor = 0;
        let mut segments = Vec::new();

        for (gap, words, tail) in layout {
            let start = cursor + gap;
            let mut t = start;
            let mut timed = Vec::new();
            for (i, (word_gap, duration)) in words.iter().enumerate() {
                let word_start = t + word_gap;
                timed.push(Word::new(format!("w{i}"), word_start, word_start + duration));
                t = word_start + duration;
            }
            let end = if timed.is_empty() {
                start + MIN_FRAME_MS + tail
            } else {
                t + tail
            };
            segments.push(Segment::new("placeholder text", start, end).with_words(timed));
            cursor = end;
        }

        Manifest::new(segments)
    }

    #[test]
    fn proptest_storyboard_covers_total_duration() {
        proptest!(|(
            layout in segments_strategy(),
            trailing in 0u64..1000,
            animation in animation_strategy()
        )| {
            let manifest = manifest_from(&layout);
            prop_assert!(manifest.validate(u64::MAX).is_ok());
            let total = manifest.last_end_ms() + trailing;

            let board = build_storyboard(
                &manifest,
                &style(animation),
                total,
                &StoryboardOptions::default(),
            ).unwrap();

            let sum = board.frames_duration_ms();
            prop_assert!(sum.abs_diff(total) <= MIN_FRAME_MS, "sum {} vs total {}", sum, total);

            let mut cursor = 0;
            for frame in &board.frames {
                prop_assert_eq!(frame.start_ms, cursor);
                prop_assert!(frame.duration_ms >= MIN_FRAME_MS);
                cursor = frame.end_ms;
            }
        });
    }
}
