use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Choice;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size<T> {
    pub width: T,
    pub height: T,
}

/// Inclusive range of accepted bubble aspect ratios (width / height).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AspectRange {
    pub min: f32,
    pub max: f32,
}

impl AspectRange {
    pub fn contains(&self, aspect_ratio: f32) -> bool {
        aspect_ratio >= self.min && aspect_ratio <= self.max
    }
}

/// Describes the printed answer sheet and the constants used to read it.
///
/// The defaults describe a 100 question, 4 option sheet printed in 5 columns
/// of 20 questions each.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SheetLayout {
    /// Number of questions the score report covers.
    pub question_count: u32,
    pub options_per_question: usize,
    /// Page columns assumed when the multi-column ordering kicks in.
    pub column_count: usize,
    /// More candidates than this switches to multi-column ordering.
    pub multi_column_threshold: usize,
    /// Fewer accepted candidates than this and the sheet is not scored.
    pub min_candidates: usize,
    pub min_bubble_size: Size<u32>,
    pub aspect_ratio: AspectRange,
    /// Foreground pixel count a bubble must exceed to count as filled.
    pub fill_threshold: u32,
    /// Side length in pixels of the adaptive threshold window. Must be odd.
    pub threshold_block_size: u32,
    pub threshold_offset: u8,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            question_count: 100,
            options_per_question: 4,
            column_count: 5,
            multi_column_threshold: 100,
            min_candidates: 100,
            min_bubble_size: Size {
                width: 20,
                height: 20,
            },
            aspect_ratio: AspectRange { min: 0.8, max: 1.3 },
            fill_threshold: 150,
            threshold_block_size: 51,
            threshold_offset: 2,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("question count must be positive")]
    NoQuestions,

    #[error("options per question must be between 1 and {max}, got {found}")]
    UnsupportedOptionCount { found: usize, max: usize },

    #[error("column count must be positive")]
    NoColumns,

    #[error("threshold block size must be odd and at least 3, got {0}")]
    InvalidBlockSize(u32),

    #[error("aspect ratio range {min}..={max} is empty")]
    EmptyAspectRange { min: f32, max: f32 },

    #[error(
        "at least {min_candidates} candidates required but a full sheet has only {bubbles} bubbles"
    )]
    UnreachableMinimum { min_candidates: usize, bubbles: usize },
}

impl SheetLayout {
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.question_count == 0 {
            return Err(LayoutError::NoQuestions);
        }
        if self.options_per_question == 0 || self.options_per_question > Choice::ALL.len() {
            return Err(LayoutError::UnsupportedOptionCount {
                found: self.options_per_question,
                max: Choice::ALL.len(),
            });
        }
        if self.column_count == 0 {
            return Err(LayoutError::NoColumns);
        }
        if self.threshold_block_size < 3 || self.threshold_block_size % 2 == 0 {
            return Err(LayoutError::InvalidBlockSize(self.threshold_block_size));
        }
        if !(self.aspect_ratio.min <= self.aspect_ratio.max) {
            return Err(LayoutError::EmptyAspectRange {
                min: self.aspect_ratio.min,
                max: self.aspect_ratio.max,
            });
        }
        if self.min_candidates > self.bubble_count() {
            return Err(LayoutError::UnreachableMinimum {
                min_candidates: self.min_candidates,
                bubbles: self.bubble_count(),
            });
        }
        Ok(())
    }

    /// Bubbles printed on a complete sheet.
    pub fn bubble_count(&self) -> usize {
        self.question_count as usize * self.options_per_question
    }

    /// Changes the question count along with the candidate thresholds that
    /// depend on it. A sheet must show at least one candidate per question,
    /// and more than that switches to multi-column ordering.
    pub fn with_question_count(self, question_count: u32) -> Self {
        Self {
            question_count,
            min_candidates: question_count as usize,
            multi_column_threshold: question_count as usize,
            ..self
        }
    }

    /// Gaussian sigma matching the threshold window, using the same rule
    /// OpenCV applies to derive a sigma from a kernel size.
    pub fn threshold_sigma(&self) -> f32 {
        0.3 * ((self.threshold_block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }
}
