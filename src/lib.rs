//! Reads hand-marked bubble sheets and scores them against an answer key.
//!
//! A sheet goes through a fixed pipeline: the image is binarized with a
//! locally adaptive threshold ([`image_utils::binarize`]), bubble-shaped ink
//! regions are picked out of the mask ([`bubbles::find_bubble_candidates`]),
//! put into reading order ([`grid::order_bubbles`]), read four at a time
//! ([`marks::select_marks`]) and finally graded ([`scoring::score_response`]).

pub mod answer_key;
pub mod bubbles;
pub mod debug;
pub mod geometry;
pub mod grid;
pub mod image_utils;
pub mod interpret;
pub mod layout;
pub mod marks;
pub mod scoring;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use answer_key::{read_answer_key, AnswerKey, AnswerKeyError};
pub use interpret::{
    score_sheet, score_sheets, score_sheets_with_key, BatchError, BatchReport, ScoringOptions,
    SheetOutcome, SheetResult,
};
pub use layout::SheetLayout;
pub use scoring::{AnswerStatus, ScoreReport, ScoreRow};
pub use types::{Choice, SheetName};
