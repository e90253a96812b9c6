use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use logging_timer::time;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::{
    answer_key::{read_answer_key, AnswerKey, AnswerKeyError},
    bubbles::find_bubble_candidates,
    debug::{
        draw_candidate_rects_debug_image_mut, draw_mask_debug_image_mut,
        draw_scored_bubbles_debug_image_mut, ImageDebugWriter,
    },
    grid::{order_bubbles, LayoutMode, OrderedBubbles},
    image_utils::{binarize, to_intensity},
    layout::{LayoutError, SheetLayout},
    marks::{select_marks, MarkedSheet},
    scoring::{score_response, ScoreReport},
    types::SheetName,
};

#[derive(Debug, Clone, Default)]
pub struct ScoringOptions {
    pub debug: bool,
    pub layout: SheetLayout,
}

/// Failures that stop a whole batch before any sheet is scored.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid sheet layout")]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    AnswerKey(#[from] AnswerKeyError),
}

/// Failures confined to a single sheet.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("unable to open image {path}")]
    ImageOpen {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("could not detect enough bubbles ({found} found, {required} required)")]
    InsufficientCandidates { found: usize, required: usize },

    #[error("invalid sheet layout")]
    InvalidLayout(#[from] LayoutError),

    #[error("unexpected failure: {0}")]
    Panicked(String),
}

/// Something about the detected grid that does not fit the sheet layout.
/// The sheet is still scored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum LayoutWarning {
    /// Candidates past the last complete question, ignored.
    #[serde(rename_all = "camelCase")]
    LeftoverCandidates { count: usize },

    /// A page column whose candidates do not split into whole questions.
    #[serde(rename_all = "camelCase")]
    UnevenColumn { column: usize, candidates: usize },

    /// The grid holds a different number of questions than the layout.
    #[serde(rename_all = "camelCase")]
    QuestionCountMismatch { detected: usize, expected: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSheet {
    pub report: ScoreReport,
    pub candidates: usize,
    pub mode: LayoutMode,
    pub layout_warnings: Vec<LayoutWarning>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetWarning {
    #[serde(rename_all = "camelCase")]
    InsufficientCandidates { found: usize, required: usize },
}

/// What became of one sheet. Every sheet in a batch gets exactly one.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "detail")]
pub enum SheetOutcome {
    Scored(ScoredSheet),
    Warning(SheetWarning),
    Error(String),
}

impl From<Result<ScoredSheet, SheetError>> for SheetOutcome {
    fn from(result: Result<ScoredSheet, SheetError>) -> Self {
        match result {
            Ok(scored) => SheetOutcome::Scored(scored),
            Err(SheetError::InsufficientCandidates { found, required }) => {
                SheetOutcome::Warning(SheetWarning::InsufficientCandidates { found, required })
            }
            Err(e) => SheetOutcome::Error(error_chain(&e)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetResult {
    pub sheet: SheetName,
    pub outcome: SheetOutcome,
}

/// Outcomes for every submitted sheet, in submission order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub layout: SheetLayout,
    pub sheets: Vec<SheetResult>,
}

impl BatchReport {
    pub fn scored(&self) -> impl Iterator<Item = (&SheetName, &ScoredSheet)> {
        self.sheets.iter().filter_map(|result| match &result.outcome {
            SheetOutcome::Scored(scored) => Some((&result.sheet, scored)),
            _ => None,
        })
    }
}

/// Formats an error followed by each of its sources.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with unknown payload".to_string()
    }
}

pub fn sheet_name(path: &Path) -> SheetName {
    SheetName::new(
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
    )
}

#[time]
pub fn load_sheet_image(image_path: &Path) -> Result<GrayImage, SheetError> {
    let img = image::open(image_path).map_err(|source| SheetError::ImageOpen {
        path: image_path.to_path_buf(),
        source,
    })?;
    Ok(to_intensity(&img))
}

/// Flags anything about the grid that does not match the layout.
fn find_layout_warnings(
    ordered: &OrderedBubbles,
    marked: &MarkedSheet,
    layout: &SheetLayout,
) -> Vec<LayoutWarning> {
    let mut warnings = vec![];

    if marked.leftover > 0 {
        warnings.push(LayoutWarning::LeftoverCandidates {
            count: marked.leftover,
        });
    }

    for (column, &candidates) in ordered.band_counts.iter().enumerate() {
        if candidates % layout.options_per_question != 0 {
            warnings.push(LayoutWarning::UnevenColumn { column, candidates });
        }
    }

    let detected = ordered.bubbles.len() / layout.options_per_question;
    if detected != layout.question_count as usize {
        warnings.push(LayoutWarning::QuestionCountMismatch {
            detected,
            expected: layout.question_count,
        });
    }

    warnings
}

/// Runs the full recognition pipeline on one sheet and scores it.
///
/// The layout must already be validated.
#[time]
pub fn interpret_sheet(
    image: &GrayImage,
    key: &AnswerKey,
    layout: &SheetLayout,
    debug: &ImageDebugWriter,
) -> Result<ScoredSheet, SheetError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(SheetError::EmptyImage {
            width: image.width(),
            height: image.height(),
        });
    }

    let mask = binarize(image, layout);
    debug.write("binarized", |canvas| draw_mask_debug_image_mut(canvas, &mask));

    let candidates = find_bubble_candidates(&mask, layout);
    if candidates.len() < layout.min_candidates {
        return Err(SheetError::InsufficientCandidates {
            found: candidates.len(),
            required: layout.min_candidates,
        });
    }

    let ordered = order_bubbles(candidates, layout);
    debug.write("candidates", |canvas| {
        draw_candidate_rects_debug_image_mut(canvas, &ordered.bubbles)
    });

    let marked = select_marks(&ordered.bubbles, &mask, layout);
    debug.write("bubbles", |canvas| {
        draw_scored_bubbles_debug_image_mut(canvas, &marked.bubbles)
    });

    let layout_warnings = find_layout_warnings(&ordered, &marked, layout);
    for warning in &layout_warnings {
        log::warn!("{:?}", warning);
    }

    Ok(ScoredSheet {
        report: score_response(key, &marked.response, layout.question_count),
        candidates: ordered.bubbles.len(),
        mode: ordered.mode,
        layout_warnings,
    })
}

/// Scores one in-memory sheet. Never fails: problems become the outcome.
pub fn score_sheet(
    name: SheetName,
    image: &DynamicImage,
    key: &AnswerKey,
    layout: &SheetLayout,
) -> SheetResult {
    let result = catch_unwind(AssertUnwindSafe(|| {
        layout.validate()?;
        interpret_sheet(&to_intensity(image), key, layout, &ImageDebugWriter::disabled())
    }))
    .unwrap_or_else(|payload| Err(SheetError::Panicked(panic_message(payload))));

    SheetResult {
        sheet: name,
        outcome: result.into(),
    }
}

fn score_sheet_at_path(
    image_path: &Path,
    key: &AnswerKey,
    options: &ScoringOptions,
) -> SheetResult {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let image = load_sheet_image(image_path)?;
        let debug = if options.debug {
            ImageDebugWriter::new(image_path.to_path_buf(), image.clone())
        } else {
            ImageDebugWriter::disabled()
        };
        interpret_sheet(&image, key, &options.layout, &debug)
    }))
    .unwrap_or_else(|payload| Err(SheetError::Panicked(panic_message(payload))));

    let sheet = sheet_name(image_path);
    match &result {
        Ok(scored) => {
            log::debug!("{}:\n{}", sheet, scored.report);
            log::info!(
                "{}: {} / {} ({}%)",
                sheet,
                scored.report.score,
                scored.report.question_count,
                scored.report.percentage()
            );
        }
        Err(SheetError::InsufficientCandidates { .. }) => log::warn!("{}: skipped", sheet),
        Err(e) => log::error!("{}: {}", sheet, error_chain(e)),
    }

    SheetResult {
        sheet,
        outcome: result.into(),
    }
}

/// Scores every sheet against an already loaded key, in parallel.
#[time]
pub fn score_sheets_with_key(
    image_paths: &[PathBuf],
    key: &AnswerKey,
    options: &ScoringOptions,
) -> Result<BatchReport, BatchError> {
    options.layout.validate()?;

    let sheets = image_paths
        .par_iter()
        .map(|path| score_sheet_at_path(path, key, options))
        .collect::<Vec<SheetResult>>();

    Ok(BatchReport {
        layout: options.layout,
        sheets,
    })
}

/// Reads the answer key once, then scores every sheet.
///
/// Only an invalid layout or an unreadable key fails the batch; anything
/// that goes wrong with one sheet is reported in that sheet's outcome.
pub fn score_sheets(
    image_paths: &[PathBuf],
    key_path: &Path,
    options: &ScoringOptions,
) -> Result<BatchReport, BatchError> {
    options.layout.validate()?;
    let key = read_answer_key(key_path)?;
    score_sheets_with_key(image_paths, &key, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::AnswerStatus;
    use crate::test_utils::{answer_pattern, draw_answer_sheet, draw_empty_bubbles};
    use crate::types::Choice;

    fn key_of_all(choice: Choice) -> AnswerKey {
        (1..=100).map(|q| (q, choice)).collect()
    }

    #[test]
    fn reads_a_five_column_sheet() {
        let answers = answer_pattern(100);
        let image = DynamicImage::ImageRgb8(draw_answer_sheet(5, 20, &answers));
        let key = (1..=100u32)
            .filter_map(|q| answers[q as usize - 1].map(|choice| (q, choice)))
            .collect::<AnswerKey>();

        let result = score_sheet(
            SheetName::new("sheet.png"),
            &image,
            &key,
            &SheetLayout::default(),
        );

        let scored = match result.outcome {
            SheetOutcome::Scored(scored) => scored,
            other => panic!("expected a score, got {:?}", other),
        };
        assert_eq!(scored.candidates, 400);
        assert_eq!(scored.mode, LayoutMode::MultiColumn { columns: 5 });
        assert!(scored.layout_warnings.is_empty());
        assert_eq!(scored.report.score, 80);
        assert_eq!(scored.report.count(AnswerStatus::Unanswered), 20);
        for (row, expected) in scored.report.rows.iter().zip(&answers) {
            assert_eq!(row.student_answer, *expected, "question {}", row.question);
        }
    }

    #[test]
    fn wrong_answers_and_missing_key_entries_are_incorrect() {
        let answers = answer_pattern(100);
        let image = DynamicImage::ImageRgb8(draw_answer_sheet(5, 20, &answers));
        let key = (1..=50).map(|q| (q, Choice::A)).collect::<AnswerKey>();

        let result = score_sheet(
            SheetName::new("sheet.png"),
            &image,
            &key,
            &SheetLayout::default(),
        );

        let SheetOutcome::Scored(scored) = result.outcome else {
            panic!("expected a score");
        };
        // questions 1, 6, ... 46 are marked A
        assert_eq!(scored.report.score, 10);
        assert_eq!(scored.report.count(AnswerStatus::Incorrect), 70);
        assert_eq!(scored.report.rows[99].correct_answer, None);
    }

    #[test]
    fn scoring_is_repeatable() {
        let image = DynamicImage::ImageRgb8(draw_answer_sheet(5, 20, &answer_pattern(100)));
        let key = key_of_all(Choice::B);
        let layout = SheetLayout::default();

        let first = score_sheet(SheetName::new("a.png"), &image, &key, &layout);
        let second = score_sheet(SheetName::new("a.png"), &image, &key, &layout);

        assert_eq!(first, second);
    }

    #[test]
    fn too_few_bubbles_is_a_warning() {
        let key = key_of_all(Choice::A);
        let layout = SheetLayout::default();

        let image = DynamicImage::ImageRgb8(draw_empty_bubbles(99));
        let result = score_sheet(SheetName::new("short.png"), &image, &key, &layout);
        assert_eq!(
            result.outcome,
            SheetOutcome::Warning(SheetWarning::InsufficientCandidates {
                found: 99,
                required: 100
            })
        );

        let image = DynamicImage::ImageRgb8(draw_empty_bubbles(100));
        let result = score_sheet(SheetName::new("exact.png"), &image, &key, &layout);
        let SheetOutcome::Scored(scored) = result.outcome else {
            panic!("expected 100 bubbles to be scored");
        };
        assert_eq!(scored.mode, LayoutMode::SingleColumn);
        assert_eq!(scored.report.rows.len(), 100);
        assert_eq!(scored.report.score, 0);
        assert_eq!(
            scored.layout_warnings,
            vec![LayoutWarning::QuestionCountMismatch {
                detected: 25,
                expected: 100
            }]
        );
    }

    #[test]
    fn reads_sheets_with_fewer_questions() {
        let answers = answer_pattern(20);
        let key = (1..=20u32)
            .filter_map(|q| answers[q as usize - 1].map(|choice| (q, choice)))
            .collect::<AnswerKey>();

        let five_columns = SheetLayout::default().with_question_count(20);
        let one_column = SheetLayout {
            column_count: 1,
            ..five_columns
        };

        for (columns, rows, layout) in [(5, 4, five_columns), (1, 20, one_column)] {
            let image = DynamicImage::ImageRgb8(draw_answer_sheet(columns, rows, &answers));
            let result = score_sheet(SheetName::new("quiz.png"), &image, &key, &layout);

            let SheetOutcome::Scored(scored) = result.outcome else {
                panic!(
                    "expected a {}x{} sheet to be scored, got {:?}",
                    columns, rows, result.outcome
                );
            };
            assert_eq!(scored.candidates, 80);
            assert!(scored.layout_warnings.is_empty());
            assert_eq!(scored.report.rows.len(), 20);
            assert_eq!(scored.report.score, 16);
            for (row, expected) in scored.report.rows.iter().zip(&answers) {
                assert_eq!(row.student_answer, *expected, "question {}", row.question);
            }
        }
    }

    #[test]
    fn minimum_above_a_full_sheet_is_an_error() {
        let image = DynamicImage::ImageRgb8(draw_answer_sheet(1, 20, &answer_pattern(20)));
        let layout = SheetLayout {
            question_count: 20,
            ..SheetLayout::default()
        };

        let result = score_sheet(
            SheetName::new("quiz.png"),
            &image,
            &AnswerKey::default(),
            &layout,
        );

        assert!(matches!(
            result.outcome,
            SheetOutcome::Error(ref message) if message.contains("only 80 bubbles")
        ));
    }

    #[test]
    fn empty_image_is_an_error() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::new(0, 0));
        let result = score_sheet(
            SheetName::new("empty.png"),
            &image,
            &AnswerKey::default(),
            &SheetLayout::default(),
        );
        assert!(matches!(
            result.outcome,
            SheetOutcome::Error(ref message) if message.contains("no pixels")
        ));
    }

    #[test]
    fn uneven_columns_are_reported() {
        let ordered = OrderedBubbles {
            mode: LayoutMode::MultiColumn { columns: 3 },
            bubbles: (0..10).map(|i| crate::grid::tests::candidate_at(i * 30, 0)).collect(),
            band_counts: vec![4, 5, 1],
        };
        let marked = MarkedSheet {
            response: Default::default(),
            bubbles: vec![],
            leftover: 2,
        };
        let layout = SheetLayout {
            question_count: 2,
            ..SheetLayout::default()
        };

        assert_eq!(
            find_layout_warnings(&ordered, &marked, &layout),
            vec![
                LayoutWarning::LeftoverCandidates { count: 2 },
                LayoutWarning::UnevenColumn {
                    column: 1,
                    candidates: 5
                },
                LayoutWarning::UnevenColumn {
                    column: 2,
                    candidates: 1
                },
            ]
        );
    }

    #[test]
    fn batch_keeps_going_past_bad_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        draw_answer_sheet(5, 20, &answer_pattern(100)).save(&good).unwrap();
        let short = dir.path().join("short.png");
        draw_empty_bubbles(40).save(&short).unwrap();
        let corrupt = dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"not an image").unwrap();
        let key_path = dir.path().join("key.csv");
        std::fs::write(&key_path, "1-A,2-B,3-C,4-D\n").unwrap();

        let report = score_sheets(
            &[corrupt.clone(), good.clone(), short.clone()],
            &key_path,
            &ScoringOptions::default(),
        )
        .unwrap();

        let names = report
            .sheets
            .iter()
            .map(|result| result.sheet.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(names, vec!["corrupt.png", "good.png", "short.png"]);
        assert!(matches!(report.sheets[0].outcome, SheetOutcome::Error(_)));
        assert!(matches!(report.sheets[1].outcome, SheetOutcome::Scored(_)));
        assert!(matches!(report.sheets[2].outcome, SheetOutcome::Warning(_)));

        let scored = report.scored().collect::<Vec<_>>();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].1.report.score, 4);
    }

    #[test]
    fn debug_mode_writes_images_next_to_the_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = dir.path().join("sheet.png");
        draw_answer_sheet(5, 20, &answer_pattern(100)).save(&sheet).unwrap();
        let options = ScoringOptions {
            debug: true,
            ..ScoringOptions::default()
        };

        let report = score_sheets_with_key(&[sheet], &key_of_all(Choice::A), &options).unwrap();

        assert!(matches!(report.sheets[0].outcome, SheetOutcome::Scored(_)));
        for label in ["binarized", "candidates", "bubbles"] {
            let path = dir.path().join(format!("sheet_debug_{}.png", label));
            assert!(path.exists(), "missing {}", path.display());
        }
    }

    #[test]
    fn unreadable_key_fails_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.csv");
        let result = score_sheets(&[], &missing, &ScoringOptions::default());
        assert!(matches!(
            result,
            Err(BatchError::AnswerKey(AnswerKeyError::Io { .. }))
        ));

        let options = ScoringOptions {
            layout: SheetLayout {
                column_count: 0,
                ..SheetLayout::default()
            },
            ..ScoringOptions::default()
        };
        let key_path = dir.path().join("key.csv");
        std::fs::write(&key_path, "1-A\n").unwrap();
        assert!(matches!(
            score_sheets(&[], &key_path, &options),
            Err(BatchError::Layout(LayoutError::NoColumns))
        ));
    }

    #[test]
    fn outcomes_serialize_with_status_tags() {
        let outcome = SheetOutcome::Warning(SheetWarning::InsufficientCandidates {
            found: 12,
            required: 100,
        });
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({
                "status": "warning",
                "detail": { "insufficientCandidates": { "found": 12, "required": 100 } }
            })
        );
    }
}
