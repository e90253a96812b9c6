use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use logging_timer::time;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Choice;

/// A question number, a space, hyphen or period, then a letter A-D.
static KEY_ENTRY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*[-.\s]\s*([a-d])")
        .unwrap_or_else(|e| panic!("Failed to compile key entry pattern: {e}"))
});

/// The correct answer for each question number. Need not be contiguous.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerKey(BTreeMap<u32, Choice>);

impl AnswerKey {
    pub fn get(&self, question: u32) -> Option<Choice> {
        self.0.get(&question).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(u32, Choice)> for AnswerKey {
    fn from_iter<I: IntoIterator<Item = (u32, Choice)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Error)]
pub enum AnswerKeyError {
    #[error("failed to read answer key {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("answer key is not valid UTF-8")]
    NotUtf8(#[source] std::string::FromUtf8Error),

    #[error("answer key has no data")]
    Empty,

    #[error("answer key line {line} has {found} cells, expected at most {expected}")]
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// Reads an answer key file. See [`parse_answer_key`].
#[time]
pub fn read_answer_key(path: &Path) -> Result<AnswerKey, AnswerKeyError> {
    let bytes = std::fs::read(path).map_err(|source| AnswerKeyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(AnswerKeyError::NotUtf8)?;
    let key = parse_answer_key(&text)?;
    log::info!("read {} answers from {}", key.len(), path.display());
    Ok(key)
}

/// Builds an answer key from comma separated text with no header row.
///
/// Every non-empty cell is searched for an entry like `37-B`, `37 b` or
/// `37.B`; cells without one are skipped. Cells are visited row by row, so a
/// question number appearing twice takes the letter of the later cell.
///
/// Fails as a whole if the text has no rows or a row is wider than the
/// first one.
pub fn parse_answer_key(text: &str) -> Result<AnswerKey, AnswerKeyError> {
    let mut answers = BTreeMap::new();
    let mut expected_cells = None;

    for Row { line, cells } in split_rows(text) {
        let expected = *expected_cells.get_or_insert(cells.len());
        if cells.len() > expected {
            return Err(AnswerKeyError::RaggedRow {
                line,
                expected,
                found: cells.len(),
            });
        }

        for cell in cells.iter().filter(|cell| !cell.is_empty()) {
            match parse_key_entry(cell) {
                Some((question, choice)) => {
                    answers.insert(question, choice);
                }
                None => log::trace!("skipping key cell {:?}", cell),
            }
        }
    }

    if expected_cells.is_none() {
        return Err(AnswerKeyError::Empty);
    }

    Ok(AnswerKey(answers))
}

/// Extracts `(question, letter)` from one key cell.
pub fn parse_key_entry(cell: &str) -> Option<(u32, Choice)> {
    let captures = KEY_ENTRY_PATTERN.captures(cell)?;
    let question = captures.get(1)?.as_str().parse::<u32>().ok()?;
    let letter = captures.get(2)?.as_str().chars().next()?;
    if question == 0 {
        return None;
    }
    Choice::try_from(letter).ok().map(|choice| (question, choice))
}

/// A row of cells and the line it starts on.
struct Row {
    line: usize,
    cells: Vec<String>,
}

/// Splits text into rows of cells, dropping blank lines. Double-quoted cells
/// may contain commas and line breaks, and `""` inside quotes is a literal
/// quote.
fn split_rows(text: &str) -> Vec<Row> {
    let mut rows = vec![];
    let mut cells = vec![];
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut blank = true;
    let mut line = 1;
    let mut row_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => {
                in_quotes = !in_quotes;
                blank = false;
            }
            ',' if !in_quotes => {
                cells.push(std::mem::take(&mut cell));
                blank = false;
            }
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                cells.push(std::mem::take(&mut cell));
                let row_cells = std::mem::take(&mut cells);
                if !blank {
                    rows.push(Row {
                        line: row_line,
                        cells: row_cells,
                    });
                }
                blank = true;
                line += 1;
                row_line = line;
            }
            _ => {
                if c == '\n' {
                    line += 1;
                }
                blank &= c.is_whitespace();
                cell.push(c);
            }
        }
    }

    if !blank {
        cells.push(cell);
        rows.push(Row {
            line: row_line,
            cells,
        });
    }

    rows
}
