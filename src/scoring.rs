use std::fmt::Display;

use serde::{ser::SerializeStruct, Serialize, Serializer};

use crate::{answer_key::AnswerKey, marks::StudentResponse, types::Choice};

pub const UNANSWERED: &str = "Unanswered";
pub const NOT_IN_KEY: &str = "N/A";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum AnswerStatus {
    Correct,
    Incorrect,
    Unanswered,
}

impl AnswerStatus {
    /// A marked answer is correct only if the key has the same letter; a
    /// question missing from the key can never be answered correctly.
    pub fn of(student_answer: Option<Choice>, correct_answer: Option<Choice>) -> Self {
        match (student_answer, correct_answer) {
            (None, _) => AnswerStatus::Unanswered,
            (Some(student), Some(correct)) if student == correct => AnswerStatus::Correct,
            (Some(_), _) => AnswerStatus::Incorrect,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRow {
    pub question: u32,
    #[serde(serialize_with = "serialize_student_answer")]
    pub student_answer: Option<Choice>,
    #[serde(serialize_with = "serialize_correct_answer")]
    pub correct_answer: Option<Choice>,
    pub status: AnswerStatus,
}

fn serialize_student_answer<S: Serializer>(
    answer: &Option<Choice>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match answer {
        Some(choice) => choice.serialize(serializer),
        None => serializer.serialize_str(UNANSWERED),
    }
}

fn serialize_correct_answer<S: Serializer>(
    answer: &Option<Choice>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match answer {
        Some(choice) => choice.serialize(serializer),
        None => serializer.serialize_str(NOT_IN_KEY),
    }
}

impl Display for ScoreRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let student = self
            .student_answer
            .map_or_else(|| UNANSWERED.to_string(), |c| c.to_string());
        let correct = self
            .correct_answer
            .map_or_else(|| NOT_IN_KEY.to_string(), |c| c.to_string());
        write!(
            f,
            "{:>3}  {:<10}  {:<7}  {:?}",
            self.question, student, correct, self.status
        )
    }
}

/// Per-question verdicts for one sheet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreReport {
    pub score: u32,
    pub question_count: u32,
    pub rows: Vec<ScoreRow>,
}

impl Serialize for ScoreReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut report = serializer.serialize_struct("ScoreReport", 4)?;
        report.serialize_field("score", &self.score)?;
        report.serialize_field("questionCount", &self.question_count)?;
        report.serialize_field("percentage", &self.percentage())?;
        report.serialize_field("rows", &self.rows)?;
        report.end()
    }
}

/// One row per question, then the summary line.
impl Display for ScoreReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in &self.rows {
            writeln!(f, "{}", row)?;
        }
        write!(f, "{}", self.summary())
    }
}

impl ScoreReport {
    pub fn percentage(&self) -> f32 {
        if self.question_count == 0 {
            return 0.0;
        }
        self.score as f32 * 100.0 / self.question_count as f32
    }

    /// `Score: N / M (P%)`
    pub fn summary(&self) -> String {
        format!(
            "Score: {} / {} ({}%)",
            self.score,
            self.question_count,
            self.percentage()
        )
    }

    pub fn count(&self, status: AnswerStatus) -> usize {
        self.rows.iter().filter(|row| row.status == status).count()
    }
}

/// Grades questions `1..=question_count` against the key. Questions that
/// were not detected on the sheet are reported as unanswered.
pub fn score_response(
    key: &AnswerKey,
    response: &StudentResponse,
    question_count: u32,
) -> ScoreReport {
    let rows = (1..=question_count)
        .map(|question| {
            let student_answer = response.get(question);
            let correct_answer = key.get(question);
            ScoreRow {
                question,
                student_answer,
                correct_answer,
                status: AnswerStatus::of(student_answer, correct_answer),
            }
        })
        .collect::<Vec<ScoreRow>>();

    let score = rows
        .iter()
        .filter(|row| row.status == AnswerStatus::Correct)
        .count() as u32;

    ScoreReport {
        score,
        question_count,
        rows,
    }
}
