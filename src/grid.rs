use logging_timer::time;
use serde::{Deserialize, Serialize};

use crate::{bubbles::BubbleCandidate, layout::SheetLayout};

/// How the candidates of a sheet are put into reading order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum LayoutMode {
    /// Sorted left to right, then top to bottom.
    SingleColumn,
    /// Split into equal-width page columns, each read top to bottom.
    MultiColumn { columns: usize },
}

impl LayoutMode {
    pub fn for_candidate_count(count: usize, layout: &SheetLayout) -> Self {
        if count > layout.multi_column_threshold {
            LayoutMode::MultiColumn {
                columns: layout.column_count,
            }
        } else {
            LayoutMode::SingleColumn
        }
    }
}

/// Equal-width vertical slices of the horizontal span covered by candidates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ColumnBands {
    pub min_x: i32,
    pub band_width: f32,
    pub count: usize,
}

impl ColumnBands {
    /// Computes the bands from the left edges of the candidates, or `None`
    /// if there are no candidates.
    pub fn from_candidates(candidates: &[BubbleCandidate], count: usize) -> Option<Self> {
        let min_x = candidates.iter().map(BubbleCandidate::left).min()?;
        let max_x = candidates.iter().map(BubbleCandidate::left).max()?;
        Some(Self {
            min_x,
            band_width: (max_x - min_x) as f32 / count as f32,
            count,
        })
    }

    /// The band `x` falls in. Anything at or past the right edge of the last
    /// band is clamped into it.
    pub fn band_for_x(&self, x: i32) -> usize {
        if self.band_width <= 0.0 || x <= self.min_x {
            return 0;
        }
        let band = ((x - self.min_x) as f32 / self.band_width).floor() as usize;
        band.min(self.count.saturating_sub(1))
    }
}

/// Candidates in reading order: question by question, option by option.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderedBubbles {
    pub mode: LayoutMode,
    pub bubbles: Vec<BubbleCandidate>,
    /// Number of candidates that landed in each band. Empty in single
    /// column mode.
    pub band_counts: Vec<usize>,
}

/// Sorts candidates into reading order.
///
/// Up to `multi_column_threshold` candidates are read as one column band
/// sorted by `(x, y)`. Past that, the page is assumed to hold
/// `column_count` columns of questions: each candidate is assigned to the
/// band its left edge falls in and the result is sorted by `(band, y)`,
/// keeping candidates on the same row in left-to-right order.
#[time]
pub fn order_bubbles(mut candidates: Vec<BubbleCandidate>, layout: &SheetLayout) -> OrderedBubbles {
    let mode = LayoutMode::for_candidate_count(candidates.len(), layout);

    match mode {
        LayoutMode::SingleColumn => {
            candidates.sort_by_key(|c| (c.left(), c.top()));
            OrderedBubbles {
                mode,
                bubbles: candidates,
                band_counts: vec![],
            }
        }
        LayoutMode::MultiColumn { columns } => {
            let bands = match ColumnBands::from_candidates(&candidates, columns) {
                Some(bands) => bands,
                None => {
                    return OrderedBubbles {
                        mode,
                        bubbles: candidates,
                        band_counts: vec![],
                    }
                }
            };

            candidates.sort_by_key(|c| (bands.band_for_x(c.left()), c.top(), c.left()));

            let mut band_counts = vec![0; columns];
            for candidate in &candidates {
                band_counts[bands.band_for_x(candidate.left())] += 1;
            }
            log::debug!(
                "multi-column layout {:?}, band counts {:?}",
                bands,
                band_counts
            );

            OrderedBubbles {
                mode,
                bubbles: candidates,
                band_counts,
            }
        }
    }
}
