//! Dense score matrix produced by the classifier.

use std::io::{self, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::math::format::format_row;

/// Match scores, one row per window start and one column per model.
///
/// Scores are directional-agreement sums: each of the `match_steps` steps in
/// a window contributes a value in `[-1, 1]`, so a perfect match scores
/// `match_steps`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoreMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl ScoreMatrix {
    /// All-zero matrix.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Number of scored windows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of models.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Whether the matrix holds no scores.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Score of `model` for the window starting at `window`.
    #[must_use]
    pub fn get(&self, window: usize, model: usize) -> Option<f64> {
        (window < self.rows && model < self.cols).then(|| self.data[window * self.cols + model])
    }

    pub(crate) fn set(&mut self, window: usize, model: usize, value: f64) {
        self.data[window * self.cols + model] = value;
    }

    /// Scores of every model for one window.
    ///
    /// # Panics
    ///
    /// Panics if `window >= rows()`.
    #[must_use]
    pub fn row(&self, window: usize) -> &[f64] {
        &self.data[window * self.cols..(window + 1) * self.cols]
    }

    /// Iterate over window rows.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }

    /// Index of the best scoring model for each window.
    #[must_use]
    pub fn best_models(&self) -> Vec<Option<usize>> {
        self.iter_rows()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, _)| i)
            })
            .collect()
    }

    /// Row-major scores.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Write tab-separated rows, one line per window.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn write_tsv<W: Write>(&self, mut out: W) -> io::Result<()> {
        for row in self.iter_rows() {
            writeln!(out, "{}", format_row(row, '\t'))?;
        }
        out.flush()
    }

    /// Render the tab-separated form into a string.
    #[must_use]
    pub fn to_tsv(&self) -> String {
        let mut buf = Vec::new();
        let _ = self.write_tsv(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}
