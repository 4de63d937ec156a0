//! Dense point cloud storage.
//!
//! A [`PointCloud`] is an ordered set of fixed-width vectors kept in a single
//! row-major buffer. Row `i` is the `i`-th sample in time; its columns are raw
//! channels, embedded coordinates or PCA coordinates depending on the stage
//! of the pipeline. Both dimensions are fixed after construction.

use crate::error::{Result, TdeError};

/// Row-major matrix of `f64` samples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl PointCloud {
    /// Wrap an existing row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(TdeError::dimension_mismatch(rows * cols, data.len()));
        }
        Ok(Self { data, rows, cols })
    }

    /// A cloud of `rows` zero vectors.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Build from a slice of equally sized rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows have differing widths.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(TdeError::dimension_mismatch(cols, row.len()));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    /// Single-channel series, one sample per row.
    #[must_use]
    pub fn from_column(values: &[f64]) -> Self {
        Self {
            data: values.to_vec(),
            rows: values.len(),
            cols: 1,
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Width of each row.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Whether the cloud holds no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Borrow row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows()`.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Mutably borrow row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows()`.
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Borrow row `i` if it exists.
    #[must_use]
    pub fn get_row(&self, i: usize) -> Option<&[f64]> {
        (i < self.rows).then(|| self.row(i))
    }

    /// Iterate over rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // chunks_exact(0) panics, and a zero-width cloud still has `rows` rows
        (0..self.rows).map(move |i| self.row(i))
    }

    /// Copy out column `c`.
    #[must_use]
    pub fn column(&self, c: usize) -> Vec<f64> {
        self.iter_rows().map(|r| r[c]).collect()
    }

    /// Flat row-major view.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Consume into the flat row-major buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Drop every row from `rows` onward.
    pub fn truncate_rows(&mut self, rows: usize) {
        if rows < self.rows {
            self.rows = rows;
            self.data.truncate(rows * self.cols);
        }
    }

    /// Per-column arithmetic mean. Zero for an empty cloud.
    #[must_use]
    pub fn column_means(&self) -> Vec<f64> {
        let mut mean = vec![0.0; self.cols];
        if self.rows == 0 {
            return mean;
        }
        for row in self.iter_rows() {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        let n = self.rows as f64;
        for m in &mut mean {
            *m /= n;
        }
        mean
    }
}
