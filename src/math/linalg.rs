//! PCA dimensionality reduction for embedded point clouds.
//!
//! The basis is computed from the covariance of the embedded points with
//! nalgebra's symmetric eigendecomposition. Eigenpairs are sorted by
//! descending eigenvalue and each retained axis is sign-normalized so the
//! same data always yields the same basis.

use nalgebra::{DMatrix, SymmetricEigen};

use crate::embedding::PointCloud;
use crate::error::{Result, TdeError};

/// Mean vector and projection matrix of a fitted PCA.
///
/// `basis` is `input_dim × output_dim` with orthonormal columns.
#[derive(Debug, Clone, PartialEq)]
pub struct PcaBasis {
    mean: Vec<f64>,
    basis: DMatrix<f64>,
}

impl PcaBasis {
    /// Assemble a basis from stored parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the mean width differs from the basis row count.
    pub fn from_parts(mean: Vec<f64>, basis: DMatrix<f64>) -> Result<Self> {
        if mean.len() != basis.nrows() {
            return Err(TdeError::dimension_mismatch(basis.nrows(), mean.len()));
        }
        Ok(Self { mean, basis })
    }

    /// Width of the vectors the basis accepts.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.basis.nrows()
    }

    /// Width of the projected vectors.
    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.basis.ncols()
    }

    /// Mean subtracted before projection.
    #[must_use]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Projection matrix (eigenvectors as columns).
    #[must_use]
    pub const fn matrix(&self) -> &DMatrix<f64> {
        &self.basis
    }

    /// Subtract the mean from every row and right-multiply by the basis.
    ///
    /// # Errors
    ///
    /// Returns an error if the cloud width differs from `input_dim()`.
    pub fn project(&self, points: &PointCloud) -> Result<PointCloud> {
        if points.cols() != self.input_dim() {
            return Err(TdeError::dimension_mismatch(self.input_dim(), points.cols()));
        }
        let out_dim = self.output_dim();
        let mut out = PointCloud::zeros(points.rows(), out_dim);
        let mut centered = vec![0.0; self.input_dim()];

        for (i, row) in points.iter_rows().enumerate() {
            for ((c, &x), &m) in centered.iter_mut().zip(row).zip(&self.mean) {
                *c = x - m;
            }
            let dst = out.row_mut(i);
            for (k, slot) in dst.iter_mut().enumerate() {
                *slot = self
                    .basis
                    .column(k)
                    .iter()
                    .zip(&centered)
                    .map(|(b, c)| b * c)
                    .sum();
            }
        }
        Ok(out)
    }

    /// Map projected rows back to the input space: `y · Bᵀ + mean`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cloud width differs from `output_dim()`.
    pub fn reconstruct(&self, projected: &PointCloud) -> Result<PointCloud> {
        if projected.cols() != self.output_dim() {
            return Err(TdeError::dimension_mismatch(
                self.output_dim(),
                projected.cols(),
            ));
        }
        let mut out = PointCloud::zeros(projected.rows(), self.input_dim());
        for (i, row) in projected.iter_rows().enumerate() {
            let dst = out.row_mut(i);
            for (d, slot) in dst.iter_mut().enumerate() {
                *slot = self.mean[d]
                    + row
                        .iter()
                        .enumerate()
                        .map(|(k, &y)| y * self.basis[(d, k)])
                        .sum::<f64>();
            }
        }
        Ok(out)
    }
}

/// Result of a PCA fit.
#[derive(Debug, Clone)]
pub struct PcaDecomposition {
    /// Retained basis.
    pub basis: PcaBasis,

    /// All covariance eigenvalues, sorted descending.
    pub eigenvalues: Vec<f64>,
}

impl PcaDecomposition {
    /// Fraction of total variance captured by the retained axes.
    #[must_use]
    pub fn retained_variance_ratio(&self) -> f64 {
        let total: f64 = self.eigenvalues.iter().map(|e| e.max(0.0)).sum();
        if total <= 0.0 {
            return 1.0;
        }
        let kept: f64 = self
            .eigenvalues
            .iter()
            .take(self.basis.output_dim())
            .map(|e| e.max(0.0))
            .sum();
        kept / total
    }
}

/// Fit a PCA basis keeping the `reduced_dim` directions of largest variance.
///
/// # Errors
///
/// Returns an error if:
/// - the cloud is empty
/// - `reduced_dim` is zero or exceeds the cloud width
/// - the decomposition produces non-finite values
pub fn compute_pca_basis(points: &PointCloud, reduced_dim: usize) -> Result<PcaDecomposition> {
    let dim = points.cols();
    if points.is_empty() {
        return Err(TdeError::insufficient_data(1, 0));
    }
    if reduced_dim == 0 || reduced_dim > dim {
        return Err(TdeError::invalid_config(format!(
            "reduced dimension must be in 1..={dim}, got {reduced_dim}"
        )));
    }

    let mean = points.column_means();

    // C = 1/n * sum (x - mean)(x - mean)^T
    let mut cov = DMatrix::<f64>::zeros(dim, dim);
    let mut centered = vec![0.0; dim];
    for row in points.iter_rows() {
        for ((c, &x), &m) in centered.iter_mut().zip(row).zip(&mean) {
            *c = x - m;
        }
        for i in 0..dim {
            for j in i..dim {
                cov[(i, j)] += centered[i] * centered[j];
            }
        }
    }
    let n = points.rows() as f64;
    for i in 0..dim {
        for j in i..dim {
            let v = cov[(i, j)] / n;
            cov[(i, j)] = v;
            cov[(j, i)] = v;
        }
    }

    let eigen = SymmetricEigen::new(cov);

    let mut order: Vec<usize> = (0..dim).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let eigenvalues: Vec<f64> = order.iter().map(|&i| eigen.eigenvalues[i]).collect();
    if eigenvalues.iter().any(|e| !e.is_finite()) {
        return Err(TdeError::linalg("covariance eigenvalues are not finite"));
    }

    let mut basis = DMatrix::<f64>::zeros(dim, reduced_dim);
    for (k, &src) in order.iter().take(reduced_dim).enumerate() {
        let column = eigen.eigenvectors.column(src);
        // Largest-magnitude component positive
        let pivot = column
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        for d in 0..dim {
            basis[(d, k)] = sign * column[d];
        }
    }

    Ok(PcaDecomposition {
        basis: PcaBasis { mean, basis },
        eigenvalues,
    })
}
