//! Reconstruction of embedded points from their PCA projection.
//!
//! Projecting a model's training points and mapping them back through the
//! transposed basis recovers the retained part of the signal. The residual
//! shrinks with the eigenvalue mass that was discarded, which makes the
//! reconstruction error a direct check on the chosen PCA dimension.

use crate::embedding::PointCloud;
use crate::error::{Result, TdeError};
use crate::math::kdtree::squared_distance;
use crate::math::linalg::PcaBasis;

/// Map projected rows back into the embedding space.
///
/// # Errors
///
/// Returns an error if the cloud width differs from the basis output width.
pub fn reconstruct_points(projected: &PointCloud, basis: &PcaBasis) -> Result<PointCloud> {
    basis.reconstruct(projected)
}

/// Root-mean-square Euclidean distance between corresponding rows.
///
/// # Errors
///
/// Returns an error if the clouds differ in shape.
pub fn compute_reconstruction_error(
    original: &PointCloud,
    reconstructed: &PointCloud,
) -> Result<f64> {
    if original.cols() != reconstructed.cols() {
        return Err(TdeError::dimension_mismatch(
            original.cols(),
            reconstructed.cols(),
        ));
    }
    if original.rows() != reconstructed.rows() {
        return Err(TdeError::dimension_mismatch(
            original.rows(),
            reconstructed.rows(),
        ));
    }
    if original.is_empty() {
        return Ok(0.0);
    }

    let sum_sq: f64 = original
        .iter_rows()
        .zip(reconstructed.iter_rows())
        .map(|(a, b)| squared_distance(a, b))
        .sum();

    Ok((sum_sq / original.rows() as f64).sqrt())
}
