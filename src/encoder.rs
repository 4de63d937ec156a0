//! Time-delay embedding of raw multi-channel series.
//!
//! Each output row reconstructs a state vector from lagged samples. For a
//! series with `C` channels and an embedding dimension `E`, every channel
//! contributes `m = E / C` samples spaced `delay` apart, oldest first:
//!
//! ```text
//! row(t) = [ x0(t - (m-1)d), ..., x0(t - d), x0(t),
//!            x1(t - (m-1)d), ..., x1(t),
//!            ... ]
//! ```
//!
//! The first `max_lag = (m - 1) * d` samples only serve as history, so an
//! input of `N` samples yields `N - max_lag` rows.

use tracing::debug;

use crate::config::EmbeddingSettings;
use crate::embedding::PointCloud;
use crate::error::{Result, TdeError};

/// Embed a raw series (rows = time, columns = channels).
///
/// # Errors
///
/// Returns an error if:
/// - the settings are invalid
/// - the series width differs from `settings.channels`
/// - the series has no more than `max_lag` samples
///
/// # Example
///
/// ```
/// use tde_classifier::{embed_series, EmbeddingSettings, PointCloud};
///
/// let series = PointCloud::from_column(&[0.0, 1.0, 2.0, 3.0, 4.0]);
/// let embedded = embed_series(&series, &EmbeddingSettings::new(3, 2))?;
///
/// assert_eq!(embedded.rows(), 1);
/// assert_eq!(embedded.row(0), &[0.0, 2.0, 4.0]);
/// # Ok::<(), tde_classifier::TdeError>(())
/// ```
pub fn embed_series(series: &PointCloud, settings: &EmbeddingSettings) -> Result<PointCloud> {
    settings.validate()?;
    if series.cols() != settings.channels {
        return Err(TdeError::dimension_mismatch(
            settings.channels,
            series.cols(),
        ));
    }

    let max_lag = settings.max_lag();
    let n = series.rows();
    if n <= max_lag {
        return Err(TdeError::insufficient_data(max_lag + 1, n));
    }

    let m = settings.per_channel_dim();
    let rows = n - max_lag;
    let mut out = PointCloud::zeros(rows, settings.embedding_dim);

    for r in 0..rows {
        let t = r + max_lag;
        let dst = out.row_mut(r);
        for c in 0..settings.channels {
            let block = &mut dst[c * m..(c + 1) * m];
            for (k, slot) in block.iter_mut().rev().enumerate() {
                *slot = series.row(t - k * settings.delay)[c];
            }
        }
    }

    debug!(
        samples = n,
        rows,
        embedding_dim = settings.embedding_dim,
        delay = settings.delay,
        "Embedded series"
    );

    Ok(out)
}

/// Embed `rows` consecutive windows of a single-channel sample buffer.
///
/// Row `i`, column `j` holds `samples[i + j * delay]`, so the row starting at
/// sample `i` ends at sample `i + (embedding_dim - 1) * delay`.
///
/// # Errors
///
/// Returns an error if `samples` is shorter than
/// `rows + (embedding_dim - 1) * delay`.
pub fn embed_window(
    samples: &[f64],
    embedding_dim: usize,
    delay: usize,
    rows: usize,
) -> Result<PointCloud> {
    if embedding_dim == 0 || delay == 0 {
        return Err(TdeError::invalid_config(
            "embedding_dim and delay must be positive",
        ));
    }
    let span = (embedding_dim - 1) * delay;
    let required = rows + span;
    if samples.len() < required {
        return Err(TdeError::insufficient_data(required, samples.len()));
    }

    let mut out = PointCloud::zeros(rows, embedding_dim);
    for i in 0..rows {
        for (j, slot) in out.row_mut(i).iter_mut().enumerate() {
            *slot = samples[i + j * delay];
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> PointCloud {
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        PointCloud::from_column(&values)
    }

    #[test]
    fn test_output_shape() {
        for (dim, delay) in [(1, 1), (2, 1), (3, 2), (5, 4)] {
            let settings = EmbeddingSettings::new(dim, delay);
            let out = embed_series(&ramp(50), &settings).unwrap();
            assert_eq!(out.rows(), 50 - settings.max_lag());
            assert_eq!(out.cols(), dim);
        }
    }

    #[test]
    fn test_single_channel_layout() {
        let settings = EmbeddingSettings::new(3, 2);
        let out = embed_series(&ramp(10), &settings).unwrap();
        assert_eq!(out.row(0), &[0.0, 2.0, 4.0]);
        assert_eq!(out.row(5), &[5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_multi_channel_layout() {
        let rows: Vec<[f64; 2]> = (0..6).map(|i| [i as f64, 100.0 + i as f64]).collect();
        let series = PointCloud::from_rows(&rows).unwrap();
        let settings = EmbeddingSettings::new(4, 2).with_channels(2);

        let out = embed_series(&series, &settings).unwrap();
        assert_eq!(out.rows(), 4);
        assert_eq!(out.row(0), &[0.0, 2.0, 100.0, 102.0]);
        assert_eq!(out.row(3), &[3.0, 5.0, 103.0, 105.0]);
    }

    #[test]
    fn test_insufficient_data() {
        let settings = EmbeddingSettings::new(4, 3);
        // max_lag = 9
        let err = embed_series(&ramp(9), &settings).unwrap_err();
        assert!(matches!(
            err,
            TdeError::InsufficientData {
                required: 10,
                actual: 9
            }
        ));
        assert_eq!(embed_series(&ramp(10), &settings).unwrap().rows(), 1);
    }

    #[test]
    fn test_channel_mismatch() {
        let settings = EmbeddingSettings::new(4, 1).with_channels(2);
        assert!(matches!(
            embed_series(&ramp(10), &settings),
            Err(TdeError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_window_matches_series_embedding() {
        let samples: Vec<f64> = (0..20).map(|i| (i as f64 * 0.3).sin()).collect();
        let settings = EmbeddingSettings::new(3, 2);

        let from_series = embed_series(&PointCloud::from_column(&samples), &settings).unwrap();
        let from_window = embed_window(&samples, 3, 2, 16).unwrap();

        assert_eq!(from_window.rows(), 16);
        assert_eq!(from_window, from_series);
    }

    #[test]
    fn test_window_too_short() {
        assert!(embed_window(&[0.0; 5], 3, 2, 2).is_err());
        assert!(embed_window(&[0.0; 6], 3, 2, 2).is_ok());
    }
}
