//! Configuration for model construction and classification.
//!
//! [`EmbeddingSettings`] describes how a raw series is turned into a
//! reference model; [`ClassifierConfig`] describes how live trajectories are
//! scored against a set of models.
//!
//! # Example
//!
//! ```
//! use tde_classifier::{Algorithm, ClassifierConfig, EmbeddingSettings};
//!
//! let settings = EmbeddingSettings::new(8, 2).with_pca_dim(3);
//! assert!(settings.validate().is_ok());
//!
//! let config = ClassifierConfig::live().with_algorithm(Algorithm::FullMatch);
//! assert_eq!(config.query_size(), 3 + 32 + 1);
//! ```

use crate::error::{Result, TdeError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Time-delay embedding parameters for building a reference model.
///
/// The embedding dimension is the total width of a reconstructed vector and
/// is split evenly across the input channels. Each channel contributes
/// `embedding_dim / channels` lagged samples spaced `delay` apart.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EmbeddingSettings {
    /// Total width of an embedded vector.
    pub embedding_dim: usize,

    /// Lag, in samples, between successive embedded coordinates.
    pub delay: usize,

    /// Number of input channels (columns of the raw series).
    pub channels: usize,

    /// Target PCA dimension. `None`, or a value equal to `embedding_dim`,
    /// disables the reduction.
    pub pca_dim: Option<usize>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            embedding_dim: 2,
            delay: 1,
            channels: 1,
            pca_dim: None,
        }
    }
}

impl EmbeddingSettings {
    /// Single-channel settings without PCA.
    #[must_use]
    pub fn new(embedding_dim: usize, delay: usize) -> Self {
        Self {
            embedding_dim,
            delay,
            ..Self::default()
        }
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(TdeError::invalid_config("embedding_dim must be positive"));
        }
        if self.channels == 0 {
            return Err(TdeError::invalid_config("channels must be positive"));
        }
        if self.embedding_dim % self.channels != 0 {
            return Err(TdeError::invalid_config(format!(
                "embedding_dim {} is not a multiple of channel count {}",
                self.embedding_dim, self.channels
            )));
        }
        if self.delay == 0 {
            return Err(TdeError::invalid_config("delay must be at least 1"));
        }
        if let Some(p) = self.pca_dim {
            if p == 0 || p > self.embedding_dim {
                return Err(TdeError::invalid_config(format!(
                    "pca_dim must be in 1..={}, got {p}",
                    self.embedding_dim
                )));
            }
        }
        Ok(())
    }

    /// Embedded coordinates contributed by each channel.
    #[must_use]
    pub const fn per_channel_dim(&self) -> usize {
        self.embedding_dim / self.channels
    }

    /// Number of leading samples consumed as embedding history.
    #[must_use]
    pub const fn max_lag(&self) -> usize {
        self.per_channel_dim().saturating_sub(1) * self.delay
    }

    /// Width of the stored model points.
    #[must_use]
    pub fn reduced_dim(&self) -> usize {
        self.pca_dim.unwrap_or(self.embedding_dim)
    }

    /// Whether a PCA basis will be computed and applied.
    #[must_use]
    pub fn uses_pca(&self) -> bool {
        matches!(self.pca_dim, Some(p) if p < self.embedding_dim)
    }

    /// Set the number of input channels.
    #[must_use]
    pub const fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    /// Set the PCA target dimension.
    #[must_use]
    pub const fn with_pca_dim(mut self, pca_dim: usize) -> Self {
        self.pca_dim = Some(pca_dim);
        self
    }
}

/// Scoring algorithm used by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Algorithm {
    /// Nearest neighbours are recomputed for every step of the window.
    IndependentSteps,
    /// Neighbours of the first point are followed along the model for the
    /// whole window. Faster but brittle for long windows.
    FullMatch,
    /// Neighbours are projected onto the model's line segments before the
    /// successor is taken.
    #[default]
    SegmentMatch,
}

impl Algorithm {
    /// Numeric selector (1, 2 or 3).
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::IndependentSteps => 1,
            Self::FullMatch => 2,
            Self::SegmentMatch => 3,
        }
    }

    /// Spare candidates fetched beyond the requested neighbour count.
    #[must_use]
    pub const fn extra_neighbours(self) -> usize {
        match self {
            Self::IndependentSteps => 0,
            Self::FullMatch => 32,
            Self::SegmentMatch => 5,
        }
    }
}

impl TryFrom<u8> for Algorithm {
    type Error = TdeError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::IndependentSteps),
            2 => Ok(Self::FullMatch),
            3 => Ok(Self::SegmentMatch),
            other => Err(TdeError::invalid_config(format!(
                "unknown algorithm number {other}"
            ))),
        }
    }
}

/// Classifier parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClassifierConfig {
    /// Scoring algorithm.
    pub algorithm: Algorithm,

    /// Neighbours averaged to predict the next point.
    pub num_neighbours: usize,

    /// Steps compared per scored window.
    pub match_steps: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::SegmentMatch,
            num_neighbours: 2,
            match_steps: 16,
        }
    }
}

impl ClassifierConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset used for live sensor streams: short windows, three neighbours,
    /// neighbours recomputed at every step.
    #[must_use]
    pub fn live() -> Self {
        Self {
            algorithm: Algorithm::IndependentSteps,
            num_neighbours: 3,
            match_steps: 8,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the neighbour count or window length is zero.
    pub fn validate(&self) -> Result<()> {
        if self.num_neighbours == 0 {
            return Err(TdeError::invalid_config(
                "num_neighbours must be at least 1",
            ));
        }
        if self.match_steps == 0 {
            return Err(TdeError::invalid_config("match_steps must be at least 1"));
        }
        Ok(())
    }

    /// Spare candidates for the configured algorithm.
    #[must_use]
    pub const fn extra_neighbours(&self) -> usize {
        self.algorithm.extra_neighbours()
    }

    /// Total candidates requested from the spatial index per query.
    #[must_use]
    pub const fn query_size(&self) -> usize {
        self.num_neighbours + self.extra_neighbours() + 1
    }

    /// Set the scoring algorithm.
    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the neighbour count.
    #[must_use]
    pub const fn with_num_neighbours(mut self, num_neighbours: usize) -> Self {
        self.num_neighbours = num_neighbours;
        self
    }

    /// Set the window length.
    #[must_use]
    pub const fn with_match_steps(mut self, match_steps: usize) -> Self {
        self.match_steps = match_steps;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = EmbeddingSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_lag(), 1);
        assert!(!settings.uses_pca());
    }

    #[test]
    fn test_settings_lag() {
        let settings = EmbeddingSettings::new(12, 3).with_channels(3);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.per_channel_dim(), 4);
        assert_eq!(settings.max_lag(), 9);
    }

    #[test]
    fn test_settings_validation() {
        assert!(EmbeddingSettings::new(0, 1).validate().is_err());
        assert!(EmbeddingSettings::new(4, 0).validate().is_err());
        assert!(EmbeddingSettings::new(5, 1)
            .with_channels(2)
            .validate()
            .is_err());
        assert!(EmbeddingSettings::new(4, 1)
            .with_pca_dim(5)
            .validate()
            .is_err());
        assert!(EmbeddingSettings::new(4, 1)
            .with_pca_dim(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_pca_passthrough() {
        let full = EmbeddingSettings::new(4, 1).with_pca_dim(4);
        assert!(full.validate().is_ok());
        assert!(!full.uses_pca());
        assert_eq!(full.reduced_dim(), 4);

        let reduced = EmbeddingSettings::new(4, 1).with_pca_dim(2);
        assert!(reduced.uses_pca());
        assert_eq!(reduced.reduced_dim(), 2);
    }

    #[test]
    fn test_algorithm_numbers() {
        for n in 1..=3u8 {
            assert_eq!(Algorithm::try_from(n).unwrap().number(), n);
        }
        assert!(Algorithm::try_from(0).is_err());
        assert!(Algorithm::try_from(4).is_err());
    }

    #[test]
    fn test_query_size() {
        let config = ClassifierConfig::default();
        assert_eq!(config.query_size(), 2 + 5 + 1);

        let config = config.with_algorithm(Algorithm::IndependentSteps);
        assert_eq!(config.query_size(), 3);
    }

    #[test]
    fn test_classifier_validation() {
        assert!(ClassifierConfig::default().validate().is_ok());
        assert!(ClassifierConfig::live().validate().is_ok());
        assert!(ClassifierConfig::default()
            .with_num_neighbours(0)
            .validate()
            .is_err());
        assert!(ClassifierConfig::default()
            .with_match_steps(0)
            .validate()
            .is_err());
    }
}
