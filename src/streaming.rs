//! Real-time classification of a continuous sample stream.
//!
//! This module provides [`StreamingClassifier`], which keeps the most recent
//! samples of a single-channel signal in a circular buffer and scores the
//! latest window on demand.

use tracing::debug;

use crate::classifier::Classifier;
use crate::error::{Result, TdeError};

/// Streaming front end for a [`Classifier`].
///
/// The buffer holds `2 * window_size - 1` samples. Once the write position
/// passes the mid point `window_size - 1`, every sample is also mirrored
/// `window_size` slots earlier, and the write position wraps back to the
/// mid point instead of zero. The latest `window_size` samples are therefore
/// always contiguous and can be scored without copying the ring apart.
///
/// # Example
///
/// ```
/// use tde_classifier::{
///     Classifier, ClassifierConfig, EmbeddingSettings, NamedModel, PointCloud, ReferenceModel,
///     StreamingClassifier,
/// };
///
/// let wave: Vec<f64> = (0..500).map(|i| (f64::from(i) * 0.1).sin()).collect();
/// let model = ReferenceModel::build(&PointCloud::from_column(&wave), &EmbeddingSettings::new(3, 2))?;
/// let classifier = Classifier::new(vec![NamedModel::new("wave", model)], ClassifierConfig::live())?;
///
/// let mut stream = StreamingClassifier::new(classifier)?;
/// let mut latest = None;
/// for &sample in &wave[..40] {
///     if let Some(scores) = stream.update(sample)? {
///         latest = Some(scores);
///     }
/// }
/// assert!(stream.is_ready());
/// assert_eq!(latest.map(|s| s.len()), Some(1));
/// # Ok::<(), tde_classifier::TdeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct StreamingClassifier {
    /// Classifier scoring each window.
    classifier: Classifier,

    /// Samples per scored window.
    window_size: usize,

    /// Ring of `2 * window_size - 1` samples.
    buffer: Vec<f64>,

    /// First slot whose window is complete.
    mid_point: usize,

    /// Next slot to write.
    next_index: usize,

    /// Samples received since the last reset.
    received: usize,
}

impl StreamingClassifier {
    /// Wrap a classifier.
    ///
    /// # Errors
    ///
    /// Returns [`TdeError::InvalidConfig`] if the classifier holds no models.
    pub fn new(classifier: Classifier) -> Result<Self> {
        let window_size = classifier.window_size();
        if window_size == 0 {
            return Err(TdeError::invalid_config(
                "streaming classification needs at least one model",
            ));
        }
        debug!(window_size, "Created streaming classifier");
        Ok(Self {
            classifier,
            window_size,
            buffer: vec![0.0; 2 * window_size - 1],
            mid_point: window_size - 1,
            next_index: 0,
            received: 0,
        })
    }

    /// Store one sample and return the buffer index it was written to.
    pub fn add_sample(&mut self, sample: f64) -> usize {
        let index = self.next_index;
        self.buffer[index] = sample;
        if index > self.mid_point {
            self.buffer[index - self.window_size] = sample;
        }

        self.next_index += 1;
        if self.next_index >= self.buffer.len() {
            self.next_index = self.mid_point;
        }
        self.received += 1;
        index
    }

    /// Score the window ending at buffer `index`.
    ///
    /// Returns `None` while `index` lies before the mid point, i.e. before a
    /// full window has been received.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` lies outside the buffer or the classifier
    /// rejects the window.
    pub fn classify(&mut self, index: usize) -> Result<Option<Vec<f64>>> {
        if index >= self.buffer.len() {
            return Err(TdeError::index_out_of_range(index, self.buffer.len()));
        }
        if index < self.mid_point {
            return Ok(None);
        }
        let start = index + 1 - self.window_size;
        let window = &self.buffer[start..=index];
        self.classifier.classify_sample(window).map(Some)
    }

    /// Store one sample and score the window it completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the classifier rejects the window.
    pub fn update(&mut self, sample: f64) -> Result<Option<Vec<f64>>> {
        let index = self.add_sample(sample);
        self.classify(index)
    }

    /// Store a batch of samples without scoring them.
    pub fn update_batch(&mut self, samples: &[f64]) {
        for &sample in samples {
            self.add_sample(sample);
        }
    }

    /// The most recent `window_size` samples, oldest first, once available.
    #[must_use]
    pub fn latest_window(&self) -> Option<&[f64]> {
        if !self.is_ready() {
            return None;
        }
        let end = if self.next_index == self.mid_point {
            self.buffer.len() - 1
        } else {
            self.next_index - 1
        };
        Some(&self.buffer[end + 1 - self.window_size..=end])
    }

    /// Whether a full window has been received.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.received >= self.window_size
    }

    /// Forget all samples.
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.next_index = 0;
        self.received = 0;
    }

    /// Samples per scored window.
    #[must_use]
    pub const fn window_size(&self) -> usize {
        self.window_size
    }

    /// Samples received since the last reset.
    #[must_use]
    pub const fn n_samples(&self) -> usize {
        self.received
    }

    /// Get reference to the wrapped classifier.
    #[must_use]
    pub const fn classifier(&self) -> &Classifier {
        &self.classifier
    }
}
