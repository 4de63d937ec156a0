//! Sliding-window classification against a set of reference models.
//!
//! Every window of `match_steps` steps is scored independently for each
//! model. A step looks up model points near the current trajectory point,
//! averages where those points moved next, applies that displacement to the
//! trajectory point and compares the prediction with the observed next
//! point (see [`directional_agreement`]).
//!
//! The three [`Algorithm`]s differ only in how neighbours are retrieved and
//! which ones are accepted; that part is captured by [`NeighbourStrategy`].
//! The averaging and scoring stages are shared.
//!
//! A [`Classifier`] owns per-model scratch buffers that are reused across
//! calls, so one instance must not be shared between threads that classify
//! concurrently. Models are held behind [`Arc`](std::sync::Arc) and can be
//! shared by any number of classifiers.

use tracing::{info, warn};

use crate::config::{Algorithm, ClassifierConfig};
use crate::distance::{directional_agreement, expected_next, interpolation_coefficient, lerp_into};
use crate::embedding::PointCloud;
use crate::error::{Result, TdeError};
use crate::math::kdtree::Neighbour;
use crate::model::{NamedModel, ReferenceModel};
use crate::scores::ScoreMatrix;

/// Candidates kept beyond `num_neighbours` by [`NeighbourStrategy::CachedShift`].
pub const CACHED_SHIFT_SPARES: usize = 32;

/// Candidates kept beyond `num_neighbours` by [`NeighbourStrategy::Interpolated`].
pub const INTERPOLATED_SPARES: usize = 5;

/// Neighbours this close to a model's last point are rejected by
/// [`NeighbourStrategy::Interpolated`].
pub const INTERPOLATED_END_MARGIN: usize = 3;

/// Neighbour retrieval and validity filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighbourStrategy {
    /// Query at every step. A neighbour that is the model's last point has
    /// no successor and is swapped for the single spare candidate.
    SimpleRequery,

    /// Query once at the first step and walk the same neighbours forward
    /// along the model. Neighbours closer than `match_steps` to the model
    /// end are swapped for spares.
    CachedShift {
        /// Spare candidates fetched beyond `num_neighbours`.
        spares: usize,
    },

    /// Query at every step, then project the query onto the model segment
    /// starting at each neighbour and interpolate both the neighbour and
    /// its successor.
    Interpolated {
        /// Spare candidates fetched beyond `num_neighbours`.
        spares: usize,
        /// Neighbours with `index + end_margin >= len`, or index 0, are
        /// rejected.
        end_margin: usize,
    },
}

impl NeighbourStrategy {
    /// Strategy implementing `algorithm`.
    #[must_use]
    pub const fn for_algorithm(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::IndependentSteps => Self::SimpleRequery,
            Algorithm::FullMatch => Self::CachedShift {
                spares: CACHED_SHIFT_SPARES,
            },
            Algorithm::SegmentMatch => Self::Interpolated {
                spares: INTERPOLATED_SPARES,
                end_margin: INTERPOLATED_END_MARGIN,
            },
        }
    }

    /// Spare candidates fetched beyond `num_neighbours`.
    #[must_use]
    pub const fn spares(self) -> usize {
        match self {
            Self::SimpleRequery => 0,
            Self::CachedShift { spares } | Self::Interpolated { spares, .. } => spares,
        }
    }
}

impl From<Algorithm> for NeighbourStrategy {
    fn from(algorithm: Algorithm) -> Self {
        Self::for_algorithm(algorithm)
    }
}

/// Per-model working memory, sized once at construction.
#[derive(Debug, Clone)]
struct Scratch {
    neighbours: PointCloud,
    successors: PointCloud,
    mean: Vec<f64>,
    mean_next: Vec<f64>,
    expected: Vec<f64>,
    candidates: Vec<Option<Neighbour>>,
    chosen: Vec<usize>,
}

impl Scratch {
    fn new(num_neighbours: usize, dim: usize) -> Self {
        let max_candidates = num_neighbours + CACHED_SHIFT_SPARES.max(INTERPOLATED_SPARES) + 1;
        Self {
            neighbours: PointCloud::zeros(num_neighbours, dim),
            successors: PointCloud::zeros(num_neighbours, dim),
            mean: vec![0.0; dim],
            mean_next: vec![0.0; dim],
            expected: vec![0.0; dim],
            candidates: Vec::with_capacity(max_candidates),
            chosen: Vec::with_capacity(num_neighbours),
        }
    }

    /// Average the first `found` neighbour and successor rows.
    fn average(&mut self, found: usize) {
        mean_of_rows(&self.neighbours, found, &mut self.mean);
        mean_of_rows(&self.successors, found, &mut self.mean_next);
    }
}

fn mean_of_rows(cloud: &PointCloud, count: usize, out: &mut [f64]) {
    out.fill(0.0);
    if count == 0 {
        return;
    }
    for row in cloud.iter_rows().take(count) {
        for (o, &v) in out.iter_mut().zip(row) {
            *o += v;
        }
    }
    let n = count as f64;
    for o in out.iter_mut() {
        *o /= n;
    }
}

/// Scores trajectory windows against a fixed set of models.
///
/// # Example
///
/// ```
/// use tde_classifier::{
///     Algorithm, Classifier, ClassifierConfig, EmbeddingSettings, NamedModel, PointCloud,
///     ReferenceModel,
/// };
///
/// let ramp: Vec<f64> = (0..=100).map(f64::from).collect();
/// let model = ReferenceModel::build(&PointCloud::from_column(&ramp), &EmbeddingSettings::new(2, 1))?;
///
/// let config = ClassifierConfig::new()
///     .with_algorithm(Algorithm::IndependentSteps)
///     .with_num_neighbours(2)
///     .with_match_steps(4);
/// let mut classifier = Classifier::new(vec![NamedModel::new("ramp", model)], config)?;
///
/// // Six samples further along the same ramp
/// let scores = classifier.classify_sample(&[20.0, 21.0, 22.0, 23.0, 24.0, 25.0])?;
/// assert!((scores[0] - 4.0).abs() < 1e-9);
/// # Ok::<(), tde_classifier::TdeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Classifier {
    models: Vec<NamedModel>,
    config: ClassifierConfig,
    scratch: Vec<Scratch>,
    window_size: usize,
}

impl Classifier {
    /// Create a classifier over `models`.
    ///
    /// An empty model set is allowed; every classification then returns an
    /// empty result.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(models: Vec<NamedModel>, config: ClassifierConfig) -> Result<Self> {
        config.validate()?;

        let scratch = models
            .iter()
            .map(|m| Scratch::new(config.num_neighbours, m.model.reduced_dim()))
            .collect();
        let window_size = models
            .iter()
            .map(|m| m.model.window_size(config.match_steps))
            .max()
            .unwrap_or(0);

        info!(
            models = models.len(),
            window_size,
            algorithm = config.algorithm.number(),
            num_neighbours = config.num_neighbours,
            match_steps = config.match_steps,
            "Created classifier"
        );

        Ok(Self {
            models,
            config,
            scratch,
            window_size,
        })
    }

    /// Score every window of `length` steps.
    ///
    /// `data[k]` holds the trajectory embedded and projected for model `k`
    /// and must have at least `length + 1` rows. Window `i` reads rows
    /// `i..=i + match_steps`, so the result has `length - match_steps + 1`
    /// rows (none when `length < match_steps`).
    ///
    /// # Errors
    ///
    /// Returns an error if `data` does not have one cloud per model, a cloud
    /// has the wrong width, or a cloud is too short.
    pub fn classify(&mut self, data: &[PointCloud], length: usize) -> Result<ScoreMatrix> {
        if self.models.is_empty() {
            return Ok(ScoreMatrix::default());
        }
        if data.len() != self.models.len() {
            return Err(TdeError::invalid_input(format!(
                "expected projected data for {} models, got {}",
                self.models.len(),
                data.len()
            )));
        }

        let match_steps = self.config.match_steps;
        let windows = (length + 1).saturating_sub(match_steps);
        for (named, cloud) in self.models.iter().zip(data) {
            let dim = named.model.reduced_dim();
            if cloud.cols() != dim {
                return Err(TdeError::dimension_mismatch(dim, cloud.cols()));
            }
            if windows > 0 && cloud.rows() < length + 1 {
                return Err(TdeError::insufficient_data(length + 1, cloud.rows()));
            }
        }

        let strategy = NeighbourStrategy::for_algorithm(self.config.algorithm);
        let mut scores = ScoreMatrix::zeros(windows, self.models.len());
        for start in 0..windows {
            for (k, cloud) in data.iter().enumerate() {
                let score = score_window(
                    &self.models[k],
                    strategy,
                    &self.config,
                    cloud,
                    start,
                    &mut self.scratch[k],
                )?;
                scores.set(start, k, score);
            }
        }
        Ok(scores)
    }

    /// Score a single window of raw single-channel samples.
    ///
    /// Every model embeds the first `match_steps + 1` rows of `window` with
    /// its own delay and dimension, so `window` must hold at least
    /// [`window_size`](Self::window_size) samples. Returns one score per
    /// model.
    ///
    /// # Errors
    ///
    /// Returns [`TdeError::InsufficientData`] if `window` is too short for
    /// any model.
    pub fn classify_sample(&mut self, window: &[f64]) -> Result<Vec<f64>> {
        if self.models.is_empty() {
            return Ok(Vec::new());
        }
        let match_steps = self.config.match_steps;
        let data = self
            .models
            .iter()
            .map(|m| m.model.project_window(window, match_steps + 1))
            .collect::<Result<Vec<_>>>()?;
        let scores = self.classify(&data, match_steps)?;
        Ok(scores.row(0).to_vec())
    }

    /// Raw samples needed to score one window against every model.
    #[must_use]
    pub const fn window_size(&self) -> usize {
        self.window_size
    }

    /// Model names joined by tabs, in column order.
    #[must_use]
    pub fn model_names(&self) -> String {
        self.models
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join("\t")
    }

    /// Number of loaded models.
    #[must_use]
    pub fn num_models(&self) -> usize {
        self.models.len()
    }

    /// Loaded models, in column order.
    #[must_use]
    pub fn models(&self) -> &[NamedModel] {
        &self.models
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Switch the scoring algorithm.
    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.config.algorithm = algorithm;
    }
}

/// Sum of per-step agreements for the window starting at row `start`.
fn score_window(
    named: &NamedModel,
    strategy: NeighbourStrategy,
    config: &ClassifierConfig,
    data: &PointCloud,
    start: usize,
    scratch: &mut Scratch,
) -> Result<f64> {
    let model = named.model.as_ref();
    let n = config.num_neighbours;
    let mut total = 0.0;

    for j in 0..config.match_steps {
        let point = data.row(start + j);
        let next = data.row(start + j + 1);

        let found = match strategy {
            NeighbourStrategy::SimpleRequery => gather_requery(model, point, n, scratch)?,
            NeighbourStrategy::CachedShift { spares } => {
                if j == 0 {
                    choose_cached(model, point, n, spares, config.match_steps, scratch)?;
                }
                gather_shifted(model, j, scratch)
            }
            NeighbourStrategy::Interpolated { spares, end_margin } => {
                gather_interpolated(model, point, n, spares, end_margin, scratch)?
            }
        };
        if found < n {
            warn!(
                model = %named.name,
                found,
                required = n,
                "Couldn't find enough neighbours"
            );
        }

        scratch.average(found);
        expected_next(point, &scratch.mean, &scratch.mean_next, &mut scratch.expected);
        total += directional_agreement(point, next, &scratch.expected);
    }

    Ok(total)
}

/// Replace a rejected candidate with the first acceptable spare, or index 0
/// when every spare is rejected too.
fn substitute(
    spares: &[Option<Neighbour>],
    is_bad: impl Fn(usize) -> bool,
) -> usize {
    spares
        .iter()
        .flatten()
        .map(|s| s.index)
        .find(|&i| !is_bad(i))
        .unwrap_or_else(|| {
            warn!("Couldn't find enough good neighbours, falling back to the first model point");
            0
        })
}

fn gather_requery(
    model: &ReferenceModel,
    point: &[f64],
    n: usize,
    scratch: &mut Scratch,
) -> Result<usize> {
    model.nearest_into(point, n + 1, &mut scratch.candidates)?;
    let last = model.len().saturating_sub(1);

    let mut found = 0;
    for l in 0..n {
        let Some(mut nb) = scratch.candidates[l] else {
            break;
        };
        if nb.index == last {
            match scratch.candidates[n] {
                Some(spare) => nb = spare,
                None => break,
            }
        }
        scratch
            .neighbours
            .row_mut(found)
            .copy_from_slice(model.point_clamped(nb.index));
        scratch
            .successors
            .row_mut(found)
            .copy_from_slice(model.point_clamped(nb.index + 1));
        found += 1;
    }
    Ok(found)
}

fn choose_cached(
    model: &ReferenceModel,
    point: &[f64],
    n: usize,
    spares: usize,
    match_steps: usize,
    scratch: &mut Scratch,
) -> Result<()> {
    model.nearest_into(point, n + spares + 1, &mut scratch.candidates)?;
    let len = model.len();
    // Neighbours must be followable for the whole window
    let is_bad = |index: usize| index + match_steps + 1 > len;

    scratch.chosen.clear();
    for l in 0..n {
        let Some(nb) = scratch.candidates[l] else {
            break;
        };
        let index = if is_bad(nb.index) {
            substitute(&scratch.candidates[n..n + spares], is_bad)
        } else {
            nb.index
        };
        scratch.chosen.push(index);
    }
    Ok(())
}

fn gather_shifted(model: &ReferenceModel, step: usize, scratch: &mut Scratch) -> usize {
    for (slot, &index) in scratch.chosen.iter().enumerate() {
        scratch
            .neighbours
            .row_mut(slot)
            .copy_from_slice(model.point_clamped(index + step));
        scratch
            .successors
            .row_mut(slot)
            .copy_from_slice(model.point_clamped(index + step + 1));
    }
    scratch.chosen.len()
}

fn gather_interpolated(
    model: &ReferenceModel,
    point: &[f64],
    n: usize,
    spares: usize,
    end_margin: usize,
    scratch: &mut Scratch,
) -> Result<usize> {
    model.nearest_into(point, n + spares + 1, &mut scratch.candidates)?;
    let len = model.len();
    let is_bad = |index: usize| index + end_margin >= len || index == 0;

    let mut found = 0;
    for l in 0..n {
        let Some(nb) = scratch.candidates[l] else {
            break;
        };
        let index = if is_bad(nb.index) {
            substitute(&scratch.candidates[n..n + spares], is_bad)
        } else {
            nb.index
        };

        let mut p3 = model.point_clamped(index);
        let mut p4 = model.point_clamped(index + 1);
        let mut p5 = model.point_clamped(index + 2);
        let mut coeff = interpolation_coefficient(point, p3, p4);
        if coeff < 0.0 {
            // Query lies before this segment, step back one point
            p5 = p4;
            p4 = p3;
            p3 = model.point_clamped(index.saturating_sub(1));
            coeff = interpolation_coefficient(point, p3, p4);
        } else if coeff > 1.0 {
            p3 = p4;
            p4 = p5;
            p5 = model.point_clamped(index + 3);
            coeff = interpolation_coefficient(point, p3, p4);
        }
        let coeff = coeff.clamp(0.0, 1.0);

        lerp_into(p3, p4, coeff, scratch.neighbours.row_mut(found));
        lerp_into(p4, p5, coeff, scratch.successors.row_mut(found));
        found += 1;
    }
    Ok(found)
}
