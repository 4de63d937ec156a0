//! Reference models: one activity's embedded manifold.
//!
//! A [`ReferenceModel`] bundles the delay-embedding parameters, an optional
//! PCA basis and a k-d tree over the (possibly reduced) embedded points. It
//! is built once from raw data or loaded from a dump, then queried
//! read-only; share it between classifiers through [`NamedModel`].
//!
//! # File Format
//!
//! ```text
//! <delay>
//! <embedding_dim>
//! <mean_len>                  (0 disables PCA)
//! <mean_0> ... <mean_{len-1}>  (empty line when PCA is disabled)
//! <basis_rows> <basis_cols>   (0 0 when PCA is disabled)
//! <basis row 0>
//! ...
//! <k-d tree dump>
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use nalgebra::DMatrix;
use tracing::info;

use crate::config::EmbeddingSettings;
use crate::embedding::PointCloud;
use crate::encoder::{embed_series, embed_window};
use crate::error::{Result, TdeError};
use crate::math::format::{format_row, Tokens};
use crate::math::kdtree::{KdTree, Neighbour};
use crate::math::linalg::{compute_pca_basis, PcaBasis};

/// A persisted, queryable time-delay embedding of one signal class.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceModel {
    delay: usize,
    embedding_dim: usize,
    pca: Option<PcaBasis>,
    tree: KdTree,
}

impl ReferenceModel {
    /// Build a model from a raw series (rows = time, columns = channels).
    ///
    /// Embeds the series, fits and applies PCA when `settings` asks for a
    /// reduction, and indexes the resulting points.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid, the series width does
    /// not match `settings.channels`, or the series is too short.
    pub fn build(series: &PointCloud, settings: &EmbeddingSettings) -> Result<Self> {
        let embedded = embed_series(series, settings)?;

        let (pca, points) = if settings.uses_pca() {
            let decomposition = compute_pca_basis(&embedded, settings.reduced_dim())?;
            let projected = decomposition.basis.project(&embedded)?;
            info!(
                reduced_dim = settings.reduced_dim(),
                retained_variance = decomposition.retained_variance_ratio(),
                "Computed PCA basis"
            );
            (Some(decomposition.basis), projected)
        } else {
            (None, embedded)
        };

        let tree = KdTree::build(points);
        info!(
            points = tree.len(),
            embedding_dim = settings.embedding_dim,
            delay = settings.delay,
            "Built reference model"
        );

        Ok(Self {
            delay: settings.delay,
            embedding_dim: settings.embedding_dim,
            pca,
            tree,
        })
    }

    /// Load a model dump from disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or
    /// [`TdeError::CorruptModel`] if its contents are malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let model = Self::parse(&text)?;
        info!(
            path = %path.display(),
            points = model.len(),
            embedding_dim = model.embedding_dim,
            reduced_dim = model.reduced_dim(),
            "Loaded reference model"
        );
        Ok(model)
    }

    /// Parse a model from its dump text.
    ///
    /// # Errors
    ///
    /// Returns [`TdeError::CorruptModel`] on short input, malformed numbers
    /// or inconsistent dimensions.
    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = Tokens::new(text);

        let delay = tokens.next_usize("delay")?;
        let embedding_dim = tokens.next_usize("embedding dimension")?;
        if delay == 0 || embedding_dim == 0 {
            return Err(TdeError::corrupt_model(
                "delay and embedding dimension must be positive",
            ));
        }

        let mean_len = tokens.next_usize("mean vector size")?;
        let mean = tokens.next_floats(mean_len, "mean vector")?;
        let rows = tokens.next_usize("basis rows")?;
        let cols = tokens.next_usize("basis columns")?;

        let pca = if mean_len == 0 {
            if rows != 0 || cols != 0 {
                return Err(TdeError::corrupt_model(format!(
                    "basis of {rows}x{cols} without a mean vector"
                )));
            }
            None
        } else {
            if mean_len != embedding_dim || rows != embedding_dim {
                return Err(TdeError::corrupt_model(format!(
                    "PCA dimensions {mean_len}/{rows}x{cols} do not match embedding dimension {embedding_dim}"
                )));
            }
            if cols == 0 || cols > embedding_dim {
                return Err(TdeError::corrupt_model(format!(
                    "basis column count {cols} out of range"
                )));
            }
            let total = rows.checked_mul(cols).ok_or_else(|| {
                TdeError::corrupt_model(format!("basis of {rows}x{cols} overflows"))
            })?;
            let values = tokens.next_floats(total, "basis matrix")?;
            let basis = DMatrix::from_row_slice(rows, cols, &values);
            Some(PcaBasis::from_parts(mean, basis)?)
        };

        let tree = KdTree::read_from(&mut tokens)?;
        let expected_dim = pca.as_ref().map_or(embedding_dim, PcaBasis::output_dim);
        if tree.dim() != expected_dim {
            return Err(TdeError::corrupt_model(format!(
                "index dimension {} does not match model dimension {expected_dim}",
                tree.dim()
            )));
        }
        if tree.is_empty() {
            return Err(TdeError::corrupt_model("model holds no points"));
        }
        if !tokens.is_exhausted() {
            return Err(TdeError::corrupt_model("trailing data after index"));
        }

        Ok(Self {
            delay,
            embedding_dim,
            pca,
            tree,
        })
    }

    /// Render the dump text. [`parse`](Self::parse) inverts this exactly.
    #[must_use]
    pub fn to_dump_string(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_to(&mut out);
        out
    }

    /// Write the dump text to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn write_to<W: std::fmt::Write>(&self, out: &mut W) -> std::fmt::Result {
        writeln!(out, "{}", self.delay)?;
        writeln!(out, "{}", self.embedding_dim)?;
        match &self.pca {
            None => {
                writeln!(out, "0")?;
                writeln!(out)?;
                writeln!(out, "0 0")?;
            }
            Some(pca) => {
                writeln!(out, "{}", pca.mean().len())?;
                writeln!(out, "{}", format_row(pca.mean(), ' '))?;
                let basis = pca.matrix();
                writeln!(out, "{} {}", basis.nrows(), basis.ncols())?;
                for r in 0..basis.nrows() {
                    let row: Vec<f64> = basis.row(r).iter().copied().collect();
                    writeln!(out, "{}", format_row(&row, ' '))?;
                }
            }
        }
        self.tree.write_to(out)
    }

    /// Write the model dump to `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving model");
        fs::write(path, self.to_dump_string())?;
        Ok(())
    }

    /// Stored (post-PCA) point at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`TdeError::IndexOutOfRange`] when `index >= len()`.
    pub fn get_data_point(&self, index: usize) -> Result<&[f64]> {
        self.tree
            .points()
            .get_row(index)
            .ok_or_else(|| TdeError::index_out_of_range(index, self.len()))
    }

    /// Stored point at `index`, clamped to the last point.
    pub(crate) fn point_clamped(&self, index: usize) -> &[f64] {
        self.tree.points().row(index.min(self.len().saturating_sub(1)))
    }

    /// Apply this model's PCA projection to embedded rows.
    ///
    /// Without PCA the input is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows are not `embedding_dim` wide.
    pub fn project_data(&self, data: PointCloud) -> Result<PointCloud> {
        if data.cols() != self.embedding_dim {
            return Err(TdeError::dimension_mismatch(self.embedding_dim, data.cols()));
        }
        match &self.pca {
            Some(pca) => pca.project(&data),
            None => Ok(data),
        }
    }

    /// Delay-embed `rows` windows of a single-channel sample buffer and
    /// project them into this model's space.
    ///
    /// # Errors
    ///
    /// Returns an error if `samples` is shorter than
    /// `rows + (embedding_dim - 1) * delay`.
    pub fn project_window(&self, samples: &[f64], rows: usize) -> Result<PointCloud> {
        let embedded = embed_window(samples, self.embedding_dim, self.delay, rows)?;
        self.project_data(embedded)
    }

    /// The `k` nearest stored points to `point`.
    ///
    /// # Errors
    ///
    /// Returns an error if `point` is not `reduced_dim()` wide.
    pub fn nearest(&self, point: &[f64], k: usize) -> Result<Vec<Option<Neighbour>>> {
        self.tree.query(point, k)
    }

    pub(crate) fn nearest_into(
        &self,
        point: &[f64],
        k: usize,
        out: &mut Vec<Option<Neighbour>>,
    ) -> Result<()> {
        self.tree.query_into(point, k, out)
    }

    /// Raw samples needed to score one window of `match_steps` steps.
    #[must_use]
    pub const fn window_size(&self, match_steps: usize) -> usize {
        (self.embedding_dim - 1) * self.delay + match_steps + 1
    }

    /// Number of stored points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the model stores no points. Always false for built or
    /// loaded models.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Embedding delay.
    #[must_use]
    pub const fn delay(&self) -> usize {
        self.delay
    }

    /// Width of embedded vectors before PCA.
    #[must_use]
    pub const fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Width of stored points.
    #[must_use]
    pub fn reduced_dim(&self) -> usize {
        self.pca.as_ref().map_or(self.embedding_dim, PcaBasis::output_dim)
    }

    /// Whether a PCA basis is applied.
    #[must_use]
    pub const fn uses_pca(&self) -> bool {
        self.pca.is_some()
    }

    /// PCA basis, if any.
    #[must_use]
    pub const fn pca(&self) -> Option<&PcaBasis> {
        self.pca.as_ref()
    }

    /// Stored points in time order.
    #[must_use]
    pub const fn points(&self) -> &PointCloud {
        self.tree.points()
    }
}

/// A model together with the name it was loaded under.
#[derive(Debug, Clone)]
pub struct NamedModel {
    /// Display name, usually the model file path.
    pub name: String,
    /// Shared read-only model.
    pub model: Arc<ReferenceModel>,
}

impl NamedModel {
    /// Wrap a model under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, model: ReferenceModel) -> Self {
        Self {
            name: name.into(),
            model: Arc::new(model),
        }
    }

    /// Load a model file, naming it by its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Ok(Self::new(
            path.display().to_string(),
            ReferenceModel::load(path)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine_series(n: usize) -> PointCloud {
        let values: Vec<f64> = (0..n).map(|i| (i as f64 * 0.2).sin()).collect();
        PointCloud::from_column(&values)
    }

    fn ramp_model(n: usize) -> ReferenceModel {
        let values: Vec<f64> = (0..=n).map(|i| i as f64).collect();
        ReferenceModel::build(&PointCloud::from_column(&values), &EmbeddingSettings::new(2, 1))
            .unwrap()
    }

    #[test]
    fn test_build_without_pca() {
        let model = ramp_model(100);
        assert_eq!(model.len(), 100);
        assert_eq!(model.reduced_dim(), 2);
        assert!(!model.uses_pca());
        assert_eq!(model.get_data_point(0).unwrap(), &[0.0, 1.0]);
        assert_eq!(model.get_data_point(99).unwrap(), &[99.0, 100.0]);
    }

    #[test]
    fn test_build_with_pca() {
        let settings = EmbeddingSettings::new(6, 2).with_pca_dim(3);
        let model = ReferenceModel::build(&sine_series(300), &settings).unwrap();
        assert!(model.uses_pca());
        assert_eq!(model.reduced_dim(), 3);
        assert_eq!(model.embedding_dim(), 6);
        assert_eq!(model.len(), 300 - 10);
        assert_eq!(model.get_data_point(0).unwrap().len(), 3);
    }

    #[test]
    fn test_data_point_boundary() {
        let model = ramp_model(10);
        assert!(model.get_data_point(model.len() - 1).is_ok());
        // The point count itself has no stored row
        assert!(matches!(
            model.get_data_point(model.len()),
            Err(TdeError::IndexOutOfRange { index: 10, len: 10 })
        ));
        assert!(model.get_data_point(model.len() + 1).is_err());
    }

    #[test]
    fn test_point_clamped() {
        let model = ramp_model(5);
        assert_eq!(model.point_clamped(100), model.get_data_point(4).unwrap());
    }

    #[test]
    fn test_project_data_passthrough() {
        let model = ramp_model(10);
        let data = PointCloud::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let out = model.project_data(data.clone()).unwrap();
        assert_eq!(out, data);

        assert!(model.project_data(PointCloud::zeros(1, 3)).is_err());
    }

    #[test]
    fn test_project_window_matches_training_points() {
        let settings = EmbeddingSettings::new(4, 3).with_pca_dim(2);
        let series = sine_series(120);
        let model = ReferenceModel::build(&series, &settings).unwrap();

        let samples = series.column(0);
        let window = model.project_window(&samples[5..], 3).unwrap();
        for r in 0..3 {
            for (a, b) in window.row(r).iter().zip(model.get_data_point(5 + r).unwrap()) {
                assert_relative_eq!(a, b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_window_size() {
        let settings = EmbeddingSettings::new(4, 3);
        let model = ReferenceModel::build(&sine_series(50), &settings).unwrap();
        assert_eq!(model.window_size(16), 3 * 3 + 16 + 1);
    }

    #[test]
    fn test_nearest() {
        let model = ramp_model(20);
        let nn = model.nearest(&[5.0, 6.0], 3).unwrap();
        let idx: Vec<usize> = nn.into_iter().flatten().map(|n| n.index).collect();
        assert_eq!(idx, vec![5, 4, 6]);
    }

    #[test]
    fn test_dump_parse_round_trip() {
        for settings in [
            EmbeddingSettings::new(3, 1),
            EmbeddingSettings::new(6, 2).with_pca_dim(2),
        ] {
            let model = ReferenceModel::build(&sine_series(80), &settings).unwrap();
            let text = model.to_dump_string();
            let loaded = ReferenceModel::parse(&text).unwrap();
            assert_eq!(loaded, model);
            assert_eq!(loaded.to_dump_string(), text);
        }
    }

    #[test]
    fn test_parse_rejects_corruption() {
        let model = ReferenceModel::build(
            &sine_series(40),
            &EmbeddingSettings::new(4, 1).with_pca_dim(2),
        )
        .unwrap();
        let text = model.to_dump_string();

        let truncated = &text[..text.len() - 20];
        assert!(matches!(
            ReferenceModel::parse(truncated),
            Err(TdeError::CorruptModel(_))
        ));

        let garbage = text.replacen('4', "x", 1);
        assert!(matches!(
            ReferenceModel::parse(&garbage),
            Err(TdeError::CorruptModel(_))
        ));

        // Mean width disagreeing with the embedding dimension
        let mut lines: Vec<&str> = text.lines().collect();
        lines[2] = "3";
        assert!(ReferenceModel::parse(&lines.join("\n")).is_err());

        assert!(ReferenceModel::parse("").is_err());
        assert!(ReferenceModel::parse("1\n2\n0\n\n2 2\n").is_err());
    }

    #[test]
    fn test_parse_rejects_oversized_index() {
        let overflowing = "1\n2\n0\n\n0 0\nkdtree 1\npoints 4 4611686018427387904\nnodes 0\n";
        assert!(matches!(
            ReferenceModel::parse(overflowing),
            Err(TdeError::CorruptModel(_))
        ));

        // 200000 nested splits over a single point
        let mut chain = String::from("1\n2\n0\n\n0 0\nkdtree 1\npoints 2 1\n0 0\nnodes 200001\n");
        chain.push_str(&"split 0 0\n".repeat(200_000));
        chain.push_str("leaf 1 0\n");
        assert!(matches!(
            ReferenceModel::parse(&chain),
            Err(TdeError::CorruptModel(_))
        ));
    }

    #[test]
    fn test_write_to_matches_dump_string() {
        let model = ReferenceModel::build(
            &sine_series(30),
            &EmbeddingSettings::new(3, 2).with_pca_dim(2),
        )
        .unwrap();
        let mut out = String::new();
        model.write_to(&mut out).unwrap();
        assert_eq!(out, model.to_dump_string());
    }
}
