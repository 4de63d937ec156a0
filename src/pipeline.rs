//! File-level entry points: build a model from a series file, load a model
//! list into a classifier, and classify a whole recorded trajectory.
//!
//! Series files are plain text with one time step per line and one
//! whitespace-separated column per channel. Blank lines and lines starting
//! with `#` are ignored.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::config::{ClassifierConfig, EmbeddingSettings};
use crate::embedding::PointCloud;
use crate::encoder::embed_series;
use crate::error::{Result, TdeError};
use crate::model::{NamedModel, ReferenceModel};
use crate::scores::ScoreMatrix;

/// Suffix appended to a series path to name its model dump.
pub const MODEL_SUFFIX: &str = ".dmp";

/// Parse series text into a cloud (rows = time, columns = channels).
///
/// # Errors
///
/// Returns [`TdeError::InvalidInput`] on unparsable numbers, rows of
/// differing width, or text without any data rows.
pub fn parse_series(text: &str) -> Result<PointCloud> {
    let mut data = Vec::new();
    let mut width = None;
    let mut rows = 0;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let start = data.len();
        for token in line.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| {
                TdeError::invalid_input(format!("line {}: bad number {token:?}", line_no + 1))
            })?;
            data.push(value);
        }
        let cols = data.len() - start;
        match width {
            None => width = Some(cols),
            Some(w) if w != cols => {
                return Err(TdeError::invalid_input(format!(
                    "line {}: expected {w} columns, found {cols}",
                    line_no + 1
                )));
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let Some(cols) = width else {
        return Err(TdeError::invalid_input("series contains no data rows"));
    };
    PointCloud::new(rows, cols, data)
}

/// Read a series file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or
/// [`TdeError::InvalidInput`] if its contents are malformed.
pub fn read_series(path: impl AsRef<Path>) -> Result<PointCloud> {
    let path = path.as_ref();
    let series = parse_series(&fs::read_to_string(path)?)?;
    debug!(
        path = %path.display(),
        rows = series.rows(),
        channels = series.cols(),
        "Read series"
    );
    Ok(series)
}

/// Path of the model dump written for `series_path`.
#[must_use]
pub fn model_path_for(series_path: &Path) -> PathBuf {
    let mut name = series_path.as_os_str().to_owned();
    name.push(MODEL_SUFFIX);
    PathBuf::from(name)
}

/// Build a model from a series file and dump it next to the input as
/// `<input>.dmp`.
///
/// Every column of the file is a channel. `pca_dim == 0` disables PCA.
/// Returns the path of the written model.
///
/// # Errors
///
/// Returns an error if the series cannot be read, the parameters are
/// invalid for its channel count, or the model cannot be written.
pub fn build_model(
    series_path: impl AsRef<Path>,
    embedding_dim: usize,
    pca_dim: usize,
    delay: usize,
) -> Result<PathBuf> {
    let series_path = series_path.as_ref();
    let series = read_series(series_path)?;

    let mut settings = EmbeddingSettings::new(embedding_dim, delay).with_channels(series.cols());
    if pca_dim > 0 {
        settings = settings.with_pca_dim(pca_dim);
    }

    let model = ReferenceModel::build(&series, &settings)?;
    let out = model_path_for(series_path);
    model.dump(&out)?;
    Ok(out)
}

/// Load every model named in a list file into a classifier using the
/// default algorithm.
///
/// # Errors
///
/// See [`load_models_with`].
pub fn load_models(
    list_path: impl AsRef<Path>,
    num_neighbours: usize,
    match_steps: usize,
) -> Result<Classifier> {
    let config = ClassifierConfig::new()
        .with_num_neighbours(num_neighbours)
        .with_match_steps(match_steps);
    load_models_with(list_path, config)
}

/// Load every model named in a list file into a classifier.
///
/// The list holds one model path per line; blank lines are skipped and
/// relative paths are resolved against the list's directory. Models are
/// named by their line in the list. A model that fails to load is logged
/// and skipped; the others still load.
///
/// # Errors
///
/// Returns an error if the list cannot be read or `config` is invalid.
pub fn load_models_with(
    list_path: impl AsRef<Path>,
    config: ClassifierConfig,
) -> Result<Classifier> {
    let list_path = list_path.as_ref();
    let text = fs::read_to_string(list_path)?;
    let base = list_path.parent().unwrap_or_else(|| Path::new(""));
    info!(path = %list_path.display(), "Using models from list");

    let mut models = Vec::new();
    for line in text.lines() {
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        let path = base.join(name);
        match ReferenceModel::load(&path) {
            Ok(model) => models.push(NamedModel::new(name, model)),
            Err(e) => warn!(model = name, error = %e, "Could not load model, skipping"),
        }
    }

    let classifier = Classifier::new(models, config)?;
    info!(
        models = classifier.num_models(),
        window_size = classifier.window_size(),
        "Loaded models"
    );
    Ok(classifier)
}

/// Classify a recorded series against every model of `classifier` and
/// write the scores as tab-separated text.
///
/// The series is embedded and projected once per model. Embedded lengths
/// differ between models with different lags, so all of them are cut to
/// the shortest and `len - match_steps` windows are scored.
///
/// # Errors
///
/// Returns an error if the input cannot be read or embedded under some
/// model, or the output cannot be written.
pub fn classify_trajectory(
    classifier: &mut Classifier,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<ScoreMatrix> {
    let input = input.as_ref();
    let output = output.as_ref();
    let series = read_series(input)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        "Classifying trajectory"
    );

    let mut data = Vec::with_capacity(classifier.num_models());
    for named in classifier.models() {
        let settings = EmbeddingSettings::new(named.model.embedding_dim(), named.model.delay())
            .with_channels(series.cols());
        let embedded = embed_series(&series, &settings)?;
        data.push(named.model.project_data(embedded)?);
    }

    let length = data.iter().map(PointCloud::rows).min().unwrap_or(0);
    for cloud in &mut data {
        cloud.truncate_rows(length);
    }

    let scores = classifier.classify(&data, length.saturating_sub(1))?;
    scores.write_tsv(BufWriter::new(File::create(output)?))?;
    info!(windows = scores.rows(), "Wrote scores");
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_series() {
        let text = "# header\n1 2\n\n3\t4\n  5 6  \n";
        let series = parse_series(text).unwrap();
        assert_eq!(series.rows(), 3);
        assert_eq!(series.cols(), 2);
        assert_eq!(series.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_parse_series_single_column() {
        let series = parse_series("0.5\n-1e-3\n2\n").unwrap();
        assert_eq!(series.column(0), vec![0.5, -1e-3, 2.0]);
    }

    #[test]
    fn test_parse_series_errors() {
        assert!(matches!(
            parse_series("1 2\n3\n"),
            Err(TdeError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_series("1 x\n"),
            Err(TdeError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_series("# only a comment\n"),
            Err(TdeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_model_path_for() {
        assert_eq!(
            model_path_for(Path::new("data/walk.txt")),
            PathBuf::from("data/walk.txt.dmp")
        );
    }
}
