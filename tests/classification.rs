//! End-to-end classification tests.
//!
//! These tests build reference models from synthetic signals and check the
//! scores the classifier assigns to windows drawn from the same or other
//! signals, through the in-memory API and the file pipeline.

use approx::assert_relative_eq;
use tde_classifier::{
    build_model, classify_trajectory, embed_window, load_models, load_models_with, Algorithm,
    Classifier, ClassifierConfig, EmbeddingSettings, NamedModel, PointCloud, ReferenceModel,
    StreamingClassifier,
};

const ALGORITHMS: [Algorithm; 3] = [
    Algorithm::IndependentSteps,
    Algorithm::FullMatch,
    Algorithm::SegmentMatch,
];

// =============================================================================
// SIGNAL GENERATORS
// =============================================================================

/// Linear ramp `0, 1, ..., n`.
fn generate_ramp(n: usize) -> Vec<f64> {
    (0..=n).map(|i| i as f64).collect()
}

/// Sine wave with the given angular step per sample.
fn generate_sine(n: usize, freq: f64, phase: f64) -> Vec<f64> {
    (0..n).map(|i| (i as f64 * freq + phase).sin()).collect()
}

/// Sawtooth with the given period in samples.
fn generate_sawtooth(n: usize, period: usize) -> Vec<f64> {
    (0..n)
        .map(|i| (i % period) as f64 / period as f64 - 0.5)
        .collect()
}

fn build(name: &str, values: &[f64], settings: &EmbeddingSettings) -> NamedModel {
    let model = ReferenceModel::build(&PointCloud::from_column(values), settings)
        .expect("model build should succeed");
    NamedModel::new(name, model)
}

fn write_series(path: &std::path::Path, values: &[f64]) {
    let text: String = values.iter().map(|v| format!("{v:e}\n")).collect();
    std::fs::write(path, text).expect("series write should succeed");
}

// =============================================================================
// SCORING
// =============================================================================

#[test]
fn test_linear_model_perfect_agreement() {
    // 100 points embedded with delay 1 and dimension 2
    let model = build("line", &generate_ramp(100), &EmbeddingSettings::new(2, 1));
    assert_eq!(model.model.len(), 100);

    let rows: Vec<Vec<f64>> = (10..15)
        .map(|i| model.model.get_data_point(i).unwrap().to_vec())
        .collect();
    let window = PointCloud::from_rows(&rows).unwrap();

    for algorithm in ALGORITHMS {
        let config = ClassifierConfig::new()
            .with_algorithm(algorithm)
            .with_num_neighbours(2)
            .with_match_steps(4);
        let mut classifier = Classifier::new(vec![model.clone()], config).unwrap();
        let scores = classifier.classify(&[window.clone()], 4).unwrap();
        assert_eq!(scores.rows(), 1);
        // One unit of agreement per step
        assert_relative_eq!(scores.get(0, 0).unwrap(), 4.0, epsilon = 1e-12);
    }
}

#[test]
fn test_scores_are_bit_identical_across_calls() {
    let settings = EmbeddingSettings::new(6, 2).with_pca_dim(3);
    let models = vec![
        build("sine", &generate_sine(600, 0.11, 0.0), &settings),
        build("saw", &generate_sawtooth(600, 37), &settings),
    ];
    let query = generate_sine(200, 0.11, 0.3);

    for algorithm in ALGORITHMS {
        let config = ClassifierConfig::new().with_algorithm(algorithm);
        let mut a = Classifier::new(models.clone(), config).unwrap();
        let mut b = Classifier::new(models.clone(), config).unwrap();

        let window = &query[..a.window_size()];
        let first = a.classify_sample(window).unwrap();
        let second = a.classify_sample(window).unwrap();
        let other = b.classify_sample(window).unwrap();

        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&first), bits(&second));
        assert_eq!(bits(&first), bits(&other));
    }
}

#[test]
fn test_matching_model_scores_highest() {
    let settings = EmbeddingSettings::new(4, 3);
    let models = vec![
        build("sine", &generate_sine(800, 0.09, 0.0), &settings),
        build("saw", &generate_sawtooth(800, 23), &settings),
    ];
    let query = generate_sine(300, 0.09, 0.7);

    for algorithm in ALGORITHMS {
        let config = ClassifierConfig::new().with_algorithm(algorithm);
        let mut classifier = Classifier::new(models.clone(), config).unwrap();
        let start = 40;
        let window = &query[start..start + classifier.window_size()];
        let scores = classifier.classify_sample(window).unwrap();
        assert!(
            scores[0] > scores[1],
            "{algorithm:?}: sine {} vs saw {}",
            scores[0],
            scores[1]
        );
        assert!(scores[0] > 0.8 * config.match_steps as f64);
    }
}

#[test]
fn test_degenerate_model_scores_without_failure() {
    // Fewer points than num_neighbours + match_steps
    let tiny = build("tiny", &[0.0, 0.5, 0.2, 0.9], &EmbeddingSettings::new(2, 1));
    assert_eq!(tiny.model.len(), 3);

    let window = embed_window(&generate_sine(20, 0.4, 0.0), 2, 1, 9).unwrap();
    for algorithm in ALGORITHMS {
        let config = ClassifierConfig::new()
            .with_algorithm(algorithm)
            .with_num_neighbours(2)
            .with_match_steps(4);
        let mut classifier = Classifier::new(vec![tiny.clone()], config).unwrap();
        let scores = classifier.classify(&[window.clone()], 8).unwrap();
        assert_eq!(scores.rows(), 5);
        assert!(scores.as_slice().iter().all(|s| s.is_finite()));
    }
}

#[test]
fn test_models_shared_between_classifiers() {
    let model = build("sine", &generate_sine(400, 0.2, 0.0), &EmbeddingSettings::new(3, 2));
    let query = generate_sine(100, 0.2, 1.0);

    let mut live = Classifier::new(vec![model.clone()], ClassifierConfig::live()).unwrap();
    let mut batch = Classifier::new(vec![model.clone()], ClassifierConfig::default()).unwrap();
    assert!(std::sync::Arc::ptr_eq(&live.models()[0].model, &batch.models()[0].model));

    assert_eq!(live.classify_sample(&query[..live.window_size()]).unwrap().len(), 1);
    assert_eq!(batch.classify_sample(&query[..batch.window_size()]).unwrap().len(), 1);
}

#[test]
fn test_streaming_matches_single_window() {
    let settings = EmbeddingSettings::new(4, 2);
    let models = vec![
        build("sine", &generate_sine(500, 0.15, 0.0), &settings),
        build("saw", &generate_sawtooth(500, 31), &settings),
    ];
    let config = ClassifierConfig::live();
    let mut direct = Classifier::new(models.clone(), config).unwrap();
    let mut stream = StreamingClassifier::new(Classifier::new(models, config).unwrap()).unwrap();
    let w = stream.window_size();

    let query = generate_sine(80, 0.15, 0.4);
    for (t, &sample) in query.iter().enumerate() {
        let streamed = stream.update(sample).unwrap();
        if t + 1 < w {
            assert!(streamed.is_none());
            continue;
        }
        let expected = direct.classify_sample(&query[t + 1 - w..=t]).unwrap();
        assert_eq!(streamed.unwrap(), expected, "sample {t}");
    }
}

// =============================================================================
// FILE PIPELINE
// =============================================================================

#[test]
fn test_build_load_classify_files() {
    let dir = tempfile::tempdir().unwrap();

    let sine_path = dir.path().join("sine.txt");
    let saw_path = dir.path().join("saw.txt");
    write_series(&sine_path, &generate_sine(600, 0.12, 0.0));
    write_series(&saw_path, &generate_sawtooth(600, 29));
    build_model(&sine_path, 6, 3, 2).unwrap();
    build_model(&saw_path, 4, 0, 3).unwrap();

    let list = dir.path().join("models.txt");
    std::fs::write(&list, "sine.txt.dmp\n\nsaw.txt.dmp\n").unwrap();
    let mut classifier = load_models(&list, 2, 8).unwrap();
    assert_eq!(classifier.num_models(), 2);
    assert_eq!(classifier.model_names(), "sine.txt.dmp\tsaw.txt.dmp");
    assert_eq!(classifier.config().algorithm, Algorithm::SegmentMatch);
    // sine: 5 * 2 + 8 + 1, saw: 3 * 3 + 8 + 1
    assert_eq!(classifier.window_size(), 19);

    let input = dir.path().join("query.txt");
    let output = dir.path().join("scores.tsv");
    write_series(&input, &generate_sine(120, 0.12, 0.5));
    let scores = classify_trajectory(&mut classifier, &input, &output).unwrap();

    // Embedded lengths 110 and 111; the shorter one leaves 110 - 8 windows
    assert_eq!(scores.rows(), 102);
    assert_eq!(scores.cols(), 2);

    let text = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 102);
    for (i, line) in lines.iter().enumerate() {
        let values: Vec<f64> = line.split('\t').map(|v| v.parse().unwrap()).collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], scores.get(i, 0).unwrap());
        assert_eq!(values[1], scores.get(i, 1).unwrap());
    }

    let sine_wins = scores
        .best_models()
        .iter()
        .filter(|&&best| best == Some(0))
        .count();
    assert!(sine_wins > 90, "sine won only {sine_wins} of 102 windows");
}

#[test]
fn test_load_models_skips_corrupt_entries() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.txt");
    write_series(&good, &generate_sine(200, 0.2, 0.0));
    let good_model = build_model(&good, 3, 0, 1).unwrap();

    std::fs::write(dir.path().join("broken.dmp"), "2\n3\n0\n\n0 0\nkdtree 1\npoints").unwrap();
    std::fs::write(
        dir.path().join("huge.dmp"),
        "1\n2\n0\n\n0 0\nkdtree 1\npoints 4 4611686018427387904\nnodes 0\n",
    )
    .unwrap();
    let mut chain = String::from("1\n2\n0\n\n0 0\nkdtree 1\npoints 2 1\n0 0\nnodes 200001\n");
    chain.push_str(&"split 0 0\n".repeat(200_000));
    chain.push_str("leaf 1 0\n");
    std::fs::write(dir.path().join("chain.dmp"), chain).unwrap();

    let list = dir.path().join("models.txt");
    std::fs::write(
        &list,
        format!(
            "broken.dmp\nhuge.dmp\n{}\nchain.dmp\nmissing.dmp\n",
            good_model.display()
        ),
    )
    .unwrap();

    let config = ClassifierConfig::live();
    let classifier = load_models_with(&list, config).unwrap();
    assert_eq!(classifier.num_models(), 1);
    assert_eq!(classifier.model_names(), good_model.display().to_string());
    assert_eq!(classifier.config(), &config);
}

#[test]
fn test_empty_model_list() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("models.txt");
    std::fs::write(&list, "\n\n").unwrap();

    let mut classifier = load_models(&list, 2, 16).unwrap();
    assert_eq!(classifier.num_models(), 0);
    assert!(classifier.classify(&[], 50).unwrap().is_empty());

    let input = dir.path().join("query.txt");
    let output = dir.path().join("scores.tsv");
    write_series(&input, &generate_sine(50, 0.1, 0.0));
    let scores = classify_trajectory(&mut classifier, &input, &output).unwrap();
    assert!(scores.is_empty());
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "");
}
