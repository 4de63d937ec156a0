//! Time-Delay Embedding Classifier
//!
//! Activity classification by nearest-neighbour trajectory matching.
//!
//! Each activity is represented by a reference model: a time-delay embedding
//! of a recorded signal, optionally reduced with PCA and indexed with a k-d
//! tree. A live trajectory is scored against every model by following the
//! model's own trajectories from the points nearest to it and measuring how
//! well their direction of travel predicts the live one.
//!
//! # Features
//!
//! - **Delay embedding**: multi-channel series to fixed-width state vectors
//! - **PCA reduction**: deterministic, sign-normalized bases
//! - **Exact k-NN**: arena k-d tree with a lossless text dump
//! - **Three scoring algorithms**: per-step requery, followed neighbours,
//!   segment interpolation
//! - **Streaming support**: circular buffer feeding single-window queries
//!
//! # Quick Start
//!
//! ```
//! use tde_classifier::{
//!     Classifier, ClassifierConfig, EmbeddingSettings, NamedModel, PointCloud, ReferenceModel,
//! };
//!
//! // Two activities recorded as single-channel signals
//! let slow: Vec<f64> = (0..400).map(|i| (f64::from(i) * 0.1).sin()).collect();
//! let fast: Vec<f64> = (0..400).map(|i| (f64::from(i) * 0.4).sin()).collect();
//!
//! let settings = EmbeddingSettings::new(4, 2).with_pca_dim(3);
//! let models = vec![
//!     NamedModel::new("slow", ReferenceModel::build(&PointCloud::from_column(&slow), &settings)?),
//!     NamedModel::new("fast", ReferenceModel::build(&PointCloud::from_column(&fast), &settings)?),
//! ];
//!
//! let mut classifier = Classifier::new(models, ClassifierConfig::default())?;
//! assert_eq!(classifier.model_names(), "slow\tfast");
//!
//! // One score per model for a window of raw samples
//! let window = &slow[100..100 + classifier.window_size()];
//! let scores = classifier.classify_sample(window)?;
//! assert_eq!(scores.len(), 2);
//! # Ok::<(), tde_classifier::TdeError>(())
//! ```
//!
//! # Model Files
//!
//! Models round-trip through a plain-text dump:
//!
//! ```
//! use tde_classifier::{EmbeddingSettings, PointCloud, ReferenceModel};
//!
//! let ramp: Vec<f64> = (0..50).map(f64::from).collect();
//! let model = ReferenceModel::build(&PointCloud::from_column(&ramp), &EmbeddingSettings::new(3, 1))?;
//!
//! let text = model.to_dump_string();
//! let loaded = ReferenceModel::parse(&text)?;
//! assert_eq!(loaded, model);
//! # Ok::<(), tde_classifier::TdeError>(())
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod classifier;
pub mod config;
pub mod decoder;
pub mod distance;
pub mod embedding;
pub mod encoder;
pub mod error;
pub mod math;
pub mod model;
pub mod pipeline;
pub mod scores;
pub mod streaming;

// Re-exports for convenient access
pub use classifier::{Classifier, NeighbourStrategy};
pub use config::{Algorithm, ClassifierConfig, EmbeddingSettings};
pub use decoder::{compute_reconstruction_error, reconstruct_points};
pub use distance::{directional_agreement, squared_distance};
pub use embedding::PointCloud;
pub use encoder::{embed_series, embed_window};
pub use error::{Result, TdeError};
pub use math::{compute_pca_basis, KdTree, Neighbour, PcaBasis, PcaDecomposition};
pub use model::{NamedModel, ReferenceModel};
pub use pipeline::{build_model, classify_trajectory, load_models, load_models_with, read_series};
pub use scores::ScoreMatrix;
pub use streaming::StreamingClassifier;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
