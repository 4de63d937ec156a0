//! Numerical building blocks.
//!
//! This module provides:
//! - [`linalg`]: PCA basis fitting and projection
//! - [`kdtree`]: exact k-nearest-neighbour index
//! - [`format`]: fixed-precision text encoding for dumps

pub mod format;
pub mod kdtree;
pub mod linalg;

pub use kdtree::{squared_distance, KdTree, Neighbour};
pub use linalg::{compute_pca_basis, PcaBasis, PcaDecomposition};
