//! # bico
//!
//! One-pass streaming coresets for k-means.
//!
//! BICO reduces an arbitrarily long stream of points in R^d to a bounded
//! number of weighted points whose k-means cost approximates that of the
//! whole stream. Points are summarized by clustering features held in a
//! tree; each tree level uses an approximate nearest-neighbor index to find
//! the summary a new point belongs to. When the number of summaries exceeds
//! the budget, the merge threshold doubles and the tree is rebuilt.
//!
//! ```rust
//! use bico::{Bico, BicoConfig, NnVariant};
//!
//! let config = BicoConfig::new(2, 4, 32)
//!     .with_nn_variant(NnVariant::Grid)
//!     .with_seed(42);
//! let mut bico = Bico::new(config).unwrap();
//!
//! for i in 0..1_000 {
//!     let t = i as f64;
//!     bico.insert_point(vec![t.sin() * 10.0, t.cos() * 10.0]).unwrap();
//! }
//!
//! let coreset = bico.into_coreset().unwrap();
//! assert_eq!(coreset.total_weight(), 1_000);
//! assert!(coreset.len() <= 32);
//! ```
//!
//! The engine is single-writer. To use several cores, run one engine per
//! shard and concatenate the resulting coresets.

/// Coreset output type.
pub mod coreset;
pub mod engine;
/// Error types used across `bico`.
pub mod error;
pub mod feature;
#[cfg(feature = "kmeans")]
pub mod kmeans;
pub mod nearest_neighbor;
pub mod node;
pub mod point;

#[cfg(test)]
mod stream_tests;

pub use coreset::{Coreset, WeightedPoint};
pub use engine::{Bico, BicoConfig, BicoStats};
pub use error::{Error, Result};
pub use feature::ClusteringFeature;
pub use nearest_neighbor::{
    BinaryProjection, Candidate, GridProjection, IndexParams, NearestNeighbor, NnVariant,
};
pub use node::{ChildHandle, Insertion, TreeNode};
pub use point::{squared_distance, Point};

#[cfg(feature = "kmeans")]
pub use kmeans::WeightedKmeans;
