//! Approximate nearest-neighbor indexes over a tree level's reference points.
//!
//! Every tree node keeps an index over the reference points of its direct
//! children. When a point cannot be merged into the node itself, the index
//! answers "which child is this point close to?". An empty answer means a
//! new child must be opened.
//!
//! The indexes are approximate: they may miss true neighbors (false
//! negatives cost an extra summary node, never correctness of the weights).
//!
//! ## Variants
//!
//! | Variant | Bucketing | Radius cutoff |
//! |---------|-----------|---------------|
//! | [`GridProjection`] | `floor(p·dⱼ / 2r)` per direction, smallest bucket wins | optional |
//! | [`BinaryProjection`] | sign pattern of `p·dⱼ` across all directions | always |
//!
//! Radii are in squared-distance units, the same units as merge thresholds.

mod binary;
mod grid;

pub use binary::BinaryProjection;
pub use grid::GridProjection;

use crate::error::{Error, Result};
use crate::point::Point;
use core::fmt;
use core::str::FromStr;
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::StandardNormal;

/// A candidate neighbor returned by [`NearestNeighbor::get_candidates`].
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a, M> {
    /// The registered point.
    pub point: &'a Point,
    /// Metadata attached at registration.
    pub metadata: M,
    /// Squared Euclidean distance to the query.
    pub distance: f64,
}

/// Capability interface for approximate radius-bounded neighbor lookup.
///
/// Indexes are owned by tree nodes, so they must be `Send + Sync` for an
/// engine to move to another thread.
pub trait NearestNeighbor<M: Copy>: Send + Sync {
    /// Register `point` for future queries, tagged with `metadata`.
    fn insert_candidate(&mut self, point: &Point, metadata: M);

    /// Registered points plausibly near `query`, ascending by distance.
    ///
    /// May omit true neighbors. An empty result means no usable neighbor.
    fn get_candidates(&self, query: &Point) -> Vec<Candidate<'_, M>>;

    /// Number of registered points.
    fn len(&self) -> usize;

    /// True if nothing was registered yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which index implementation tree nodes use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NnVariant {
    /// Grid-bucket random projections ([`GridProjection`]).
    #[default]
    Grid,
    /// Random binary projection hashing ([`BinaryProjection`]).
    BinaryHash,
}

impl NnVariant {
    /// Build an empty index of this variant.
    pub fn build<M: Copy + Send + Sync + 'static>(
        self,
        params: &IndexParams,
        rng: &mut impl Rng,
    ) -> Box<dyn NearestNeighbor<M>> {
        match self {
            NnVariant::Grid => Box::new(
                GridProjection::<M>::new(params.dimension, params.number_projections, params.radius, rng)
                    .with_radius_filter(params.radius_filter),
            ),
            NnVariant::BinaryHash => Box::new(BinaryProjection::<M>::new(
                params.dimension,
                params.number_projections,
                params.radius,
                rng,
            )),
        }
    }
}

impl FromStr for NnVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "grid" | "simple" => Ok(NnVariant::Grid),
            "binary" | "binary_hash" => Ok(NnVariant::BinaryHash),
            _ => Err(Error::InvalidConfig {
                name: "nn_variant",
                message: "unknown nearest-neighbor variant",
            }),
        }
    }
}

impl fmt::Display for NnVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NnVariant::Grid => write!(f, "grid"),
            NnVariant::BinaryHash => write!(f, "binary"),
        }
    }
}

/// Construction parameters shared by all index variants.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    /// Dimension of indexed points.
    pub dimension: usize,
    /// Number of random directions.
    pub number_projections: usize,
    /// Neighborhood radius (squared-distance units).
    pub radius: f64,
    /// Drop grid candidates whose distance is not below `radius`.
    pub radius_filter: bool,
}

/// `count` directions in R^dim with i.i.d. standard normal components.
pub(crate) fn random_directions(dim: usize, count: usize, rng: &mut impl Rng) -> Array2<f64> {
    Array2::from_shape_simple_fn((count, dim), || rng.sample(StandardNormal))
}

/// Projection of `point` onto every row of `directions`.
pub(crate) fn project(directions: &Array2<f64>, point: &Point) -> Array1<f64> {
    directions.dot(&point.view())
}

/// Sort candidates ascending by distance.
pub(crate) fn sort_by_distance<M>(candidates: &mut [Candidate<'_, M>]) {
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_variant_from_str() {
        assert_eq!("grid".parse::<NnVariant>().unwrap(), NnVariant::Grid);
        assert_eq!("Simple".parse::<NnVariant>().unwrap(), NnVariant::Grid);
        assert_eq!("binary".parse::<NnVariant>().unwrap(), NnVariant::BinaryHash);
        assert!("kd_tree".parse::<NnVariant>().is_err());
    }

    #[test]
    fn test_build_each_variant() {
        let mut rng = StdRng::seed_from_u64(7);
        let params = IndexParams {
            dimension: 2,
            number_projections: 4,
            radius: 1.0,
            radius_filter: false,
        };
        for variant in [NnVariant::Grid, NnVariant::BinaryHash] {
            let mut index: Box<dyn NearestNeighbor<usize>> = variant.build(&params, &mut rng);
            assert!(index.is_empty());
            index.insert_candidate(&Point::new(vec![0.1, 0.1]), 3);
            assert_eq!(index.len(), 1);

            let found = index.get_candidates(&Point::new(vec![0.1, 0.1]));
            assert_eq!(found.len(), 1, "variant {variant}");
            assert_eq!(found[0].metadata, 3);
            assert_eq!(found[0].distance, 0.0);
        }
    }

    #[test]
    fn test_indexes_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn NearestNeighbor<usize>>();
        assert_send_sync::<GridProjection<usize>>();
        assert_send_sync::<BinaryProjection<usize>>();
    }

    #[test]
    fn test_random_directions_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let dirs = random_directions(3, 5, &mut rng);
        assert_eq!(dirs.dim(), (5, 3));
        let proj = project(&dirs, &Point::new(vec![1.0, 0.0, 0.0]));
        assert_eq!(proj.len(), 5);
        assert_eq!(proj[2], dirs[[2, 0]]);
    }
}
