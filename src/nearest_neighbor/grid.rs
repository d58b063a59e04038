//! Grid-bucket random projection index.
//!
//! Each of `p` random directions cuts the line into intervals of width `2r`.
//! A point falls into one bucket per direction:
//!
//! ```text
//! bucket_j(x) = floor( (x · d_j) / (2r) )
//! ```
//!
//! A query inspects only the *smallest* of its `p` buckets and ranks that
//! bucket's entries by exact distance. More directions mean smaller buckets
//! and fewer distance computations, at the cost of more misses.
//!
//! Without the radius filter, nothing beyond bucket granularity bounds the
//! returned distances; callers needing a hard cutoff turn the filter on.

use super::{project, random_directions, sort_by_distance, Candidate, NearestNeighbor};
use crate::point::{squared_distance, Point};
use ndarray::Array2;
use rand::Rng;
use std::collections::HashMap;

/// Grid-bucket random projection index.
#[derive(Debug, Clone)]
pub struct GridProjection<M> {
    radius: f64,
    radius_filter: bool,
    directions: Array2<f64>,
    /// Per direction: bucket id -> positions in `entries`.
    buckets: Vec<HashMap<i64, Vec<usize>>>,
    entries: Vec<(Point, M)>,
}

impl<M: Copy> GridProjection<M> {
    /// Create an empty index with freshly drawn directions.
    pub fn new(dimension: usize, number_projections: usize, radius: f64, rng: &mut impl Rng) -> Self {
        Self {
            radius,
            radius_filter: false,
            directions: random_directions(dimension, number_projections, rng),
            buckets: vec![HashMap::new(); number_projections],
            entries: Vec::new(),
        }
    }

    /// Drop candidates whose squared distance is not below the radius.
    pub fn with_radius_filter(mut self, enabled: bool) -> Self {
        self.radius_filter = enabled;
        self
    }

    /// Neighborhood radius.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Bucket id of `point` along every direction.
    pub fn bucket_ids(&self, point: &Point) -> Vec<i64> {
        let width = 2.0 * self.radius;
        project(&self.directions, point)
            .iter()
            .map(|v| (v / width).floor() as i64)
            .collect()
    }
}

impl<M: Copy + Send + Sync> NearestNeighbor<M> for GridProjection<M> {
    fn insert_candidate(&mut self, point: &Point, metadata: M) {
        let pos = self.entries.len();
        let ids = self.bucket_ids(point);
        for (bucket, id) in self.buckets.iter_mut().zip(ids) {
            bucket.entry(id).or_default().push(pos);
        }
        self.entries.push((point.clone(), metadata));
    }

    fn get_candidates(&self, query: &Point) -> Vec<Candidate<'_, M>> {
        let ids = self.bucket_ids(query);

        // Smallest bucket among the ones the query falls into; an unseen
        // bucket counts as empty and wins immediately.
        let mut smallest: &[usize] = &[];
        let mut smallest_len = usize::MAX;
        for (bucket, id) in self.buckets.iter().zip(&ids) {
            let members = bucket.get(id).map(Vec::as_slice).unwrap_or(&[]);
            if members.len() < smallest_len {
                smallest = members;
                smallest_len = members.len();
                if smallest_len == 0 {
                    break;
                }
            }
        }

        let mut out: Vec<Candidate<'_, M>> = smallest
            .iter()
            .map(|&pos| {
                let (point, metadata) = &self.entries[pos];
                Candidate {
                    point,
                    metadata: *metadata,
                    distance: squared_distance(point, query),
                }
            })
            .filter(|c| !self.radius_filter || c.distance < self.radius)
            .collect();
        sort_by_distance(&mut out);
        out
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
