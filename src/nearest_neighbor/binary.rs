//! Random binary projection hashing.
//!
//! A point hashes to the sign pattern of its projections onto `p` random
//! directions, one bit per direction. Points sharing all `p` bits share a
//! bucket. A query ranks its bucket by exact distance and keeps only the
//! entries strictly closer than the radius.

use super::{project, random_directions, sort_by_distance, Candidate, NearestNeighbor};
use crate::point::{squared_distance, Point};
use ndarray::Array2;
use rand::Rng;
use std::collections::HashMap;

/// Random binary projection LSH index.
#[derive(Debug, Clone)]
pub struct BinaryProjection<M> {
    radius: f64,
    directions: Array2<f64>,
    buckets: HashMap<Vec<u64>, Vec<usize>>,
    entries: Vec<(Point, M)>,
}

impl<M: Copy> BinaryProjection<M> {
    /// Create an empty index with freshly drawn directions.
    pub fn new(dimension: usize, number_projections: usize, radius: f64, rng: &mut impl Rng) -> Self {
        Self {
            radius,
            directions: random_directions(dimension, number_projections, rng),
            buckets: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Sign pattern of `point`, packed 64 directions per word.
    pub fn hash(&self, point: &Point) -> Vec<u64> {
        let proj = project(&self.directions, point);
        let mut key = vec![0u64; proj.len().div_ceil(64)];
        for (j, v) in proj.iter().enumerate() {
            if *v > 0.0 {
                key[j / 64] |= 1u64 << (j % 64);
            }
        }
        key
    }
}

impl<M: Copy + Send + Sync> NearestNeighbor<M> for BinaryProjection<M> {
    fn insert_candidate(&mut self, point: &Point, metadata: M) {
        let key = self.hash(point);
        self.buckets.entry(key).or_default().push(self.entries.len());
        self.entries.push((point.clone(), metadata));
    }

    fn get_candidates(&self, query: &Point) -> Vec<Candidate<'_, M>> {
        let Some(members) = self.buckets.get(&self.hash(query)) else {
            return Vec::new();
        };
        let mut out: Vec<Candidate<'_, M>> = members
            .iter()
            .map(|&pos| {
                let (point, metadata) = &self.entries[pos];
                Candidate {
                    point,
                    metadata: *metadata,
                    distance: squared_distance(point, query),
                }
            })
            .filter(|c| c.distance < self.radius)
            .collect();
        sort_by_distance(&mut out);
        out
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
