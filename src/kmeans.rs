//! Weighted k-means for solving on a coreset.
//!
//! A coreset replaces n points by m ≪ n weighted points. Running k-means on
//! it means minimizing the **weighted** within-cluster sum of squares:
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ wᵢ ||xᵢ - μₖ||²
//! ```
//!
//! # Lloyd's Algorithm, weighted
//!
//! 1. Initialize k centroids via weighted k-means++
//! 2. **Assign**: each point → nearest centroid
//! 3. **Update**: each centroid → weighted mean of its points
//! 4. Repeat until the centroids stop moving
//!
//! ## Weighted k-means++
//!
//! Same as k-means++, except the next centroid is drawn with probability
//! proportional to `w(x) · D(x)²`. A weighted point behaves exactly like `w`
//! coincident unit points.

use crate::coreset::Coreset;
use crate::error::{Error, Result};
use crate::point::Point;
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Weighted k-means clustering.
#[derive(Debug, Clone)]
pub struct WeightedKmeans {
    /// Number of clusters.
    k: usize,
    /// Maximum iterations.
    max_iter: usize,
    /// Convergence tolerance on the squared centroid shift.
    tol: f64,
    /// Random seed.
    seed: Option<u64>,
}

impl WeightedKmeans {
    /// Create a new weighted k-means solver.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 100,
            tol: 1e-8,
            seed: None,
        }
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of clusters.
    pub fn n_clusters(&self) -> usize {
        self.k
    }

    /// Fit centers to a coreset.
    pub fn fit(&self, coreset: &Coreset) -> Result<Vec<Point>> {
        if coreset.is_empty() {
            return Err(Error::EmptyInput);
        }
        let n = coreset.len();
        if self.k == 0 || self.k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }

        let d = coreset.as_slice()[0].point.dim();
        let mut flat: Vec<f64> = Vec::with_capacity(n * d);
        let mut weights: Vec<f64> = Vec::with_capacity(n);
        for wp in coreset {
            if wp.point.dim() != d {
                return Err(Error::DimensionMismatch {
                    expected: d,
                    found: wp.point.dim(),
                });
            }
            flat.extend(wp.point.iter());
            weights.push(wp.weight as f64);
        }
        let data = Array2::from_shape_vec((n, d), flat).map_err(|e| {
            Error::InternalInvariantViolation(format!("coreset matrix shape: {e}"))
        })?;
        let weights = Array1::from(weights);

        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(s) => Box::new(StdRng::seed_from_u64(s)),
            None => Box::new(rand::rng()),
        };

        let mut centroids = self.init_centroids(&data, &weights, &mut rng);
        let mut labels = vec![0usize; n];

        for _iter in 0..self.max_iter {
            // Assignment step - parallel when feature enabled
            #[cfg(feature = "parallel")]
            {
                let centroids_ref = &centroids;
                labels.par_iter_mut().enumerate().for_each(|(i, label)| {
                    *label = Self::nearest(&data.row(i), centroids_ref).0;
                });
            }

            #[cfg(not(feature = "parallel"))]
            for (i, label) in labels.iter_mut().enumerate() {
                *label = Self::nearest(&data.row(i), &centroids).0;
            }

            // Update step
            let mut new_centroids = Array2::zeros((self.k, d));
            let mut mass = vec![0.0f64; self.k];

            for i in 0..n {
                let k = labels[i];
                let w = weights[i];
                for j in 0..d {
                    new_centroids[[k, j]] += w * data[[i, j]];
                }
                mass[k] += w;
            }

            for k in 0..self.k {
                if mass[k] > 0.0 {
                    for j in 0..d {
                        new_centroids[[k, j]] /= mass[k];
                    }
                } else {
                    // Empty cluster: reinitialize randomly
                    let idx = rng.random_range(0..n);
                    new_centroids.row_mut(k).assign(&data.row(idx));
                }
            }

            // Check convergence
            let shift: f64 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();

            centroids = new_centroids;

            if shift < self.tol {
                break;
            }
        }

        Ok(centroids.rows().into_iter().map(|r| Point::from(r.to_owned())).collect())
    }

    /// Fit `restarts` times with consecutive seeds and keep the cheapest
    /// solution on the coreset.
    ///
    /// Seeds start at the configured seed, or at a random one when unset.
    pub fn fit_best_of(&self, coreset: &Coreset, restarts: usize) -> Result<Vec<Point>> {
        let base = self.base_seed();
        let mut best: Option<(f64, Vec<Point>)> = None;
        for r in 0..restarts.max(1) {
            let centers = self.clone().with_seed(base.wrapping_add(r as u64)).fit(coreset)?;
            let cost = coreset.kmeans_cost(&centers)?;
            if best.as_ref().is_none_or(|(c, _)| cost < *c) {
                best = Some((cost, centers));
            }
        }
        best.map(|(_, centers)| centers).ok_or(Error::EmptyInput)
    }

    fn base_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| rand::rng().random())
    }

    /// Initialize centroids using weighted k-means++.
    fn init_centroids(
        &self,
        data: &Array2<f64>,
        weights: &Array1<f64>,
        rng: &mut impl Rng,
    ) -> Array2<f64> {
        let n = data.nrows();
        let d = data.ncols();
        let mut centroids = Array2::zeros((self.k, d));

        // First centroid: drawn proportional to weight
        let first = Self::sample(weights.iter().copied(), rng).unwrap_or(0);
        centroids.row_mut(0).assign(&data.row(first));

        for i in 1..self.k {
            let scores = (0..n).map(|j| {
                let point = data.row(j);
                let min_dist = (0..i)
                    .map(|c| Self::squared_distance(&point, &centroids.row(c)))
                    .fold(f64::MAX, f64::min);
                weights[j] * min_dist
            });

            let selected = match Self::sample(scores, rng) {
                Some(j) => j,
                None => rng.random_range(0..n),
            };
            centroids.row_mut(i).assign(&data.row(selected));
        }

        centroids
    }

    /// Index drawn with probability proportional to `scores`, or `None`
    /// when every score is zero.
    fn sample(scores: impl Iterator<Item = f64>, rng: &mut impl Rng) -> Option<usize> {
        let scores: Vec<f64> = scores.collect();
        let total: f64 = scores.iter().sum();
        if total <= 0.0 {
            return None;
        }

        let threshold = rng.random::<f64>() * total;
        let mut cumsum = 0.0;
        for (j, &s) in scores.iter().enumerate() {
            cumsum += s;
            if cumsum >= threshold && s > 0.0 {
                return Some(j);
            }
        }
        scores.iter().rposition(|&s| s > 0.0)
    }

    /// Nearest centroid and its squared distance.
    fn nearest(point: &ArrayView1<'_, f64>, centroids: &Array2<f64>) -> (usize, f64) {
        let mut best_cluster = 0;
        let mut best_dist = f64::MAX;
        for (k, centroid) in centroids.rows().into_iter().enumerate() {
            let dist = Self::squared_distance(point, &centroid);
            if dist < best_dist {
                best_dist = dist;
                best_cluster = k;
            }
        }
        (best_cluster, best_dist)
    }

    /// Compute squared Euclidean distance.
    fn squared_distance(a: &ArrayView1<'_, f64>, b: &ArrayView1<'_, f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
    }
}
