//! Clustering features: sufficient statistics for a set of merged points.
//!
//! A clustering feature (CF) stores the vector sum, the sum of squared norms,
//! and the count of the points it summarizes, plus a *reference point* used
//! when deciding whether another point may be merged in.
//!
//! # 1-means cost
//!
//! The cost of serving every summarized point from a center `c` is
//!
//! ```text
//! Σᵢ ‖pᵢ - c‖² = Σᵢ ‖pᵢ‖² - 2 c·Σᵢ pᵢ + n ‖c‖²
//!              = squared - 2 c·sum + size ‖c‖²
//! ```
//!
//! so it is available without touching the individual points again.
//!
//! The reference point is fixed when a CF is first populated. It is never
//! moved to the true centroid, which keeps merge decisions stable.

use crate::error::{Error, Result};
use crate::point::Point;
use core::ops::{Add, AddAssign};

/// Sufficient statistics for a set of points.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringFeature {
    reference: Point,
    sum: Point,
    squared: f64,
    /// Running compensation term for `squared` (Neumaier summation).
    squared_comp: f64,
    size: u64,
}

impl ClusteringFeature {
    /// A CF that summarizes nothing. Its centroid is undefined.
    pub fn empty(dim: usize) -> Self {
        Self {
            reference: Point::zeros(dim),
            sum: Point::zeros(dim),
            squared: 0.0,
            squared_comp: 0.0,
            size: 0,
        }
    }

    /// A CF holding exactly one point, which is also its reference.
    pub fn singleton(point: Point) -> Self {
        let squared = point.squared_norm();
        Self {
            sum: point.clone(),
            reference: point,
            squared,
            squared_comp: 0.0,
            size: 1,
        }
    }

    /// Reference point used for merge decisions.
    pub fn reference(&self) -> &Point {
        &self.reference
    }

    /// Vector sum of the summarized points.
    pub fn sum(&self) -> &Point {
        &self.sum
    }

    /// Sum of the squared norms of the summarized points.
    pub fn squared(&self) -> f64 {
        self.squared + self.squared_comp
    }

    /// Number of summarized points.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// True for a CF that was never merged into.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Dimension of the summarized points.
    pub fn dim(&self) -> usize {
        self.sum.dim()
    }

    /// Combine two CFs into a new one. The reference is taken from `self`.
    pub fn combine(&self, other: &ClusteringFeature) -> ClusteringFeature {
        let mut out = self.clone();
        out.merge_into(other);
        out
    }

    /// Accumulate `other` into `self` in place. The reference is unchanged.
    pub fn merge_into(&mut self, other: &ClusteringFeature) {
        self.sum += &other.sum;
        self.add_squared(other.squared);
        self.add_squared(other.squared_comp);
        self.size += other.size;
    }

    /// Centroid `sum / size`.
    pub fn centroid(&self) -> Result<Point> {
        if self.size == 0 {
            return Err(Error::UndefinedCentroid);
        }
        Ok(self.sum.scale(1.0 / self.size as f64))
    }

    /// Sum of squared distances of all summarized points to `center`.
    ///
    /// Round-off can push the algebraic form slightly below zero when
    /// `center` sits on the centroid; the result is clamped at zero.
    pub fn kmeans_cost(&self, center: &Point) -> f64 {
        let n = self.size as f64;
        let cost = self.squared() - 2.0 * center.dot(&self.sum) + n * center.squared_norm();
        cost.max(0.0)
    }

    fn add_squared(&mut self, value: f64) {
        let total = self.squared + value;
        if self.squared.abs() >= value.abs() {
            self.squared_comp += (self.squared - total) + value;
        } else {
            self.squared_comp += (value - total) + self.squared;
        }
        self.squared = total;
    }
}

impl Add for &ClusteringFeature {
    type Output = ClusteringFeature;

    fn add(self, rhs: &ClusteringFeature) -> ClusteringFeature {
        self.combine(rhs)
    }
}

impl AddAssign<&ClusteringFeature> for ClusteringFeature {
    fn add_assign(&mut self, rhs: &ClusteringFeature) {
        self.merge_into(rhs);
    }
}
