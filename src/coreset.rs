//! Weighted point sets produced by the engine.

use crate::error::{Error, Result};
use crate::point::{squared_distance, Point};
use std::io;

/// A point standing in for `weight` input points.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedPoint {
    /// Number of input points represented.
    pub weight: u64,
    /// Representative location (a CF centroid).
    pub point: Point,
}

impl WeightedPoint {
    /// Create a weighted point.
    pub fn new(weight: u64, point: Point) -> Self {
        Self { weight, point }
    }
}

/// A coreset: a small weighted point set approximating the k-means cost of
/// the stream it was built from.
///
/// Coresets of independent shards can be concatenated (`extend`) to obtain a
/// coreset of the union.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coreset {
    points: Vec<WeightedPoint>,
}

impl Coreset {
    /// An empty coreset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of weighted points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if there are no weighted points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Weighted points in traversal order.
    pub fn as_slice(&self) -> &[WeightedPoint] {
        &self.points
    }

    /// Iterate over the weighted points.
    pub fn iter(&self) -> std::slice::Iter<'_, WeightedPoint> {
        self.points.iter()
    }

    /// Sum of all weights, i.e. the number of input points represented.
    pub fn total_weight(&self) -> u64 {
        self.points.iter().map(|wp| wp.weight).sum()
    }

    /// Weighted k-means cost of serving the coreset from `centers`:
    /// `Σ w · min_c ‖p - c‖²`.
    pub fn kmeans_cost(&self, centers: &[Point]) -> Result<f64> {
        let Some(first) = centers.first() else {
            return Err(Error::EmptyInput);
        };
        let dim = first.dim();
        for c in centers {
            if c.dim() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    found: c.dim(),
                });
            }
        }

        let mut cost = 0.0;
        for wp in &self.points {
            if wp.point.dim() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    found: wp.point.dim(),
                });
            }
            let nearest = centers
                .iter()
                .map(|c| squared_distance(&wp.point, c))
                .fold(f64::INFINITY, f64::min);
            cost += wp.weight as f64 * nearest;
        }
        Ok(cost)
    }

    /// Write one line per weighted point: the weight, then the coordinates,
    /// separated by single spaces.
    pub fn write_text<W: io::Write>(&self, mut out: W) -> io::Result<()> {
        for wp in &self.points {
            writeln!(out, "{} {}", wp.weight, wp.point)?;
        }
        Ok(())
    }

    /// Take ownership of the weighted points.
    pub fn into_vec(self) -> Vec<WeightedPoint> {
        self.points
    }
}

impl FromIterator<WeightedPoint> for Coreset {
    fn from_iter<I: IntoIterator<Item = WeightedPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl Extend<WeightedPoint> for Coreset {
    fn extend<I: IntoIterator<Item = WeightedPoint>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

impl IntoIterator for Coreset {
    type Item = WeightedPoint;
    type IntoIter = std::vec::IntoIter<WeightedPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a> IntoIterator for &'a Coreset {
    type Item = &'a WeightedPoint;
    type IntoIter = std::slice::Iter<'a, WeightedPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Coreset {
        vec![
            WeightedPoint::new(3, Point::new(vec![0.0, 0.0])),
            WeightedPoint::new(2, Point::new(vec![4.0, 0.0])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_total_weight() {
        assert_eq!(sample().total_weight(), 5);
        assert_eq!(Coreset::new().total_weight(), 0);
    }

    #[test]
    fn test_kmeans_cost_uses_nearest_center() {
        let cs = sample();
        let one = cs.kmeans_cost(&[Point::new(vec![1.0, 0.0])]).unwrap();
        assert_eq!(one, 3.0 * 1.0 + 2.0 * 9.0);

        let two = cs
            .kmeans_cost(&[Point::new(vec![0.0, 0.0]), Point::new(vec![4.0, 1.0])])
            .unwrap();
        assert_eq!(two, 2.0);
    }

    #[test]
    fn test_kmeans_cost_errors() {
        let cs = sample();
        assert_eq!(cs.kmeans_cost(&[]), Err(Error::EmptyInput));
        assert!(matches!(
            cs.kmeans_cost(&[Point::new(vec![0.0, 0.0, 0.0])]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_write_text_format() {
        let mut buf = Vec::new();
        sample().write_text(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "3 0 0\n2 4 0\n");
    }

    #[test]
    fn test_extend_unions_shards() {
        let mut a = sample();
        a.extend(sample());
        assert_eq!(a.len(), 4);
        assert_eq!(a.total_weight(), 10);
    }
}
