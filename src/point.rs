//! Points in R^d.
//!
//! A [`Point`] is a thin wrapper over an `ndarray` vector. It supports the
//! three operations clustering features need: addition, scalar
//! multiplication, and the inner product.

use crate::error::{Error, Result};
use core::fmt;
use core::ops::{Add, AddAssign};
use ndarray::{Array1, ArrayView1};

/// A d-dimensional point.
///
/// Immutable by convention: operations return new points, except
/// [`AddAssign`], which is used to accumulate running sums.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    coords: Array1<f64>,
}

impl Point {
    /// Create a point from its components.
    pub fn new(coords: Vec<f64>) -> Self {
        Self {
            coords: Array1::from(coords),
        }
    }

    /// The origin of R^dim.
    pub fn zeros(dim: usize) -> Self {
        Self {
            coords: Array1::zeros(dim),
        }
    }

    /// Number of components.
    pub fn dim(&self) -> usize {
        self.coords.len()
    }

    /// View of the components.
    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.coords.view()
    }

    /// Iterate over the components.
    pub fn iter(&self) -> impl Iterator<Item = &f64> + '_ {
        self.coords.iter()
    }

    /// Copy the components into a `Vec`.
    pub fn to_vec(&self) -> Vec<f64> {
        self.coords.to_vec()
    }

    /// Inner product.
    pub fn dot(&self, other: &Point) -> f64 {
        self.coords.dot(&other.coords)
    }

    /// Self inner product, `‖p‖²`.
    pub fn squared_norm(&self) -> f64 {
        self.dot(self)
    }

    /// Scalar multiplication.
    pub fn scale(&self, factor: f64) -> Point {
        Point {
            coords: &self.coords * factor,
        }
    }

    /// Check that the point has `dim` finite components.
    pub fn validate(&self, dim: usize) -> Result<()> {
        if self.dim() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found: self.dim(),
            });
        }
        match self.coords.iter().position(|x| !x.is_finite()) {
            Some(index) => Err(Error::NonFiniteInput { index }),
            None => Ok(()),
        }
    }
}

/// Squared Euclidean distance between two points of equal dimension.
pub fn squared_distance(a: &Point, b: &Point) -> f64 {
    a.coords
        .iter()
        .zip(b.coords.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum()
}

impl Add for &Point {
    type Output = Point;

    fn add(self, rhs: &Point) -> Point {
        Point {
            coords: &self.coords + &rhs.coords,
        }
    }
}

impl AddAssign<&Point> for Point {
    fn add_assign(&mut self, rhs: &Point) {
        self.coords += &rhs.coords;
    }
}

impl From<Vec<f64>> for Point {
    fn from(coords: Vec<f64>) -> Self {
        Self::new(coords)
    }
}

impl From<&[f64]> for Point {
    fn from(coords: &[f64]) -> Self {
        Self::new(coords.to_vec())
    }
}

impl From<Array1<f64>> for Point {
    fn from(coords: Array1<f64>) -> Self {
        Self { coords }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for x in self.coords.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{x}")?;
            first = false;
        }
        Ok(())
    }
}
