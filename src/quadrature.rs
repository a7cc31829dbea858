//! Quadrature rules on the reference simplices.
//!
//! Rules come from `fenris-quadrature`: Gauss rules on segments and `polyquad` rules on
//! triangles and tetrahedra. Those are defined on the reference domains spanned by
//! `[-1, 1]`, and are mapped affinely onto the unit simplices used by the basis, whose first
//! vertex is the origin.
use crate::classification::ElementShape;
use eyre::WrapErr;
use fenris_quadrature::{polyquad, univariate};
use nalgebra::Point3;

/// A quadrature rule on a reference domain, with points embedded in 3D.
///
/// Unused coordinates of lower-dimensional rules are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadrature {
    weights: Vec<f64>,
    points: Vec<Point3<f64>>,
}

impl Quadrature {
    pub fn from_weights_and_points(weights: Vec<f64>, points: Vec<Point3<f64>>) -> Self {
        assert_eq!(weights.len(), points.len(), "weights and points must have the same length");
        Self { weights, points }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Approximates the integral of the given function over the reference domain.
    pub fn integrate(&self, f: impl Fn(&Point3<f64>) -> f64) -> f64 {
        self.weights
            .iter()
            .zip(&self.points)
            .map(|(w, p)| w * f(p))
            .sum()
    }
}

/// Maps a rule on the `[-1, 1]` reference domain of dimension `D` onto the unit simplex.
fn from_biunit_rule<const D: usize>((weights, points): (Vec<f64>, Vec<[f64; D]>)) -> Quadrature {
    let scale = 0.5_f64.powi(D as i32);
    let weights = weights.into_iter().map(|w| scale * w).collect();
    let points = points
        .into_iter()
        .map(|x| {
            let mut p = Point3::origin();
            for k in 0..D {
                p[k] = 0.5 * (x[k] + 1.0);
            }
            p
        })
        .collect();
    Quadrature::from_weights_and_points(weights, points)
}

/// Gauss rule on the reference segment `[0, 1]`, exact for polynomials of degree `strength`.
pub fn segment(strength: usize) -> eyre::Result<Quadrature> {
    let points = strength / 2 + 1;
    Ok(from_biunit_rule(univariate::gauss(points)))
}

/// Rule on the reference triangle, exact for polynomials of degree `strength`.
pub fn triangle(strength: usize) -> eyre::Result<Quadrature> {
    let rule = polyquad::triangle(strength)
        .wrap_err_with(|| format!("no triangle quadrature of strength {} available", strength))?;
    Ok(from_biunit_rule(rule))
}

/// Rule on the reference tetrahedron, exact for polynomials of degree `strength`.
pub fn tetrahedron(strength: usize) -> eyre::Result<Quadrature> {
    let rule = polyquad::tetrahedron(strength)
        .wrap_err_with(|| format!("no tetrahedron quadrature of strength {} available", strength))?;
    Ok(from_biunit_rule(rule))
}

/// Rule of the given strength for the given shape.
pub fn simplex(shape: ElementShape, strength: usize) -> eyre::Result<Quadrature> {
    match shape {
        ElementShape::Segment => segment(strength),
        ElementShape::Triangle => triangle(strength),
        ElementShape::Tetrahedron => tetrahedron(strength),
    }
}
