//! Reference basis functions and their mapping to physical elements.
//!
//! Elements are mapped from the unit reference simplex, which has its first vertex in the
//! origin and the remaining vertices on the unit axes. Two bases are provided on every element:
//!
//! - nodal (P1) shape functions `N_a = λ_a`, with physical gradients `J^{-T} ∇λ_a`,
//! - lowest-order Whitney edge functions `W_e = λ_a ∇λ_b - λ_b ∇λ_a` for the local edge
//!   `e = (a, b)`, mapped with the covariant Piola transform `J^{-T} W_e` and with curls
//!   mapped by the contravariant Piola transform `J curl W_e / det J`.
//!
//! Planar meshes are embedded in 3D with zero z-coordinates, so that the curl of an edge
//! function of a triangle is a vector along the z-axis.
//!
//! Facet elements (segments in planar meshes, triangles in solid meshes) only carry the nodal
//! basis. Their gradients are surface gradients, their Jacobian determinant is the surface
//! measure and they additionally provide a unit normal.
use crate::classification::{ElementShape, GeometryType};
use crate::error::NumericalError;
use crate::mesh::MeshElement;
use crate::quadrature::{self, Quadrature};
use eyre::eyre;
use nalgebra::{Matrix2, Matrix3, Point3, Vector2, Vector3};

/// Basis function values of one element at one point.
///
/// Buffers are sized once for a geometry type with [`OperatorValues::for_geometry`] and then
/// overwritten in place for every element and point.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorValues {
    pub geometry: GeometryType,
    /// The physical point the values were evaluated at.
    pub point: Point3<f64>,
    /// Nodal shape function values, one per vertex.
    pub shape: Vec<f64>,
    /// Physical (surface) gradients of the nodal shape functions.
    pub gradient: Vec<Vector3<f64>>,
    /// Physical edge functions, one per local edge, with the global edge orientation applied.
    pub edge_shape: Vec<Vector3<f64>>,
    /// Physical curls of the edge functions.
    pub curl: Vec<Vector3<f64>>,
    /// Signed Jacobian determinant for bulk elements, surface measure for facet elements.
    pub jacobian_determinant: f64,
    /// Unit normal of facet elements, zero for bulk elements.
    pub normal: Vector3<f64>,
}

impl OperatorValues {
    pub fn for_geometry(geometry: GeometryType) -> Self {
        let vertices = geometry.shape.vertex_count();
        let edges = geometry.shape.edge_count();
        Self {
            geometry,
            point: Point3::origin(),
            shape: vec![0.0; vertices],
            gradient: vec![Vector3::zeros(); vertices],
            edge_shape: vec![Vector3::zeros(); edges],
            curl: vec![Vector3::zeros(); edges],
            jacobian_determinant: 0.0,
            normal: Vector3::zeros(),
        }
    }

    /// The factor converting reference measure to physical measure.
    pub fn measure(&self) -> f64 {
        self.jacobian_determinant.abs()
    }

    /// Evaluates `Σ u_i W_i` for the given edge coefficients.
    pub fn interpolate_edge_field(&self, coefficients: impl IntoIterator<Item = f64>) -> Vector3<f64> {
        self.edge_shape
            .iter()
            .zip(coefficients)
            .map(|(w, u)| w * u)
            .sum()
    }

    /// Evaluates `Σ u_i curl W_i` for the given edge coefficients.
    pub fn interpolate_curl(&self, coefficients: impl IntoIterator<Item = f64>) -> Vector3<f64> {
        self.curl.iter().zip(coefficients).map(|(c, u)| c * u).sum()
    }

    /// Evaluates `Σ u_a N_a` for the given nodal coefficients.
    pub fn interpolate_nodal(&self, coefficients: impl IntoIterator<Item = f64>) -> f64 {
        self.shape.iter().zip(coefficients).map(|(n, u)| n * u).sum()
    }

    /// Evaluates `Σ u_a ∇N_a` for the given nodal coefficients.
    pub fn interpolate_gradient(&self, coefficients: impl IntoIterator<Item = f64>) -> Vector3<f64> {
        self.gradient
            .iter()
            .zip(coefficients)
            .map(|(g, u)| g * u)
            .sum()
    }
}

/// Source of quadrature rules and physical basis function values for the element kernels.
pub trait BasisProvider {
    /// The quadrature rule used for elements of the given geometry.
    fn quadrature(&self, geometry: GeometryType) -> eyre::Result<&Quadrature>;

    /// Whether the element must be integrated with a per-point Jacobian.
    fn is_curved(&self, element: &MeshElement) -> bool {
        element.geometry.is_curved()
    }

    /// Evaluates all basis values of the element at the given reference coordinates.
    fn operator_values_at(&self, element: &MeshElement, xi: &Point3<f64>, out: &mut OperatorValues)
        -> eyre::Result<()>;

    /// Evaluates all basis values at the given quadrature point of the element's rule.
    fn operator_values(
        &self,
        element: &MeshElement,
        quadrature_point: usize,
        out: &mut OperatorValues,
    ) -> eyre::Result<()> {
        let xi = *self
            .quadrature(element.geometry)?
            .points()
            .get(quadrature_point)
            .ok_or_else(|| eyre!("quadrature point {} out of bounds", quadrature_point))?;
        self.operator_values_at(element, &xi, out)
    }

    /// The absolute Jacobian determinant (or surface measure) of the element.
    ///
    /// Straight elements have a constant Jacobian and may pass `None`. Curved elements require
    /// the quadrature point.
    fn jacobian_determinant(&self, element: &MeshElement, quadrature_point: Option<usize>) -> eyre::Result<f64>;
}

/// Lowest-order nodal and edge bases on straight or quadratically curved simplices.
#[derive(Debug, Clone)]
pub struct SimplexBasis {
    mesh_dim: usize,
    segment: Quadrature,
    triangle: Quadrature,
    tetrahedron: Quadrature,
}

impl SimplexBasis {
    /// Exact for all products of lowest-order basis functions on straight elements, with
    /// room to spare for curved geometry.
    pub const DEFAULT_STRENGTH: usize = 4;

    pub fn new(mesh_dim: usize) -> eyre::Result<Self> {
        Self::with_strength(mesh_dim, Self::DEFAULT_STRENGTH)
    }

    /// Uses quadrature rules that are exact for polynomials of degree `strength`.
    pub fn with_strength(mesh_dim: usize, strength: usize) -> eyre::Result<Self> {
        if !(2..=3).contains(&mesh_dim) {
            return Err(eyre!("meshes must be planar or solid, got dimension {}", mesh_dim));
        }
        Ok(Self {
            mesh_dim,
            segment: quadrature::segment(strength)?,
            triangle: quadrature::triangle(strength)?,
            tetrahedron: quadrature::tetrahedron(strength)?,
        })
    }

    pub fn mesh_dim(&self) -> usize {
        self.mesh_dim
    }
}

/// Barycentric coordinates and their (constant) reference gradients.
fn barycentric(shape: ElementShape, xi: &Point3<f64>) -> ([f64; 4], [Vector3<f64>; 4]) {
    let d = shape.reference_dim();
    let mut lambda = [0.0; 4];
    let mut gradients = [Vector3::zeros(); 4];
    lambda[0] = 1.0 - (0..d).map(|k| xi[k]).sum::<f64>();
    for k in 0..d {
        lambda[k + 1] = xi[k];
        gradients[0][k] = -1.0;
        gradients[k + 1][k] = 1.0;
    }
    (lambda, gradients)
}

/// Evaluates the geometry map: the physical point and the reference tangents as columns.
///
/// Columns beyond the reference dimension are zero.
fn geometry_map(element: &MeshElement, xi: &Point3<f64>) -> (Point3<f64>, Matrix3<f64>) {
    let geometry = element.geometry;
    let shape = geometry.shape;
    let (lambda, grad) = barycentric(shape, xi);
    let vertices = shape.vertex_count();

    let mut point = Vector3::zeros();
    let mut tangents = Matrix3::zeros();
    let mut accumulate = |x: &Point3<f64>, n: f64, dn: Vector3<f64>| {
        point += x.coords * n;
        tangents += x.coords * dn.transpose();
    };

    if geometry.is_curved() {
        // Quadratic Lagrange shape functions, vertex nodes first, then mid-edge nodes
        for a in 0..vertices {
            let n = lambda[a] * (2.0 * lambda[a] - 1.0);
            let dn = grad[a] * (4.0 * lambda[a] - 1.0);
            accumulate(&element.coordinates[a], n, dn);
        }
        for (e, &[a, b]) in shape.edges().iter().enumerate() {
            let n = 4.0 * lambda[a] * lambda[b];
            let dn = (grad[b] * lambda[a] + grad[a] * lambda[b]) * 4.0;
            accumulate(&element.coordinates[vertices + e], n, dn);
        }
    } else {
        for a in 0..vertices {
            accumulate(&element.coordinates[a], lambda[a], grad[a]);
        }
    }
    (Point3::from(point), tangents)
}

impl SimplexBasis {
    fn is_bulk(&self, shape: ElementShape) -> bool {
        shape.reference_dim() == self.mesh_dim
    }

    /// Completes the tangents of a planar bulk element with the out-of-plane direction.
    fn bulk_jacobian(&self, mut tangents: Matrix3<f64>) -> Matrix3<f64> {
        if self.mesh_dim == 2 {
            tangents.set_column(2, &Vector3::z());
        }
        tangents
    }

    fn check_geometry(&self, element: &MeshElement) -> eyre::Result<()> {
        let geometry = element.geometry;
        let d = geometry.shape.reference_dim();
        if geometry.interpolation_order != 1 || !(1..=2).contains(&geometry.geometric_order) {
            return Err(eyre!("no basis available for {} elements", geometry));
        }
        if d != self.mesh_dim && d + 1 != self.mesh_dim {
            return Err(eyre!(
                "{} elements are neither bulk nor facet elements of a {}D mesh",
                geometry,
                self.mesh_dim
            ));
        }
        assert_eq!(
            element.coordinates.len(),
            geometry.node_count(),
            "element {} does not have the node count of its geometry",
            element.id
        );
        Ok(())
    }
}

/// Surface measure, unit normal and the map from reference gradients to surface gradients.
fn facet_metric(tangents: &Matrix3<f64>, reference_dim: usize) -> (f64, Vector3<f64>, Matrix3<f64>) {
    match reference_dim {
        1 => {
            let t = tangents.column(0).into_owned();
            let length = t.norm();
            let normal = Vector3::new(t.y, -t.x, 0.0) / length;
            // ∇_s N = t (dN/dξ) / |t|²
            let mut map = Matrix3::zeros();
            map.set_column(0, &(t / (length * length)));
            (length, normal, map)
        }
        _ => {
            let t1 = tangents.column(0).into_owned();
            let t2 = tangents.column(1).into_owned();
            let cross = t1.cross(&t2);
            let area = cross.norm();
            let metric = Matrix2::new(t1.dot(&t1), t1.dot(&t2), t2.dot(&t1), t2.dot(&t2));
            // The metric of a non-degenerate facet is positive definite
            let inverse = metric.try_inverse().unwrap_or_else(Matrix2::zeros);
            let mut map = Matrix3::zeros();
            for k in 0..2 {
                let column: Vector2<f64> = inverse.column(k).into_owned();
                map.set_column(k, &(t1 * column[0] + t2 * column[1]));
            }
            (area, cross / area, map)
        }
    }
}

impl BasisProvider for SimplexBasis {
    fn quadrature(&self, geometry: GeometryType) -> eyre::Result<&Quadrature> {
        if geometry.interpolation_order != 1 {
            return Err(eyre!("no quadrature rule registered for {} elements", geometry));
        }
        Ok(match geometry.shape {
            ElementShape::Segment => &self.segment,
            ElementShape::Triangle => &self.triangle,
            ElementShape::Tetrahedron => &self.tetrahedron,
        })
    }

    fn operator_values_at(
        &self,
        element: &MeshElement,
        xi: &Point3<f64>,
        out: &mut OperatorValues,
    ) -> eyre::Result<()> {
        self.check_geometry(element)?;
        let shape = element.geometry.shape;
        assert_eq!(out.geometry.shape, shape, "operator value buffer allocated for a different shape");

        let (lambda, grad_lambda) = barycentric(shape, xi);
        let (point, tangents) = geometry_map(element, xi);
        out.geometry = element.geometry;
        out.point = point;
        out.shape.copy_from_slice(&lambda[..shape.vertex_count()]);

        if self.is_bulk(shape) {
            let jacobian = self.bulk_jacobian(tangents);
            let det = jacobian.determinant();
            let inverse = jacobian
                .try_inverse()
                .filter(|_| det.is_normal())
                .ok_or(NumericalError::SingularJacobian { element: element.id })?;
            let inverse_transpose = inverse.transpose();

            for (gradient, reference) in out.gradient.iter_mut().zip(&grad_lambda) {
                *gradient = inverse_transpose * reference;
            }
            for (e, &[a, b]) in shape.edges().iter().enumerate() {
                let sign = element.edge_sign(e);
                let w = grad_lambda[b] * lambda[a] - grad_lambda[a] * lambda[b];
                let curl = grad_lambda[a].cross(&grad_lambda[b]) * 2.0;
                out.edge_shape[e] = inverse_transpose * w * sign;
                out.curl[e] = jacobian * curl * (sign / det);
            }
            out.jacobian_determinant = det;
            out.normal = Vector3::zeros();
        } else {
            let (measure, normal, map) = facet_metric(&tangents, shape.reference_dim());
            if !measure.is_normal() {
                return Err(NumericalError::SingularJacobian { element: element.id }.into());
            }
            for (gradient, reference) in out.gradient.iter_mut().zip(&grad_lambda) {
                *gradient = map * reference;
            }
            out.edge_shape.fill(Vector3::zeros());
            out.curl.fill(Vector3::zeros());
            out.jacobian_determinant = measure;
            out.normal = normal;
        }
        Ok(())
    }

    fn jacobian_determinant(&self, element: &MeshElement, quadrature_point: Option<usize>) -> eyre::Result<f64> {
        self.check_geometry(element)?;
        let shape = element.geometry.shape;
        let xi = match quadrature_point {
            Some(index) => *self
                .quadrature(element.geometry)?
                .points()
                .get(index)
                .ok_or_else(|| eyre!("quadrature point {} out of bounds", index))?,
            None if element.geometry.is_curved() => {
                return Err(eyre!(
                    "element {} is curved, its Jacobian determinant depends on the quadrature point",
                    element.id
                ))
            }
            None => Point3::origin(),
        };
        let (_, tangents) = geometry_map(element, &xi);
        if self.is_bulk(shape) {
            Ok(self.bulk_jacobian(tangents).determinant().abs())
        } else {
            Ok(facet_metric(&tangents, shape.reference_dim()).0)
        }
    }
}
