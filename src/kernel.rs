//! Element kernels and their selection at link time.
//!
//! A kernel computes the local mass-type matrix `M`, stiffness-type matrix `K` and load `f` of
//! one element into the region's [`ScratchBuffers`]. Which kernel a region uses is decided
//! once, by [`select_kernel`], from the region's classification, element geometry and the
//! state dependencies its material declares.
use crate::basis::{BasisProvider, OperatorValues};
use crate::classification::{ElementShape, GeometryType, PhysicalDomain};
use crate::config::EngineConfig;
use crate::error::ConfigurationError;
use crate::material::Material;
use crate::mesh::MeshElement;
use crate::quadrature::Quadrature;
use crate::region::RegionParameters;
use eyre::eyre;
use nalgebra::{Point3, Vector3};
use std::fmt::Debug;

pub mod conductor;
pub mod ferromagnet;
pub mod field;
pub mod interface;
pub mod scratch;
pub mod shell;

use scratch::ScratchBuffers;

pub use conductor::ConductorKernel;
pub use ferromagnet::{PlanarFerromagnetKernel, SolidFerromagnetKernel};
pub use field::{AirKernel, CoilKernel};
pub use interface::InterfaceKernel;
pub use shell::{AppliedFieldKernel, NaturalBoundaryKernel, PenaltyKernel, ThinShellKernel};

/// Everything a kernel may read while computing one element.
#[derive(Clone, Copy)]
pub struct KernelContext<'a> {
    pub region: &'a str,
    pub basis: &'a dyn BasisProvider,
    pub config: &'a EngineConfig,
    pub material: Option<&'a dyn Material>,
    pub parameters: &'a RegionParameters,
    /// Quadrature rule cached for the region when it was linked.
    pub quadrature: &'a Quadrature,
    /// Whether the region's elements are integrated with a per-point Jacobian.
    pub curved: bool,
    /// Bulk element on the master side of a facet element.
    pub master: Option<&'a MeshElement>,
    /// Bulk element on the slave side of a facet element.
    pub slave: Option<&'a MeshElement>,
    /// Nodal temperature field, indexed by global node id. May be empty.
    pub temperature: &'a [f64],
}

impl<'a> KernelContext<'a> {
    pub fn material(&self) -> eyre::Result<&'a dyn Material> {
        self.material
            .ok_or_else(|| eyre!("kernel for region '{}' requires a material", self.region))
    }

    /// Quadrature weight of a point, including the Jacobian determinant of curved elements.
    pub fn point_weight(&self, weight: f64, values: &OperatorValues) -> f64 {
        if self.curved {
            weight * values.measure()
        } else {
            weight
        }
    }

    /// Factor applied after the quadrature sum: the constant Jacobian determinant of straight
    /// elements, or one for curved elements.
    pub fn element_factor(&self, element: &MeshElement) -> eyre::Result<f64> {
        if self.curved {
            Ok(1.0)
        } else {
            self.basis.jacobian_determinant(element, None)
        }
    }

    /// Copies the nodal temperatures of the element's vertices into `out`.
    pub fn gather_temperature(&self, element: &MeshElement, out: &mut [f64]) -> eyre::Result<()> {
        for (t, &node) in out.iter_mut().zip(element.vertices()) {
            *t = *self.temperature.get(node).ok_or_else(|| {
                eyre!(
                    "temperature field has {} values, but element {} references node {}",
                    self.temperature.len(),
                    element.id,
                    node
                )
            })?;
        }
        Ok(())
    }
}

/// Computes the local operators of the elements of one region.
pub trait RegionKernel: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Writes `M`, `K` and `f` of the element into the scratch buffers.
    ///
    /// The local solution vectors of the scratch system have been gathered by the caller.
    /// Returns the number of local DOFs the kernel computed, which the caller checks against
    /// the region's DOF layout.
    fn compute_element(
        &self,
        element: &MeshElement,
        context: &KernelContext,
        scratch: &mut ScratchBuffers,
    ) -> eyre::Result<usize>;
}

/// Unit normal of a facet pointing away from the given point on the inner side.
pub(crate) fn outward_normal(values: &OperatorValues, inner: &Point3<f64>) -> Vector3<f64> {
    if values.normal.dot(&(values.point - inner)) < 0.0 {
        -values.normal
    } else {
        values.normal
    }
}

/// Checks the classification and geometry against the table of supported combinations.
pub fn check_supported(
    classification: PhysicalDomain,
    geometry: GeometryType,
    mesh_dim: usize,
) -> Result<(), ConfigurationError> {
    let bulk_shape = match mesh_dim {
        2 => Some(ElementShape::Triangle),
        3 => Some(ElementShape::Tetrahedron),
        _ => None,
    };
    let expected_shape = if classification.is_bulk() {
        bulk_shape
    } else {
        bulk_shape.and_then(|shape| shape.facet_shape())
    };
    let supported = expected_shape == Some(geometry.shape)
        && geometry.interpolation_order == 1
        && (1..=2).contains(&geometry.geometric_order);
    if supported {
        Ok(())
    } else {
        Err(ConfigurationError::UnsupportedGeometry {
            classification,
            geometry,
            dimension: mesh_dim,
        })
    }
}

/// Selects the kernel for a region.
pub fn select_kernel(
    region: &str,
    classification: PhysicalDomain,
    geometry: GeometryType,
    material: Option<&dyn Material>,
    mesh_dim: usize,
    config: &EngineConfig,
) -> Result<Box<dyn RegionKernel>, ConfigurationError> {
    check_supported(classification, geometry, mesh_dim)?;
    let missing_material = || ConfigurationError::MissingMaterial {
        region: region.to_string(),
        classification,
    };

    use PhysicalDomain::*;
    let kernel: Box<dyn RegionKernel> = match classification {
        Conductor => {
            let material = material.ok_or_else(missing_material)?;
            conductor::kernel_for_law(material.resistivity_law())
        }
        Ferromagnet => {
            material.ok_or_else(missing_material)?;
            match geometry.shape {
                ElementShape::Triangle => Box::new(PlanarFerromagnetKernel::default()),
                ElementShape::Tetrahedron => Box::new(SolidFerromagnetKernel::default()),
                ElementShape::Segment => {
                    return Err(ConfigurationError::UnsupportedGeometry {
                        classification,
                        geometry,
                        dimension: mesh_dim,
                    })
                }
            }
        }
        Air => Box::new(AirKernel),
        Coil => Box::new(CoilKernel),
        ThinShell => {
            material.ok_or_else(missing_material)?;
            Box::new(ThinShellKernel)
        }
        Boundary => Box::new(AppliedFieldKernel),
        Symmetry => Box::new(NaturalBoundaryKernel),
        AntiSymmetry => Box::new(PenaltyKernel),
        ConductorAir | ConductorFerromagnet | FerromagnetAir | Cut => {
            Box::new(InterfaceKernel::new(classification, config.interface_coupling).ok_or(
                ConfigurationError::UnsupportedGeometry {
                    classification,
                    geometry,
                    dimension: mesh_dim,
                },
            )?)
        }
    };
    Ok(kernel)
}
