//! Scratch buffers reused by the kernels for every element of a region.
//!
//! Buffers are allocated once when a region is linked, with sizes derived from the region's
//! classification, geometry and DOF layout. Kernels never resize them.
use crate::basis::OperatorValues;
use crate::classification::{BasisKind, GeometryType, PhysicalDomain};
use crate::dofs::{multiplier_count, DofLayout};
use crate::error::ConfigurationError;
use nalgebra::{DMatrix, DVector, Vector3};

/// Local matrices and vectors of one element, in local DOF order.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSystem {
    /// Global indices of the local DOFs.
    pub dofs: Vec<usize>,
    pub mass: DMatrix<f64>,
    pub stiffness: DMatrix<f64>,
    pub load: DVector<f64>,
    /// Current nonlinear iterate, gathered before the kernel runs.
    pub solution: DVector<f64>,
    /// Solution of the previous time step, gathered before the kernel runs.
    pub previous: DVector<f64>,
}

impl LocalSystem {
    pub fn new(dof_count: usize) -> Self {
        Self {
            dofs: Vec::with_capacity(dof_count),
            mass: DMatrix::zeros(dof_count, dof_count),
            stiffness: DMatrix::zeros(dof_count, dof_count),
            load: DVector::zeros(dof_count),
            solution: DVector::zeros(dof_count),
            previous: DVector::zeros(dof_count),
        }
    }

    pub fn len(&self) -> usize {
        self.load.len()
    }

    pub fn is_empty(&self) -> bool {
        self.load.is_empty()
    }

    /// Zeroes the outputs if the buffers hold exactly `dof_count` DOFs.
    ///
    /// Returns `false` without touching anything otherwise, in which case the kernel should
    /// report its count without writing.
    pub(crate) fn prepare(&mut self, dof_count: usize) -> bool {
        if dof_count != self.len() {
            return false;
        }
        self.mass.fill(0.0);
        self.stiffness.fill(0.0);
        self.load.fill(0.0);
        true
    }
}

#[derive(Debug, Clone)]
pub struct BulkConductorScratch {
    pub system: LocalSystem,
    pub values: OperatorValues,
    pub temperature: Vec<f64>,
}

/// Shared by air, coil and ferromagnetic regions.
#[derive(Debug, Clone)]
pub struct BulkFieldScratch {
    pub system: LocalSystem,
    pub values: OperatorValues,
    pub temperature: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct InterfaceScratch {
    pub system: LocalSystem,
    pub facet: OperatorValues,
    pub master: OperatorValues,
    pub slave: OperatorValues,
    /// Tangential traces `n × a_i` of the master basis at the current point.
    pub master_trace: Vec<Vector3<f64>>,
    pub slave_trace: Vec<Vector3<f64>>,
    /// Scalar coupling block between master and slave basis functions.
    pub coupling: DMatrix<f64>,
    /// Scalar blocks between multipliers and the master and slave basis functions.
    pub master_multiplier: DMatrix<f64>,
    pub slave_multiplier: DMatrix<f64>,
}

#[derive(Debug, Clone)]
pub struct ThinShellScratch {
    pub system: LocalSystem,
    pub values: OperatorValues,
    pub temperature: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct BoundaryScratch {
    pub system: LocalSystem,
    pub values: OperatorValues,
}

/// Shared by symmetry and antisymmetry regions.
#[derive(Debug, Clone)]
pub struct SymmetryScratch {
    pub system: LocalSystem,
    pub values: OperatorValues,
}

#[derive(Debug, Clone)]
pub enum ScratchBuffers {
    BulkConductor(BulkConductorScratch),
    BulkField(BulkFieldScratch),
    Interface(InterfaceScratch),
    ThinShell(ThinShellScratch),
    Boundary(BoundaryScratch),
    Symmetry(SymmetryScratch),
}

fn basis_count(kind: BasisKind, geometry: GeometryType) -> usize {
    match kind {
        BasisKind::Edge => geometry.shape.edge_count(),
        BasisKind::Node => geometry.shape.vertex_count(),
    }
}

impl ScratchBuffers {
    pub fn allocate(
        classification: PhysicalDomain,
        geometry: GeometryType,
        layout: &DofLayout,
    ) -> Result<Self, ConfigurationError> {
        let system = LocalSystem::new(layout.total());
        let values = OperatorValues::for_geometry(geometry);
        let temperature = vec![0.0; geometry.shape.vertex_count()];

        use PhysicalDomain::*;
        let scratch = match classification {
            Conductor => Self::BulkConductor(BulkConductorScratch {
                system,
                values,
                temperature,
            }),
            Air | Coil | Ferromagnet => Self::BulkField(BulkFieldScratch {
                system,
                values,
                temperature,
            }),
            ThinShell => Self::ThinShell(ThinShellScratch {
                system,
                values,
                temperature,
            }),
            Boundary => Self::Boundary(BoundaryScratch { system, values }),
            Symmetry | AntiSymmetry => Self::Symmetry(SymmetryScratch { system, values }),
            ConductorAir | ConductorFerromagnet | FerromagnetAir | Cut => {
                let unsupported = || ConfigurationError::UnsupportedGeometry {
                    classification,
                    geometry,
                    dimension: geometry.shape.reference_dim() + 1,
                };
                let parent = geometry.parent_geometry().ok_or_else(unsupported)?;
                let (master_kind, slave_kind) = classification.interface_sides().ok_or_else(unsupported)?;
                let (n_master, n_slave) = (basis_count(master_kind, parent), basis_count(slave_kind, parent));
                let n_lambda = if layout.lambda > 0 { multiplier_count(geometry) } else { 0 };
                Self::Interface(InterfaceScratch {
                    system,
                    facet: values,
                    master: OperatorValues::for_geometry(parent),
                    slave: OperatorValues::for_geometry(parent),
                    master_trace: vec![Vector3::zeros(); n_master],
                    slave_trace: vec![Vector3::zeros(); n_slave],
                    coupling: DMatrix::zeros(n_master, n_slave),
                    master_multiplier: DMatrix::zeros(n_lambda, n_master),
                    slave_multiplier: DMatrix::zeros(n_lambda, n_slave),
                })
            }
        };
        Ok(scratch)
    }

    /// Name of the buffer layout family.
    pub fn layout_name(&self) -> &'static str {
        match self {
            Self::BulkConductor(_) => "bulk-conductor",
            Self::BulkField(_) => "bulk-field",
            Self::Interface(_) => "interface",
            Self::ThinShell(_) => "thin-shell",
            Self::Boundary(_) => "boundary",
            Self::Symmetry(_) => "symmetry",
        }
    }

    pub fn system(&self) -> &LocalSystem {
        match self {
            Self::BulkConductor(s) => &s.system,
            Self::BulkField(s) => &s.system,
            Self::Interface(s) => &s.system,
            Self::ThinShell(s) => &s.system,
            Self::Boundary(s) => &s.system,
            Self::Symmetry(s) => &s.system,
        }
    }

    pub fn system_mut(&mut self) -> &mut LocalSystem {
        match self {
            Self::BulkConductor(s) => &mut s.system,
            Self::BulkField(s) => &mut s.system,
            Self::Interface(s) => &mut s.system,
            Self::ThinShell(s) => &mut s.system,
            Self::Boundary(s) => &mut s.system,
            Self::Symmetry(s) => &mut s.system,
        }
    }
}
