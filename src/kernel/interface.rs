//! Coupling kernels for facets shared by regions with different physics.
//!
//! An interface element is a facet with a master and a slave bulk element. With master basis
//! functions `a_i` and slave basis functions `b_j` (Whitney edge functions on edge-based sides,
//! nodal gradients on node-based sides) and the facet normal `n` pointing away from the
//! master element, the tangential traces are coupled by
//!
//! ```text
//! C_ij = ∫ (n × a_i) · (n × b_j) dS.
//! ```
//!
//! With direct coupling the local matrix is `[[0, C], [-Cᵀ, 0]]`. With multiplier coupling,
//! tangential multipliers `ψ_k t_c` on the facet vertices give blocks `B_m` and `B_s` and the
//! local matrix `[[0, 0, B_mᵀ], [0, 0, -B_sᵀ], [-B_m, B_s, 0]]`. In both cases the lower blocks
//! are written as exact negations of the transposed upper blocks, so the coupling is exactly
//! skew-symmetric.
use crate::basis::OperatorValues;
use crate::classification::{BasisKind, PhysicalDomain};
use crate::config::InterfaceCoupling;
use crate::error::ConfigurationError;
use crate::kernel::scratch::{InterfaceScratch, LocalSystem, ScratchBuffers};
use crate::kernel::{outward_normal, KernelContext, RegionKernel};
use crate::mesh::{FaceMapping, MeshElement};
use eyre::eyre;
use nalgebra::{DMatrix, Vector3};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InterfaceKernel {
    classification: PhysicalDomain,
    master: BasisKind,
    slave: BasisKind,
    coupling: InterfaceCoupling,
}

impl InterfaceKernel {
    /// Returns `None` if the classification is not an interface.
    pub fn new(classification: PhysicalDomain, coupling: InterfaceCoupling) -> Option<Self> {
        let (master, slave) = classification.interface_sides()?;
        Some(Self {
            classification,
            master,
            slave,
            coupling,
        })
    }

    pub fn coupling(&self) -> InterfaceCoupling {
        self.coupling
    }
}

fn basis_count(kind: BasisKind, element: &MeshElement) -> usize {
    match kind {
        BasisKind::Edge => element.edges.len(),
        BasisKind::Node => element.geometry.shape.vertex_count(),
    }
}

/// Tangential traces `n × a_i` of the side's basis functions.
fn tangential_traces(kind: BasisKind, values: &OperatorValues, normal: &Vector3<f64>, out: &mut [Vector3<f64>]) {
    for (trace, a) in out.iter_mut().zip(side_basis(kind, values)) {
        *trace = normal.cross(a);
    }
}

/// Orthonormal tangents of the facet for the given unit normal.
fn tangent_frame(facet: &MeshElement, normal: &Vector3<f64>) -> [Vector3<f64>; 2] {
    let x = facet.vertex_coordinates();
    let edge = x[1] - x[0];
    let t0 = (edge - normal * normal.dot(&edge)).normalize();
    [t0, normal.cross(&t0)]
}

/// Writes `value * I` at the given local DOF block positions, together with the negated
/// transposed block.
fn write_skew_pair(system: &mut LocalSystem, row: usize, col: usize, m: usize, value: f64) {
    for c in 0..m {
        system.stiffness[(row + c, col + c)] += value;
        system.stiffness[(col + c, row + c)] = -system.stiffness[(row + c, col + c)];
    }
}

impl RegionKernel for InterfaceKernel {
    fn name(&self) -> &'static str {
        match self.coupling {
            InterfaceCoupling::Direct => "interface (direct)",
            InterfaceCoupling::Multiplier => "interface (multiplier)",
        }
    }

    fn compute_element(
        &self,
        element: &MeshElement,
        context: &KernelContext,
        scratch: &mut ScratchBuffers,
    ) -> eyre::Result<usize> {
        let ScratchBuffers::Interface(InterfaceScratch {
            system,
            facet,
            master: master_values,
            slave: slave_values,
            master_trace,
            slave_trace,
            coupling,
            master_multiplier,
            slave_multiplier,
        }) = scratch
        else {
            return Err(eyre!("interface kernel requires interface scratch buffers"));
        };
        let missing = || ConfigurationError::MissingFacetCoupling {
            region: context.region.to_string(),
            element: element.id,
            classification: self.classification,
        };
        let master = context.master.ok_or_else(missing)?;
        let slave = context.slave.ok_or_else(missing)?;
        let master_mapping = FaceMapping::between(element, master)?;
        let slave_mapping = FaceMapping::between(element, slave)?;

        let m = context.config.multiplicity.of_basis(self.master);
        let n_master = basis_count(self.master, master);
        let n_slave = basis_count(self.slave, slave);
        let multipliers = self.coupling == InterfaceCoupling::Multiplier;
        let tangent_dim = element.geometry.shape.reference_dim();
        let n_lambda = if multipliers {
            element.geometry.shape.vertex_count() * tangent_dim
        } else {
            0
        };
        let written = (n_master + n_slave + n_lambda) * m;
        if !system.prepare(written) {
            return Ok(written);
        }
        if coupling.shape() != (n_master, n_slave) {
            return Err(eyre!(
                "interface scratch sized {:?} cannot hold a {}x{} coupling block",
                coupling.shape(),
                n_master,
                n_slave
            ));
        }
        coupling.fill(0.0);
        master_multiplier.fill(0.0);
        slave_multiplier.fill(0.0);

        let inner = master.coordinates[master_mapping.opposite_vertex];
        // Normal and tangents of a straight facet are evaluated at the first point only
        let mut straight_frame = None;
        for (&weight, xi) in context.quadrature.weights().iter().zip(context.quadrature.points()) {
            context.basis.operator_values_at(element, xi, facet)?;
            let dx = context.point_weight(weight, facet);
            let (normal, tangents) = match straight_frame {
                Some(frame) => frame,
                None => {
                    let normal = outward_normal(facet, &inner);
                    let frame = (normal, tangent_frame(element, &normal));
                    if !context.curved {
                        straight_frame = Some(frame);
                    }
                    frame
                }
            };

            let xi_master = master_mapping.neighbor_reference_point(master.geometry.shape, xi);
            let xi_slave = slave_mapping.neighbor_reference_point(slave.geometry.shape, xi);
            context.basis.operator_values_at(master, &xi_master, master_values)?;
            context.basis.operator_values_at(slave, &xi_slave, slave_values)?;

            if multipliers {
                let master_basis = side_basis(self.master, master_values);
                let slave_basis = side_basis(self.slave, slave_values);
                for (k, psi) in facet.shape.iter().enumerate() {
                    for (c, t) in tangents.iter().take(tangent_dim).enumerate() {
                        let row = k * tangent_dim + c;
                        for (i, a) in master_basis.iter().enumerate() {
                            master_multiplier[(row, i)] += dx * psi * t.dot(a);
                        }
                        for (j, b) in slave_basis.iter().enumerate() {
                            slave_multiplier[(row, j)] += dx * psi * t.dot(b);
                        }
                    }
                }
            } else {
                tangential_traces(self.master, master_values, &normal, master_trace);
                tangential_traces(self.slave, slave_values, &normal, slave_trace);
                for (i, a) in master_trace.iter().enumerate() {
                    for (j, b) in slave_trace.iter().enumerate() {
                        coupling[(i, j)] += dx * a.dot(b);
                    }
                }
            }
        }

        let factor = context.element_factor(element)?;
        let slave_offset = n_master * m;
        let lambda_offset = (n_master + n_slave) * m;
        if multipliers {
            write_multiplier_blocks(system, master_multiplier, 0, lambda_offset, m, factor);
            write_multiplier_blocks(system, slave_multiplier, slave_offset, lambda_offset, m, -factor);
        } else {
            for i in 0..n_master {
                for j in 0..n_slave {
                    write_skew_pair(system, m * i, slave_offset + m * j, m, factor * coupling[(i, j)]);
                }
            }
        }
        Ok(written)
    }
}

fn side_basis(kind: BasisKind, values: &OperatorValues) -> &[Vector3<f64>] {
    match kind {
        BasisKind::Edge => &values.edge_shape,
        BasisKind::Node => &values.gradient,
    }
}

/// Writes `scale * Bᵀ` into the (side, multiplier) block and its negation into the
/// (multiplier, side) block.
fn write_multiplier_blocks(
    system: &mut LocalSystem,
    block: &DMatrix<f64>,
    side_offset: usize,
    lambda_offset: usize,
    m: usize,
    scale: f64,
) {
    for row in 0..block.nrows() {
        for i in 0..block.ncols() {
            write_skew_pair(system, side_offset + m * i, lambda_offset + m * row, m, scale * block[(row, i)]);
        }
    }
}
