//! Kernels on facet regions carrying nodal DOFs: thin shells, boundaries and symmetry planes.
use crate::error::ConfigurationError;
use crate::kernel::scratch::{BoundaryScratch, ScratchBuffers, SymmetryScratch, ThinShellScratch};
use crate::kernel::{outward_normal, KernelContext, RegionKernel};
use crate::material::MaterialState;
use crate::mesh::{FaceMapping, MeshElement};
use crate::util::{add_to_diagonal_block, clone_upper_to_lower};
use crate::VACUUM_PERMEABILITY;
use eyre::eyre;

/// One layer of a thin conducting shell of thickness `t`.
///
/// `M_ab = μ t ∫ N_a N_b dS` and `K_ab = ρ t ∫ ∇_s N_a · ∇_s N_b dS`, with material parameters
/// evaluated at the interpolated temperature.
#[derive(Debug, Default, Copy, Clone)]
pub struct ThinShellKernel;

/// Natural boundary with an applied field `H_a`: `f_a = ∫ μ0 (H_a · n) N_a dS`.
///
/// The normal points out of the bulk element the facet is attached to, if any.
#[derive(Debug, Default, Copy, Clone)]
pub struct AppliedFieldKernel;

/// Homogeneous natural condition. Contributes nothing, but still reports its DOFs.
#[derive(Debug, Default, Copy, Clone)]
pub struct NaturalBoundaryKernel;

/// Holds the potential at zero with the penalty term `K_ab = p ∫ N_a N_b dS`.
#[derive(Debug, Default, Copy, Clone)]
pub struct PenaltyKernel;

impl RegionKernel for ThinShellKernel {
    fn name(&self) -> &'static str {
        "thin shell"
    }

    #[allow(non_snake_case)]
    fn compute_element(
        &self,
        element: &MeshElement,
        context: &KernelContext,
        scratch: &mut ScratchBuffers,
    ) -> eyre::Result<usize> {
        let ScratchBuffers::ThinShell(ThinShellScratch {
            system,
            values,
            temperature,
        }) = scratch
        else {
            return Err(eyre!("thin-shell kernel requires thin-shell scratch buffers"));
        };
        let material = context.material()?;
        let thickness = context.parameters.thickness.ok_or_else(|| {
            ConfigurationError::InvalidConfig(format!("thin-shell region '{}' has no thickness", context.region))
        })?;
        let m = context.config.multiplicity.node;
        let n = element.geometry.shape.vertex_count();
        if !system.prepare(n * m) {
            return Ok(n * m);
        }

        let needs_temperature = material.resistivity_law().depends_on_temperature()
            || material.permeability_law().depends_on_temperature();
        if needs_temperature {
            context.gather_temperature(element, temperature)?;
        }

        for (&weight, xi) in context.quadrature.weights().iter().zip(context.quadrature.points()) {
            context.basis.operator_values_at(element, xi, values)?;
            let dx = context.point_weight(weight, values);
            let state = MaterialState {
                temperature: if needs_temperature {
                    values.interpolate_nodal(temperature.iter().copied())
                } else {
                    0.0
                },
                ..MaterialState::default()
            };
            let mu = material.permeability(0.0, state.temperature);
            let rho = material.resistivity(&state);

            for I in 0..n {
                for J in I..n {
                    let m_IJ = dx * mu * thickness * values.shape[I] * values.shape[J];
                    let k_IJ = dx * rho * thickness * values.gradient[I].dot(&values.gradient[J]);
                    add_to_diagonal_block(&mut system.mass, (0, 0), (I, J), m, m_IJ);
                    add_to_diagonal_block(&mut system.stiffness, (0, 0), (I, J), m, k_IJ);
                }
            }
        }

        let factor = context.element_factor(element)?;
        system.mass *= factor;
        system.stiffness *= factor;
        clone_upper_to_lower(&mut system.mass);
        clone_upper_to_lower(&mut system.stiffness);
        Ok(n * m)
    }
}

impl RegionKernel for AppliedFieldKernel {
    fn name(&self) -> &'static str {
        "applied field boundary"
    }

    #[allow(non_snake_case)]
    fn compute_element(
        &self,
        element: &MeshElement,
        context: &KernelContext,
        scratch: &mut ScratchBuffers,
    ) -> eyre::Result<usize> {
        let ScratchBuffers::Boundary(BoundaryScratch { system, values }) = scratch else {
            return Err(eyre!("boundary kernel requires boundary scratch buffers"));
        };
        let m = context.config.multiplicity.node;
        let n = element.geometry.shape.vertex_count();
        if !system.prepare(n * m) {
            return Ok(n * m);
        }

        let inner = match context.master {
            Some(master) => {
                let mapping = FaceMapping::between(element, master)?;
                Some(master.coordinates[mapping.opposite_vertex])
            }
            None => None,
        };
        let applied = context.parameters.applied_field;

        for (&weight, xi) in context.quadrature.weights().iter().zip(context.quadrature.points()) {
            context.basis.operator_values_at(element, xi, values)?;
            let dx = context.point_weight(weight, values);
            let normal = match &inner {
                Some(inner) => outward_normal(values, inner),
                None => values.normal,
            };
            let flux = VACUUM_PERMEABILITY * applied.dot(&normal);
            for I in 0..n {
                let f_I = dx * flux * values.shape[I];
                for c in 0..m {
                    system.load[m * I + c] += f_I;
                }
            }
        }

        system.load *= context.element_factor(element)?;
        Ok(n * m)
    }
}

impl RegionKernel for NaturalBoundaryKernel {
    fn name(&self) -> &'static str {
        "natural boundary"
    }

    fn compute_element(
        &self,
        element: &MeshElement,
        context: &KernelContext,
        scratch: &mut ScratchBuffers,
    ) -> eyre::Result<usize> {
        let ScratchBuffers::Symmetry(SymmetryScratch { system, .. }) = scratch else {
            return Err(eyre!("natural boundary kernel requires symmetry scratch buffers"));
        };
        let dofs = element.geometry.shape.vertex_count() * context.config.multiplicity.node;
        system.prepare(dofs);
        Ok(dofs)
    }
}

impl RegionKernel for PenaltyKernel {
    fn name(&self) -> &'static str {
        "antisymmetry penalty"
    }

    #[allow(non_snake_case)]
    fn compute_element(
        &self,
        element: &MeshElement,
        context: &KernelContext,
        scratch: &mut ScratchBuffers,
    ) -> eyre::Result<usize> {
        let ScratchBuffers::Symmetry(SymmetryScratch { system, values }) = scratch else {
            return Err(eyre!("penalty kernel requires symmetry scratch buffers"));
        };
        let m = context.config.multiplicity.node;
        let n = element.geometry.shape.vertex_count();
        if !system.prepare(n * m) {
            return Ok(n * m);
        }

        let penalty = context.config.antisymmetry_penalty;
        for (&weight, xi) in context.quadrature.weights().iter().zip(context.quadrature.points()) {
            context.basis.operator_values_at(element, xi, values)?;
            let dx = context.point_weight(weight, values);
            for I in 0..n {
                for J in I..n {
                    let k_IJ = dx * penalty * values.shape[I] * values.shape[J];
                    add_to_diagonal_block(&mut system.stiffness, (0, 0), (I, J), m, k_IJ);
                }
            }
        }

        system.stiffness *= context.element_factor(element)?;
        clone_upper_to_lower(&mut system.stiffness);
        Ok(n * m)
    }
}
