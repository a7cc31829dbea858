//! Scalar potential kernels for air and coil regions.
//!
//! The field is `H = -∇φ` with nodal shape functions `N_a`:
//!
//! ```text
//! M_ab = ∫ μ N_a N_b dx,    K_ab = ∫ μ ∇N_a · ∇N_b dx.
//! ```
//!
//! `K` is a weighted discrete Laplacian, so its rows sum to zero. Coil regions add the load
//! `f_a = ∫ μ H_s · ∇N_a dx` of their imposed source field `H_s`.
use crate::kernel::scratch::{BulkFieldScratch, ScratchBuffers};
use crate::kernel::{KernelContext, RegionKernel};
use crate::mesh::MeshElement;
use crate::util::{add_to_diagonal_block, clone_upper_to_lower};
use crate::VACUUM_PERMEABILITY;
use eyre::eyre;
use nalgebra::Vector3;

#[derive(Debug, Default, Copy, Clone)]
pub struct AirKernel;

#[derive(Debug, Default, Copy, Clone)]
pub struct CoilKernel;

impl RegionKernel for AirKernel {
    fn name(&self) -> &'static str {
        "air"
    }

    fn compute_element(
        &self,
        element: &MeshElement,
        context: &KernelContext,
        scratch: &mut ScratchBuffers,
    ) -> eyre::Result<usize> {
        compute_potential_element(element, context, scratch, None)
    }
}

impl RegionKernel for CoilKernel {
    fn name(&self) -> &'static str {
        "coil"
    }

    fn compute_element(
        &self,
        element: &MeshElement,
        context: &KernelContext,
        scratch: &mut ScratchBuffers,
    ) -> eyre::Result<usize> {
        compute_potential_element(element, context, scratch, Some(context.parameters.source_field))
    }
}

#[allow(non_snake_case)]
fn compute_potential_element(
    element: &MeshElement,
    context: &KernelContext,
    scratch: &mut ScratchBuffers,
    source: Option<Vector3<f64>>,
) -> eyre::Result<usize> {
    let ScratchBuffers::BulkField(BulkFieldScratch {
        system,
        values,
        temperature,
    }) = scratch
    else {
        return Err(eyre!("potential kernels require bulk-field scratch buffers"));
    };
    let m = context.config.multiplicity.node;
    let n = element.geometry.shape.vertex_count();
    if !system.prepare(n * m) {
        return Ok(n * m);
    }

    // Air needs no material; a region may still provide one, e.g. for a temperature-dependent μ
    let needs_temperature = context
        .material
        .map(|material| material.permeability_law().depends_on_temperature())
        .unwrap_or(false);
    if needs_temperature {
        context.gather_temperature(element, temperature)?;
    }

    for (&weight, xi) in context.quadrature.weights().iter().zip(context.quadrature.points()) {
        context.basis.operator_values_at(element, xi, values)?;
        let dx = context.point_weight(weight, values);
        let mu = match context.material {
            Some(material) => {
                let t = if needs_temperature {
                    values.interpolate_nodal(temperature.iter().copied())
                } else {
                    0.0
                };
                material.permeability(0.0, t)
            }
            None => VACUUM_PERMEABILITY,
        };

        for I in 0..n {
            for J in I..n {
                let m_IJ = dx * mu * values.shape[I] * values.shape[J];
                let k_IJ = dx * mu * values.gradient[I].dot(&values.gradient[J]);
                add_to_diagonal_block(&mut system.mass, (0, 0), (I, J), m, m_IJ);
                add_to_diagonal_block(&mut system.stiffness, (0, 0), (I, J), m, k_IJ);
            }
            if let Some(h_s) = source {
                let f_I = dx * mu * h_s.dot(&values.gradient[I]);
                for c in 0..m {
                    system.load[m * I + c] += f_I;
                }
            }
        }
    }

    let factor = context.element_factor(element)?;
    system.mass *= factor;
    system.stiffness *= factor;
    system.load *= factor;
    clone_upper_to_lower(&mut system.mass);
    clone_upper_to_lower(&mut system.stiffness);
    Ok(n * m)
}
