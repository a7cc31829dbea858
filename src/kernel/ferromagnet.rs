//! Ferromagnetic bulk kernel for the vector potential formulation.
//!
//! `K_ij = ∫ ν(|B|) curl W_i · curl W_j dx` with `B = Σ a_i curl W_i` from the current iterate.
//! The reluctivity `ν = H / B` is obtained by inverting the material's B–H law. There is no mass
//! term.
use crate::kernel::scratch::{BulkFieldScratch, ScratchBuffers};
use crate::kernel::{KernelContext, RegionKernel};
use crate::material::field_strength_from_flux;
use crate::mesh::MeshElement;
use crate::util::{add_to_diagonal_block, clone_upper_to_lower, component};
use eyre::eyre;

/// Ferromagnet kernel for elements of the given reference dimension.
///
/// Planar elements have out-of-plane curls, so only the z-component contributes to the flux.
#[derive(Debug, Default, Copy, Clone)]
pub struct FerromagnetKernel<const DIM: usize>;

pub type PlanarFerromagnetKernel = FerromagnetKernel<2>;
pub type SolidFerromagnetKernel = FerromagnetKernel<3>;

impl<const DIM: usize> RegionKernel for FerromagnetKernel<DIM> {
    fn name(&self) -> &'static str {
        if DIM == 2 {
            "ferromagnet (planar)"
        } else {
            "ferromagnet (solid)"
        }
    }

    #[allow(non_snake_case)]
    fn compute_element(
        &self,
        element: &MeshElement,
        context: &KernelContext,
        scratch: &mut ScratchBuffers,
    ) -> eyre::Result<usize> {
        let ScratchBuffers::BulkField(BulkFieldScratch {
            system,
            values,
            temperature,
        }) = scratch
        else {
            return Err(eyre!("ferromagnet kernel requires bulk-field scratch buffers"));
        };
        debug_assert_eq!(element.geometry.shape.reference_dim(), DIM);
        let material = context.material()?;
        let m = context.config.multiplicity.edge;
        let n = element.edges.len();
        if !system.prepare(n * m) {
            return Ok(n * m);
        }

        let needs_temperature = material.permeability_law().depends_on_temperature();
        if needs_temperature {
            context.gather_temperature(element, temperature)?;
        }
        let settings = context.config.nonlinear.inversion();

        for (&weight, xi) in context.quadrature.weights().iter().zip(context.quadrature.points()) {
            context.basis.operator_values_at(element, xi, values)?;
            let dx = context.point_weight(weight, values);
            let t = if needs_temperature {
                values.interpolate_nodal(temperature.iter().copied())
            } else {
                0.0
            };

            let a = system.solution.as_slice();
            let flux_squared: f64 = (0..m)
                .map(|c| {
                    let b = values.interpolate_curl(component(a, m, c));
                    if DIM == 2 {
                        b.z * b.z
                    } else {
                        b.norm_squared()
                    }
                })
                .sum();
            let flux = flux_squared.sqrt();
            let nu = if flux > 0.0 {
                field_strength_from_flux(material, flux, t, &settings)? / flux
            } else {
                1.0 / material.permeability(0.0, t)
            };

            for I in 0..n {
                for J in I..n {
                    let k_IJ = dx * nu * values.curl[I].dot(&values.curl[J]);
                    add_to_diagonal_block(&mut system.stiffness, (0, 0), (I, J), m, k_IJ);
                }
            }
        }

        system.stiffness *= context.element_factor(element)?;
        clone_upper_to_lower(&mut system.stiffness);
        Ok(n * m)
    }
}
