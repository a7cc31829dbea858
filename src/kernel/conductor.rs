//! Bulk conductor kernels for the magnetic field formulation.
//!
//! With edge functions `W_i` and the field `H = Σ h_i W_i`, the local operators are
//!
//! ```text
//! M_ij = ∫ μ W_i · W_j dx,    K_ij = ∫ ρ curl W_i · curl W_j dx.
//! ```
//!
//! The resistivity is evaluated at the local state reconstructed from the current iterate:
//! `J = curl H`, `B = μ H` and the interpolated nodal temperature, depending on what the
//! material's resistivity law declares. This gives a secant stiffness, recomputed on every
//! pass.
use crate::kernel::scratch::{BulkConductorScratch, ScratchBuffers};
use crate::kernel::{KernelContext, RegionKernel};
use crate::material::{MaterialState, ResistivityLaw};
use crate::mesh::MeshElement;
use crate::util::{add_to_diagonal_block, clone_upper_to_lower, component};
use eyre::eyre;
use std::fmt::Debug;
use std::marker::PhantomData;

/// Compile-time description of the state a resistivity law depends on.
pub trait ResistivityDependence: Debug + Default + Send + Sync + 'static {
    const LAW: ResistivityLaw;
    const NAME: &'static str;
}

macro_rules! declare_law {
    ($marker:ident, $law:ident, $name:literal) => {
        #[derive(Debug, Default, Copy, Clone)]
        pub struct $marker;

        impl ResistivityDependence for $marker {
            const LAW: ResistivityLaw = ResistivityLaw::$law;
            const NAME: &'static str = $name;
        }
    };
}

declare_law!(ConstantLaw, Constant, "conductor");
declare_law!(TemperatureLaw, Temperature, "conductor (temperature)");
declare_law!(FluxLaw, Flux, "conductor (flux)");
declare_law!(TemperatureFluxLaw, TemperatureFlux, "conductor (temperature, flux)");
declare_law!(CurrentLaw, Current, "conductor (current)");
declare_law!(CurrentTemperatureLaw, CurrentTemperature, "conductor (current, temperature)");
declare_law!(CurrentFluxLaw, CurrentFlux, "conductor (current, flux)");
declare_law!(CurrentFluxTemperatureLaw, CurrentFluxTemperature, "conductor (current, flux, temperature)");

#[derive(Debug, Default, Copy, Clone)]
pub struct ConductorKernel<L> {
    marker: PhantomData<L>,
}

pub fn kernel_for_law(law: ResistivityLaw) -> Box<dyn RegionKernel> {
    match law {
        ResistivityLaw::Constant => Box::new(ConductorKernel::<ConstantLaw>::default()),
        ResistivityLaw::Temperature => Box::new(ConductorKernel::<TemperatureLaw>::default()),
        ResistivityLaw::Flux => Box::new(ConductorKernel::<FluxLaw>::default()),
        ResistivityLaw::TemperatureFlux => Box::new(ConductorKernel::<TemperatureFluxLaw>::default()),
        ResistivityLaw::Current => Box::new(ConductorKernel::<CurrentLaw>::default()),
        ResistivityLaw::CurrentTemperature => Box::new(ConductorKernel::<CurrentTemperatureLaw>::default()),
        ResistivityLaw::CurrentFlux => Box::new(ConductorKernel::<CurrentFluxLaw>::default()),
        ResistivityLaw::CurrentFluxTemperature => Box::new(ConductorKernel::<CurrentFluxTemperatureLaw>::default()),
    }
}

impl<L: ResistivityDependence> RegionKernel for ConductorKernel<L> {
    fn name(&self) -> &'static str {
        L::NAME
    }

    #[allow(non_snake_case)]
    fn compute_element(
        &self,
        element: &MeshElement,
        context: &KernelContext,
        scratch: &mut ScratchBuffers,
    ) -> eyre::Result<usize> {
        let ScratchBuffers::BulkConductor(BulkConductorScratch {
            system,
            values,
            temperature,
        }) = scratch
        else {
            return Err(eyre!("conductor kernel requires bulk-conductor scratch buffers"));
        };
        let material = context.material()?;
        let m = context.config.multiplicity.edge;
        let n = element.edges.len();
        if !system.prepare(n * m) {
            return Ok(n * m);
        }

        let law = L::LAW;
        let permeability_law = material.permeability_law();
        let needs_temperature = law.depends_on_temperature() || permeability_law.depends_on_temperature();
        let needs_field = law.depends_on_flux() || permeability_law.depends_on_field();
        if needs_temperature {
            context.gather_temperature(element, temperature)?;
        }

        for (&weight, xi) in context.quadrature.weights().iter().zip(context.quadrature.points()) {
            context.basis.operator_values_at(element, xi, values)?;
            let dx = context.point_weight(weight, values);

            let mut state = MaterialState::default();
            if needs_temperature {
                state.temperature = values.interpolate_nodal(temperature.iter().copied());
            }
            let mut field_squared = 0.0;
            let mut current_squared = 0.0;
            for c in 0..m {
                let h = system.solution.as_slice();
                if needs_field {
                    field_squared += values.interpolate_edge_field(component(h, m, c)).norm_squared();
                }
                if law.depends_on_current() {
                    current_squared += values.interpolate_curl(component(h, m, c)).norm_squared();
                }
            }
            let field_strength = field_squared.sqrt();
            let mu = material.permeability(field_strength, state.temperature);
            state.flux_density = mu * field_strength;
            state.current_density = current_squared.sqrt();
            let rho = material.resistivity(&state);

            for I in 0..n {
                for J in I..n {
                    let m_IJ = dx * mu * values.edge_shape[I].dot(&values.edge_shape[J]);
                    let k_IJ = dx * rho * values.curl[I].dot(&values.curl[J]);
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
