//! Material laws consumed by the element kernels.
//!
//! The engine only talks to materials through the [`Material`] trait. The law tags returned by
//! [`Material::resistivity_law`] and [`Material::permeability_law`] state which parts of the
//! local field state a material actually depends on; they are consulted once, when a region
//! is linked, to select a kernel that reconstructs exactly that state.
//!
//! [`StandardMaterial`] is a serde-configurable implementation covering the usual models for
//! superconductors (power-law E–J relation with field and temperature dependent critical
//! current density), normal conductors and soft magnetic materials.
use crate::error::NumericalError;
use crate::VACUUM_PERMEABILITY;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// The state variables a resistivity law may depend on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResistivityLaw {
    Constant,
    Temperature,
    Flux,
    TemperatureFlux,
    Current,
    CurrentTemperature,
    CurrentFlux,
    CurrentFluxTemperature,
}

impl ResistivityLaw {
    pub fn depends_on_current(&self) -> bool {
        matches!(
            self,
            Self::Current | Self::CurrentTemperature | Self::CurrentFlux | Self::CurrentFluxTemperature
        )
    }

    pub fn depends_on_flux(&self) -> bool {
        matches!(
            self,
            Self::Flux | Self::TemperatureFlux | Self::CurrentFlux | Self::CurrentFluxTemperature
        )
    }

    pub fn depends_on_temperature(&self) -> bool {
        matches!(
            self,
            Self::Temperature | Self::TemperatureFlux | Self::CurrentTemperature | Self::CurrentFluxTemperature
        )
    }
}

/// The state variables a permeability law may depend on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermeabilityLaw {
    Constant,
    Field,
    Temperature,
    FieldTemperature,
}

impl PermeabilityLaw {
    pub fn depends_on_field(&self) -> bool {
        matches!(self, Self::Field | Self::FieldTemperature)
    }

    pub fn depends_on_temperature(&self) -> bool {
        matches!(self, Self::Temperature | Self::FieldTemperature)
    }
}

/// Local field state at an integration point.
///
/// Quantities a law does not depend on may be left at zero.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct MaterialState {
    /// Magnitude of the current density in A/m².
    pub current_density: f64,
    /// Magnitude of the magnetic flux density in T.
    pub flux_density: f64,
    /// Temperature in K.
    pub temperature: f64,
}

/// A material as seen by the element kernels.
pub trait Material: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn resistivity_law(&self) -> ResistivityLaw;

    fn permeability_law(&self) -> PermeabilityLaw;

    /// Resistivity in Ω·m at the given state.
    fn resistivity(&self, state: &MaterialState) -> f64;

    /// Absolute permeability in H/m at the given magnetic field strength (A/m) and temperature.
    fn permeability(&self, field_strength: f64, temperature: f64) -> f64;
}

/// Parameters of the power-law E–J relation `E = Ec (J / Jc)^n`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerLaw {
    /// Electric field criterion in V/m.
    pub ec: f64,
    /// Critical current density in A/m² (at zero field and zero temperature where relevant).
    pub jc: f64,
    /// Power-law exponent.
    pub n: f64,
    /// Lower bound on the resistivity, keeping the secant stiffness non-singular at `J = 0`.
    #[serde(default)]
    pub floor: f64,
    /// Upper bound on the resistivity, typically the normal-state resistivity. Omitted from
    /// JSON when unbounded.
    #[serde(default = "unbounded", skip_serializing_if = "is_unbounded")]
    pub ceiling: f64,
}

fn unbounded() -> f64 {
    f64::INFINITY
}

fn is_unbounded(ceiling: &f64) -> bool {
    *ceiling == f64::INFINITY
}

impl PowerLaw {
    /// Secant resistivity `E / J` for the given critical current density.
    fn resistivity(&self, current_density: f64, jc: f64) -> f64 {
        let jc = jc.max(self.jc * MIN_CRITICAL_FRACTION);
        let rho = (self.ec / jc) * (current_density.abs() / jc).powf(self.n - 1.0);
        rho.clamp(self.floor, self.ceiling)
    }
}

/// The critical current density never drops below this fraction of its nominal value.
const MIN_CRITICAL_FRACTION: f64 = 1e-6;

/// Resistivity models of [`StandardMaterial`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ResistivityModel {
    Constant {
        rho: f64,
    },
    /// `rho0 (1 + alpha (T - T0))`
    LinearTemperature {
        rho0: f64,
        alpha: f64,
        reference_temperature: f64,
    },
    /// `rho0 (1 + |B| / b0)`
    Magnetoresistive {
        rho0: f64,
        b0: f64,
    },
    /// Product of the linear temperature and the magnetoresistive models.
    MagnetoresistiveTemperature {
        rho0: f64,
        alpha: f64,
        reference_temperature: f64,
        b0: f64,
    },
    PowerLaw(PowerLaw),
    /// Power law with `Jc(T) = Jc (1 - T / Tc)`.
    PowerLawTemperature {
        #[serde(flatten)]
        law: PowerLaw,
        critical_temperature: f64,
    },
    /// Power law with the Kim model `Jc(B) = Jc / (1 + |B| / b0)`.
    PowerLawFlux {
        #[serde(flatten)]
        law: PowerLaw,
        b0: f64,
    },
    PowerLawFluxTemperature {
        #[serde(flatten)]
        law: PowerLaw,
        b0: f64,
        critical_temperature: f64,
    },
}

impl ResistivityModel {
    pub fn law(&self) -> ResistivityLaw {
        match self {
            Self::Constant { .. } => ResistivityLaw::Constant,
            Self::LinearTemperature { .. } => ResistivityLaw::Temperature,
            Self::Magnetoresistive { .. } => ResistivityLaw::Flux,
            Self::MagnetoresistiveTemperature { .. } => ResistivityLaw::TemperatureFlux,
            Self::PowerLaw(_) => ResistivityLaw::Current,
            Self::PowerLawTemperature { .. } => ResistivityLaw::CurrentTemperature,
            Self::PowerLawFlux { .. } => ResistivityLaw::CurrentFlux,
            Self::PowerLawFluxTemperature { .. } => ResistivityLaw::CurrentFluxTemperature,
        }
    }

    pub fn evaluate(&self, state: &MaterialState) -> f64 {
        let thermal = |alpha: f64, t0: f64| 1.0 + alpha * (state.temperature - t0);
        let kim = |b0: f64| 1.0 / (1.0 + state.flux_density.abs() / b0);
        let reduced = |tc: f64| 1.0 - state.temperature / tc;
        match *self {
            Self::Constant { rho } => rho,
            Self::LinearTemperature {
                rho0,
                alpha,
                reference_temperature,
            } => rho0 * thermal(alpha, reference_temperature),
            Self::Magnetoresistive { rho0, b0 } => rho0 * (1.0 + state.flux_density.abs() / b0),
            Self::MagnetoresistiveTemperature {
                rho0,
                alpha,
                reference_temperature,
                b0,
            } => rho0 * thermal(alpha, reference_temperature) * (1.0 + state.flux_density.abs() / b0),
            Self::PowerLaw(law) => law.resistivity(state.current_density, law.jc),
            Self::PowerLawTemperature {
                law,
                critical_temperature,
            } => law.resistivity(state.current_density, law.jc * reduced(critical_temperature)),
            Self::PowerLawFlux { law, b0 } => law.resistivity(state.current_density, law.jc * kim(b0)),
            Self::PowerLawFluxTemperature {
                law,
                b0,
                critical_temperature,
            } => law.resistivity(
                state.current_density,
                law.jc * kim(b0) * reduced(critical_temperature),
            ),
        }
    }
}

/// Permeability models of [`StandardMaterial`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PermeabilityModel {
    Constant {
        relative: f64,
    },
    /// `mu0 (1 + (mu_r - 1) / (1 + |H| / h_sat))`, a monotone saturation curve.
    Saturating {
        relative: f64,
        saturation_field: f64,
    },
    /// Magnetization vanishing linearly towards the Curie temperature.
    Curie {
        relative: f64,
        curie_temperature: f64,
    },
    SaturatingCurie {
        relative: f64,
        saturation_field: f64,
        curie_temperature: f64,
    },
}

impl PermeabilityModel {
    pub fn law(&self) -> PermeabilityLaw {
        match self {
            Self::Constant { .. } => PermeabilityLaw::Constant,
            Self::Saturating { .. } => PermeabilityLaw::Field,
            Self::Curie { .. } => PermeabilityLaw::Temperature,
            Self::SaturatingCurie { .. } => PermeabilityLaw::FieldTemperature,
        }
    }

    pub fn evaluate(&self, field_strength: f64, temperature: f64) -> f64 {
        let saturation = |h_sat: f64| 1.0 / (1.0 + field_strength.abs() / h_sat);
        let curie = |tc: f64| (1.0 - temperature / tc).max(0.0);
        let relative = match *self {
            Self::Constant { relative } => relative,
            Self::Saturating {
                relative,
                saturation_field,
            } => 1.0 + (relative - 1.0) * saturation(saturation_field),
            Self::Curie {
                relative,
                curie_temperature,
            } => 1.0 + (relative - 1.0) * curie(curie_temperature),
            Self::SaturatingCurie {
                relative,
                saturation_field,
                curie_temperature,
            } => 1.0 + (relative - 1.0) * saturation(saturation_field) * curie(curie_temperature),
        };
        VACUUM_PERMEABILITY * relative
    }
}

impl Default for PermeabilityModel {
    fn default() -> Self {
        Self::Constant { relative: 1.0 }
    }
}

/// A material described by one resistivity model and one permeability model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardMaterial {
    pub name: String,
    pub resistivity: ResistivityModel,
    #[serde(default)]
    pub permeability: PermeabilityModel,
}

impl StandardMaterial {
    pub fn new(name: impl Into<String>, resistivity: ResistivityModel, permeability: PermeabilityModel) -> Self {
        Self {
            name: name.into(),
            resistivity,
            permeability,
        }
    }

    /// A non-magnetic material with constant resistivity.
    pub fn ohmic(name: impl Into<String>, rho: f64) -> Self {
        Self::new(name, ResistivityModel::Constant { rho }, PermeabilityModel::default())
    }

    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Material for StandardMaterial {
    fn name(&self) -> &str {
        &self.name
    }

    fn resistivity_law(&self) -> ResistivityLaw {
        self.resistivity.law()
    }

    fn permeability_law(&self) -> PermeabilityLaw {
        self.permeability.law()
    }

    fn resistivity(&self, state: &MaterialState) -> f64 {
        self.resistivity.evaluate(state)
    }

    fn permeability(&self, field_strength: f64, temperature: f64) -> f64 {
        self.permeability.evaluate(field_strength, temperature)
    }
}

/// Settings for the iterative inversion of a B–H law.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct InversionSettings {
    pub max_iterations: usize,
    pub tolerance: f64,
}

/// Finds the field strength `H >= 0` with `mu(H) H = B` for the given flux density magnitude.
///
/// Uses Newton's method safeguarded by bisection on the bracket `[0, B / mu_min]`, where
/// `mu_min` is the permeability of vacuum. The law must describe a monotonically increasing
/// B–H curve with `mu(H) >= mu0`.
///
/// Returns [`NumericalError::NonConvergence`] if the relative residual does not drop below the
/// tolerance within the iteration cap.
pub fn field_strength_from_flux(
    material: &dyn Material,
    flux_density: f64,
    temperature: f64,
    settings: &InversionSettings,
) -> eyre::Result<f64> {
    let b = flux_density.abs();
    if b == 0.0 {
        return Ok(0.0);
    }
    if !material.permeability_law().depends_on_field() {
        return Ok(b / material.permeability(0.0, temperature));
    }

    let residual = |h: f64| material.permeability(h, temperature) * h - b;
    let (mut lower, mut upper) = (0.0, b / VACUUM_PERMEABILITY);
    let mut h = b / material.permeability(0.0, temperature);
    let mut r = residual(h);

    for _ in 0..settings.max_iterations {
        if r.abs() <= settings.tolerance * b {
            return Ok(h);
        }
        if r > 0.0 {
            upper = h;
        } else {
            lower = h;
        }

        // Finite-difference slope of B(H), i.e. the differential permeability
        let dh = (h.abs() * 1e-7).max(1e-12);
        let slope = (residual(h + dh) - r) / dh;
        let newton = h - r / slope;
        h = if slope > 0.0 && newton > lower && newton < upper {
            newton
        } else {
            0.5 * (lower + upper)
        };
        r = residual(h);
    }

    if r.abs() <= settings.tolerance * b {
        Ok(h)
    } else {
        Err(NumericalError::NonConvergence {
            procedure: "B-H inversion",
            iterations: settings.max_iterations,
            residual: r.abs() / b,
        }
        .into())
    }
}
