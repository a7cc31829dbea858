//! Engine configuration.
//!
//! Every field has a default, so a configuration file only needs to list what differs:
//!
//! ```
//! use fenris_em::config::{EngineConfig, InterfaceCoupling};
//!
//! let config = EngineConfig::from_json_str(r#"{
//!     "time": { "dt": 1e-3, "theta": 0.5 },
//!     "interface_coupling": "multiplier"
//! }"#).unwrap();
//! assert_eq!(config.interface_coupling, InterfaceCoupling::Multiplier);
//! assert_eq!(config.nonlinear.max_iterations, 50);
//! ```
use crate::dofs::DofMultiplicity;
use crate::error::ConfigurationError;
use crate::material::InversionSettings;
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// θ-scheme for the semi-discrete system `M du/dt + K(u) u = f`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeScheme {
    pub dt: f64,
    /// 1 gives backward Euler, 0.5 gives Crank–Nicolson.
    pub theta: f64,
}

impl Default for TimeScheme {
    fn default() -> Self {
        Self { dt: 1.0, theta: 1.0 }
    }
}

/// How the fields on the two sides of an interface are coupled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceCoupling {
    /// Tangential traces coupled directly.
    #[default]
    Direct,
    /// Tangential traces coupled through facet multipliers.
    Multiplier,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearSettings {
    /// Iteration cap for the local inversion of material laws.
    pub max_iterations: usize,
    /// Relative tolerance for the local inversion of material laws.
    pub tolerance: f64,
}

impl Default for NonlinearSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-10,
        }
    }
}

impl NonlinearSettings {
    pub fn inversion(&self) -> InversionSettings {
        InversionSettings {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub multiplicity: DofMultiplicity,
    pub time: TimeScheme,
    pub interface_coupling: InterfaceCoupling,
    /// Penalty factor holding the potential at zero on antisymmetry planes.
    pub antisymmetry_penalty: f64,
    pub nonlinear: NonlinearSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            multiplicity: DofMultiplicity::default(),
            time: TimeScheme::default(),
            interface_coupling: InterfaceCoupling::default(),
            antisymmetry_penalty: 1e8,
            nonlinear: NonlinearSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        let config: Self = serde_json::from_str(json).wrap_err("failed to parse engine configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).wrap_err_with(|| format!("failed to open {}", path.display()))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| format!("failed to parse engine configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |message: String| Err(ConfigurationError::InvalidConfig(message));
        let m = &self.multiplicity;
        if [m.edge, m.face, m.node, m.lambda].contains(&0) {
            return invalid(format!("multiplicities must be positive, got {:?}", m));
        }
        if !(self.time.dt > 0.0 && self.time.dt.is_finite()) {
            return invalid(format!("time step must be positive, got {}", self.time.dt));
        }
        if !(0.0..=1.0).contains(&self.time.theta) {
            return invalid(format!("theta must lie in [0, 1], got {}", self.time.theta));
        }
        if !(self.antisymmetry_penalty >= 0.0 && self.antisymmetry_penalty.is_finite()) {
            return invalid(format!(
                "antisymmetry penalty must be non-negative, got {}",
                self.antisymmetry_penalty
            ));
        }
        if self.nonlinear.max_iterations == 0 || !(self.nonlinear.tolerance > 0.0) {
            return invalid(format!("invalid nonlinear settings {:?}", self.nonlinear));
        }
        Ok(())
    }
}
