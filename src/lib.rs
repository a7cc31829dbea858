//! Multi-physics finite element assembly for coupled nonlinear field problems.
//!
//! The crate assembles local element contributions for meshes whose regions follow different
//! physics: superconducting or resistive conductors, air, ferromagnetic material, coils, thin
//! conducting shells and the interfaces between them. Every region is *linked* once, which
//! selects the element kernel and allocates the scratch buffers used for all of its elements.
//! After that, [`assembly::AssemblyEngine`] evaluates kernels element by element and scatters
//! the result into a global system for an external solver.
//!
//! Cross-rank consistency (ghost elements of layered interfaces, checkpoint restarts and the
//! interface error estimator) is handled through the blocking [`comm::Communicator`] layer
//! from the `fenris-comm` crate.

pub mod assembly;
pub mod basis;
pub mod checkpoint;
pub mod classification;
pub mod config;
pub mod dofs;
pub mod error;
pub mod estimate;
pub mod ghost;
pub mod kernel;
pub mod material;
pub mod mesh;
pub mod quadrature;
pub mod region;

mod util;

pub mod comm {
    pub use fenris_comm::*;
}

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// Permeability of vacuum in H/m.
pub const VACUUM_PERMEABILITY: f64 = 4.0e-7 * std::f64::consts::PI;
