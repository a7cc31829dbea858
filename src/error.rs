//! Failure categories of the assembly engine.
//!
//! All fallible operations return [`eyre::Result`]. The typed errors in this module are
//! wrapped in the report, so callers that need to distinguish the category can use
//! `report.downcast_ref::<ConfigurationError>()`.
use crate::classification::{GeometryType, PhysicalDomain};
use thiserror::Error;

/// The model cannot be assembled as configured.
///
/// These errors indicate a structurally invalid model. They are never recovered from inside
/// the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("no kernel is available for {classification:?} regions with {geometry} elements in a {dimension}D mesh")]
    UnsupportedGeometry {
        classification: PhysicalDomain,
        geometry: GeometryType,
        dimension: usize,
    },
    #[error("region '{region}' ({classification:?}) requires a material")]
    MissingMaterial {
        region: String,
        classification: PhysicalDomain,
    },
    #[error("element {element} of region '{region}' has no facet coupling, which {classification:?} regions require")]
    MissingFacetCoupling {
        region: String,
        element: usize,
        classification: PhysicalDomain,
    },
    #[error("facet of element {element} does not match any face of element {neighbor}: {reason}")]
    FacetOrientation {
        element: usize,
        neighbor: usize,
        reason: String,
    },
    #[error("kernel for region '{region}' wrote {written} local DOFs, but the layout declares {declared}")]
    DofCountMismatch {
        region: String,
        declared: usize,
        written: usize,
    },
    #[error(
        "interface region '{region}' couples blocks with multiplicities {master}, {slave} and {lambda}; \
         they must agree"
    )]
    MultiplicityMismatch {
        region: String,
        master: usize,
        slave: usize,
        lambda: usize,
    },
    #[error("region '{region}' references element {element} of region {target}, which does not exist")]
    DanglingElementReference {
        region: String,
        target: usize,
        element: usize,
    },
    #[error("region '{region}' has elements but is not linked")]
    UnlinkedRegion { region: String },
    #[error("element {element} of region '{region}' has {actual} nodes, but {geometry} requires {expected}")]
    MalformedElement {
        region: String,
        element: usize,
        geometry: GeometryType,
        expected: usize,
        actual: usize,
    },
    #[error("ghost element map: {0}")]
    GhostMap(String),
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// A numerical procedure failed to produce a trustworthy value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalError {
    #[error("{procedure} did not converge within {iterations} iterations (residual {residual:e})")]
    NonConvergence {
        procedure: &'static str,
        iterations: usize,
        residual: f64,
    },
    #[error("singular element Jacobian encountered in element {element}")]
    SingularJacobian { element: usize },
}
