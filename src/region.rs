//! Mesh regions and the per-region state created by linking.
use crate::classification::{GeometryType, PhysicalDomain};
use crate::dofs::DofLayout;
use crate::kernel::scratch::ScratchBuffers;
use crate::kernel::RegionKernel;
use crate::material::Material;
use crate::mesh::MeshElement;
use crate::quadrature::Quadrature;
use nalgebra::Vector3;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Per-region data consumed by some kernels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RegionParameters {
    /// Thickness of a thin-shell layer.
    pub thickness: Option<f64>,
    /// Imposed source field of a coil region, in A/m.
    pub source_field: Vector3<f64>,
    /// Applied field on a boundary region, in A/m.
    pub applied_field: Vector3<f64>,
}

impl Default for RegionParameters {
    fn default() -> Self {
        Self {
            thickness: None,
            source_field: Vector3::zeros(),
            applied_field: Vector3::zeros(),
        }
    }
}

/// The kernel, scratch buffers and layout selected for a region when it is linked.
pub struct RegionLink {
    pub(crate) kernel: Box<dyn RegionKernel>,
    pub(crate) scratch: ScratchBuffers,
    pub(crate) layout: DofLayout,
    pub(crate) quadrature: Quadrature,
    pub(crate) curved: bool,
}

impl RegionLink {
    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    pub fn layout(&self) -> &DofLayout {
        &self.layout
    }

    pub fn scratch(&self) -> &ScratchBuffers {
        &self.scratch
    }

    pub fn quadrature(&self) -> &Quadrature {
        &self.quadrature
    }

    pub fn is_curved(&self) -> bool {
        self.curved
    }
}

impl Debug for RegionLink {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionLink")
            .field("kernel", &self.kernel.name())
            .field("layout", &self.layout)
            .field("quadrature_points", &self.quadrature.len())
            .field("curved", &self.curved)
            .finish()
    }
}

/// A group of mesh elements sharing a classification, a geometry type and a material.
#[derive(Debug)]
pub struct Region {
    pub name: String,
    pub classification: PhysicalDomain,
    pub geometry: GeometryType,
    pub elements: Vec<MeshElement>,
    pub material: Option<Arc<dyn Material>>,
    pub parameters: RegionParameters,
    pub(crate) link: Option<RegionLink>,
}

impl Region {
    pub fn new(name: impl Into<String>, classification: PhysicalDomain, geometry: GeometryType) -> Self {
        Self {
            name: name.into(),
            classification,
            geometry,
            elements: Vec::new(),
            material: None,
            parameters: RegionParameters::default(),
            link: None,
        }
    }

    pub fn with_elements(mut self, elements: Vec<MeshElement>) -> Self {
        self.elements = elements;
        self
    }

    pub fn with_material(mut self, material: Arc<dyn Material>) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_parameters(mut self, parameters: RegionParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    pub fn link(&self) -> Option<&RegionLink> {
        self.link.as_ref()
    }

    pub fn layout(&self) -> Option<&DofLayout> {
        self.link.as_ref().map(|link| &link.layout)
    }
}
