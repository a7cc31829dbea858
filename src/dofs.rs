//! Local DOF layouts and the global DOF numbering.
//!
//! Local DOFs of an element are ordered in blocks: edge DOFs, then face DOFs, then node DOFs,
//! then multiplier DOFs. Within a block, the `m` components of an entity are contiguous
//! (entity-major order `m * entity + component`). Interface elements place the master
//! element's entities before the slave element's entities in each block.
use crate::classification::{BasisKind, GeometryType, PhysicalDomain};
use crate::config::InterfaceCoupling;
use crate::error::ConfigurationError;
use crate::mesh::MeshElement;
use serde::{Deserialize, Serialize};

/// Number of field components carried by each kind of entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DofMultiplicity {
    pub edge: usize,
    pub face: usize,
    pub node: usize,
    pub lambda: usize,
}

impl Default for DofMultiplicity {
    fn default() -> Self {
        Self {
            edge: 1,
            face: 1,
            node: 1,
            lambda: 1,
        }
    }
}

impl DofMultiplicity {
    pub fn uniform(m: usize) -> Self {
        Self {
            edge: m,
            face: m,
            node: m,
            lambda: m,
        }
    }

    pub fn of_basis(&self, kind: BasisKind) -> usize {
        match kind {
            BasisKind::Edge => self.edge,
            BasisKind::Node => self.node,
        }
    }
}

/// Sizes of the local DOF blocks of a region's elements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DofLayout {
    pub edge: usize,
    pub face: usize,
    pub node: usize,
    pub lambda: usize,
}

impl DofLayout {
    pub fn total(&self) -> usize {
        self.edge + self.face + self.node + self.lambda
    }

    pub fn edge_offset(&self) -> usize {
        0
    }

    pub fn face_offset(&self) -> usize {
        self.edge
    }

    pub fn node_offset(&self) -> usize {
        self.edge + self.face
    }

    pub fn lambda_offset(&self) -> usize {
        self.edge + self.face + self.node
    }

    fn add_side(&mut self, kind: BasisKind, geometry: GeometryType, multiplicity: &DofMultiplicity) {
        match kind {
            BasisKind::Edge => self.edge += geometry.shape.edge_count() * multiplicity.edge,
            BasisKind::Node => self.node += geometry.shape.vertex_count() * multiplicity.node,
        }
    }

    /// Determines the layout of a region from its classification and element geometry.
    ///
    /// Interface regions must carry the same number of components on both sides and, with
    /// multiplier coupling, on the multipliers.
    pub fn for_region(
        region: &str,
        classification: PhysicalDomain,
        geometry: GeometryType,
        multiplicity: &DofMultiplicity,
        coupling: InterfaceCoupling,
    ) -> Result<Self, ConfigurationError> {
        let mut layout = DofLayout::default();
        if let Some(kind) = classification.bulk_basis() {
            layout.add_side(kind, geometry, multiplicity);
            // Face DOFs only exist for higher interpolation orders
            if geometry.interpolation_order > 1 {
                layout.face += geometry.shape.face_count() * multiplicity.face;
            }
            return Ok(layout);
        }

        if let Some((master, slave)) = classification.interface_sides() {
            let (m_master, m_slave) = (multiplicity.of_basis(master), multiplicity.of_basis(slave));
            let coupled = coupling == InterfaceCoupling::Multiplier;
            if m_master != m_slave || (coupled && multiplicity.lambda != m_master) {
                return Err(ConfigurationError::MultiplicityMismatch {
                    region: region.to_string(),
                    master: m_master,
                    slave: m_slave,
                    lambda: multiplicity.lambda,
                });
            }
            // Interface regions are facet regions; their sides are the adjacent bulk elements
            let bulk = geometry
                .parent_geometry()
                .ok_or_else(|| ConfigurationError::UnsupportedGeometry {
                    classification,
                    geometry,
                    dimension: geometry.shape.reference_dim() + 1,
                })?;
            layout.add_side(master, bulk, multiplicity);
            layout.add_side(slave, bulk, multiplicity);
            if coupled {
                layout.lambda = multiplier_count(geometry) * multiplicity.lambda;
            }
            return Ok(layout);
        }

        // Remaining facet regions carry nodal DOFs on the facet vertices
        layout.add_side(BasisKind::Node, geometry, multiplicity);
        Ok(layout)
    }
}

/// Number of scalar multipliers on a facet: one per vertex and tangent direction.
pub fn multiplier_count(facet_geometry: GeometryType) -> usize {
    facet_geometry.shape.vertex_count() * facet_geometry.shape.reference_dim()
}

/// Mesh-wide entity counts from which the global numbering is derived.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub nodes: usize,
    pub edges: usize,
    pub faces: usize,
    /// Number of facets that may carry multipliers.
    pub facets: usize,
    /// Number of thin-shell layers. Each layer carries its own copy of the nodal DOFs.
    pub shell_layers: usize,
    /// Vertices per facet (2 in planar meshes, 3 in solid meshes).
    pub facet_vertices: usize,
}

/// Global DOF numbering.
///
/// DOFs are numbered in blocks: edge DOFs, face DOFs, node DOFs, thin-shell layer DOFs
/// (`layer * nodes + node`), then multiplier DOFs. Every block is entity-major.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofNumbering {
    counts: EntityCounts,
    multiplicity: DofMultiplicity,
}

impl DofNumbering {
    pub fn new(counts: EntityCounts, multiplicity: DofMultiplicity) -> Self {
        Self { counts, multiplicity }
    }

    pub fn counts(&self) -> &EntityCounts {
        &self.counts
    }

    pub fn multiplicity(&self) -> &DofMultiplicity {
        &self.multiplicity
    }

    fn face_offset(&self) -> usize {
        self.counts.edges * self.multiplicity.edge
    }

    fn node_offset(&self) -> usize {
        self.face_offset() + self.counts.faces * self.multiplicity.face
    }

    fn shell_offset(&self) -> usize {
        self.node_offset() + self.counts.nodes * self.multiplicity.node
    }

    fn multiplier_offset(&self) -> usize {
        self.shell_offset() + self.counts.shell_layers * self.counts.nodes * self.multiplicity.node
    }

    fn tangent_dim(&self) -> usize {
        self.counts.facet_vertices.saturating_sub(1)
    }

    pub fn total(&self) -> usize {
        let per_facet = self.counts.facet_vertices * self.tangent_dim() * self.multiplicity.lambda;
        self.multiplier_offset() + self.counts.facets * per_facet
    }

    pub fn edge_dof(&self, edge: usize, component: usize) -> usize {
        self.multiplicity.edge * edge + component
    }

    pub fn face_dof(&self, face: usize, component: usize) -> usize {
        self.face_offset() + self.multiplicity.face * face + component
    }

    pub fn node_dof(&self, node: usize, component: usize) -> usize {
        self.node_offset() + self.multiplicity.node * node + component
    }

    pub fn shell_dof(&self, layer: usize, node: usize, component: usize) -> usize {
        self.shell_offset() + self.multiplicity.node * (layer * self.counts.nodes + node) + component
    }

    pub fn multiplier_dof(&self, facet: usize, vertex: usize, tangent: usize, component: usize) -> usize {
        let local = (facet * self.counts.facet_vertices + vertex) * self.tangent_dim() + tangent;
        self.multiplier_offset() + self.multiplicity.lambda * local + component
    }

    fn push_side(&self, kind: BasisKind, element: &MeshElement, out: &mut Vec<usize>) {
        match kind {
            BasisKind::Edge => {
                for &edge in &element.edges {
                    out.extend((0..self.multiplicity.edge).map(|c| self.edge_dof(edge, c)));
                }
            }
            BasisKind::Node => {
                for &node in element.vertices() {
                    out.extend((0..self.multiplicity.node).map(|c| self.node_dof(node, c)));
                }
            }
        }
    }

    /// Collects the global DOF indices of an element in local DOF order.
    ///
    /// Interface elements need their master and slave elements. Returns the number of indices
    /// written.
    pub fn collect_element_dofs(
        &self,
        classification: PhysicalDomain,
        coupling: InterfaceCoupling,
        element: &MeshElement,
        sides: Option<(&MeshElement, &MeshElement)>,
        out: &mut Vec<usize>,
    ) -> eyre::Result<usize> {
        out.clear();
        if let Some(kind) = classification.bulk_basis() {
            self.push_side(kind, element, out);
            if element.geometry.interpolation_order > 1 {
                for &face in &element.faces {
                    out.extend((0..self.multiplicity.face).map(|c| self.face_dof(face, c)));
                }
            }
        } else if let Some((master_kind, slave_kind)) = classification.interface_sides() {
            let (master, slave) = sides
                .ok_or_else(|| eyre::eyre!("interface element {} requires master and slave elements", element.id))?;
            // Edge block before node block, master before slave within a block
            for kind in [BasisKind::Edge, BasisKind::Node] {
                if master_kind == kind {
                    self.push_side(kind, master, out);
                }
                if slave_kind == kind {
                    self.push_side(kind, slave, out);
                }
            }
            if coupling == InterfaceCoupling::Multiplier {
                let facet = element
                    .facet
                    .ok_or_else(|| eyre::eyre!("interface element {} has no facet coupling", element.id))?;
                let tangents = element.geometry.shape.reference_dim();
                for vertex in 0..element.geometry.shape.vertex_count() {
                    for tangent in 0..tangents {
                        out.extend(
                            (0..self.multiplicity.lambda)
                                .map(|c| self.multiplier_dof(facet.facet_id, vertex, tangent, c)),
                        );
                    }
                }
            }
        } else if classification == PhysicalDomain::ThinShell {
            let layer = element.facet.map(|facet| facet.layer).unwrap_or(0);
            for &node in element.vertices() {
                out.extend((0..self.multiplicity.node).map(|c| self.shell_dof(layer, node, c)));
            }
        } else {
            self.push_side(BasisKind::Node, element, out);
        }
        Ok(out.len())
    }
}
