//! Physical classification of regions and the element geometries they are made of.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// The physical role of a mesh region.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalDomain {
    /// Bulk conducting material, possibly superconducting. Edge-based field.
    Conductor,
    /// Non-conducting, non-magnetic bulk. Node-based scalar potential.
    Air,
    /// Nonlinear magnetic bulk. Edge-based field.
    Ferromagnet,
    /// Air with an imposed source current.
    Coil,
    /// One layer of a thin conducting shell, represented by facet elements.
    ThinShell,
    /// Outer boundary with an applied field.
    Boundary,
    /// Cut surface making a multiply connected potential region single-valued.
    Cut,
    /// Symmetry plane, homogeneous natural condition.
    Symmetry,
    /// Antisymmetry plane, potential held at zero.
    AntiSymmetry,
    ConductorAir,
    ConductorFerromagnet,
    FerromagnetAir,
}

/// How the unknown field of a region is discretized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasisKind {
    /// Tangentially continuous vector field on edges (Whitney elements).
    Edge,
    /// Continuous scalar field on vertices.
    Node,
}

impl PhysicalDomain {
    pub const ALL: [PhysicalDomain; 12] = [
        Self::Conductor,
        Self::Air,
        Self::Ferromagnet,
        Self::Coil,
        Self::ThinShell,
        Self::Boundary,
        Self::Cut,
        Self::Symmetry,
        Self::AntiSymmetry,
        Self::ConductorAir,
        Self::ConductorFerromagnet,
        Self::FerromagnetAir,
    ];

    /// Whether the region consists of elements of the full mesh dimension.
    pub fn is_bulk(&self) -> bool {
        matches!(self, Self::Conductor | Self::Air | Self::Ferromagnet | Self::Coil)
    }

    /// Whether the region couples a master and a slave element across a facet.
    pub fn is_interface(&self) -> bool {
        matches!(
            self,
            Self::ConductorAir | Self::ConductorFerromagnet | Self::FerromagnetAir | Self::Cut
        )
    }

    /// Whether the region consists of facet elements (co-dimension one).
    pub fn is_facet(&self) -> bool {
        !self.is_bulk()
    }

    /// Whether linking the region requires a material.
    pub fn requires_material(&self) -> bool {
        matches!(self, Self::Conductor | Self::Ferromagnet | Self::ThinShell)
    }

    /// The discretization of the field in a bulk region.
    pub fn bulk_basis(&self) -> Option<BasisKind> {
        match self {
            Self::Conductor | Self::Ferromagnet => Some(BasisKind::Edge),
            Self::Air | Self::Coil => Some(BasisKind::Node),
            _ => None,
        }
    }

    /// The discretizations on the master and slave side of an interface region.
    pub fn interface_sides(&self) -> Option<(BasisKind, BasisKind)> {
        match self {
            Self::ConductorAir => Some((BasisKind::Edge, BasisKind::Node)),
            Self::ConductorFerromagnet => Some((BasisKind::Edge, BasisKind::Edge)),
            Self::FerromagnetAir => Some((BasisKind::Edge, BasisKind::Node)),
            Self::Cut => Some((BasisKind::Node, BasisKind::Node)),
            _ => None,
        }
    }
}

/// The reference shape of an element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementShape {
    Segment,
    Triangle,
    Tetrahedron,
}

const SEGMENT_EDGES: [[usize; 2]; 1] = [[0, 1]];
const TRIANGLE_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];
// Same ordering as the mid-edge nodes of a Tet10 element
const TETRAHEDRON_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [0, 2], [0, 3], [2, 3], [1, 3]];

impl ElementShape {
    /// The dimension of the reference domain.
    pub fn reference_dim(&self) -> usize {
        match self {
            Self::Segment => 1,
            Self::Triangle => 2,
            Self::Tetrahedron => 3,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.reference_dim() + 1
    }

    /// Local edges as pairs of local vertex indices.
    pub fn edges(&self) -> &'static [[usize; 2]] {
        match self {
            Self::Segment => &SEGMENT_EDGES,
            Self::Triangle => &TRIANGLE_EDGES,
            Self::Tetrahedron => &TETRAHEDRON_EDGES,
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges().len()
    }

    /// The number of two-dimensional faces of the shape.
    pub fn face_count(&self) -> usize {
        match self {
            Self::Segment => 0,
            Self::Triangle => 1,
            Self::Tetrahedron => 4,
        }
    }

    /// The shape of the facets (co-dimension one sub-entities).
    pub fn facet_shape(&self) -> Option<ElementShape> {
        match self {
            Self::Segment => None,
            Self::Triangle => Some(Self::Segment),
            Self::Tetrahedron => Some(Self::Triangle),
        }
    }

    /// The shape of dimension `dim + 1` whose facets are of this shape.
    pub fn parent_shape(&self) -> Option<ElementShape> {
        match self {
            Self::Segment => Some(Self::Triangle),
            Self::Triangle => Some(Self::Tetrahedron),
            Self::Tetrahedron => None,
        }
    }

    /// The coordinates of the reference vertices, embedded in 3D.
    ///
    /// The reference simplex has its first vertex in the origin and the remaining vertices on
    /// the unit axes.
    pub fn reference_vertices(&self) -> &'static [[f64; 3]] {
        const VERTICES: [[f64; 3]; 4] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        &VERTICES[..self.vertex_count()]
    }
}

/// Element shape together with the polynomial orders of geometry and interpolation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeometryType {
    pub shape: ElementShape,
    /// Polynomial order of the geometry map. Order 2 elements may be curved.
    pub geometric_order: u8,
    /// Polynomial order of the field interpolation.
    pub interpolation_order: u8,
}

impl GeometryType {
    pub const SEGMENT2: Self = Self::new(ElementShape::Segment, 1);
    pub const SEGMENT3: Self = Self::new(ElementShape::Segment, 2);
    pub const TRI3: Self = Self::new(ElementShape::Triangle, 1);
    pub const TRI6: Self = Self::new(ElementShape::Triangle, 2);
    pub const TET4: Self = Self::new(ElementShape::Tetrahedron, 1);
    pub const TET10: Self = Self::new(ElementShape::Tetrahedron, 2);

    /// A geometry with lowest-order interpolation.
    pub const fn new(shape: ElementShape, geometric_order: u8) -> Self {
        Self {
            shape,
            geometric_order,
            interpolation_order: 1,
        }
    }

    pub const fn with_interpolation_order(self, interpolation_order: u8) -> Self {
        Self {
            interpolation_order,
            ..self
        }
    }

    /// Number of geometry nodes: vertices, plus one node per edge for quadratic geometry.
    ///
    /// Quadratic node ordering follows the Tri6/Tet10 convention: vertices first, then one
    /// node per edge in the order of [`ElementShape::edges`].
    pub fn node_count(&self) -> usize {
        match self.geometric_order {
            1 => self.shape.vertex_count(),
            _ => self.shape.vertex_count() + self.shape.edge_count(),
        }
    }

    /// Whether elements of this type are treated as curved by the kernels.
    pub fn is_curved(&self) -> bool {
        self.geometric_order > 1
    }

    /// The geometry of the facets of this element type.
    pub fn facet_geometry(&self) -> Option<GeometryType> {
        self.shape.facet_shape().map(|shape| GeometryType {
            shape,
            ..*self
        })
    }

    /// The geometry of the elements whose facets have this geometry.
    pub fn parent_geometry(&self) -> Option<GeometryType> {
        self.shape.parent_shape().map(|shape| GeometryType {
            shape,
            ..*self
        })
    }
}

impl Display for GeometryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self.shape {
            ElementShape::Segment => "Segment",
            ElementShape::Triangle => "Tri",
            ElementShape::Tetrahedron => "Tet",
        };
        write!(f, "{}{}", name, self.node_count())?;
        if self.interpolation_order != 1 {
            write!(f, " (interpolation order {})", self.interpolation_order)?;
        }
        Ok(())
    }
}
