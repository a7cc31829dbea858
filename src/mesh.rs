//! Mesh elements as seen by the assembly engine, together with global topology numbering.
//!
//! The engine does not own a mesh data structure. Each region holds the [`MeshElement`]s it
//! consists of, carrying global node, edge and face ids so that DOFs can be numbered
//! consistently across regions and ranks.
use crate::classification::{ElementShape, GeometryType};
use crate::error::ConfigurationError;
use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Index of an element within a region of the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    pub region: usize,
    pub element: usize,
}

impl ElementRef {
    pub fn new(region: usize, element: usize) -> Self {
        Self { region, element }
    }
}

/// The bulk elements a facet element is attached to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacetCoupling {
    /// Global id of the facet in the mesh-wide facet enumeration.
    pub facet_id: usize,
    /// Layer index for layered thin shells, zero otherwise.
    pub layer: usize,
    pub master: ElementRef,
    pub slave: Option<ElementRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshElement {
    /// Global element id.
    pub id: usize,
    pub geometry: GeometryType,
    /// Global node ids: vertices first, then one node per edge for quadratic geometry.
    pub nodes: Vec<usize>,
    /// Node coordinates in the same order as `nodes`. Planar meshes have zero z-coordinates.
    pub coordinates: Vec<Point3<f64>>,
    /// Global edge ids, in the local edge order of the shape.
    pub edges: Vec<usize>,
    /// Global face ids.
    pub faces: Vec<usize>,
    pub facet: Option<FacetCoupling>,
}

impl MeshElement {
    pub fn vertices(&self) -> &[usize] {
        &self.nodes[..self.geometry.shape.vertex_count()]
    }

    pub fn vertex_coordinates(&self) -> &[Point3<f64>] {
        &self.coordinates[..self.geometry.shape.vertex_count()]
    }

    /// Orientation of a local edge relative to its global orientation.
    ///
    /// Global edges point from the lower to the higher global vertex id.
    pub fn edge_sign(&self, local_edge: usize) -> f64 {
        let [a, b] = self.geometry.shape.edges()[local_edge];
        if self.nodes[a] < self.nodes[b] {
            1.0
        } else {
            -1.0
        }
    }

    pub fn centroid(&self) -> Point3<f64> {
        let vertices = self.vertex_coordinates();
        let sum: Vector3<f64> = vertices.iter().map(|x| x.coords).sum();
        Point3::from(sum / vertices.len() as f64)
    }

    pub fn with_facet(mut self, facet: FacetCoupling) -> Self {
        self.facet = Some(facet);
        self
    }

    /// Checks that the node, coordinate and edge arrays agree with the geometry.
    pub fn check_consistency(&self, region: &str) -> Result<(), ConfigurationError> {
        let malformed = |expected: usize, actual: usize| ConfigurationError::MalformedElement {
            region: region.to_string(),
            element: self.id,
            geometry: self.geometry,
            expected,
            actual,
        };
        let expected = self.geometry.node_count();
        if self.nodes.len() != expected {
            return Err(malformed(expected, self.nodes.len()));
        }
        if self.coordinates.len() != expected {
            return Err(malformed(expected, self.coordinates.len()));
        }
        let edge_count = self.geometry.shape.edge_count();
        if self.edges.len() != edge_count {
            return Err(malformed(edge_count, self.edges.len()));
        }
        Ok(())
    }
}

/// Counts identifying a mesh, used to match checkpoints against the running model.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeshIdentity {
    pub nodes: usize,
    pub edges: usize,
    pub elements: usize,
}

/// Assigns global ids to edges and faces the first time they are encountered.
#[derive(Debug, Clone, Default)]
pub struct TopologyBuilder {
    edges: FxHashMap<[usize; 2], usize>,
    faces: FxHashMap<[usize; 3], usize>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge_id(&mut self, a: usize, b: usize) -> usize {
        let key = if a < b { [a, b] } else { [b, a] };
        let next = self.edges.len();
        *self.edges.entry(key).or_insert(next)
    }

    pub fn face_id(&mut self, a: usize, b: usize, c: usize) -> usize {
        let mut key = [a, b, c];
        key.sort_unstable();
        let next = self.faces.len();
        *self.faces.entry(key).or_insert(next)
    }

    /// Looks up an existing edge without registering it.
    pub fn find_edge(&self, a: usize, b: usize) -> Option<usize> {
        let key = if a < b { [a, b] } else { [b, a] };
        self.edges.get(&key).copied()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Creates an element, registering its edges and faces.
    pub fn element(
        &mut self,
        id: usize,
        geometry: GeometryType,
        nodes: Vec<usize>,
        coordinates: Vec<Point3<f64>>,
    ) -> MeshElement {
        let shape = geometry.shape;
        let edges = shape
            .edges()
            .iter()
            .map(|&[a, b]| self.edge_id(nodes[a], nodes[b]))
            .collect();
        let faces = match shape {
            ElementShape::Segment => Vec::new(),
            ElementShape::Triangle => vec![self.face_id(nodes[0], nodes[1], nodes[2])],
            ElementShape::Tetrahedron => (0..4)
                .map(|opposite| {
                    let [a, b, c] = TETRAHEDRON_FACES[opposite];
                    self.face_id(nodes[a], nodes[b], nodes[c])
                })
                .collect(),
        };
        MeshElement {
            id,
            geometry,
            nodes,
            coordinates,
            edges,
            faces,
            facet: None,
        }
    }

    /// Creates a facet element from the vertices of the given face of a bulk element.
    ///
    /// For quadratic bulk elements the facet inherits the corresponding mid-edge nodes.
    pub fn facet_of(&mut self, id: usize, bulk: &MeshElement, opposite_vertex: usize) -> eyre::Result<MeshElement> {
        let shape = bulk.geometry.shape;
        let local = face_opposite(shape, opposite_vertex).ok_or_else(|| {
            eyre::eyre!("{:?} elements have no face opposite local vertex {}", shape, opposite_vertex)
        })?;
        let geometry = bulk
            .geometry
            .facet_geometry()
            .ok_or_else(|| eyre::eyre!("{:?} elements have no facets", shape))?;

        let mut nodes: Vec<usize> = local.iter().map(|&v| bulk.nodes[v]).collect();
        let mut coordinates: Vec<Point3<f64>> = local.iter().map(|&v| bulk.coordinates[v]).collect();
        if geometry.is_curved() {
            for &[a, b] in geometry.shape.edges() {
                let (ga, gb) = (local[a], local[b]);
                let bulk_edge = shape
                    .edges()
                    .iter()
                    .position(|&[x, y]| (x, y) == (ga, gb) || (x, y) == (gb, ga))
                    .ok_or_else(|| eyre::eyre!("facet edge ({}, {}) is not an edge of the bulk element", ga, gb))?;
                let mid = shape.vertex_count() + bulk_edge;
                nodes.push(bulk.nodes[mid]);
                coordinates.push(bulk.coordinates[mid]);
            }
        }
        Ok(self.element(id, geometry, nodes, coordinates))
    }
}

const TETRAHEDRON_FACES: [[usize; 3]; 4] = [[1, 2, 3], [0, 2, 3], [0, 1, 3], [0, 1, 2]];
const TRIANGLE_FACES: [[usize; 2]; 3] = [[1, 2], [0, 2], [0, 1]];

/// Local vertices of the face of `shape` opposite the given local vertex.
pub fn face_opposite(shape: ElementShape, opposite_vertex: usize) -> Option<&'static [usize]> {
    match (shape, opposite_vertex) {
        (ElementShape::Tetrahedron, 0) => Some(&TETRAHEDRON_FACES[0]),
        (ElementShape::Tetrahedron, 1) => Some(&TETRAHEDRON_FACES[1]),
        (ElementShape::Tetrahedron, 2) => Some(&TETRAHEDRON_FACES[2]),
        (ElementShape::Tetrahedron, 3) => Some(&TETRAHEDRON_FACES[3]),
        (ElementShape::Triangle, 0) => Some(&TRIANGLE_FACES[0]),
        (ElementShape::Triangle, 1) => Some(&TRIANGLE_FACES[1]),
        (ElementShape::Triangle, 2) => Some(&TRIANGLE_FACES[2]),
        _ => None,
    }
}

/// How the vertices of a facet element map onto a face of an adjacent bulk element.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FaceMapping {
    /// The local vertex of the bulk element that does not lie on the facet.
    pub opposite_vertex: usize,
    /// For each facet vertex, the matching local vertex of the bulk element.
    local_vertices: [usize; 3],
    facet_vertex_count: usize,
}

impl FaceMapping {
    /// Determines which face of `neighbor` the facet element lies on.
    pub fn between(facet: &MeshElement, neighbor: &MeshElement) -> Result<Self, ConfigurationError> {
        let orientation_error = |reason: String| ConfigurationError::FacetOrientation {
            element: facet.id,
            neighbor: neighbor.id,
            reason,
        };
        let neighbor_shape = neighbor.geometry.shape;
        if facet.geometry.shape.parent_shape() != Some(neighbor_shape) {
            return Err(orientation_error(format!(
                "a {:?} cannot be a facet of a {:?}",
                facet.geometry.shape, neighbor_shape
            )));
        }

        let facet_vertices = facet.vertices();
        let mut local_vertices = [usize::MAX; 3];
        for (slot, vertex) in local_vertices.iter_mut().zip(facet_vertices) {
            *slot = neighbor
                .vertices()
                .iter()
                .position(|v| v == vertex)
                .ok_or_else(|| orientation_error(format!("facet vertex {} is not a vertex of the neighbor", vertex)))?;
        }
        let matched = &local_vertices[..facet_vertices.len()];
        let opposite_vertex = (0..neighbor_shape.vertex_count())
            .find(|v| !matched.contains(v))
            .ok_or_else(|| orientation_error("facet covers every vertex of the neighbor".to_string()))?;

        let face = face_opposite(neighbor_shape, opposite_vertex).ok_or_else(|| {
            orientation_error(format!("no face opposite local vertex {}", opposite_vertex))
        })?;
        if !face.iter().all(|v| matched.contains(v)) {
            return Err(orientation_error(format!(
                "facet vertices {:?} do not form the face opposite local vertex {}",
                matched, opposite_vertex
            )));
        }

        Ok(Self {
            opposite_vertex,
            local_vertices,
            facet_vertex_count: facet_vertices.len(),
        })
    }

    /// Local vertex of the neighbor matching the given facet vertex.
    pub fn local_vertex(&self, facet_vertex: usize) -> usize {
        self.local_vertices[facet_vertex]
    }

    /// Maps reference coordinates of the facet to reference coordinates of the neighbor.
    pub fn neighbor_reference_point(&self, neighbor_shape: ElementShape, facet_xi: &Point3<f64>) -> Point3<f64> {
        let reference = neighbor_shape.reference_vertices();
        let mut barycentric = [0.0; 3];
        barycentric[0] = 1.0 - (1..self.facet_vertex_count).map(|k| facet_xi[k - 1]).sum::<f64>();
        for k in 1..self.facet_vertex_count {
            barycentric[k] = facet_xi[k - 1];
        }
        let mut xi = Vector3::zeros();
        for k in 0..self.facet_vertex_count {
            xi += Vector3::from(reference[self.local_vertices[k]]) * barycentric[k];
        }
        Point3::from(xi)
    }
}

pub mod procedural;
