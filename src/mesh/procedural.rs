//! Simple structured meshes.
use crate::mesh::{MeshElement, MeshIdentity, TopologyBuilder};
use crate::classification::{ElementShape, GeometryType};
use nalgebra::Point3;

#[derive(Debug, Clone)]
pub struct ProceduralMesh {
    pub coordinates: Vec<Point3<f64>>,
    pub elements: Vec<MeshElement>,
    pub topology: TopologyBuilder,
}

impl ProceduralMesh {
    pub fn identity(&self) -> MeshIdentity {
        MeshIdentity {
            nodes: self.coordinates.len(),
            edges: self.topology.edge_count(),
            elements: self.elements.len(),
        }
    }
}

/// Triangulated rectangle `[0, width] x [0, height]` with `cells_x * cells_y` cells, each
/// split into two triangles.
pub fn rectangle_tri_mesh(width: f64, height: f64, cells_x: usize, cells_y: usize) -> ProceduralMesh {
    let node = |i: usize, j: usize| j * (cells_x + 1) + i;
    let mut coordinates = Vec::with_capacity((cells_x + 1) * (cells_y + 1));
    for j in 0..=cells_y {
        for i in 0..=cells_x {
            let x = width * i as f64 / cells_x as f64;
            let y = height * j as f64 / cells_y as f64;
            coordinates.push(Point3::new(x, y, 0.0));
        }
    }

    let mut topology = TopologyBuilder::new();
    let mut elements = Vec::with_capacity(2 * cells_x * cells_y);
    for j in 0..cells_y {
        for i in 0..cells_x {
            let (a, b, c, d) = (node(i, j), node(i + 1, j), node(i + 1, j + 1), node(i, j + 1));
            for triangle in [[a, b, c], [a, c, d]] {
                let coords = triangle.iter().map(|&n| coordinates[n]).collect();
                let id = elements.len();
                elements.push(topology.element(id, GeometryType::TRI3, triangle.to_vec(), coords));
            }
        }
    }

    ProceduralMesh {
        coordinates,
        elements,
        topology,
    }
}

/// Box `[0, size.x] x [0, size.y] x [0, size.z]` where each cell is split into six
/// tetrahedra sharing the main diagonal of the cell.
pub fn box_tet_mesh(size: [f64; 3], cells: [usize; 3]) -> ProceduralMesh {
    let [nx, ny, nz] = cells;
    let node = |i: usize, j: usize, k: usize| (k * (ny + 1) + j) * (nx + 1) + i;
    let mut coordinates = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                coordinates.push(Point3::new(
                    size[0] * i as f64 / nx as f64,
                    size[1] * j as f64 / ny as f64,
                    size[2] * k as f64 / nz as f64,
                ));
            }
        }
    }

    // Each tetrahedron follows a monotone path from the cell's lowest to its highest corner
    const AXIS_ORDERS: [[usize; 3]; 6] = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let mut topology = TopologyBuilder::new();
    let mut elements = Vec::with_capacity(6 * nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                for order in AXIS_ORDERS {
                    let mut corner = [i, j, k];
                    let mut tet = vec![node(i, j, k)];
                    for axis in order {
                        corner[axis] += 1;
                        tet.push(node(corner[0], corner[1], corner[2]));
                    }
                    let coords = tet.iter().map(|&n| coordinates[n]).collect();
                    let id = elements.len();
                    elements.push(topology.element(id, GeometryType::TET4, tet, coords));
                }
            }
        }
    }

    ProceduralMesh {
        coordinates,
        elements,
        topology,
    }
}

/// Converts linear elements to quadratic geometry with mid-edge nodes at edge midpoints.
///
/// Mid-edge nodes are numbered `node_count + global edge id`.
pub fn elevate_to_quadratic(elements: &[MeshElement], node_count: usize) -> Vec<MeshElement> {
    elements
        .iter()
        .map(|element| {
            let shape: ElementShape = element.geometry.shape;
            let mut quadratic = element.clone();
            quadratic.geometry = GeometryType {
                geometric_order: 2,
                ..element.geometry
            };
            quadratic.nodes.truncate(shape.vertex_count());
            quadratic.coordinates.truncate(shape.vertex_count());
            for (local, &[a, b]) in shape.edges().iter().enumerate() {
                quadratic.nodes.push(node_count + element.edges[local]);
                let midpoint = nalgebra::center(&element.coordinates[a], &element.coordinates[b]);
                quadratic.coordinates.push(midpoint);
            }
            quadratic
        })
        .collect()
}
