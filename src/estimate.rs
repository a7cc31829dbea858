//! Error estimator for the tangential field continuity across thin shells.
//!
//! At every corner of a thin-shell facet, the tangential magnetic field is evaluated from the
//! master side and from the slave side: `H = Σ h_i W_i` on edge-based sides and `H = -∇φ` on
//! node-based sides. Corner values are averaged per global node over all facets and layers
//! sharing it, across ranks, and combined into a relative error per facet
//!
//! ```text
//! e = Σ_k |H_m,k - H_s,k| / (½ Σ_k (|H_m,k| + |H_s,k|)).
//! ```
//!
//! The estimator only reads the solution. Only the first component of multi-component fields
//! is considered.
use crate::assembly::AssemblyEngine;
use crate::basis::{BasisProvider, OperatorValues};
use crate::classification::{BasisKind, PhysicalDomain};
use crate::comm::{Communicator, CommunicatorExt, COORDINATOR};
use crate::kernel::outward_normal;
use crate::mesh::{ElementRef, FaceMapping, MeshElement};
use eyre::eyre;
use log::debug;
use nalgebra::{DVector, Point3, Vector3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Averaged tangential fields at a node.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NodalTrace {
    pub master: Vector3<f64>,
    pub slave: Vector3<f64>,
}

/// Summed corner values of one node, as exchanged between ranks.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodalContribution {
    pub node: usize,
    pub master: [f64; 3],
    pub slave: [f64; 3],
    pub count: usize,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FacetError {
    pub region: usize,
    pub element: usize,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterfaceErrorEstimate {
    pub facets: Vec<FacetError>,
    pub traces: FxHashMap<usize, NodalTrace>,
}

impl InterfaceErrorEstimate {
    pub fn max_error(&self) -> f64 {
        self.facets.iter().map(|facet| facet.error).fold(0.0, f64::max)
    }
}

/// Relative error of paired master and slave values. Zero if both sides vanish.
pub fn relative_trace_error(pairs: impl IntoIterator<Item = (Vector3<f64>, Vector3<f64>)>) -> f64 {
    let (difference, magnitude) = pairs
        .into_iter()
        .fold((0.0, 0.0), |(difference, magnitude), (master, slave)| {
            (difference + (master - slave).norm(), magnitude + master.norm() + slave.norm())
        });
    if magnitude > 0.0 {
        difference / (0.5 * magnitude)
    } else {
        0.0
    }
}

/// Sums contributions from all ranks and averages them per node.
pub fn combine_contributions(
    contributions: impl IntoIterator<Item = NodalContribution>,
) -> FxHashMap<usize, NodalTrace> {
    let mut sums: FxHashMap<usize, NodalContribution> = FxHashMap::default();
    for contribution in contributions {
        let sum = sums.entry(contribution.node).or_insert(NodalContribution {
            node: contribution.node,
            master: [0.0; 3],
            slave: [0.0; 3],
            count: 0,
        });
        for k in 0..3 {
            sum.master[k] += contribution.master[k];
            sum.slave[k] += contribution.slave[k];
        }
        sum.count += contribution.count;
    }
    sums.into_iter()
        .filter(|(_, sum)| sum.count > 0)
        .map(|(node, sum)| {
            let n = sum.count as f64;
            let trace = NodalTrace {
                master: Vector3::from(sum.master) / n,
                slave: Vector3::from(sum.slave) / n,
            };
            (node, trace)
        })
        .collect()
}

struct Side<'a> {
    element: &'a MeshElement,
    kind: BasisKind,
    mapping: FaceMapping,
}

fn resolve_side<'a, B: BasisProvider>(
    engine: &'a AssemblyEngine<B>,
    facet: &MeshElement,
    reference: ElementRef,
) -> eyre::Result<Side<'a>> {
    let element = engine
        .element(reference)
        .ok_or_else(|| eyre!("facet {} references missing element {:?}", facet.id, reference))?;
    let classification = engine
        .region(reference.region)
        .map(|region| region.classification)
        .ok_or_else(|| eyre!("facet {} references missing region {}", facet.id, reference.region))?;
    let kind = classification
        .bulk_basis()
        .ok_or_else(|| eyre!("facet {} is attached to a {:?} region, which is not bulk", facet.id, classification))?;
    let mapping = FaceMapping::between(facet, element)?;
    Ok(Side { element, kind, mapping })
}

/// Evaluates the field of one side at the given facet corner.
fn side_field<B: BasisProvider>(
    engine: &AssemblyEngine<B>,
    side: &Side,
    corner: &Point3<f64>,
    solution: &DVector<f64>,
    values: &mut OperatorValues,
) -> eyre::Result<Vector3<f64>> {
    let xi = side.mapping.neighbor_reference_point(side.element.geometry.shape, corner);
    engine.basis().operator_values_at(side.element, &xi, values)?;
    let numbering = engine.numbering();
    let coefficient = |dof: usize| {
        solution
            .get(dof)
            .copied()
            .ok_or_else(|| eyre!("DOF {} out of bounds for a solution of length {}", dof, solution.len()))
    };
    match side.kind {
        BasisKind::Edge => {
            let mut field = Vector3::zeros();
            for (w, &edge) in values.edge_shape.iter().zip(&side.element.edges) {
                field += w * coefficient(numbering.edge_dof(edge, 0))?;
            }
            Ok(field)
        }
        BasisKind::Node => {
            let mut gradient = Vector3::zeros();
            for (g, &node) in values.gradient.iter().zip(side.element.vertices()) {
                gradient += g * coefficient(numbering.node_dof(node, 0))?;
            }
            Ok(-gradient)
        }
    }
}

fn tangential(field: Vector3<f64>, normal: &Vector3<f64>) -> Vector3<f64> {
    field - normal * normal.dot(&field)
}

/// Estimates the interface error of all thin-shell regions. Collective over `comm`.
pub fn estimate_interface_error<B, C>(
    engine: &AssemblyEngine<B>,
    comm: &C,
    solution: &DVector<f64>,
) -> eyre::Result<InterfaceErrorEstimate>
where
    B: BasisProvider,
    C: Communicator,
{
    let mut local: FxHashMap<usize, NodalContribution> = FxHashMap::default();
    let mut shell_facets = Vec::new();

    for (region_index, region) in engine.regions().iter().enumerate() {
        if region.classification != PhysicalDomain::ThinShell || region.is_empty() {
            continue;
        }
        let parent = region
            .geometry
            .parent_geometry()
            .ok_or_else(|| eyre!("thin-shell region '{}' does not consist of facets", region.name))?;
        let mut facet_values = OperatorValues::for_geometry(region.geometry);
        let mut master_values = OperatorValues::for_geometry(parent);
        let mut slave_values = OperatorValues::for_geometry(parent);

        for (element_index, facet) in region.elements.iter().enumerate() {
            let coupling = match facet.facet {
                Some(coupling) => coupling,
                None => continue,
            };
            let slave_ref = match coupling.slave {
                Some(slave) => slave,
                None => continue,
            };
            let master = resolve_side(engine, facet, coupling.master)?;
            let slave = resolve_side(engine, facet, slave_ref)?;
            let inner = master.element.coordinates[master.mapping.opposite_vertex];

            for (k, &node) in facet.vertices().iter().enumerate() {
                let corner = Point3::from(facet.geometry.shape.reference_vertices()[k]);
                engine
                    .basis()
                    .operator_values_at(facet, &corner, &mut facet_values)?;
                let normal = outward_normal(&facet_values, &inner);
                let h_master = tangential(side_field(engine, &master, &corner, solution, &mut master_values)?, &normal);
                let h_slave = tangential(side_field(engine, &slave, &corner, solution, &mut slave_values)?, &normal);

                let sum = local.entry(node).or_insert(NodalContribution {
                    node,
                    master: [0.0; 3],
                    slave: [0.0; 3],
                    count: 0,
                });
                for c in 0..3 {
                    sum.master[c] += h_master[c];
                    sum.slave[c] += h_slave[c];
                }
                sum.count += 1;
            }
            shell_facets.push((region_index, element_index));
        }
    }

    let contributions: Vec<NodalContribution> = local.into_values().collect();
    let gathered = comm.gather(COORDINATOR, contributions)?;
    let subsets = gathered.map(|per_rank| {
        let averaged = combine_contributions(per_rank.iter().flatten().copied());
        per_rank
            .iter()
            .map(|contributions| {
                contributions
                    .iter()
                    .filter_map(|c| averaged.get(&c.node).map(|t| (c.node, t.master.into(), t.slave.into())))
                    .collect::<Vec<(usize, [f64; 3], [f64; 3])>>()
            })
            .collect::<Vec<_>>()
    });
    let subset = comm.scatter(COORDINATOR, subsets)?;
    let traces: FxHashMap<usize, NodalTrace> = subset
        .into_iter()
        .map(|(node, master, slave)| {
            let trace = NodalTrace {
                master: Vector3::from(master),
                slave: Vector3::from(slave),
            };
            (node, trace)
        })
        .collect();

    let mut facets = Vec::with_capacity(shell_facets.len());
    for (region, element) in shell_facets {
        let facet = &engine.regions()[region].elements[element];
        let pairs = facet
            .vertices()
            .iter()
            .map(|node| {
                traces
                    .get(node)
                    .map(|trace| (trace.master, trace.slave))
                    .ok_or_else(|| eyre!("no averaged trace received for node {}", node))
            })
            .collect::<eyre::Result<Vec<_>>>()?;
        facets.push(FacetError {
            region,
            element,
            error: relative_trace_error(pairs),
        });
    }

    debug!(
        "Rank {} estimated interface errors on {} shell facets ({} nodes)",
        comm.rank(),
        facets.len(),
        traces.len()
    );
    Ok(InterfaceErrorEstimate { facets, traces })
}
