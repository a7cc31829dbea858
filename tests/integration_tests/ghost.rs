use super::run_on_ranks;
use fenris_em::classification::PhysicalDomain;
use fenris_em::comm::Communicator;
use fenris_em::error::ConfigurationError;
use fenris_em::ghost::{GhostElementMap, GhostEntry, LayerEnumeration, LayerRecord, SidesetFacet};
use fenris_em::mesh::procedural::box_tet_mesh;
use fenris_em::mesh::{face_opposite, ElementRef, FacetCoupling, MeshElement};
use fenris_em::region::Region;

const LAYERS: usize = 3;
const RANKS: usize = 3;

/// The unit cube with a three-layer shell on its bottom face.
///
/// Region 0 holds the tetrahedra and region `1 + l` the triangles of layer `l`. Sideset facets
/// are numbered `2 * i + 1` and owned round-robin by the ranks.
struct BottomShell {
    facets: Vec<SidesetFacet>,
    regions: Vec<Region>,
    layer_regions: Vec<usize>,
}

impl BottomShell {
    fn new() -> Self {
        let mut mesh = box_tet_mesh([1.0, 1.0, 1.0], [2, 2, 1]);
        let bulk = mesh.elements.clone();
        let bottom: Vec<(usize, usize)> = bulk
            .iter()
            .enumerate()
            .flat_map(|(index, element)| (0..4).map(move |opposite| (index, element, opposite)))
            .filter(|&(_, element, opposite)| {
                face_opposite(element.geometry.shape, opposite)
                    .map_or(false, |face| face.iter().all(|&v| element.coordinates[v].z.abs() < 1e-12))
            })
            .map(|(index, _, opposite)| (index, opposite))
            .collect();
        let facets: Vec<SidesetFacet> = (0..bottom.len())
            .map(|i| SidesetFacet {
                facet: 2 * i + 1,
                owner: i % RANKS,
            })
            .collect();

        let bulk_region = Region::new("bulk", PhysicalDomain::Conductor, bulk[0].geometry).with_elements(bulk.clone());
        let mut regions = vec![bulk_region];
        for layer in 0..LAYERS {
            let mut elements: Vec<MeshElement> = Vec::with_capacity(bottom.len());
            for (i, (&(index, opposite), sideset)) in bottom.iter().zip(&facets).enumerate() {
                let id = bulk.len() + layer * bottom.len() + i;
                let element = mesh.topology.facet_of(id, &bulk[index], opposite).unwrap();
                elements.push(element.with_facet(FacetCoupling {
                    facet_id: sideset.facet,
                    layer,
                    master: ElementRef::new(0, index),
                    slave: None,
                }));
            }
            regions.push(
                Region::new(format!("shell layer {}", layer), PhysicalDomain::ThinShell, elements[0].geometry)
                    .with_elements(elements),
            );
        }

        Self {
            facets,
            regions,
            layer_regions: (1..=LAYERS).collect(),
        }
    }

    fn enumeration(&self) -> LayerEnumeration<'_> {
        LayerEnumeration {
            facets: &self.facets,
            regions: &self.regions,
            layer_regions: &self.layer_regions,
        }
    }

    /// Each rank asks for the facets owned by its successor.
    fn requested_by(&self, rank: usize) -> Vec<usize> {
        self.facets
            .iter()
            .filter(|sideset| sideset.owner == (rank + 1) % RANKS)
            .map(|sideset| sideset.facet)
            .collect()
    }
}

#[test]
fn ranks_receive_owned_and_requested_entries() {
    let shell = BottomShell::new();
    let records: Vec<LayerRecord> = shell.enumeration().records().unwrap();
    assert_eq!(records.len(), shell.facets.len() * LAYERS);
    assert!(shell.facets.len() >= RANKS);

    let maps = run_on_ranks(RANKS, |comm| {
        let enumeration = comm.is_coordinator().then(|| shell.enumeration());
        GhostElementMap::construct(&comm, enumeration, &shell.requested_by(comm.rank())).unwrap()
    });

    for (rank, map) in maps.iter().enumerate() {
        assert_eq!(map.layer_count(), LAYERS);
        let requested = shell.requested_by(rank);
        let mut expected = 0;
        for record in &records {
            let visible = record.owner == rank || requested.contains(&record.facet);
            let resolved = map.resolve(record.facet, record.layer);
            if visible {
                expected += 1;
                assert_eq!(
                    resolved,
                    Some(&GhostEntry {
                        element: record.element,
                        region: record.region,
                        owner: record.owner,
                    })
                );
            } else {
                assert_eq!(resolved, None);
            }
        }
        assert_eq!(map.len(), expected);
    }
}

#[test]
fn enumeration_errors_are_reported_on_every_rank() {
    let mut shell = BottomShell::new();
    shell.regions[2].elements.swap(1, 2);
    let results = run_on_ranks(RANKS, |comm| {
        let enumeration = comm.is_coordinator().then(|| shell.enumeration());
        GhostElementMap::construct(&comm, enumeration, &shell.requested_by(comm.rank()))
            .map_err(|error| error.to_string())
    });

    let messages: Vec<String> = results.into_iter().map(Result::unwrap_err).collect();
    assert!(messages.iter().all(|message| message == &messages[0]));

    // Every rank sees the same configuration error
    let rebuilt = run_on_ranks(2, |comm| {
        let enumeration = comm.is_coordinator().then(|| shell.enumeration());
        let error = GhostElementMap::construct(&comm, enumeration, &[]).unwrap_err();
        matches!(error.downcast_ref::<ConfigurationError>(), Some(ConfigurationError::GhostMap(_)))
    });
    assert_eq!(rebuilt, vec![true, true]);
}
