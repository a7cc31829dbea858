use fenris_em::classification::PhysicalDomain;
use fenris_em::comm::SerialCommunicator;
use fenris_em::error::ConfigurationError;
use fenris_em::ghost::{GhostElementMap, GhostEntry, GhostKey, LayerEnumeration, LayerRecord, SidesetFacet};
use fenris_em::mesh::procedural::rectangle_tri_mesh;
use fenris_em::mesh::{face_opposite, ElementRef, FacetCoupling, MeshElement};
use fenris_em::region::Region;
use proptest::prelude::*;

/// Layer elements of `facets` facets with `layers` layers each, distributed round-robin.
fn layered_records(facets: usize, layers: usize, ranks: usize) -> Vec<LayerRecord> {
    (0..facets)
        .flat_map(|facet| {
            (0..layers).map(move |layer| LayerRecord {
                facet: 10 * facet,
                layer,
                element: 1000 + facet * layers + layer,
                region: layer % 2,
                owner: facet % ranks,
            })
        })
        .collect()
}

proptest! {
    #[test]
    fn keys_decompose_into_facet_and_layer(facet in 0..1_000_000usize, layer_count in 1..64usize, layer in 0..64usize) {
        let layer = layer % layer_count;
        let key = GhostKey::new(facet, layer, layer_count).unwrap();
        prop_assert_eq!(key.value(), (facet * layer_count + layer) as u64);
        prop_assert_eq!(key.decompose(layer_count), Some((facet, layer)));
    }
}

#[test]
fn keys_do_not_decompose_without_layers() {
    let key = GhostKey::new(7, 1, 2).unwrap();
    assert_eq!(key.decompose(0), None);
}

/// A planar mesh whose bottom edges carry a shell of `layers` layers.
///
/// Region 0 holds the bulk triangles and region `1 + l` the segments of layer `l`. Sideset
/// facets are numbered `5 * i + 2` and owned round-robin by `ranks` ranks.
struct LayeredShell {
    facets: Vec<SidesetFacet>,
    regions: Vec<Region>,
    layer_regions: Vec<usize>,
}

impl LayeredShell {
    fn new(layers: usize, ranks: usize) -> Self {
        let mut mesh = rectangle_tri_mesh(3.0, 1.0, 3, 1);
        let bulk = mesh.elements.clone();
        let mut bottom = Vec::new();
        for (index, element) in bulk.iter().enumerate() {
            for opposite in 0..3 {
                let face = face_opposite(element.geometry.shape, opposite).unwrap();
                if face.iter().all(|&v| element.coordinates[v].y.abs() < 1e-12) {
                    bottom.push((index, opposite));
                }
            }
        }
        let facets: Vec<SidesetFacet> = (0..bottom.len())
            .map(|i| SidesetFacet {
                facet: 5 * i + 2,
                owner: i % ranks,
            })
            .collect();

        let bulk_region = Region::new("bulk", PhysicalDomain::Conductor, bulk[0].geometry).with_elements(bulk.clone());
        let mut regions = vec![bulk_region];
        for layer in 0..layers {
            let elements: Vec<MeshElement> = bottom
                .iter()
                .zip(&facets)
                .enumerate()
                .map(|(i, (&(index, opposite), sideset))| {
                    let id = bulk.len() + layer * bottom.len() + i;
                    mesh.topology
                        .facet_of(id, &bulk[index], opposite)
                        .unwrap()
                        .with_facet(FacetCoupling {
                            facet_id: sideset.facet,
                            layer,
                            master: ElementRef::new(0, index),
                            slave: None,
                        })
                })
                .collect();
            regions.push(
                Region::new(format!("shell {}", layer), PhysicalDomain::ThinShell, elements[0].geometry)
                    .with_elements(elements),
            );
        }

        Self {
            facets,
            regions,
            layer_regions: (1..=layers).collect(),
        }
    }

    fn enumeration(&self) -> LayerEnumeration<'_> {
        LayerEnumeration {
            facets: &self.facets,
            regions: &self.regions,
            layer_regions: &self.layer_regions,
        }
    }
}

#[test]
fn layer_regions_are_walked_alongside_the_sideset() {
    let shell = LayeredShell::new(3, 2);
    let records = shell.enumeration().records().unwrap();
    let facet_count = shell.facets.len();
    assert_eq!(facet_count, 3);
    assert_eq!(records.len(), facet_count * 3);

    for (i, sideset) in shell.facets.iter().enumerate() {
        for layer in 0..3 {
            let record = records[3 * i + layer];
            let element = &shell.regions[1 + layer].elements[i];
            assert_eq!(
                record,
                LayerRecord {
                    facet: sideset.facet,
                    layer,
                    element: element.id,
                    region: 1 + layer,
                    owner: sideset.owner,
                }
            );
        }
    }

    let map = GhostElementMap::from_records(&records, 3).unwrap();
    assert_eq!(map.len(), facet_count * 3);
    for record in &records {
        let key = GhostKey::new(record.facet, record.layer, 3).unwrap();
        assert_eq!(map.get(key).map(|entry| entry.element), Some(record.element));
    }
}

#[test]
fn layer_regions_out_of_step_with_the_sideset_are_rejected() {
    let expect_error = |shell: &LayeredShell| {
        let error = shell.enumeration().records().unwrap_err();
        assert!(matches!(error, ConfigurationError::GhostMap(_)), "{:?}", error);
    };

    // Elements of one layer in a different order than the sideset
    let mut permuted = LayeredShell::new(2, 1);
    permuted.regions[2].elements.swap(0, 1);
    expect_error(&permuted);

    // Layer regions listed in the wrong order
    let mut swapped = LayeredShell::new(2, 1);
    swapped.layer_regions.reverse();
    expect_error(&swapped);

    let mut truncated = LayeredShell::new(2, 1);
    truncated.regions[1].elements.pop();
    expect_error(&truncated);

    let mut detached = LayeredShell::new(2, 1);
    detached.regions[1].elements[0].facet = None;
    expect_error(&detached);

    let mut missing = LayeredShell::new(2, 1);
    missing.layer_regions.push(7);
    expect_error(&missing);

    let mut empty = LayeredShell::new(1, 1);
    empty.layer_regions.clear();
    expect_error(&empty);
}

#[test]
fn invalid_keys_are_rejected() {
    assert!(matches!(GhostKey::new(3, 2, 2), Err(ConfigurationError::GhostMap(_))));
    assert!(matches!(
        GhostKey::new(usize::MAX, 1, 2),
        Err(ConfigurationError::GhostMap(_))
    ));
}

#[test]
fn map_resolves_every_layer() {
    let records = layered_records(5, 3, 2);
    let map = GhostElementMap::from_records(&records, 3).unwrap();
    assert_eq!(map.len(), 15);
    assert_eq!(map.layer_count(), 3);
    for record in &records {
        let entry = map.resolve(record.facet, record.layer).unwrap();
        assert_eq!(
            entry,
            &GhostEntry {
                element: record.element,
                region: record.region,
                owner: record.owner,
            }
        );
    }
    assert_eq!(map.resolve(1, 0), None);
    assert_eq!(map.resolve(10, 3), None);
    assert_eq!(map.iter().count(), 15);

    assert!(GhostElementMap::from_records(&[], 0).unwrap().is_empty());
}

#[test]
fn enumeration_errors_are_detected() {
    let records = layered_records(3, 2, 1);
    let expect_error = |records: &[LayerRecord], layer_count| {
        let error = GhostElementMap::from_records(records, layer_count).unwrap_err();
        assert!(matches!(error, ConfigurationError::GhostMap(_)), "{:?}", error);
    };

    // Layers out of order
    let mut swapped = records.clone();
    swapped.swap(2, 3);
    expect_error(&swapped, 2);

    // Second layer attached to a different facet
    let mut interleaved = records.clone();
    interleaved[1].facet = 99;
    expect_error(&interleaved, 2);

    // Truncated enumeration
    expect_error(&records[..5], 2);

    // A facet enumerated twice
    let mut repeated = records.clone();
    repeated.extend_from_slice(&records[..2]);
    expect_error(&repeated, 2);

    expect_error(&records, 0);
}

#[test]
fn serial_construction_keeps_every_entry() {
    // A single rank owns everything
    let shell = LayeredShell::new(2, 1);
    let comm = SerialCommunicator;
    let map = GhostElementMap::construct(&comm, Some(shell.enumeration()), &[]).unwrap();
    let records = shell.enumeration().records().unwrap();
    assert_eq!(map, GhostElementMap::from_records(&records, 2).unwrap());

    let mut broken = LayeredShell::new(2, 1);
    broken.regions[1].elements.swap(1, 2);
    let error = GhostElementMap::construct(&comm, Some(broken.enumeration()), &[]).unwrap_err();
    assert!(matches!(
        error.downcast_ref::<ConfigurationError>(),
        Some(ConfigurationError::GhostMap(_))
    ));
}
