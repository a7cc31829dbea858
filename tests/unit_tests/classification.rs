use fenris_em::classification::{BasisKind, ElementShape, GeometryType, PhysicalDomain};

#[test]
fn every_classification_is_either_bulk_or_facet() {
    for domain in PhysicalDomain::ALL {
        assert_ne!(domain.is_bulk(), domain.is_facet(), "{:?}", domain);
        if domain.is_interface() {
            assert!(domain.is_facet());
            assert!(domain.interface_sides().is_some());
        } else {
            assert!(domain.interface_sides().is_none());
        }
        assert_eq!(domain.is_bulk(), domain.bulk_basis().is_some());
    }
}

#[test]
fn field_discretization_per_classification() {
    assert_eq!(PhysicalDomain::Conductor.bulk_basis(), Some(BasisKind::Edge));
    assert_eq!(PhysicalDomain::Ferromagnet.bulk_basis(), Some(BasisKind::Edge));
    assert_eq!(PhysicalDomain::Air.bulk_basis(), Some(BasisKind::Node));
    assert_eq!(PhysicalDomain::Coil.bulk_basis(), Some(BasisKind::Node));
    assert_eq!(
        PhysicalDomain::ConductorAir.interface_sides(),
        Some((BasisKind::Edge, BasisKind::Node))
    );
    assert_eq!(
        PhysicalDomain::ConductorFerromagnet.interface_sides(),
        Some((BasisKind::Edge, BasisKind::Edge))
    );
    assert_eq!(PhysicalDomain::Cut.interface_sides(), Some((BasisKind::Node, BasisKind::Node)));
}

#[test]
fn materials_are_required_where_laws_are_evaluated() {
    let requiring: Vec<_> = PhysicalDomain::ALL
        .iter()
        .copied()
        .filter(PhysicalDomain::requires_material)
        .collect();
    assert_eq!(
        requiring,
        vec![PhysicalDomain::Conductor, PhysicalDomain::Ferromagnet, PhysicalDomain::ThinShell]
    );
}

#[test]
fn shape_topology() {
    assert_eq!(ElementShape::Tetrahedron.edge_count(), 6);
    assert_eq!(ElementShape::Tetrahedron.face_count(), 4);
    assert_eq!(ElementShape::Triangle.edge_count(), 3);
    assert_eq!(ElementShape::Segment.edge_count(), 1);
    assert_eq!(ElementShape::Tetrahedron.facet_shape(), Some(ElementShape::Triangle));
    assert_eq!(ElementShape::Segment.facet_shape(), None);
    assert_eq!(ElementShape::Segment.parent_shape(), Some(ElementShape::Triangle));
    assert_eq!(ElementShape::Tetrahedron.parent_shape(), None);

    // Every vertex pair appears exactly once among the edges
    for shape in [ElementShape::Segment, ElementShape::Triangle, ElementShape::Tetrahedron] {
        let n = shape.vertex_count();
        assert_eq!(shape.edges().len(), n * (n - 1) / 2);
        for a in 0..n {
            for b in (a + 1)..n {
                let count = shape
                    .edges()
                    .iter()
                    .filter(|&&[x, y]| (x, y) == (a, b) || (x, y) == (b, a))
                    .count();
                assert_eq!(count, 1, "{:?} edge ({}, {})", shape, a, b);
            }
        }
    }
}

#[test]
fn geometry_types() {
    assert_eq!(GeometryType::TET4.node_count(), 4);
    assert_eq!(GeometryType::TET10.node_count(), 10);
    assert_eq!(GeometryType::TRI6.node_count(), 6);
    assert_eq!(GeometryType::SEGMENT3.node_count(), 3);
    assert!(GeometryType::TET10.is_curved());
    assert!(!GeometryType::TRI3.is_curved());

    assert_eq!(GeometryType::TET10.facet_geometry(), Some(GeometryType::TRI6));
    assert_eq!(GeometryType::TRI3.facet_geometry(), Some(GeometryType::SEGMENT2));
    assert_eq!(GeometryType::SEGMENT2.parent_geometry(), Some(GeometryType::TRI3));
    assert_eq!(GeometryType::TRI6.parent_geometry(), Some(GeometryType::TET10));

    assert_eq!(GeometryType::TET10.to_string(), "Tet10");
    assert_eq!(GeometryType::SEGMENT2.to_string(), "Segment2");
    assert_eq!(
        GeometryType::TET4.with_interpolation_order(2).to_string(),
        "Tet4 (interpolation order 2)"
    );
}
