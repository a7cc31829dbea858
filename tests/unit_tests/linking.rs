use crate::{copper, engine_with_regions, entity_counts, tet_coordinates, FacetPair};
use fenris_em::assembly::{AssemblyEngine, FieldState};
use fenris_em::basis::SimplexBasis;
use fenris_em::classification::{ElementShape, GeometryType, PhysicalDomain};
use fenris_em::config::{EngineConfig, InterfaceCoupling};
use fenris_em::dofs::{DofMultiplicity, DofNumbering};
use fenris_em::error::ConfigurationError;
use fenris_em::kernel::scratch::ScratchBuffers;
use fenris_em::kernel::{KernelContext, RegionKernel};
use fenris_em::material::{PermeabilityModel, ResistivityModel, StandardMaterial};
use fenris_em::mesh::{ElementRef, MeshElement, TopologyBuilder};
use fenris_em::region::{Region, RegionParameters};
use std::sync::Arc;

fn configuration_error(error: &eyre::Report) -> &ConfigurationError {
    error
        .downcast_ref::<ConfigurationError>()
        .unwrap_or_else(|| panic!("expected a configuration error, got {:?}", error))
}

fn conductor_engine(region: Region) -> AssemblyEngine<SimplexBasis> {
    let mut topology = TopologyBuilder::new();
    topology.element(0, GeometryType::TET4, vec![0, 1, 2, 3], tet_coordinates());
    engine_with_regions(3, EngineConfig::default(), entity_counts(4, &topology), vec![region])
}

fn tet() -> MeshElement {
    TopologyBuilder::new().element(0, GeometryType::TET4, vec![0, 1, 2, 3], tet_coordinates())
}

#[test]
fn kernels_and_buffers_follow_the_classification() {
    let mut pair = FacetPair::new(ElementShape::Tetrahedron, 0);
    if let Some(coupling) = pair.facet.facet.as_mut() {
        coupling.slave = None;
    }
    let cases = [
        (PhysicalDomain::Conductor, "conductor", "bulk-conductor"),
        (PhysicalDomain::Air, "air", "bulk-field"),
        (PhysicalDomain::Coil, "coil", "bulk-field"),
        (PhysicalDomain::Ferromagnet, "ferromagnet (solid)", "bulk-field"),
    ];
    for (classification, kernel, layout) in cases {
        let config = EngineConfig::default();
        let mut engine = pair.engine(classification, PhysicalDomain::Air, PhysicalDomain::Boundary, config);
        engine.link_region(0).unwrap();
        let link = engine.region(0).unwrap().link().unwrap();
        assert_eq!(link.kernel_name(), kernel);
        assert_eq!(link.scratch().layout_name(), layout);
    }

    let facet_cases = [
        (PhysicalDomain::Boundary, "applied field boundary", "boundary"),
        (PhysicalDomain::Symmetry, "natural boundary", "symmetry"),
        (PhysicalDomain::AntiSymmetry, "antisymmetry penalty", "symmetry"),
        (PhysicalDomain::ThinShell, "thin shell", "thin-shell"),
    ];
    for (classification, kernel, layout) in facet_cases {
        let mut engine = pair.engine(PhysicalDomain::Air, PhysicalDomain::Air, classification, EngineConfig::default());
        let result = engine.link_region(2);
        if classification == PhysicalDomain::ThinShell {
            // The facet region of the fixture has no material
            assert!(matches!(
                configuration_error(&result.unwrap_err()),
                ConfigurationError::MissingMaterial { .. }
            ));
            continue;
        }
        result.unwrap();
        let link = engine.region(2).unwrap().link().unwrap();
        assert_eq!(link.kernel_name(), kernel);
        assert_eq!(link.scratch().layout_name(), layout);
    }

    let pair = FacetPair::new(ElementShape::Tetrahedron, 0);
    for (coupling, kernel) in [
        (InterfaceCoupling::Direct, "interface (direct)"),
        (InterfaceCoupling::Multiplier, "interface (multiplier)"),
    ] {
        let config = EngineConfig {
            interface_coupling: coupling,
            ..EngineConfig::default()
        };
        let (master, slave) = (PhysicalDomain::Conductor, PhysicalDomain::Air);
        let mut engine = pair.engine(master, slave, PhysicalDomain::ConductorAir, config);
        engine.link_all().unwrap();
        let link = engine.region(2).unwrap().link().unwrap();
        assert_eq!(link.kernel_name(), kernel);
        assert_eq!(link.scratch().layout_name(), "interface");
    }
}

#[test]
fn conductor_kernel_follows_the_resistivity_law() {
    let models = [
        (ResistivityModel::Constant { rho: 1.0 }, "conductor"),
        (
            ResistivityModel::LinearTemperature {
                rho0: 1.0,
                alpha: 0.004,
                reference_temperature: 293.0,
            },
            "conductor (temperature)",
        ),
        (ResistivityModel::Magnetoresistive { rho0: 1.0, b0: 1.0 }, "conductor (flux)"),
    ];
    for (model, name) in models {
        let material = StandardMaterial::new("m", model, PermeabilityModel::default());
        let region = Region::new("bulk", PhysicalDomain::Conductor, GeometryType::TET4)
            .with_elements(vec![tet()])
            .with_material(Arc::new(material));
        let mut engine = conductor_engine(region);
        engine.link_all().unwrap();
        assert_eq!(engine.region(0).unwrap().link().unwrap().kernel_name(), name);
    }
}

#[test]
fn unsupported_geometry_is_rejected() {
    let triangle = TopologyBuilder::new().element(
        0,
        GeometryType::TRI3,
        vec![0, 1, 2],
        tet_coordinates()[..3].to_vec(),
    );
    let region = Region::new("bulk", PhysicalDomain::Conductor, GeometryType::TRI3)
        .with_elements(vec![triangle])
        .with_material(copper());
    let mut engine = conductor_engine(region);
    let error = engine.link_region(0).unwrap_err();
    assert!(matches!(
        configuration_error(&error),
        ConfigurationError::UnsupportedGeometry {
            classification: PhysicalDomain::Conductor,
            dimension: 3,
            ..
        }
    ));
    assert!(!engine.region(0).unwrap().is_linked());

    // Higher interpolation orders are not implemented by any kernel
    let higher = GeometryType::TET4.with_interpolation_order(2);
    let region = Region::new("bulk", PhysicalDomain::Air, higher);
    let mut engine = conductor_engine(region.with_elements(vec![tet()]));
    assert!(engine.link_region(0).is_err());
}

#[test]
fn conductors_require_a_material() {
    let region = Region::new("bulk", PhysicalDomain::Conductor, GeometryType::TET4).with_elements(vec![tet()]);
    let mut engine = conductor_engine(region);
    let error = engine.link_region(0).unwrap_err();
    assert!(matches!(
        configuration_error(&error),
        ConfigurationError::MissingMaterial {
            classification: PhysicalDomain::Conductor,
            ..
        }
    ));
}

/// Claims one more DOF than the layout declares.
#[derive(Debug)]
struct MiscountingKernel;

impl RegionKernel for MiscountingKernel {
    fn name(&self) -> &'static str {
        "miscounting"
    }

    fn compute_element(
        &self,
        element: &MeshElement,
        _context: &KernelContext,
        _scratch: &mut ScratchBuffers,
    ) -> eyre::Result<usize> {
        Ok(element.edges.len() + 1)
    }
}

#[test]
fn kernel_dof_counts_are_checked_against_the_layout() {
    let region = Region::new("bulk", PhysicalDomain::Conductor, GeometryType::TET4)
        .with_elements(vec![tet()])
        .with_material(copper());
    let mut engine = conductor_engine(region);
    engine.link_region_with_kernel(0, Box::new(MiscountingKernel)).unwrap();
    assert_eq!(engine.region(0).unwrap().link().unwrap().kernel_name(), "miscounting");

    let state = FieldState::zeros(engine.dof_count());
    let error = engine.compute_element(0, 0, &state).unwrap_err();
    match configuration_error(&error) {
        ConfigurationError::DofCountMismatch {
            region,
            declared,
            written,
        } => {
            assert_eq!(region, "bulk");
            assert_eq!(*declared, 6);
            assert_eq!(*written, 7);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(engine.assemble(&state).is_err());
}

#[test]
fn assembly_requires_linked_regions() {
    let region = Region::new("bulk", PhysicalDomain::Conductor, GeometryType::TET4)
        .with_elements(vec![tet()])
        .with_material(copper());
    let mut engine = conductor_engine(region);
    let state = FieldState::zeros(engine.dof_count());
    let error = engine.assemble(&state).unwrap_err();
    assert!(matches!(
        configuration_error(&error),
        ConfigurationError::UnlinkedRegion { region } if region == "bulk"
    ));
    assert!(engine.compute_element(0, 0, &state).is_err());
    assert!(engine.assemble_region_operators(0, &state).is_err());

    engine.link_all().unwrap();
    assert!(engine.assemble(&state).is_ok());

    // Reclassification invalidates the link
    engine.reclassify_region(0, PhysicalDomain::Air).unwrap();
    assert!(!engine.region(0).unwrap().is_linked());
    assert!(engine.assemble(&state).is_err());
    engine.link_region(0).unwrap();
    assert_eq!(engine.region(0).unwrap().link().unwrap().kernel_name(), "air");
    assert!(engine.reclassify_region(3, PhysicalDomain::Air).is_err());
}

#[test]
fn empty_regions_are_skipped() {
    let mut topology = TopologyBuilder::new();
    let element = topology.element(0, GeometryType::TET4, vec![0, 1, 2, 3], tet_coordinates());
    let regions = vec![
        Region::new("bulk", PhysicalDomain::Air, GeometryType::TET4).with_elements(vec![element]),
        // Would fail to link: wrong geometry and no material
        Region::new("empty", PhysicalDomain::Conductor, GeometryType::TRI3),
    ];
    let mut engine = engine_with_regions(3, EngineConfig::default(), entity_counts(4, &topology), regions);
    engine.link_all().unwrap();
    assert!(engine.region(0).unwrap().is_linked());
    assert!(!engine.region(1).unwrap().is_linked());

    let state = FieldState::zeros(engine.dof_count());
    let system = engine.assemble(&state).unwrap();
    assert!(system.jacobian.nnz() > 0);
    let operators = engine.assemble_region_operators(1, &state).unwrap();
    assert_eq!(operators.stiffness.nnz(), 0);
    assert_eq!(operators.load.norm(), 0.0);
}

#[test]
fn interface_multiplicities_are_checked_when_linking() {
    let pair = FacetPair::new(ElementShape::Tetrahedron, 0);
    let config = EngineConfig {
        multiplicity: DofMultiplicity {
            edge: 2,
            node: 1,
            ..DofMultiplicity::default()
        },
        ..EngineConfig::default()
    };
    let mut engine = pair.engine(PhysicalDomain::Conductor, PhysicalDomain::Air, PhysicalDomain::ConductorAir, config);
    engine.link_region(0).unwrap();
    engine.link_region(1).unwrap();
    let error = engine.link_region(2).unwrap_err();
    assert!(matches!(
        configuration_error(&error),
        ConfigurationError::MultiplicityMismatch { master: 2, slave: 1, .. }
    ));
}

#[test]
fn facet_references_must_resolve() {
    let mut pair = FacetPair::new(ElementShape::Tetrahedron, 0);
    if let Some(coupling) = pair.facet.facet.as_mut() {
        coupling.slave = Some(ElementRef::new(5, 0));
    }
    let mut engine = pair.engine(
        PhysicalDomain::Conductor,
        PhysicalDomain::Air,
        PhysicalDomain::ConductorAir,
        EngineConfig::default(),
    );
    let error = engine.link_region(2).unwrap_err();
    assert!(matches!(
        configuration_error(&error),
        ConfigurationError::DanglingElementReference { target: 5, element: 0, .. }
    ));

    // Interface facets without any coupling
    pair.facet.facet = None;
    let mut engine = pair.engine(
        PhysicalDomain::Conductor,
        PhysicalDomain::Air,
        PhysicalDomain::ConductorAir,
        EngineConfig::default(),
    );
    let error = engine.link_region(2).unwrap_err();
    assert!(matches!(
        configuration_error(&error),
        ConfigurationError::MissingFacetCoupling { .. }
    ));
}

#[test]
fn engine_rejects_inconsistent_numbering() {
    let mut topology = TopologyBuilder::new();
    topology.element(0, GeometryType::TET4, vec![0, 1, 2, 3], tet_coordinates());
    let numbering = DofNumbering::new(entity_counts(4, &topology), DofMultiplicity::uniform(2));
    let basis = SimplexBasis::new(3).unwrap();
    let error = AssemblyEngine::new(basis, EngineConfig::default(), 3, numbering).unwrap_err();
    assert!(matches!(configuration_error(&error), ConfigurationError::InvalidConfig(_)));

    // Region parameters do not influence linking
    let region = Region::new("coil", PhysicalDomain::Coil, GeometryType::TET4)
        .with_elements(vec![tet()])
        .with_parameters(RegionParameters::default());
    let mut engine = conductor_engine(region);
    engine.link_all().unwrap();
}
