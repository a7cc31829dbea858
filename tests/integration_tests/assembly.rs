use super::SplitModel;
use fenris_em::assembly::FieldState;
use fenris_em::classification::PhysicalDomain;
use fenris_em::config::{EngineConfig, InterfaceCoupling, TimeScheme};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};

fn config(coupling: InterfaceCoupling) -> EngineConfig {
    EngineConfig {
        time: TimeScheme { dt: 0.1, theta: 0.5 },
        interface_coupling: coupling,
        ..EngineConfig::default()
    }
}

/// A deterministic, non-smooth previous solution.
fn previous_solution(n: usize) -> DVector<f64> {
    DVector::from_fn(n, |i, _| ((i * 7919) % 13) as f64 / 13.0 - 0.5)
}

fn check_theta_scheme(model: &SplitModel, coupling: InterfaceCoupling) {
    let config = config(coupling);
    let (dt, theta) = (config.time.dt, config.time.theta);
    let mut engine = model.engine(PhysicalDomain::ConductorAir, model.interface.clone(), config);
    engine.link_all().unwrap();

    let n = engine.dof_count();
    let previous = previous_solution(n);
    let state = FieldState {
        current: DVector::zeros(n),
        previous: previous.clone(),
        temperature: DVector::zeros(0),
    };
    let system = engine.assemble(&state).unwrap();
    let jacobian = DMatrix::from(&system.jacobian);
    assert_eq!(jacobian.nrows(), n);

    let mut expected_jacobian = DMatrix::zeros(n, n);
    let mut expected_rhs = DVector::zeros(n);
    let mut interface_stiffness = DMatrix::zeros(n, n);
    for region in 0..3 {
        let operators = engine.assemble_region_operators(region, &state).unwrap();
        let mass = DMatrix::from(&operators.mass);
        let stiffness = DMatrix::from(&operators.stiffness);
        expected_jacobian += &mass / dt + &stiffness * theta;
        expected_rhs += &mass * &previous / dt - &stiffness * &previous * (1.0 - theta) + &operators.load;

        match region {
            0 => {
                assert!(stiffness.norm() > 0.0);
                assert_eq!(stiffness, stiffness.transpose());
                assert_eq!(mass, mass.transpose());
            }
            1 => {
                // Constant potentials are in the nullspace
                let row_sums = stiffness.column_sum();
                assert_matrix_eq!(row_sums, DVector::zeros(n), comp = abs, tol = 1e-12 * stiffness.norm());
                assert_eq!(stiffness, stiffness.transpose());
                assert_eq!(mass, mass.transpose());
            }
            _ => {
                assert_eq!(stiffness, -stiffness.transpose());
                assert!(stiffness.norm() > 0.0);
                interface_stiffness = stiffness;
            }
        }
    }

    let scale = jacobian.norm();
    assert_matrix_eq!(jacobian, expected_jacobian, comp = abs, tol = 1e-12 * scale);
    assert_matrix_eq!(system.rhs, expected_rhs, comp = abs, tol = 1e-12 * expected_rhs.norm());

    // Everything but the interface coupling is symmetric
    let skew = (&jacobian - jacobian.transpose()) / 2.0;
    assert_matrix_eq!(skew, interface_stiffness * theta, comp = abs, tol = 1e-12 * scale);
}

#[test]
fn solid_theta_scheme_combines_region_operators() {
    let model = SplitModel::solid();
    assert_eq!(model.interface.len(), 2);
    check_theta_scheme(&model, InterfaceCoupling::Direct);
    check_theta_scheme(&model, InterfaceCoupling::Multiplier);
}

#[test]
fn planar_theta_scheme_combines_region_operators() {
    let model = SplitModel::planar();
    assert_eq!(model.interface.len(), 1);
    check_theta_scheme(&model, InterfaceCoupling::Direct);
    check_theta_scheme(&model, InterfaceCoupling::Multiplier);
}

#[test]
fn multiplier_unknowns_are_only_coupled_to_the_interface() {
    let model = SplitModel::solid();
    let mut engine = model.engine(
        PhysicalDomain::ConductorAir,
        model.interface.clone(),
        config(InterfaceCoupling::Multiplier),
    );
    engine.link_all().unwrap();
    let numbering = engine.numbering().clone();
    let state = FieldState::zeros(engine.dof_count());
    let jacobian = DMatrix::from(&engine.assemble(&state).unwrap().jacobian);

    for facet in 0..model.interface.len() {
        for vertex in 0..3 {
            for tangent in 0..2 {
                let dof = numbering.multiplier_dof(facet, vertex, tangent, 0);
                // Saddle point structure: no diagonal block for the multipliers
                assert_eq!(jacobian[(dof, dof)], 0.0);
                assert!(jacobian.row(dof).norm() > 0.0);
                assert_eq!(jacobian.row(dof).transpose(), -jacobian.column(dof));
            }
        }
    }
}

#[test]
fn reclassified_interface_is_relinked() {
    let model = SplitModel::solid();
    let mut engine = model.engine(
        PhysicalDomain::ConductorAir,
        model.interface.clone(),
        config(InterfaceCoupling::Direct),
    );
    engine.link_all().unwrap();
    let state = FieldState::zeros(engine.dof_count());
    let coupled = DMatrix::from(&engine.assemble(&state).unwrap().jacobian);

    engine.reclassify_region(2, PhysicalDomain::ThinShell).unwrap();
    assert!(engine.assemble(&state).is_err());
    engine.link_region(2).unwrap();
    assert_eq!(engine.region(2).unwrap().link().unwrap().kernel_name(), "thin shell");
    let shell = DMatrix::from(&engine.assemble(&state).unwrap().jacobian);
    assert_eq!(shell.nrows(), coupled.nrows());
    assert_ne!(shell, coupled);
}
