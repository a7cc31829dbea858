use super::run_on_ranks;
use fenris_em::checkpoint::{load, save, LoadStatus, SimulationState, TimeMetadata};
use fenris_em::comm::Communicator;
use fenris_em::mesh::MeshIdentity;

fn initial_state() -> SimulationState {
    let mut state = SimulationState::new(MeshIdentity {
        nodes: 12,
        edges: 33,
        elements: 12,
    });
    state.declare_field("solution", vec![0.0; 6]);
    state
}

#[test]
fn coordinator_state_is_restored_on_every_rank() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let restored = run_on_ranks(3, |comm| {
        // Ranks disagree on their in-memory state; only the coordinator's is written
        let mut state = initial_state();
        state.time = TimeMetadata {
            timestamp: 0.5 + comm.rank() as f64,
            step: 10 * (comm.rank() as u64 + 1),
            loop_index: 1,
        };
        state.declare_field("solution", vec![comm.rank() as f64 + 0.1; 6]);
        save(&comm, &path, &state).unwrap();

        let mut fresh = initial_state();
        let status = load(&comm, &path, &mut fresh).unwrap();
        (status, fresh)
    });

    for (status, state) in restored {
        assert_eq!(status, LoadStatus::Loaded);
        assert_eq!(state.time.step, 10);
        assert_eq!(state.time.timestamp, 0.5);
        assert_eq!(state.field("solution"), Some(&[0.1; 6][..]));
    }
}

#[test]
fn incompatible_checkpoints_are_rejected_on_every_rank() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let missing = dir.path().join("missing.json");

    let outcomes = run_on_ranks(3, |comm| {
        let mut old = initial_state();
        old.declare_field("solution", vec![1.0; 4]);
        save(&comm, &path, &old).unwrap();

        let mut running = initial_state();
        let resized = load(&comm, &path, &mut running).unwrap();
        let absent = load(&comm, &missing, &mut running).unwrap();
        let failed_save = save(&comm, dir.path().join("no/such/dir.json"), &running).is_err();
        (resized, absent, failed_save, running == initial_state())
    });

    for outcome in outcomes {
        assert_eq!(outcome, (LoadStatus::Incompatible, LoadStatus::Incompatible, true, true));
    }
}

#[test]
fn non_finite_coordinator_state_fails_on_every_rank() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let outcomes = run_on_ranks(3, |comm| {
        // Only the coordinator's values are checked
        let mut state = initial_state();
        if comm.is_coordinator() {
            state.declare_field("solution", vec![1.0, f64::INFINITY, 2.0, 0.0, 0.0, 0.0]);
        }
        save(&comm, &path, &state).is_err()
    });

    assert_eq!(outcomes, vec![true; 3]);
    assert!(!path.exists());
}
