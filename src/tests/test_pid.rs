use float_cmp::assert_approx_eq;

use crate::io::loader::build_model;
use crate::io::tables::*;
use crate::model::Model;
use crate::tests::support::{configuration, control_link, flow_link, node};

const TIGHT_SOLVER: &str = "
[solver]
algorithm = \"rk23\"
abstol = 1e-9
reltol = 1e-9
dt_initial = 0.01
dtmin = 1e-12
dtmax = 0.5
";

/// A pump with infinite supply filling a basin towards a PID target.
fn pid_model(kp: f64, ki: f64, kd: f64, seconds: i64) -> Model {
    let mut data = ModelData::default();
    data.nodes = vec![
        node(1, "LevelBoundary"),
        node(2, "Pump"),
        node(3, "Basin"),
        node(4, "PidControl"),
    ];
    data.links = vec![flow_link(1, 1, 2), flow_link(2, 2, 3), control_link(3, 4, 2)];
    data.level_boundary_static = vec![LevelBoundaryRow {
        node_id: 1,
        level: 10.0,
    }];
    data.pump_static = vec![StructureRow {
        node_id: 2,
        flow_rate: 0.0,
        ..Default::default()
    }];
    data.basin_profile = vec![
        BasinProfileRow {
            node_id: 3,
            level: 0.0,
            area: 1.0,
        },
        BasinProfileRow {
            node_id: 3,
            level: 100.0,
            area: 1.0,
        },
    ];
    data.basin_state = vec![BasinStateRow {
        node_id: 3,
        storage: Some(4.0),
        level: None,
    }];
    data.pid_control_static = vec![PidControlRow {
        node_id: 4,
        listen_id: 3,
        target: 5.0,
        proportional: kp,
        integral: ki,
        derivative: kd,
    }];

    build_model(configuration(seconds, 1.0, TIGHT_SOLVER), data).unwrap()
}

#[test]
fn test_pid_settles_on_target_within_overshoot_bound() {
    let mut model = pid_model(1.0, 0.1, 0.0, 100);
    model.run().unwrap();

    assert_approx_eq!(f64, model.level(0), 5.0, epsilon = 1e-3);

    // Overdamped gains still peak a little past the target through the
    // integral term; it must stay under a tenth of the commanded step
    let peak = model
        .saved
        .basin
        .iter()
        .map(|row| row.level)
        .fold(f64::NEG_INFINITY, f64::max);
    assert!(peak <= 5.1, "overshoot to {}", peak);
}

#[test]
fn test_pid_integral_state_relaxes_back() {
    let mut model = pid_model(1.0, 0.1, 0.0, 100);
    model.run().unwrap();

    // Nothing drains the basin, so holding the level needs no flow and
    // the accumulated error winds back down
    let integral = model.pid_integral(0);
    assert!(integral.is_finite());
    assert!(integral.abs() < 1.0);
}

#[test]
fn test_pid_with_derivative_term_stays_stable() {
    let mut model = pid_model(1.0, 0.1, 0.2, 100);
    model.run().unwrap();
    assert_approx_eq!(f64, model.level(0), 5.0, epsilon = 5e-3);
}

#[test]
fn test_pid_flow_lands_on_both_pump_links() {
    let mut model = pid_model(1.0, 0.1, 0.0, 100);
    model.advance_to(1.0).unwrap();
    let flows = model.flows().to_vec();
    assert_eq!(flows.len(), 2);
    assert_approx_eq!(f64, flows[0], flows[1], epsilon = 1e-12);
    assert!(flows[0] > 0.0);
}
