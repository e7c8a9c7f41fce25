use float_cmp::assert_approx_eq;

use crate::io::loader::build_model;
use crate::io::tables::*;
use crate::model::Model;
use crate::tests::support::{configuration, flow_link, node};

const SOLVER: &str = "
[solver]
algorithm = \"rk23\"
abstol = 1e-9
reltol = 1e-9
dt_initial = 0.1
dtmax = 10.0
";

/// A boundary held at level 3 discharging over a curve that doubles its
/// discharge at t = 100.
fn switched_curve_model() -> Model {
    let mut data = ModelData::default();
    data.nodes = vec![
        node(1, "LevelBoundary"),
        node(2, "TabulatedRatingCurve"),
        node(3, "Terminal"),
    ];
    data.links = vec![flow_link(1, 1, 2), flow_link(2, 2, 3)];
    data.level_boundary_static = vec![LevelBoundaryRow {
        node_id: 1,
        level: 3.0,
    }];
    for (level, flow_rate) in [(0.0, 0.0), (5.0, 5.0)] {
        data.rating_curve_time.push(RatingCurveTimeRow {
            node_id: 2,
            time: 0.0,
            level,
            flow_rate,
        });
    }
    for (level, flow_rate) in [(0.0, 0.0), (5.0, 10.0)] {
        data.rating_curve_time.push(RatingCurveTimeRow {
            node_id: 2,
            time: 100.0,
            level,
            flow_rate,
        });
    }

    build_model(configuration(200, 50.0, SOLVER), data).unwrap()
}

#[test]
fn test_curve_switch_doubles_the_discharge() {
    let mut model = switched_curve_model();
    model.run().unwrap();

    let flow_at = |t: f64| -> f64 {
        model
            .saved
            .flow
            .iter()
            .find(|row| row.t == t && row.link_id == 1)
            .unwrap()
            .flow
    };

    assert_approx_eq!(f64, flow_at(50.0), 3.0, epsilon = 1e-9);
    assert_approx_eq!(f64, flow_at(150.0), 6.0, epsilon = 1e-9);
    // Same-time ordering: the switch runs before the save at t = 100
    assert_approx_eq!(f64, flow_at(100.0), 6.0, epsilon = 1e-9);
}

#[test]
fn test_active_table_tracks_the_schedule() {
    let mut model = switched_curve_model();
    assert_eq!(model.store.rating_curve.active[0], 0);
    model.advance_to(150.0).unwrap();
    assert_eq!(model.store.rating_curve.active[0], 1);
}

#[test]
fn test_curve_discharge_scales_with_upstream_level() {
    let mut data = ModelData::default();
    data.nodes = vec![
        node(1, "Basin"),
        node(2, "TabulatedRatingCurve"),
        node(3, "Terminal"),
    ];
    data.links = vec![flow_link(1, 1, 2), flow_link(2, 2, 3)];
    data.basin_profile = vec![
        BasinProfileRow {
            node_id: 1,
            level: 0.0,
            area: 1.0,
        },
        BasinProfileRow {
            node_id: 1,
            level: 1000.0,
            area: 1.0,
        },
    ];
    data.basin_state = vec![BasinStateRow {
        node_id: 1,
        storage: Some(100.0),
        level: None,
    }];
    for (level, flow_rate) in [(0.0, 0.0), (200.0, 2.0)] {
        data.rating_curve.push(RatingCurveRow {
            node_id: 2,
            level,
            flow_rate,
            control_state: None,
        });
    }

    // Q = h / 100 drains the basin exponentially with time constant 100
    let mut model = build_model(configuration(100, 100.0, SOLVER), data).unwrap();
    model.run().unwrap();
    let expected = 100.0 * (-1.0_f64).exp();
    assert_approx_eq!(f64, model.storage(0), expected, epsilon = 0.05);
}
