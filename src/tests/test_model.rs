use float_cmp::assert_approx_eq;

use crate::io::loader::build_model;
use crate::io::tables::*;
use crate::model::Model;
use crate::tests::support::{configuration, flow_link, node};

const TIGHT_SOLVER: &str = "
[solver]
algorithm = \"rk23\"
abstol = 1e-9
reltol = 1e-9
dt_initial = 0.01
dtmin = 1e-12
dtmax = 1.0
";

/// Unit-area profile: level equals storage.
fn unit_profile(node_id: i64, top: f64) -> Vec<BasinProfileRow> {
    vec![
        BasinProfileRow {
            node_id,
            level: 0.0,
            area: 1.0,
        },
        BasinProfileRow {
            node_id,
            level: top,
            area: 1.0,
        },
    ]
}

/// Two basins joined by a linear resistance, no forcing.
fn two_basin_model(seconds: i64) -> Model {
    let mut data = ModelData::default();
    data.nodes = vec![
        node(1, "Basin"),
        node(2, "LinearResistance"),
        node(3, "Basin"),
    ];
    data.links = vec![flow_link(1, 1, 2), flow_link(2, 2, 3)];
    data.basin_profile = unit_profile(1, 1000.0);
    data.basin_profile.extend(unit_profile(3, 1000.0));
    data.basin_state = vec![
        BasinStateRow {
            node_id: 1,
            storage: Some(100.0),
            level: None,
        },
        BasinStateRow {
            node_id: 3,
            storage: Some(0.0),
            level: None,
        },
    ];
    data.linear_resistance = vec![LinearResistanceRow {
        node_id: 2,
        resistance: 1.0,
        max_flow_rate: None,
        control_state: None,
    }];

    build_model(configuration(seconds, seconds as f64, TIGHT_SOLVER), data).unwrap()
}

#[test]
fn test_two_basins_equalise_through_linear_resistance() {
    let mut model = two_basin_model(10);
    model.run().unwrap();

    assert_approx_eq!(f64, model.storage(0), 50.0, epsilon = 1e-3);
    assert_approx_eq!(f64, model.storage(1), 50.0, epsilon = 1e-3);

    // Conservation over the resistance: both saved links report the
    // same flow at every save point
    for t in [0.0, 10.0] {
        let flows: Vec<f64> = model
            .saved
            .flow
            .iter()
            .filter(|row| row.t == t)
            .map(|row| row.flow)
            .collect();
        assert_eq!(flows.len(), 2);
        assert_approx_eq!(f64, flows[0], flows[1], epsilon = 1e-12);
    }

    // The balance residual stays within the reporting tolerance
    for row in &model.saved.basin {
        assert!(row.balance_error.abs() < 1e-6);
    }
}

#[test]
fn test_two_basin_runs_are_deterministic() {
    let mut first = two_basin_model(10);
    first.run().unwrap();
    let mut second = two_basin_model(10);
    second.run().unwrap();

    assert_eq!(first.saved.basin.len(), second.saved.basin.len());
    for (a, b) in first.saved.basin.iter().zip(second.saved.basin.iter()) {
        assert_eq!(a.storage.to_bits(), b.storage.to_bits());
        assert_eq!(a.level.to_bits(), b.level.to_bits());
    }
    for (a, b) in first.saved.flow.iter().zip(second.saved.flow.iter()) {
        assert_eq!(a.flow.to_bits(), b.flow.to_bits());
    }
}

/// Precipitation against evaporation: the basin must not drain to zero
/// but settle where the dry-out ramp balances the rain.
fn forced_basin_model(seconds: i64, storage0: f64) -> Model {
    let mut data = ModelData::default();
    data.nodes = vec![node(1, "Basin")];
    data.basin_profile = vec![
        BasinProfileRow {
            node_id: 1,
            level: 0.0,
            area: 1000.0,
        },
        BasinProfileRow {
            node_id: 1,
            level: 10.0,
            area: 1000.0,
        },
    ];
    data.basin_state = vec![BasinStateRow {
        node_id: 1,
        storage: Some(storage0),
        level: None,
    }];
    data.basin_static = vec![BasinStaticRow {
        node_id: 1,
        precipitation: Some(1e-3),
        potential_evaporation: Some(2e-3),
        ..Default::default()
    }];

    build_model(configuration(seconds, seconds as f64, TIGHT_SOLVER), data).unwrap()
}

#[test]
fn test_evaporation_dominates_while_wet() {
    // Depth 0.5: evaporation runs at full strength, net -1 per second
    let mut model = forced_basin_model(300, 500.0);
    model.run().unwrap();
    assert_approx_eq!(f64, model.storage(0), 200.0, epsilon = 1e-2);
}

#[test]
fn test_basin_asymptotes_above_dry() {
    // Net loss stalls where the dry-out ramp halves the evaporation:
    // depth 0.05, storage 50
    let mut model = forced_basin_model(3000, 500.0);
    model.run().unwrap();
    let storage = model.storage(0);
    assert!(storage > 0.0, "basin must never dry out, got {}", storage);
    assert_approx_eq!(f64, storage, 50.0, epsilon = 0.5);
}

#[test]
fn test_equilibrium_initial_condition_is_stationary() {
    // Storage 50 is exactly the precipitation/evaporation balance point
    let mut model = forced_basin_model(1000, 50.0);
    model.run().unwrap();
    assert_approx_eq!(f64, model.storage(0), 50.0, epsilon = 1e-3);
}

/// A pump latched above its bracket: the saved flow must respect the
/// maximum rate series.
#[test]
fn test_pump_flow_respects_bracket() {
    let mut data = ModelData::default();
    data.nodes = vec![node(1, "Basin"), node(2, "Pump"), node(3, "Terminal")];
    data.links = vec![flow_link(1, 1, 2), flow_link(2, 2, 3)];
    data.basin_profile = unit_profile(1, 1000.0);
    data.basin_state = vec![BasinStateRow {
        node_id: 1,
        storage: Some(100.0),
        level: None,
    }];
    data.pump_static = vec![StructureRow {
        node_id: 2,
        flow_rate: 2.0,
        max_flow_rate: Some(1.0),
        ..Default::default()
    }];

    let mut model = build_model(configuration(10, 1.0, TIGHT_SOLVER), data).unwrap();
    model.run().unwrap();

    for row in model.saved.flow.iter().filter(|row| row.t > 0.0) {
        assert!(
            row.flow <= 1.0 + 1e-9,
            "pump exceeded its bracket: {}",
            row.flow
        );
        assert!(row.flow > 0.9);
    }
}

/// Stopping and resuming from the dumped state continues bit-identically
/// under a fixed-step method.
#[test]
fn test_state_round_trip_resumes_identically() {
    const EULER: &str = "
[solver]
algorithm = \"euler\"
dt_initial = 0.005
";
    let build = || {
        let mut data = ModelData::default();
        data.nodes = vec![
            node(1, "Basin"),
            node(2, "LinearResistance"),
            node(3, "Basin"),
        ];
        data.links = vec![flow_link(1, 1, 2), flow_link(2, 2, 3)];
        data.basin_profile = unit_profile(1, 1000.0);
        data.basin_profile.extend(unit_profile(3, 1000.0));
        data.basin_state = vec![
            BasinStateRow {
                node_id: 1,
                storage: Some(100.0),
                level: None,
            },
            BasinStateRow {
                node_id: 3,
                storage: Some(0.0),
                level: None,
            },
        ];
        data.linear_resistance = vec![LinearResistanceRow {
            node_id: 2,
            resistance: 1.0,
            max_flow_rate: None,
            control_state: None,
        }];
        build_model(configuration(10, 10.0, EULER), data).unwrap()
    };

    let mut straight = build();
    straight.advance_to(10.0).unwrap();

    let mut paused = build();
    paused.advance_to(5.0).unwrap();
    let dumped = paused.u.clone();

    let mut resumed = build();
    resumed.t = 5.0;
    resumed.u = dumped;
    resumed.advance_to(10.0).unwrap();

    for (a, b) in straight.u.iter().zip(resumed.u.iter()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn test_cancellation_stops_the_run() {
    let mut model = two_basin_model(10);
    model.request_cancel();
    let result = model.run();
    assert!(result.is_err());
}

#[test]
fn test_forcing_refresh_is_idempotent() {
    let mut model = forced_basin_model(300, 500.0);
    model.caches.time.refresh(&model.store, 42.0);
    let first = model.caches.time.basin_forcing_rate.clone();
    model.caches.time.invalidate();
    model.caches.time.refresh(&model.store, 42.0);
    assert_eq!(first, model.caches.time.basin_forcing_rate);
}
