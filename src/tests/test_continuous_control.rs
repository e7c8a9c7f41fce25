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
dtmax = 1.0
";

/// A pump whose rate tracks the basin level through a function table,
/// giving a linear reservoir: Q = level / 10.
fn proportional_drain_model() -> Model {
    let mut data = ModelData::default();
    data.nodes = vec![
        node(1, "Basin"),
        node(2, "Pump"),
        node(3, "Terminal"),
        node(4, "ContinuousControl"),
    ];
    data.links = vec![flow_link(1, 1, 2), flow_link(2, 2, 3), control_link(3, 4, 2)];
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
    data.pump_static = vec![StructureRow {
        node_id: 2,
        flow_rate: 0.0,
        ..Default::default()
    }];
    data.continuous_control_variable = vec![ControlVariableRow {
        node_id: 4,
        compound_id: 0,
        listen_id: 1,
        variable: "level".to_string(),
        weight: 1.0,
        look_ahead: 0.0,
    }];
    data.continuous_control_function = vec![
        ControlFunctionRow {
            node_id: 4,
            input: 0.0,
            output: 0.0,
            controlled_parameter: "flow_rate".to_string(),
        },
        ControlFunctionRow {
            node_id: 4,
            input: 1000.0,
            output: 100.0,
            controlled_parameter: "flow_rate".to_string(),
        },
    ];

    build_model(configuration(20, 20.0, TIGHT_SOLVER), data).unwrap()
}

#[test]
fn test_function_table_gives_a_linear_reservoir() {
    let mut model = proportional_drain_model();
    model.run().unwrap();

    // dS/dt = -S/10 while the basin is comfortably wet
    let expected = 100.0 * (-2.0_f64).exp();
    assert_approx_eq!(f64, model.storage(0), expected, epsilon = 0.2);
}

#[test]
fn test_controlled_rate_is_reapplied_every_call() {
    let mut model = proportional_drain_model();
    model.advance_to(5.0).unwrap();
    let flows_early = model.flows().to_vec();
    model.advance_to(15.0).unwrap();
    let flows_late = model.flows().to_vec();

    // The pump keeps tracking the falling level; the latched static
    // series (zero) never shows through
    assert!(flows_early[0] > flows_late[0]);
    assert!(flows_late[0] > 0.0);
    let level = model.level(0);
    assert_approx_eq!(f64, flows_late[0], level / 10.0, epsilon = 1e-6);
}
