use crate::errors::{LoadError, ModelError, ValidationIssue};
use crate::io::loader::build_model;
use crate::io::tables::*;
use crate::tests::support::{configuration, flow_link, node};

fn issues_of(result: Result<crate::model::Model, ModelError>) -> Vec<ValidationIssue> {
    match result {
        Err(ModelError::Load(LoadError::Validation(report))) => report.issues,
        other => panic!("expected a validation failure, got {:?}", other.err().map(|e| e.to_string())),
    }
}

#[test]
fn test_all_problems_are_collected_not_first_failure() {
    let mut data = ModelData::default();
    data.nodes = vec![
        node(1, "Basin"),
        node(2, "Pump"),
        // Unknown kind
        NodeRow {
            id: 3,
            kind: "Weir".to_string(),
            subnetwork: 0,
            cyclic: false,
        },
        node(4, "Terminal"),
    ];
    data.links = vec![
        flow_link(1, 1, 2),
        flow_link(2, 2, 4),
        // Duplicate of link 1
        flow_link(3, 1, 2),
        // Dangling reference
        flow_link(4, 99, 1),
    ];
    // Non-monotone profile
    data.basin_profile = vec![
        BasinProfileRow {
            node_id: 1,
            level: 1.0,
            area: 1.0,
        },
        BasinProfileRow {
            node_id: 1,
            level: 1.0,
            area: 1.0,
        },
    ];
    data.pump_static = vec![StructureRow {
        node_id: 2,
        flow_rate: 1.0,
        ..Default::default()
    }];

    let issues = issues_of(build_model(configuration(10, 10.0, ""), data));
    assert!(issues.len() >= 3, "issues: {:?}", issues);
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::DuplicateLink { .. })));
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::UnknownNode { node_id: 99, .. })));
    assert!(issues.iter().any(|i| matches!(i, ValidationIssue::Table(_))));
}

#[test]
fn test_neighbour_counts_are_enforced() {
    // A pump with no outflow link
    let mut data = ModelData::default();
    data.nodes = vec![node(1, "Basin"), node(2, "Pump")];
    data.links = vec![flow_link(1, 1, 2)];
    data.basin_profile = vec![
        BasinProfileRow {
            node_id: 1,
            level: 0.0,
            area: 1.0,
        },
        BasinProfileRow {
            node_id: 1,
            level: 1.0,
            area: 1.0,
        },
    ];
    data.pump_static = vec![StructureRow {
        node_id: 2,
        flow_rate: 1.0,
        ..Default::default()
    }];

    let issues = issues_of(build_model(configuration(10, 10.0, ""), data));
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::NeighbourCount { .. })));
}

#[test]
fn test_negative_subnetwork_id_is_rejected() {
    let mut data = ModelData::default();
    data.nodes = vec![NodeRow {
        id: 1,
        kind: "Basin".to_string(),
        subnetwork: -2,
        cyclic: false,
    }];
    data.basin_profile = vec![
        BasinProfileRow {
            node_id: 1,
            level: 0.0,
            area: 1.0,
        },
        BasinProfileRow {
            node_id: 1,
            level: 1.0,
            area: 1.0,
        },
    ];
    let issues = issues_of(build_model(configuration(10, 10.0, ""), data));
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::BadSubnetworkId { .. })));
}

#[test]
fn test_logic_table_is_checked() {
    let mut data = ModelData::default();
    data.nodes = vec![node(1, "Basin"), node(2, "DiscreteControl")];
    data.basin_profile = vec![
        BasinProfileRow {
            node_id: 1,
            level: 0.0,
            area: 1.0,
        },
        BasinProfileRow {
            node_id: 1,
            level: 1.0,
            area: 1.0,
        },
    ];
    data.discrete_control_variable = vec![ControlVariableRow {
        node_id: 2,
        compound_id: 0,
        listen_id: 1,
        variable: "level".to_string(),
        weight: 1.0,
        look_ahead: 0.0,
    }];
    data.discrete_control_condition = vec![
        ControlConditionRow {
            node_id: 2,
            compound_id: 0,
            threshold_high: 1.0,
            threshold_low: f64::NAN,
        },
        ControlConditionRow {
            node_id: 2,
            compound_id: 0,
            threshold_high: 2.0,
            threshold_low: f64::NAN,
        },
    ];
    data.discrete_control_logic = vec![
        // Illegal character
        ControlLogicRow {
            node_id: 2,
            truth_state: "TX".to_string(),
            control_state: "a".to_string(),
        },
        // Wrong length
        ControlLogicRow {
            node_id: 2,
            truth_state: "T".to_string(),
            control_state: "a".to_string(),
        },
        // Wildcard overlap with a contradicting concrete row
        ControlLogicRow {
            node_id: 2,
            truth_state: "T*".to_string(),
            control_state: "a".to_string(),
        },
        ControlLogicRow {
            node_id: 2,
            truth_state: "TF".to_string(),
            control_state: "b".to_string(),
        },
    ];

    let issues = issues_of(build_model(configuration(10, 10.0, ""), data));
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::BadTruthState { .. })));
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::TruthStateLength { .. })));
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::AmbiguousTruthState { .. })));
}

#[test]
fn test_repeated_forcing_timestamp_is_rejected() {
    let mut data = ModelData::default();
    data.nodes = vec![node(1, "FlowBoundary"), node(2, "Terminal")];
    data.links = vec![flow_link(1, 1, 2)];
    data.flow_boundary_time = vec![
        FlowBoundaryTimeRow {
            node_id: 1,
            time: 5.0,
            flow_rate: 1.0,
        },
        FlowBoundaryTimeRow {
            node_id: 1,
            time: 5.0,
            flow_rate: 2.0,
        },
    ];
    let issues = issues_of(build_model(configuration(10, 10.0, ""), data));
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::RepeatedTimestamp { .. })));
}

#[test]
fn test_manning_needs_basins_on_both_sides() {
    let mut data = ModelData::default();
    data.nodes = vec![
        node(1, "LevelBoundary"),
        node(2, "ManningResistance"),
        node(3, "Basin"),
    ];
    data.links = vec![flow_link(1, 1, 2), flow_link(2, 2, 3)];
    data.level_boundary_static = vec![LevelBoundaryRow {
        node_id: 1,
        level: 1.0,
    }];
    data.basin_profile = vec![
        BasinProfileRow {
            node_id: 3,
            level: 0.0,
            area: 1.0,
        },
        BasinProfileRow {
            node_id: 3,
            level: 1.0,
            area: 1.0,
        },
    ];
    data.manning_resistance = vec![ManningResistanceRow {
        node_id: 2,
        length: 100.0,
        manning_n: 0.04,
        profile_width: 2.0,
        profile_slope: 1.0,
    }];

    let issues = issues_of(build_model(configuration(10, 10.0, ""), data));
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::Node { .. })));
}
