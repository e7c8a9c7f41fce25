use crate::errors::ValidationReport;
use crate::network::graph::{Graph, LinkKind, LinkMetadata, NodeId, NodeKind};

fn link(id: i64, from: NodeId, to: NodeId) -> LinkMetadata {
    LinkMetadata {
        id,
        from,
        to,
        kind: LinkKind::Flow,
        subnetwork: 0,
    }
}

#[test]
fn test_simple_chain_collapses_to_two_links() {
    let basin_a = NodeId::new(NodeKind::Basin, 1, 0);
    let pump = NodeId::new(NodeKind::Pump, 2, 0);
    let basin_b = NodeId::new(NodeKind::Basin, 3, 1);
    let mut report = ValidationReport::new();
    let graph = Graph::new(
        vec![basin_a, pump, basin_b],
        vec![link(1, basin_a, pump), link(2, pump, basin_b)],
        &mut report,
    );
    assert!(report.is_empty());

    assert_eq!(graph.flow_count(), 2);
    let inflow = graph.inflow_link(pump).unwrap();
    let outflow = graph.outflow_link(pump).unwrap();
    assert_eq!(inflow.from, basin_a);
    assert_eq!(outflow.to, basin_b);
    assert_ne!(inflow.flow_idx, outflow.flow_idx);

    assert_eq!(graph.flow_index(basin_a, pump).unwrap(), inflow.flow_idx);
    assert!(graph.flow_index(basin_a, basin_b).is_err());
}

#[test]
fn test_junction_is_collapsed_but_kept_externally() {
    // Two rating curves merge through a junction into one basin
    let basin_a = NodeId::new(NodeKind::Basin, 1, 0);
    let basin_b = NodeId::new(NodeKind::Basin, 2, 1);
    let curve_a = NodeId::new(NodeKind::TabulatedRatingCurve, 3, 0);
    let curve_b = NodeId::new(NodeKind::TabulatedRatingCurve, 4, 1);
    let junction = NodeId::new(NodeKind::Junction, 5, 0);
    let basin_c = NodeId::new(NodeKind::Basin, 6, 2);

    let mut report = ValidationReport::new();
    let graph = Graph::new(
        vec![basin_a, basin_b, curve_a, curve_b, junction, basin_c],
        vec![
            link(1, basin_a, curve_a),
            link(2, basin_b, curve_b),
            link(3, curve_a, junction),
            link(4, curve_b, junction),
            link(5, junction, basin_c),
        ],
        &mut report,
    );
    assert!(report.is_empty(), "{:?}", report.issues);

    // Collapsed: a->ca, b->cb, ca->c, cb->c
    assert_eq!(graph.flow_count(), 4);
    assert_eq!(graph.outflow_link(curve_a).unwrap().to, basin_c);
    assert_eq!(graph.outflow_link(curve_b).unwrap().to, basin_c);
    assert_eq!(graph.inflow_links(basin_c).count(), 2);

    // The external junction link reports both routed flows
    assert_eq!(graph.external_link_flows(4).len(), 2);
    assert_eq!(graph.external_link_flows(2).len(), 1);
}

#[test]
fn test_duplicate_flow_link_is_rejected() {
    let basin = NodeId::new(NodeKind::Basin, 1, 0);
    let pump = NodeId::new(NodeKind::Pump, 2, 0);
    let terminal = NodeId::new(NodeKind::Terminal, 3, 0);
    let mut report = ValidationReport::new();
    Graph::new(
        vec![basin, pump, terminal],
        vec![
            link(1, basin, pump),
            link(2, basin, pump),
            link(3, pump, terminal),
        ],
        &mut report,
    );
    assert!(report
        .issues
        .iter()
        .any(|issue| matches!(issue, crate::errors::ValidationIssue::DuplicateLink { .. })));
}

#[test]
fn test_structure_to_structure_is_rejected() {
    let basin = NodeId::new(NodeKind::Basin, 1, 0);
    let pump_a = NodeId::new(NodeKind::Pump, 2, 0);
    let pump_b = NodeId::new(NodeKind::Pump, 3, 1);
    let terminal = NodeId::new(NodeKind::Terminal, 4, 0);
    let mut report = ValidationReport::new();
    Graph::new(
        vec![basin, pump_a, pump_b, terminal],
        vec![
            link(1, basin, pump_a),
            link(2, pump_a, pump_b),
            link(3, pump_b, terminal),
        ],
        &mut report,
    );
    assert!(!report.is_empty());
}

#[test]
fn test_junction_path_without_structure_is_rejected() {
    let basin_a = NodeId::new(NodeKind::Basin, 1, 0);
    let junction = NodeId::new(NodeKind::Junction, 2, 0);
    let basin_b = NodeId::new(NodeKind::Basin, 3, 1);
    let mut report = ValidationReport::new();
    Graph::new(
        vec![basin_a, junction, basin_b],
        vec![link(1, basin_a, junction), link(2, junction, basin_b)],
        &mut report,
    );
    assert!(!report.is_empty());
}

#[test]
fn test_neighbour_iteration_by_link_kind() {
    let basin = NodeId::new(NodeKind::Basin, 1, 0);
    let pump = NodeId::new(NodeKind::Pump, 2, 0);
    let terminal = NodeId::new(NodeKind::Terminal, 3, 0);
    let control = NodeId::new(NodeKind::DiscreteControl, 4, 0);
    let mut report = ValidationReport::new();
    let graph = Graph::new(
        vec![basin, pump, terminal, control],
        vec![
            link(1, basin, pump),
            link(2, pump, terminal),
            LinkMetadata {
                id: 3,
                from: control,
                to: pump,
                kind: LinkKind::Control,
                subnetwork: 0,
            },
        ],
        &mut report,
    );
    assert!(report.is_empty());

    let flow_in: Vec<NodeId> = graph.neighbours_in(pump, LinkKind::Flow).collect();
    assert_eq!(flow_in, vec![basin]);
    let control_in: Vec<NodeId> = graph.neighbours_in(pump, LinkKind::Control).collect();
    assert_eq!(control_in, vec![control]);
    let flow_out: Vec<NodeId> = graph.neighbours_out(pump, LinkKind::Flow).collect();
    assert_eq!(flow_out, vec![terminal]);
}

#[test]
fn test_flow_boundary_has_only_an_outflow() {
    let boundary = NodeId::new(NodeKind::FlowBoundary, 1, 0);
    let basin = NodeId::new(NodeKind::Basin, 2, 0);
    let mut report = ValidationReport::new();
    let graph = Graph::new(
        vec![boundary, basin],
        vec![link(1, boundary, basin)],
        &mut report,
    );
    assert!(report.is_empty());
    assert_eq!(graph.flow_count(), 1);
    assert!(graph.inflow_link(boundary).is_none());
    assert_eq!(graph.outflow_link(boundary).unwrap().to, basin);
}
