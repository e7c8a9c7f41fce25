//! Cross-table consistency checks, run once after the store is filled.
//! Everything lands in the shared report; nothing aborts early.

use crate::errors::{ValidationIssue, ValidationReport};
use crate::network::graph::{Graph, LinkKind, NodeId, NodeKind};
use crate::nodes::{ControlledParameter, ListenVariable};
use crate::store::ParameterStore;

pub fn validate_network(graph: &Graph, store: &ParameterStore, report: &mut ValidationReport) {
    for node in graph.nodes().iter().copied() {
        check_neighbour_counts(graph, node, report);
    }

    // Manning reaches need basin profiles on both sides for their
    // bottom levels
    for node in store.manning_resistance.node_ids.iter().copied() {
        for link in [graph.inflow_link(node), graph.outflow_link(node)]
            .into_iter()
            .flatten()
        {
            for endpoint in [link.from, link.to] {
                if endpoint != node && endpoint.kind != NodeKind::Basin {
                    report.push(ValidationIssue::Node {
                        node,
                        message: format!("must connect basins, found {}", endpoint),
                    });
                }
            }
        }
    }

    // Controllers must point at something that can take their output
    for i in 0..store.pid_control.len() {
        let node = store.pid_control.node_ids[i];
        if store.pid_control.listen[i].kind != NodeKind::Basin {
            report.push(ValidationIssue::Node {
                node,
                message: format!(
                    "must listen to a basin, found {}",
                    store.pid_control.listen[i]
                ),
            });
        }
        let controlled = store.pid_control.controlled[i];
        if !matches!(controlled.kind, NodeKind::Pump | NodeKind::Outlet) {
            report.push(ValidationIssue::Node {
                node,
                message: format!("must control a pump or outlet, found {}", controlled),
            });
        }
    }

    for i in 0..store.continuous_control.len() {
        let node = store.continuous_control.node_ids[i];
        let target = store.continuous_control.target[i];
        if !matches!(target.kind, NodeKind::Pump | NodeKind::Outlet) {
            report.push(ValidationIssue::Node {
                node,
                message: format!("must control a pump or outlet, found {}", target),
            });
        }
        if store.continuous_control.parameter[i] != ControlledParameter::FlowRate {
            report.push(ValidationIssue::Node {
                node,
                message: "can only control flow_rate".to_string(),
            });
        }
        check_compound_terms(store, node, &store.continuous_control.compound[i].terms, report);
        // Flows are not part of the per-call control path
        for term in &store.continuous_control.compound[i].terms {
            if term.variable == ListenVariable::Flow && !term.listen.kind.writes_flow() {
                report.push(ValidationIssue::Node {
                    node,
                    message: format!("cannot listen to the flow of {}", term.listen),
                });
            }
        }
    }

    for i in 0..store.discrete_control.len() {
        let node = store.discrete_control.node_ids[i];
        for compound in &store.discrete_control.compound_variables[i] {
            check_compound_terms(store, node, &compound.terms, report);
        }
    }

    for i in 0..store.level_demand.len() {
        let node = store.level_demand.node_ids[i];
        if store.level_demand.target_basin[i].kind != NodeKind::Basin {
            report.push(ValidationIssue::Node {
                node,
                message: format!(
                    "must target a basin, found {}",
                    store.level_demand.target_basin[i]
                ),
            });
        }
    }
    for i in 0..store.flow_demand.len() {
        let node = store.flow_demand.node_ids[i];
        if !store.flow_demand.target[i].kind.writes_flow() {
            report.push(ValidationIssue::Node {
                node,
                message: format!(
                    "must target a flow-controlling structure, found {}",
                    store.flow_demand.target[i]
                ),
            });
        }
    }
}

fn check_compound_terms(
    _store: &ParameterStore,
    node: NodeId,
    terms: &[crate::nodes::CompoundTerm],
    report: &mut ValidationReport,
) {
    for term in terms {
        let supported = matches!(
            (term.listen.kind, term.variable),
            (NodeKind::Basin, ListenVariable::Level)
                | (NodeKind::Basin, ListenVariable::Storage)
                | (NodeKind::LevelBoundary, ListenVariable::Level)
                | (NodeKind::FlowBoundary, ListenVariable::Flow)
        ) || (term.variable == ListenVariable::Flow && term.listen.kind.writes_flow());
        if !supported {
            report.push(ValidationIssue::Node {
                node,
                message: format!(
                    "cannot listen to {:?} of {}",
                    term.variable, term.listen
                ),
            });
        }
    }
}

/// Flow-link arity rules per kind.
fn check_neighbour_counts(graph: &Graph, node: NodeId, report: &mut ValidationReport) {
    let n_in = graph.flow_link_count_in(node);
    let n_out = graph.flow_link_count_out(node);
    let n_control_out = graph.control_link_count_out(node);

    let expect = |report: &mut ValidationReport,
                  direction: &'static str,
                  expected: &str,
                  ok: bool,
                  found: usize| {
        if !ok {
            report.push(ValidationIssue::NeighbourCount {
                node,
                direction,
                expected: expected.to_string(),
                found,
            });
        }
    };

    match node.kind {
        NodeKind::Basin | NodeKind::LevelBoundary => {}
        NodeKind::FlowBoundary => {
            expect(report, "inbound", "0", n_in == 0, n_in);
            expect(report, "outbound", "1", n_out == 1, n_out);
        }
        NodeKind::LinearResistance
        | NodeKind::ManningResistance
        | NodeKind::TabulatedRatingCurve
        | NodeKind::Pump
        | NodeKind::Outlet
        | NodeKind::UserDemand => {
            expect(report, "inbound", "1", n_in == 1, n_in);
            expect(report, "outbound", "1", n_out == 1, n_out);
        }
        NodeKind::Terminal => {
            expect(report, "inbound", "at least 1", n_in >= 1, n_in);
            expect(report, "outbound", "0", n_out == 0, n_out);
        }
        NodeKind::Junction => {
            expect(report, "inbound", "at least 1", n_in >= 1, n_in);
            expect(report, "outbound", "at least 1", n_out >= 1, n_out);
        }
        NodeKind::DiscreteControl
        | NodeKind::ContinuousControl
        | NodeKind::PidControl
        | NodeKind::LevelDemand
        | NodeKind::FlowDemand => {
            expect(report, "inbound", "0", n_in == 0, n_in);
            expect(report, "outbound", "0", n_out == 0, n_out);
            let wanted = match node.kind {
                NodeKind::ContinuousControl | NodeKind::PidControl | NodeKind::FlowDemand => {
                    n_control_out == 1
                }
                _ => n_control_out >= 1,
            };
            if !wanted {
                report.push(ValidationIssue::Node {
                    node,
                    message: format!(
                        "expected {} outbound control link(s), found {}",
                        match node.kind {
                            NodeKind::ContinuousControl
                            | NodeKind::PidControl
                            | NodeKind::FlowDemand => "exactly 1",
                            _ => "at least 1",
                        },
                        n_control_out
                    ),
                });
            }
        }
    }
}
