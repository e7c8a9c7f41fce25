//! Build a runnable model from configuration plus tabular input.
//!
//! Every problem found on the way is collected into one validation
//! report; only a completely clean input produces a model. Dense
//! per-kind indices are assigned in node-table order.

use std::collections::HashMap;

use crate::control::{ControlUpdate, ControlValue};
use crate::errors::{ModelError, ValidationIssue, ValidationReport};
use crate::io::tables::*;
use crate::misc::configuration::Configuration;
use crate::model::Model;
use crate::network::graph::{Graph, LinkKind, LinkMetadata, NodeId, NodeKind};
use crate::network::validation::validate_network;
use crate::nodes::{
    CompoundTerm, CompoundVariable, Condition, ControlledParameter, ListenVariable,
};
use crate::nodes::discrete_control::expand_wildcards;
use crate::numerical::interpolation::{
    Extrapolation, IndexLookup, Interpolation, InterpolationMethod,
};
use crate::numerical::profile::BasinProfile;
use crate::store::ParameterStore;

/// Load a model the usual way: TOML configuration next to a SQLite
/// database.
pub fn load_model(configuration: Configuration, config_dir: &std::path::Path) -> Result<Model, ModelError> {
    let db_path = config_dir.join(&configuration.input_path);
    let data = crate::io::sqlite_io::read_model(&db_path.to_string_lossy())?;
    build_model(configuration, data)
}

/// Build a model from in-memory rows. Tests feed this directly.
pub fn build_model(configuration: Configuration, data: ModelData) -> Result<Model, ModelError> {
    let mut report = ValidationReport::new();

    // Nodes: resolve kinds and assign dense per-kind indices
    let mut counts: HashMap<NodeKind, usize> = HashMap::new();
    let mut nodes: Vec<NodeId> = vec![];
    let mut by_id: HashMap<i64, NodeId> = HashMap::new();
    let mut cyclic: HashMap<i64, bool> = HashMap::new();
    for row in &data.nodes {
        let Some(kind) = NodeKind::from_str(&row.kind) else {
            report.push(ValidationIssue::Table(format!(
                "node #{} has unknown type '{}'",
                row.id, row.kind
            )));
            continue;
        };
        if by_id.contains_key(&row.id) {
            report.push(ValidationIssue::Table(format!(
                "node id {} is declared twice",
                row.id
            )));
            continue;
        }
        let idx = *counts.entry(kind).or_insert(0);
        let node = NodeId::new(kind, row.id, idx);
        if row.subnetwork < 0 {
            report.push(ValidationIssue::BadSubnetworkId { node });
        }
        counts.insert(kind, idx + 1);
        by_id.insert(row.id, node);
        cyclic.insert(row.id, row.cyclic);
        nodes.push(node);
    }

    // Links
    let mut links: Vec<LinkMetadata> = vec![];
    for row in &data.links {
        let kind = match row.kind.as_str() {
            "flow" => LinkKind::Flow,
            "control" => LinkKind::Control,
            other => {
                report.push(ValidationIssue::Link {
                    link_id: row.id,
                    message: format!("unknown link type '{}'", other),
                });
                continue;
            }
        };
        let Some(&from) = by_id.get(&row.from_id) else {
            report.push(ValidationIssue::UnknownNode {
                link_id: row.id,
                node_id: row.from_id,
            });
            continue;
        };
        let Some(&to) = by_id.get(&row.to_id) else {
            report.push(ValidationIssue::UnknownNode {
                link_id: row.id,
                node_id: row.to_id,
            });
            continue;
        };
        if row.subnetwork < 0 {
            report.push(ValidationIssue::Link {
                link_id: row.id,
                message: "subnetwork id must be a positive integer".to_string(),
            });
            continue;
        }
        links.push(LinkMetadata {
            id: row.id,
            from,
            to,
            kind,
            subnetwork: row.subnetwork as u32,
        });
    }

    let graph = Graph::new(nodes.clone(), links, &mut report);

    let mut store = ParameterStore::new();
    store.pid_derivative_floor = configuration.pid_derivative_floor();
    for row in &data.nodes {
        if let Some(&node) = by_id.get(&row.id) {
            store
                .node_subnetwork
                .insert(node, row.subnetwork.max(0) as u32);
        }
    }

    // Global priority list
    let mut priorities: Vec<u32> = vec![];
    for row in &data.user_demand_static {
        priorities.push(row.priority.max(0) as u32);
    }
    for row in &data.user_demand_time {
        priorities.push(row.priority.max(0) as u32);
    }
    for row in &data.level_demand {
        priorities.push(row.priority.max(0) as u32);
    }
    for row in &data.flow_demand {
        priorities.push(row.priority.max(0) as u32);
    }
    priorities.sort_unstable();
    priorities.dedup();
    store.priorities = priorities;

    // Union of substances over all concentration tables
    let mut substances: Vec<String> = data
        .basin_concentration
        .iter()
        .chain(&data.flow_boundary_concentration)
        .chain(&data.level_boundary_concentration)
        .map(|r| r.substance.clone())
        .collect();
    substances.sort();
    substances.dedup();
    store.basin.substances = substances.clone();

    let forcing_method = configuration.forcing_method()?;
    let flow_rate_method = configuration.flow_rate_method()?;
    let demand_method = configuration.demand_method()?;
    let extrapolation_of = |node: NodeId| -> Extrapolation {
        if cyclic.get(&node.id).copied().unwrap_or(false) {
            Extrapolation::Periodic
        } else {
            Extrapolation::Constant
        }
    };

    // Two passes: controller kinds resolve references into the arrays
    // the first pass fills.
    let first_pass = nodes.iter().copied().filter(|n| !n.kind.is_control());
    let second_pass = nodes.iter().copied().filter(|n| n.kind.is_control());
    for node in first_pass.chain(second_pass) {
        match node.kind {
            NodeKind::Basin => load_basin(
                &mut store,
                &data,
                node,
                forcing_method,
                extrapolation_of(node),
                &substances,
                &mut report,
            ),
            NodeKind::FlowBoundary => {
                let points: Vec<(f64, f64)> = data
                    .flow_boundary_time
                    .iter()
                    .filter(|r| r.node_id == node.id)
                    .map(|r| (r.time, r.flow_rate))
                    .collect();
                let static_value = data
                    .flow_boundary_static
                    .iter()
                    .find(|r| r.node_id == node.id)
                    .map(|r| r.flow_rate);
                let series = build_series(
                    node,
                    points,
                    static_value,
                    0.0,
                    forcing_method,
                    extrapolation_of(node),
                    &mut report,
                );
                store.flow_boundary.node_ids.push(node);
                store.flow_boundary.flow_rate.push(series);
                store.flow_boundary.concentration.push(concentration_vector(
                    &data.flow_boundary_concentration,
                    node.id,
                    &substances,
                ));
            }
            NodeKind::LevelBoundary => {
                let points: Vec<(f64, f64)> = data
                    .level_boundary_time
                    .iter()
                    .filter(|r| r.node_id == node.id)
                    .map(|r| (r.time, r.level))
                    .collect();
                let static_value = data
                    .level_boundary_static
                    .iter()
                    .find(|r| r.node_id == node.id)
                    .map(|r| r.level);
                let series = build_series(
                    node,
                    points,
                    static_value,
                    0.0,
                    forcing_method,
                    extrapolation_of(node),
                    &mut report,
                );
                store.level_boundary.node_ids.push(node);
                store.level_boundary.level.push(series);
                store.level_boundary.concentration.push(concentration_vector(
                    &data.level_boundary_concentration,
                    node.id,
                    &substances,
                ));
            }
            NodeKind::LinearResistance => {
                let rows: Vec<&LinearResistanceRow> = data
                    .linear_resistance
                    .iter()
                    .filter(|r| r.node_id == node.id)
                    .collect();
                let base = rows
                    .iter()
                    .find(|r| r.control_state.is_none())
                    .or(rows.first())
                    .copied();
                let (resistance, max_flow_rate) = match base {
                    Some(row) => (row.resistance, row.max_flow_rate.unwrap_or(f64::INFINITY)),
                    None => {
                        report.push(ValidationIssue::Node {
                            node,
                            message: "missing linear_resistance_static row".to_string(),
                        });
                        (1.0, f64::INFINITY)
                    }
                };
                store.linear_resistance.node_ids.push(node);
                store.linear_resistance.resistance.push(resistance);
                store.linear_resistance.max_flow_rate.push(max_flow_rate);

                for row in rows.iter().filter(|r| r.control_state.is_some()) {
                    register_update(
                        &mut store,
                        &graph,
                        node,
                        row.control_state.clone().unwrap(),
                        ControlUpdate {
                            target: node,
                            parameter: ControlledParameter::Resistance,
                            value: ControlValue::Scalar(row.resistance),
                        },
                    );
                }
            }
            NodeKind::ManningResistance => {
                match data
                    .manning_resistance
                    .iter()
                    .find(|r| r.node_id == node.id)
                {
                    Some(row) => {
                        store.manning_resistance.node_ids.push(node);
                        store.manning_resistance.length.push(row.length);
                        store.manning_resistance.manning_n.push(row.manning_n);
                        store.manning_resistance.profile_width.push(row.profile_width);
                        store.manning_resistance.profile_slope.push(row.profile_slope);
                    }
                    None => {
                        report.push(ValidationIssue::Node {
                            node,
                            message: "missing manning_resistance_static row".to_string(),
                        });
                        store.manning_resistance.node_ids.push(node);
                        store.manning_resistance.length.push(1.0);
                        store.manning_resistance.manning_n.push(0.04);
                        store.manning_resistance.profile_width.push(1.0);
                        store.manning_resistance.profile_slope.push(1.0);
                    }
                }
            }
            NodeKind::TabulatedRatingCurve => {
                load_rating_curve(&mut store, &graph, &data, node, &mut report)
            }
            NodeKind::Pump => load_structure(
                &mut store,
                &graph,
                &data.pump_static,
                &data.pump_time,
                node,
                flow_rate_method,
                extrapolation_of(node),
                &mut report,
            ),
            NodeKind::Outlet => load_structure(
                &mut store,
                &graph,
                &data.outlet_static,
                &data.outlet_time,
                node,
                flow_rate_method,
                extrapolation_of(node),
                &mut report,
            ),
            NodeKind::UserDemand => load_user_demand(
                &mut store,
                &data,
                node,
                demand_method,
                extrapolation_of(node),
                &mut report,
            ),
            NodeKind::LevelDemand => {
                let row = data.level_demand.iter().find(|r| r.node_id == node.id);
                let (priority, min_level, max_level) = match row {
                    Some(r) => (r.priority.max(0) as u32, r.min_level, r.max_level),
                    None => {
                        report.push(ValidationIssue::Node {
                            node,
                            message: "missing level_demand_static row".to_string(),
                        });
                        (0, 0.0, f64::INFINITY)
                    }
                };
                let target = control_target(&graph, node).unwrap_or(node);
                store.level_demand.node_ids.push(node);
                store.level_demand.priority.push(priority);
                store
                    .level_demand
                    .min_level
                    .push(Interpolation::constant(min_level));
                store
                    .level_demand
                    .max_level
                    .push(Interpolation::constant(max_level));
                store.level_demand.target_basin.push(target);
            }
            NodeKind::FlowDemand => {
                let row = data.flow_demand.iter().find(|r| r.node_id == node.id);
                let (priority, demand) = match row {
                    Some(r) => (r.priority.max(0) as u32, r.demand),
                    None => {
                        report.push(ValidationIssue::Node {
                            node,
                            message: "missing flow_demand_static row".to_string(),
                        });
                        (0, 0.0)
                    }
                };
                let target = control_target(&graph, node).unwrap_or(node);
                store.flow_demand.node_ids.push(node);
                store.flow_demand.priority.push(priority);
                store
                    .flow_demand
                    .demand
                    .push(Interpolation::constant(demand));
                store.flow_demand.target.push(target);
            }
            NodeKind::DiscreteControl => {
                load_discrete_control(&mut store, &data, node, &by_id, &mut report)
            }
            NodeKind::ContinuousControl => {
                load_continuous_control(&mut store, &graph, &data, node, &by_id, &mut report)
            }
            NodeKind::PidControl => load_pid_control(
                &mut store,
                &graph,
                &data,
                node,
                &by_id,
                flow_rate_method,
                extrapolation_of(node),
                &mut report,
            ),
            NodeKind::Terminal | NodeKind::Junction => {}
        }
    }

    validate_network(&graph, &store, &mut report);
    report.into_result()?;

    store.finalize(&graph);
    Model::new(configuration, graph, store)
}

/// Build a time series from optional time rows and an optional static
/// value, reporting malformed breakpoints.
fn build_series(
    node: NodeId,
    mut points: Vec<(f64, f64)>,
    static_value: Option<f64>,
    default: f64,
    method: InterpolationMethod,
    extrapolation: Extrapolation,
    report: &mut ValidationReport,
) -> Interpolation {
    if points.is_empty() {
        return Interpolation::constant(static_value.unwrap_or(default));
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    for w in points.windows(2) {
        if w[0].0 == w[1].0 {
            report.push(ValidationIssue::RepeatedTimestamp { node, time: w[0].0 });
            return Interpolation::constant(default);
        }
    }
    let (x, y): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
    match Interpolation::new(method, extrapolation, x, y) {
        Ok(series) => series,
        Err(message) => {
            report.push(ValidationIssue::Node { node, message });
            Interpolation::constant(default)
        }
    }
}

fn concentration_vector(rows: &[ConcentrationRow], node_id: i64, substances: &[String]) -> Vec<f64> {
    substances
        .iter()
        .map(|substance| {
            rows.iter()
                .find(|r| r.node_id == node_id && &r.substance == substance)
                .map(|r| r.concentration)
                .unwrap_or(0.0)
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn load_basin(
    store: &mut ParameterStore,
    data: &ModelData,
    node: NodeId,
    method: InterpolationMethod,
    extrapolation: Extrapolation,
    substances: &[String],
    report: &mut ValidationReport,
) {
    let levels: Vec<f64> = data
        .basin_profile
        .iter()
        .filter(|r| r.node_id == node.id)
        .map(|r| r.level)
        .collect();
    let areas: Vec<f64> = data
        .basin_profile
        .iter()
        .filter(|r| r.node_id == node.id)
        .map(|r| r.area)
        .collect();
    let profile = match BasinProfile::new(levels, areas) {
        Ok(profile) => profile,
        Err(message) => {
            report.push(ValidationIssue::Node { node, message });
            BasinProfile::new(vec![0.0, 1.0], vec![1.0, 1.0]).unwrap()
        }
    };

    let storage0 = match data.basin_state.iter().find(|r| r.node_id == node.id) {
        Some(row) => match (row.storage, row.level) {
            (Some(storage), _) => storage,
            (None, Some(level)) => profile.storage_from_level(level),
            (None, None) => 0.0,
        },
        None => 0.0,
    };

    let static_row = data.basin_static.iter().find(|r| r.node_id == node.id);
    let field = |select_static: fn(&BasinStaticRow) -> Option<f64>,
                 select_time: fn(&BasinTimeRow) -> Option<f64>,
                 report: &mut ValidationReport| {
        let points: Vec<(f64, f64)> = data
            .basin_time
            .iter()
            .filter(|r| r.node_id == node.id)
            .filter_map(|r| select_time(r).map(|v| (r.time, v)))
            .collect();
        build_series(
            node,
            points,
            static_row.and_then(select_static),
            0.0,
            method,
            extrapolation,
            report,
        )
    };

    let precipitation = field(|r| r.precipitation, |r| r.precipitation, report);
    let surface_runoff = field(|r| r.surface_runoff, |r| r.surface_runoff, report);
    let drainage = field(|r| r.drainage, |r| r.drainage, report);
    let evaporation = field(|r| r.potential_evaporation, |r| r.potential_evaporation, report);
    let infiltration = field(|r| r.infiltration, |r| r.infiltration, report);

    store.basin.node_ids.push(node);
    store.basin.storage0.push(storage0);
    store.basin.profile.push(profile);
    store.basin.precipitation.push(precipitation);
    store.basin.surface_runoff.push(surface_runoff);
    store.basin.drainage.push(drainage);
    store.basin.evaporation.push(evaporation);
    store.basin.infiltration.push(infiltration);
    store.basin.concentration.push(concentration_vector(
        &data.basin_concentration,
        node.id,
        substances,
    ));
}

fn load_rating_curve(
    store: &mut ParameterStore,
    graph: &Graph,
    data: &ModelData,
    node: NodeId,
    report: &mut ValidationReport,
) {
    let mut tables: Vec<Interpolation> = vec![];
    let mut switch: Option<IndexLookup> = None;

    let time_rows: Vec<&RatingCurveTimeRow> = data
        .rating_curve_time
        .iter()
        .filter(|r| r.node_id == node.id)
        .collect();
    if !time_rows.is_empty() {
        // Group points by switch time, first-seen order then sorted
        let mut times: Vec<f64> = time_rows.iter().map(|r| r.time).collect();
        times.sort_by(f64::total_cmp);
        times.dedup();
        for &time in &times {
            let points: Vec<(f64, f64)> = time_rows
                .iter()
                .filter(|r| r.time == time)
                .map(|r| (r.level, r.flow_rate))
                .collect();
            tables.push(curve_table(node, points, report));
        }
        match IndexLookup::new(times, (0..tables.len()).collect()) {
            Ok(lookup) => switch = Some(lookup),
            Err(message) => report.push(ValidationIssue::Node { node, message }),
        }
    } else {
        // Static variants keyed by control state; the stateless rows
        // are the base table
        let rows: Vec<&RatingCurveRow> = data
            .rating_curve
            .iter()
            .filter(|r| r.node_id == node.id)
            .collect();
        let mut states: Vec<Option<String>> = vec![];
        for row in &rows {
            if !states.contains(&row.control_state) {
                states.push(row.control_state.clone());
            }
        }
        // Base first
        states.sort_by_key(|s| s.is_some());
        for state in &states {
            let points: Vec<(f64, f64)> = rows
                .iter()
                .filter(|r| &r.control_state == state)
                .map(|r| (r.level, r.flow_rate))
                .collect();
            let index = tables.len();
            tables.push(curve_table(node, points, report));
            if let Some(name) = state {
                register_update(
                    store,
                    graph,
                    node,
                    name.clone(),
                    ControlUpdate {
                        target: node,
                        parameter: ControlledParameter::RatingTable,
                        value: ControlValue::Index(index),
                    },
                );
            }
        }
    }

    if tables.is_empty() {
        report.push(ValidationIssue::Node {
            node,
            message: "rating curve has no table".to_string(),
        });
        tables.push(Interpolation::constant(0.0));
    }
    let active = switch.as_ref().map(|s| s.lookup(0.0)).unwrap_or(0);
    store.rating_curve.node_ids.push(node);
    store.rating_curve.tables.push(tables);
    store.rating_curve.active.push(active);
    store.rating_curve.switch.push(switch);
}

/// A rating table must be piecewise monotone: levels strictly
/// increasing, discharge non-decreasing.
fn curve_table(
    node: NodeId,
    mut points: Vec<(f64, f64)>,
    report: &mut ValidationReport,
) -> Interpolation {
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    for w in points.windows(2) {
        if w[1].1 < w[0].1 {
            report.push(ValidationIssue::Node {
                node,
                message: format!("rating curve discharge decreases at level {}", w[1].0),
            });
            break;
        }
    }
    let (x, y): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
    match Interpolation::new(InterpolationMethod::Linear, Extrapolation::Constant, x, y) {
        Ok(table) => table,
        Err(message) => {
            report.push(ValidationIssue::Node { node, message });
            Interpolation::constant(0.0)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn load_structure(
    store: &mut ParameterStore,
    graph: &Graph,
    static_rows: &[StructureRow],
    time_rows: &[StructureTimeRow],
    node: NodeId,
    method: InterpolationMethod,
    extrapolation: Extrapolation,
    report: &mut ValidationReport,
) {
    let rows: Vec<&StructureRow> = static_rows.iter().filter(|r| r.node_id == node.id).collect();
    let times: Vec<&StructureTimeRow> =
        time_rows.iter().filter(|r| r.node_id == node.id).collect();
    let base = rows
        .iter()
        .find(|r| r.control_state.is_none())
        .or(rows.first())
        .copied();
    if base.is_none() && times.is_empty() {
        report.push(ValidationIssue::Node {
            node,
            message: "missing static or time rows".to_string(),
        });
    }

    let series_of = |select: fn(&StructureTimeRow) -> Option<f64>,
                     static_value: Option<f64>,
                     default: f64,
                     report: &mut ValidationReport| {
        let points: Vec<(f64, f64)> = times
            .iter()
            .filter_map(|&r| select(r).map(|v| (r.time, v)))
            .collect();
        build_series(node, points, static_value, default, method, extrapolation, report)
    };

    let flow_rate = series_of(
        |r| Some(r.flow_rate),
        base.map(|r| r.flow_rate),
        0.0,
        report,
    );
    let min_flow_rate = series_of(
        |r| r.min_flow_rate,
        base.and_then(|r| r.min_flow_rate),
        0.0,
        report,
    );
    let max_flow_rate = series_of(
        |r| r.max_flow_rate,
        base.and_then(|r| r.max_flow_rate),
        f64::INFINITY,
        report,
    );
    let min_upstream_level = series_of(
        |r| r.min_upstream_level,
        base.and_then(|r| r.min_upstream_level),
        f64::NEG_INFINITY,
        report,
    );
    let max_downstream_level = series_of(
        |r| r.max_downstream_level,
        base.and_then(|r| r.max_downstream_level),
        f64::INFINITY,
        report,
    );
    let allocation_controlled = base.map(|r| r.allocation_controlled).unwrap_or(false);

    // Control-state rows become parameter updates
    for row in rows.iter().filter(|r| r.control_state.is_some()) {
        let state = row.control_state.clone().unwrap();
        register_update(
            store,
            graph,
            node,
            state.clone(),
            ControlUpdate {
                target: node,
                parameter: ControlledParameter::FlowRate,
                value: ControlValue::Series(Interpolation::constant(row.flow_rate)),
            },
        );
        if let Some(min) = row.min_flow_rate {
            register_update(
                store,
                graph,
                node,
                state.clone(),
                ControlUpdate {
                    target: node,
                    parameter: ControlledParameter::MinFlowRate,
                    value: ControlValue::Series(Interpolation::constant(min)),
                },
            );
        }
        if let Some(max) = row.max_flow_rate {
            register_update(
                store,
                graph,
                node,
                state.clone(),
                ControlUpdate {
                    target: node,
                    parameter: ControlledParameter::MaxFlowRate,
                    value: ControlValue::Series(Interpolation::constant(max)),
                },
            );
        }
    }

    match node.kind {
        NodeKind::Pump => {
            store.pump.node_ids.push(node);
            store.pump.flow_rate.push(flow_rate);
            store.pump.min_flow_rate.push(min_flow_rate);
            store.pump.max_flow_rate.push(max_flow_rate);
            store.pump.min_upstream_level.push(min_upstream_level);
            store.pump.max_downstream_level.push(max_downstream_level);
            store.pump.pid_controlled.push(false);
            store.pump.allocation_controlled.push(allocation_controlled);
        }
        NodeKind::Outlet => {
            store.outlet.node_ids.push(node);
            store.outlet.flow_rate.push(flow_rate);
            store.outlet.min_flow_rate.push(min_flow_rate);
            store.outlet.max_flow_rate.push(max_flow_rate);
            store.outlet.min_upstream_level.push(min_upstream_level);
            store.outlet.max_downstream_level.push(max_downstream_level);
            store.outlet.pid_controlled.push(false);
            store.outlet.allocation_controlled.push(allocation_controlled);
        }
        _ => unreachable!("load_structure only handles pumps and outlets"),
    }
}

fn load_user_demand(
    store: &mut ParameterStore,
    data: &ModelData,
    node: NodeId,
    method: InterpolationMethod,
    extrapolation: Extrapolation,
    report: &mut ValidationReport,
) {
    let rows: Vec<&UserDemandRow> = data
        .user_demand_static
        .iter()
        .filter(|r| r.node_id == node.id)
        .collect();
    let n_priorities = store.priorities.len();
    let mut demand = Vec::with_capacity(n_priorities);
    let mut has_priority = vec![false; n_priorities];

    for (p, &priority) in store.priorities.iter().enumerate() {
        let static_row = rows.iter().find(|r| r.priority.max(0) as u32 == priority);
        let points: Vec<(f64, f64)> = data
            .user_demand_time
            .iter()
            .filter(|r| r.node_id == node.id && r.priority.max(0) as u32 == priority)
            .map(|r| (r.time, r.demand))
            .collect();
        has_priority[p] = static_row.is_some() || !points.is_empty();
        demand.push(build_series(
            node,
            points,
            static_row.map(|r| r.demand),
            0.0,
            method,
            extrapolation,
            report,
        ));
    }

    if !has_priority.iter().any(|&h| h) {
        report.push(ValidationIssue::Node {
            node,
            message: "user demand declares no demand at any priority".to_string(),
        });
    }

    let return_factor = rows.first().map(|r| r.return_factor).unwrap_or(0.0);
    let min_level = rows
        .first()
        .map(|r| r.min_level)
        .unwrap_or(f64::NEG_INFINITY);

    store.user_demand.node_ids.push(node);
    store.user_demand.demand.push(demand);
    store
        .user_demand
        .allocated
        .push(vec![f64::INFINITY; n_priorities]);
    store.user_demand.has_priority.push(has_priority);
    store
        .user_demand
        .return_factor
        .push(Interpolation::constant(return_factor));
    store.user_demand.min_level.push(min_level);
}

fn load_discrete_control(
    store: &mut ParameterStore,
    data: &ModelData,
    node: NodeId,
    by_id: &HashMap<i64, NodeId>,
    report: &mut ValidationReport,
) {
    // Compound variables, grouped and ordered by compound id
    let mut compound_ids: Vec<i64> = data
        .discrete_control_variable
        .iter()
        .filter(|r| r.node_id == node.id)
        .map(|r| r.compound_id)
        .collect();
    compound_ids.sort_unstable();
    compound_ids.dedup();

    let mut compounds: Vec<CompoundVariable> = vec![];
    for &cid in &compound_ids {
        let terms = build_terms(
            data.discrete_control_variable
                .iter()
                .filter(|r| r.node_id == node.id && r.compound_id == cid),
            node,
            by_id,
            report,
        );
        compounds.push(CompoundVariable { terms });
    }

    let mut conditions: Vec<Condition> = vec![];
    for row in data
        .discrete_control_condition
        .iter()
        .filter(|r| r.node_id == node.id)
    {
        let Some(compound) = compound_ids.iter().position(|&c| c == row.compound_id) else {
            report.push(ValidationIssue::Node {
                node,
                message: format!("condition references unknown compound variable {}", row.compound_id),
            });
            continue;
        };
        let threshold_low = if row.threshold_low.is_nan() {
            row.threshold_high
        } else {
            row.threshold_low
        };
        if threshold_low > row.threshold_high {
            report.push(ValidationIssue::Node {
                node,
                message: format!(
                    "condition low threshold {} exceeds high threshold {}",
                    threshold_low, row.threshold_high
                ),
            });
        }
        conditions.push(Condition {
            compound,
            threshold_high: row.threshold_high,
            threshold_low,
        });
    }
    if conditions.is_empty() {
        report.push(ValidationIssue::Node {
            node,
            message: "discrete control has no conditions".to_string(),
        });
    }

    // Logic table with wildcard expansion
    let mut logic: HashMap<String, String> = HashMap::new();
    for row in data
        .discrete_control_logic
        .iter()
        .filter(|r| r.node_id == node.id)
    {
        if row.truth_state.chars().any(|c| !matches!(c, 'T' | 'F' | '*')) {
            report.push(ValidationIssue::BadTruthState {
                node,
                state: row.truth_state.clone(),
            });
            continue;
        }
        if row.truth_state.len() != conditions.len() {
            report.push(ValidationIssue::TruthStateLength {
                node,
                state: row.truth_state.clone(),
                expected: conditions.len(),
                found: row.truth_state.len(),
            });
            continue;
        }
        for concrete in expand_wildcards(&row.truth_state) {
            if let Some(previous) = logic.insert(concrete.clone(), row.control_state.clone()) {
                if previous != row.control_state {
                    report.push(ValidationIssue::AmbiguousTruthState {
                        node,
                        state: concrete,
                    });
                }
            }
        }
    }

    let n_conditions = conditions.len();
    store.discrete_control.node_ids.push(node);
    store.discrete_control.compound_variables.push(compounds);
    store.discrete_control.conditions.push(conditions);
    store.discrete_control.logic.push(logic);
    store
        .discrete_control
        .truth_state
        .push(vec![false; n_conditions]);
    store.discrete_control.active_state.push(String::new());
}

fn load_continuous_control(
    store: &mut ParameterStore,
    graph: &Graph,
    data: &ModelData,
    node: NodeId,
    by_id: &HashMap<i64, NodeId>,
    report: &mut ValidationReport,
) {
    let terms = build_terms(
        data.continuous_control_variable
            .iter()
            .filter(|r| r.node_id == node.id),
        node,
        by_id,
        report,
    );

    let mut points: Vec<(f64, f64)> = data
        .continuous_control_function
        .iter()
        .filter(|r| r.node_id == node.id)
        .map(|r| (r.input, r.output))
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    let function = if points.is_empty() {
        report.push(ValidationIssue::Node {
            node,
            message: "continuous control has no function table".to_string(),
        });
        Interpolation::constant(0.0)
    } else {
        let (x, y): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
        match Interpolation::new(InterpolationMethod::Linear, Extrapolation::Constant, x, y) {
            Ok(series) => series,
            Err(message) => {
                report.push(ValidationIssue::Node { node, message });
                Interpolation::constant(0.0)
            }
        }
    };

    let parameter = data
        .continuous_control_function
        .iter()
        .find(|r| r.node_id == node.id)
        .and_then(|r| ControlledParameter::from_str(&r.controlled_parameter))
        .unwrap_or(ControlledParameter::FlowRate);

    let target = control_target(graph, node).unwrap_or(node);

    store.continuous_control.node_ids.push(node);
    store
        .continuous_control
        .compound
        .push(CompoundVariable { terms });
    store.continuous_control.function.push(function);
    store.continuous_control.target.push(target);
    store.continuous_control.parameter.push(parameter);
}

#[allow(clippy::too_many_arguments)]
fn load_pid_control(
    store: &mut ParameterStore,
    graph: &Graph,
    data: &ModelData,
    node: NodeId,
    by_id: &HashMap<i64, NodeId>,
    method: InterpolationMethod,
    extrapolation: Extrapolation,
    report: &mut ValidationReport,
) {
    let static_row = data
        .pid_control_static
        .iter()
        .find(|r| r.node_id == node.id);
    let times: Vec<&PidControlTimeRow> = data
        .pid_control_time
        .iter()
        .filter(|r| r.node_id == node.id)
        .collect();
    if static_row.is_none() && times.is_empty() {
        report.push(ValidationIssue::Node {
            node,
            message: "missing pid_control rows".to_string(),
        });
    }

    let series_of = |select: fn(&PidControlTimeRow) -> f64,
                     static_value: Option<f64>,
                     report: &mut ValidationReport| {
        let points: Vec<(f64, f64)> = times.iter().map(|&r| (r.time, select(r))).collect();
        build_series(node, points, static_value, 0.0, method, extrapolation, report)
    };

    let target = series_of(|r| r.target, static_row.map(|r| r.target), report);
    let proportional = series_of(|r| r.proportional, static_row.map(|r| r.proportional), report);
    let integral = series_of(|r| r.integral, static_row.map(|r| r.integral), report);
    let derivative = series_of(|r| r.derivative, static_row.map(|r| r.derivative), report);

    let listen_id = static_row.map(|r| r.listen_id).unwrap_or(-1);
    let listen = match by_id.get(&listen_id) {
        Some(&listen) => listen,
        None => {
            report.push(ValidationIssue::Node {
                node,
                message: format!("listens to unknown node #{}", listen_id),
            });
            node
        }
    };
    let controlled = control_target(graph, node).unwrap_or(node);
    match controlled.kind {
        NodeKind::Pump => store.pump.pid_controlled[controlled.idx] = true,
        NodeKind::Outlet => store.outlet.pid_controlled[controlled.idx] = true,
        _ => {}
    }

    store.pid_control.node_ids.push(node);
    store.pid_control.listen.push(listen);
    store.pid_control.controlled.push(controlled);
    store.pid_control.target.push(target);
    store.pid_control.proportional.push(proportional);
    store.pid_control.integral.push(integral);
    store.pid_control.derivative.push(derivative);
    store.pid_control.active.push(true);
}

fn build_terms<'a>(
    rows: impl Iterator<Item = &'a ControlVariableRow>,
    node: NodeId,
    by_id: &HashMap<i64, NodeId>,
    report: &mut ValidationReport,
) -> Vec<CompoundTerm> {
    let mut terms = vec![];
    for row in rows {
        let Some(&listen) = by_id.get(&row.listen_id) else {
            report.push(ValidationIssue::Node {
                node,
                message: format!("listens to unknown node #{}", row.listen_id),
            });
            continue;
        };
        let Some(variable) = ListenVariable::from_str(&row.variable) else {
            report.push(ValidationIssue::Node {
                node,
                message: format!("unknown listened variable '{}'", row.variable),
            });
            continue;
        };
        terms.push(CompoundTerm {
            listen,
            variable,
            weight: row.weight,
            look_ahead: row.look_ahead,
        });
    }
    terms
}

/// First control-link target of a controller node.
fn control_target(graph: &Graph, node: NodeId) -> Option<NodeId> {
    graph.neighbours_out(node, LinkKind::Control).next()
}

/// Attach a parameter update to every discrete control node driving the
/// target, keyed by control state name.
fn register_update(
    store: &mut ParameterStore,
    graph: &Graph,
    target: NodeId,
    state: String,
    update: ControlUpdate,
) {
    let controllers: Vec<NodeId> = graph
        .neighbours_in(target, LinkKind::Control)
        .filter(|n| n.kind == NodeKind::DiscreteControl)
        .collect();
    for controller in controllers {
        store
            .control_mappings
            .entry((controller, state.clone()))
            .or_default()
            .push(update.clone());
    }
}
