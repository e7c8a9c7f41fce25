//! Right-hand-side assembly.
//!
//! One call turns (state, t) into the state derivative. The fixed order
//! is: cache refresh, basin properties, continuous control, hydraulic
//! flows kind by kind, vertical fluxes, basin derivative accumulation,
//! and last the PID pass, which may overwrite structure flows it owns.
//! Everything in between lives in the two caches so repeated probes of
//! the same (state, t) cost nothing.

use crate::cache::{StateTimeCache, TimeCache};
use crate::control::pid::formulate_pid_control;
use crate::network::graph::{Graph, NodeId, NodeKind};
use crate::nodes::{CompoundVariable, ControlledParameter, ListenVariable};
use crate::numerical::dual::Scalar;
use crate::numerical::smoothing::wet_depth_factor;
use crate::state::StateComponent;
use crate::store::ParameterStore;

pub fn formulate_rhs<S: Scalar>(
    store: &ParameterStore,
    graph: &Graph,
    time_cache: &mut TimeCache,
    cache: &mut StateTimeCache<S>,
    u: &[S],
    du: &mut [S],
    t: f64,
    t0: f64,
) {
    time_cache.refresh(store, t);

    if !cache.matches(u, t) {
        cache.refresh_basins(store, u, t, t0);
        formulate_continuous_control(store, graph, time_cache, cache, t);
        formulate_flows(store, graph, time_cache, cache, t);
        formulate_vertical_fluxes(store, time_cache, cache);
        formulate_dstorage(store, graph, time_cache, cache);
        formulate_pid_control(store, graph, time_cache, cache, u);
        cache.remember(u, t);
    }

    assemble_du(store, cache, du);
}

/// Value of a compound variable under the current caches. Look-ahead
/// shifts the sampling time of listened time series; state variables
/// have no future to peek at, their look-ahead is ignored.
pub fn compound_value<S: Scalar>(
    store: &ParameterStore,
    graph: &Graph,
    time_cache: &TimeCache,
    cache: &StateTimeCache<S>,
    variable: &CompoundVariable,
    t: f64,
) -> S {
    let mut acc = S::constant(0.0);
    for term in &variable.terms {
        let sampled: S = match (term.listen.kind, term.variable) {
            (NodeKind::Basin, ListenVariable::Level) => cache.level[term.listen.idx],
            (NodeKind::Basin, ListenVariable::Storage) => cache.storage[term.listen.idx],
            (NodeKind::LevelBoundary, ListenVariable::Level) => {
                if term.look_ahead != 0.0 {
                    S::constant(store.level_boundary.level[term.listen.idx].eval(t + term.look_ahead))
                } else {
                    S::constant(time_cache.boundary_level[term.listen.idx])
                }
            }
            (NodeKind::FlowBoundary, ListenVariable::Flow) => {
                if term.look_ahead != 0.0 {
                    S::constant(store.flow_boundary.flow_rate[term.listen.idx].eval(t + term.look_ahead))
                } else {
                    S::constant(time_cache.flow_boundary_rate[term.listen.idx])
                }
            }
            (_, ListenVariable::Flow) => match graph.inflow_link(term.listen) {
                Some(link) => cache.flow[link.flow_idx],
                None => S::constant(0.0),
            },
            // Anything else was rejected at load
            _ => S::constant(0.0),
        };
        acc = acc + sampled * term.weight;
    }
    acc
}

fn formulate_continuous_control<S: Scalar>(
    store: &ParameterStore,
    graph: &Graph,
    time_cache: &TimeCache,
    cache: &mut StateTimeCache<S>,
    t: f64,
) {
    // Working rates start from the latched time series each pass
    for i in 0..store.pump.len() {
        cache.pump_rate[i] = S::constant(time_cache.pump_rate[i]);
    }
    for i in 0..store.outlet.len() {
        cache.outlet_rate[i] = S::constant(time_cache.outlet_rate[i]);
    }

    for i in 0..store.continuous_control.len() {
        let value = compound_value(
            store,
            graph,
            time_cache,
            cache,
            &store.continuous_control.compound[i],
            t,
        );
        let output = store.continuous_control.function[i].eval_scalar(value);
        let target = store.continuous_control.target[i];
        match (target.kind, store.continuous_control.parameter[i]) {
            (NodeKind::Pump, ControlledParameter::FlowRate) => {
                cache.pump_rate[target.idx] = output;
            }
            (NodeKind::Outlet, ControlledParameter::FlowRate) => {
                cache.outlet_rate[target.idx] = output;
            }
            // Other combinations are rejected at load
            _ => {}
        }
    }
}

/// Level of a flow link endpoint, if it has one.
fn endpoint_level<S: Scalar>(
    time_cache: &TimeCache,
    cache: &StateTimeCache<S>,
    node: NodeId,
) -> Option<S> {
    match node.kind {
        NodeKind::Basin => Some(cache.level[node.idx]),
        NodeKind::LevelBoundary => Some(S::constant(time_cache.boundary_level[node.idx])),
        _ => None,
    }
}

/// Low-storage factor of an endpoint; boundaries never run dry.
fn endpoint_factor<S: Scalar>(cache: &StateTimeCache<S>, node: NodeId) -> S {
    match node.kind {
        NodeKind::Basin => cache.low_storage[node.idx],
        _ => S::constant(1.0),
    }
}

/// Hydraulic flows in a fixed per-kind order. Every structure writes the
/// same value on its inflow and its outflow link, which is what makes
/// conservation at these nodes hold by construction.
fn formulate_flows<S: Scalar>(
    store: &ParameterStore,
    graph: &Graph,
    time_cache: &TimeCache,
    cache: &mut StateTimeCache<S>,
    t: f64,
) {
    for i in 0..store.linear_resistance.len() {
        let node = store.linear_resistance.node_ids[i];
        let inflow = graph.inflow_link(node).expect("validated linear resistance");
        let outflow = graph.outflow_link(node).expect("validated linear resistance");
        let h_a = endpoint_level(time_cache, cache, inflow.from).expect("validated endpoint");
        let h_b = endpoint_level(time_cache, cache, outflow.to).expect("validated endpoint");
        let factor_a = endpoint_factor(cache, inflow.from);
        let factor_b = endpoint_factor(cache, outflow.to);
        let q = store.linear_resistance.flow(i, h_a, h_b, factor_a, factor_b);
        cache.flow[inflow.flow_idx] = q;
        cache.flow[outflow.flow_idx] = q;
    }

    for i in 0..store.manning_resistance.len() {
        let node = store.manning_resistance.node_ids[i];
        let inflow = graph.inflow_link(node).expect("validated manning resistance");
        let outflow = graph.outflow_link(node).expect("validated manning resistance");
        // Both endpoints are basins, checked at load
        let h_a = cache.level[inflow.from.idx];
        let h_b = cache.level[outflow.to.idx];
        let b_a = store.basin.profile[inflow.from.idx].bottom();
        let b_b = store.basin.profile[outflow.to.idx].bottom();
        let q_free = store.manning_resistance.flow(i, h_a, h_b, b_a, b_b);
        let q = if q_free.value() >= 0.0 {
            q_free * cache.low_storage[inflow.from.idx]
        } else {
            q_free * cache.low_storage[outflow.to.idx]
        };
        cache.flow[inflow.flow_idx] = q;
        cache.flow[outflow.flow_idx] = q;
    }

    for i in 0..store.rating_curve.len() {
        let node = store.rating_curve.node_ids[i];
        let inflow = graph.inflow_link(node).expect("validated rating curve");
        let outflow = graph.outflow_link(node).expect("validated rating curve");
        let h_up = endpoint_level(time_cache, cache, inflow.from).expect("validated endpoint");
        let factor = endpoint_factor(cache, inflow.from);
        let q = store.rating_curve.flow(i, h_up, factor);
        cache.flow[inflow.flow_idx] = q;
        cache.flow[outflow.flow_idx] = q;
    }

    for i in 0..store.pump.len() {
        let node = store.pump.node_ids[i];
        let inflow = graph.inflow_link(node).expect("validated pump");
        let outflow = graph.outflow_link(node).expect("validated pump");
        let src_level = endpoint_level(time_cache, cache, inflow.from).expect("validated endpoint");
        let q = store.pump.flow(
            cache.pump_rate[i],
            endpoint_factor(cache, inflow.from),
            src_level,
            endpoint_level(time_cache, cache, outflow.to),
            time_cache.pump_min_upstream[i],
            time_cache.pump_max_downstream[i],
            time_cache.pump_min[i],
            time_cache.pump_max[i],
        );
        cache.flow[inflow.flow_idx] = q;
        cache.flow[outflow.flow_idx] = q;
    }

    for i in 0..store.outlet.len() {
        let node = store.outlet.node_ids[i];
        let inflow = graph.inflow_link(node).expect("validated outlet");
        let outflow = graph.outflow_link(node).expect("validated outlet");
        let src_level = endpoint_level(time_cache, cache, inflow.from).expect("validated endpoint");
        let q = store.outlet.flow(
            cache.outlet_rate[i],
            endpoint_factor(cache, inflow.from),
            src_level,
            endpoint_level(time_cache, cache, outflow.to),
            time_cache.outlet_crest[i],
            time_cache.outlet_max_downstream[i],
            time_cache.outlet_min[i],
            time_cache.outlet_max[i],
        );
        cache.flow[inflow.flow_idx] = q;
        cache.flow[outflow.flow_idx] = q;
    }

    for i in 0..store.user_demand.len() {
        let node = store.user_demand.node_ids[i];
        let inflow = graph.inflow_link(node).expect("validated user demand");
        let outflow = graph.outflow_link(node).expect("validated user demand");
        let src_level = endpoint_level(time_cache, cache, inflow.from).expect("validated endpoint");
        let (q_in, q_out) =
            store
                .user_demand
                .flow(i, t, endpoint_factor(cache, inflow.from), src_level);
        cache.flow[inflow.flow_idx] = q_in;
        cache.flow[outflow.flow_idx] = q_out;
    }

    for i in 0..store.flow_boundary.len() {
        let node = store.flow_boundary.node_ids[i];
        if let Some(outflow) = graph.outflow_link(node) {
            cache.flow[outflow.flow_idx] = S::constant(time_cache.flow_boundary_rate[i]);
        }
    }
}

/// Evaporation and infiltration, smoothed to zero as the basin dries.
fn formulate_vertical_fluxes<S: Scalar>(
    store: &ParameterStore,
    time_cache: &TimeCache,
    cache: &mut StateTimeCache<S>,
) {
    for b in 0..store.basin.len() {
        let depth = cache.level[b] - store.basin.profile[b].bottom();
        let factor = wet_depth_factor(depth);
        cache.evaporation[b] = factor * cache.area[b] * time_cache.basin_evap_potential[b];
        cache.infiltration[b] = factor * time_cache.basin_infiltration_potential[b];
    }
}

/// Basin storage derivatives: net link flow plus vertical fluxes. The
/// PID pass reads these before applying its own correction.
fn formulate_dstorage<S: Scalar>(
    store: &ParameterStore,
    graph: &Graph,
    time_cache: &TimeCache,
    cache: &mut StateTimeCache<S>,
) {
    for b in 0..store.basin.len() {
        let node = store.basin.node_ids[b];
        let mut rate = S::constant(time_cache.basin_forcing_rate[b])
            - cache.evaporation[b]
            - cache.infiltration[b];
        for link in graph.inflow_links(node) {
            rate = rate + cache.flow[link.flow_idx];
        }
        for link in graph.outflow_links(node) {
            rate = rate - cache.flow[link.flow_idx];
        }
        cache.dstorage[b] = rate;
    }
}

/// Gather the cached flows into the state derivative.
fn assemble_du<S: Scalar>(store: &ParameterStore, cache: &StateTimeCache<S>, du: &mut [S]) {
    for v in du.iter_mut() {
        *v = S::constant(0.0);
    }
    for (flow_idx, state) in store.incidence.flow_state.iter().enumerate() {
        if let Some(s) = state {
            du[*s] = cache.flow[flow_idx];
        }
    }
    for b in 0..store.basin.len() {
        du[store.layout.index(StateComponent::Evaporation, b)] = cache.evaporation[b];
        du[store.layout.index(StateComponent::Infiltration, b)] = cache.infiltration[b];
    }
    for i in 0..store.pid_control.len() {
        du[store.layout.index(StateComponent::PidIntegral, i)] = cache.pid_error[i];
    }
}
