use tracing::{info, warn};

use crate::cache::{StateTimeCache, TimeCache};
use crate::control::{ControlUpdate, ControlValue};
use crate::network::graph::{Graph, NodeId, NodeKind};
use crate::nodes::ControlledParameter;
use crate::solver::rhs::compound_value;
use crate::store::ParameterStore;

/// One row of the append-only transition log.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlTransition {
    pub t: f64,
    pub node: NodeId,
    pub truth_state: String,
    pub control_state: String,
}

/// Signed distance of every condition to its currently armed threshold.
/// A condition that is false arms its high threshold, a true one its low
/// threshold; the integrator watches these values for zero crossings
/// between accepted steps. The hysteresis band is exactly the gap the
/// armed threshold jumps over on a transition.
pub fn condition_values(
    store: &ParameterStore,
    graph: &Graph,
    time_cache: &TimeCache,
    cache: &StateTimeCache<f64>,
    t: f64,
) -> Vec<f64> {
    let mut values = vec![];
    for i in 0..store.discrete_control.len() {
        for (c, condition) in store.discrete_control.conditions[i].iter().enumerate() {
            let compound = compound_value(
                store,
                graph,
                time_cache,
                cache,
                &store.discrete_control.compound_variables[i][condition.compound],
                t,
            );
            let threshold = if store.discrete_control.truth_state[i][c] {
                condition.threshold_low
            } else {
                condition.threshold_high
            };
            values.push(compound - threshold);
        }
    }
    values
}

/// Re-evaluate every condition, flip truth states that crossed their
/// armed threshold, and apply the parameter updates of newly active
/// control states. Returns the transitions that fired.
pub fn check_transitions(
    store: &mut ParameterStore,
    graph: &Graph,
    time_cache: &TimeCache,
    cache: &StateTimeCache<f64>,
    t: f64,
) -> Vec<ControlTransition> {
    let mut transitions = vec![];

    for i in 0..store.discrete_control.len() {
        let mut changed = false;
        for c in 0..store.discrete_control.conditions[i].len() {
            let condition = &store.discrete_control.conditions[i][c];
            let compound = compound_value(
                store,
                graph,
                time_cache,
                cache,
                &store.discrete_control.compound_variables[i][condition.compound],
                t,
            );
            let was_true = store.discrete_control.truth_state[i][c];
            let is_true = if was_true {
                // Stays armed until the low threshold clears it
                compound >= condition.threshold_low
            } else {
                compound >= condition.threshold_high
            };
            if is_true != was_true {
                store.discrete_control.truth_state[i][c] = is_true;
                changed = true;
            }
        }
        if !changed {
            continue;
        }

        let node = store.discrete_control.node_ids[i];
        let truth = store.discrete_control.truth_string(i);
        let Some(control_state) = store.discrete_control.logic[i].get(&truth).cloned() else {
            warn!(
                node = %node,
                truth_state = %truth,
                "truth state has no control state mapped, keeping the previous one"
            );
            continue;
        };
        if control_state == store.discrete_control.active_state[i] {
            continue;
        }

        info!(node = %node, truth_state = %truth, control_state = %control_state, t, "control transition");
        let updates = store
            .control_mappings
            .get(&(node, control_state.clone()))
            .cloned()
            .unwrap_or_default();
        for update in updates {
            apply_update(store, &update);
        }
        store.discrete_control.active_state[i] = control_state.clone();
        transitions.push(ControlTransition {
            t,
            node,
            truth_state: truth,
            control_state,
        });
    }

    transitions
}

/// Write one parameter update into the store. The transition handler is
/// the designated writer for every cell touched here.
pub fn apply_update(store: &mut ParameterStore, update: &ControlUpdate) {
    let target = update.target;
    match (target.kind, update.parameter, &update.value) {
        (NodeKind::Pump, ControlledParameter::FlowRate, ControlValue::Series(s)) => {
            store.pump.flow_rate[target.idx] = s.clone();
        }
        (NodeKind::Pump, ControlledParameter::MinFlowRate, ControlValue::Series(s)) => {
            store.pump.min_flow_rate[target.idx] = s.clone();
        }
        (NodeKind::Pump, ControlledParameter::MaxFlowRate, ControlValue::Series(s)) => {
            store.pump.max_flow_rate[target.idx] = s.clone();
        }
        (NodeKind::Outlet, ControlledParameter::FlowRate, ControlValue::Series(s)) => {
            store.outlet.flow_rate[target.idx] = s.clone();
        }
        (NodeKind::Outlet, ControlledParameter::MinFlowRate, ControlValue::Series(s)) => {
            store.outlet.min_flow_rate[target.idx] = s.clone();
        }
        (NodeKind::Outlet, ControlledParameter::MaxFlowRate, ControlValue::Series(s)) => {
            store.outlet.max_flow_rate[target.idx] = s.clone();
        }
        (NodeKind::LinearResistance, ControlledParameter::Resistance, ControlValue::Scalar(v)) => {
            store.linear_resistance.resistance[target.idx] = *v;
        }
        (NodeKind::TabulatedRatingCurve, ControlledParameter::RatingTable, ControlValue::Index(k)) => {
            store.rating_curve.active[target.idx] = *k;
        }
        (NodeKind::PidControl, ControlledParameter::Active, ControlValue::Bool(b)) => {
            store.pid_control.active[target.idx] = *b;
        }
        _ => {
            warn!(target = %target, "unsupported control update target, ignored");
        }
    }
}
