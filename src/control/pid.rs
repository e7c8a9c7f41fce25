//! The PID pass of the right-hand side. Runs last: it may overwrite the
//! flows a pump or outlet wrote earlier in the same call, and patches
//! the affected basin derivatives to match.

use crate::cache::{StateTimeCache, TimeCache};
use crate::network::graph::{Graph, NodeId, NodeKind};
use crate::nodes::{Outlet, Pump};
use crate::numerical::dual::Scalar;
use crate::state::StateComponent;
use crate::store::ParameterStore;

/// The derivative term feeds back into the listened basin's own
/// derivative through the controlled flow, giving an implicit equation;
/// the denominator D resolves it in closed form.
pub fn formulate_pid_control<S: Scalar>(
    store: &ParameterStore,
    graph: &Graph,
    time_cache: &TimeCache,
    cache: &mut StateTimeCache<S>,
    u: &[S],
) {
    for i in 0..store.pid_control.len() {
        if !store.pid_control.active[i] {
            cache.pid_error[i] = S::constant(0.0);
            continue;
        }
        let listen = store.pid_control.listen[i];
        let error = -cache.level[listen.idx] + time_cache.pid_target[i];
        cache.pid_error[i] = error;

        let controlled = store.pid_control.controlled[i];
        let inflow = graph.inflow_link(controlled).expect("validated pid target");
        let outflow = graph.outflow_link(controlled).expect("validated pid target");
        let src_factor = match inflow.from.kind {
            NodeKind::Basin => cache.low_storage[inflow.from.idx],
            _ => S::constant(1.0),
        };
        let src_level = level_of(time_cache, cache, inflow.from).expect("validated endpoint");
        let dst_level = level_of(time_cache, cache, outflow.to);

        let (factor, min_rate, max_rate) = match controlled.kind {
            NodeKind::Pump => (
                Pump::reduction(
                    src_factor,
                    src_level,
                    dst_level,
                    time_cache.pump_min_upstream[controlled.idx],
                    time_cache.pump_max_downstream[controlled.idx],
                ),
                time_cache.pump_min[controlled.idx],
                time_cache.pump_max[controlled.idx],
            ),
            NodeKind::Outlet => (
                Outlet::reduction(
                    src_factor,
                    src_level,
                    dst_level,
                    time_cache.outlet_crest[controlled.idx],
                    time_cache.outlet_max_downstream[controlled.idx],
                ),
                time_cache.outlet_min[controlled.idx],
                time_cache.outlet_max[controlled.idx],
            ),
            _ => continue,
        };
        let flow_sign = pid_flow_sign(listen, inflow.from, outflow.to);

        let kp = time_cache.pid_kp[i];
        let ki = time_cache.pid_ki[i];
        let kd = time_cache.pid_kd[i];
        let area = cache.area[listen.idx];

        // The controlled flow contributes -sign * q to the listened
        // basin, hence the feedback denominator.
        let mut denominator = -(factor * (flow_sign * kd)) / area + 1.0;
        if let Some(floor) = store.pid_derivative_floor {
            if denominator.value().abs() < floor {
                let sign = if denominator.value() < 0.0 { -1.0 } else { 1.0 };
                denominator = S::constant(sign * floor);
            }
        }

        let dlevel_old = cache.dstorage[listen.idx] / area;
        let integral = u[store.layout.index(StateComponent::PidIntegral, i)];
        let q = factor / denominator
            * (error * kp + integral * ki + (-dlevel_old + time_cache.pid_target_derivative[i]) * kd);
        let q = q.max(S::constant(min_rate)).min(S::constant(max_rate));

        // Overwrite the structure's links and patch the affected basins
        let q_old = cache.flow[inflow.flow_idx];
        let delta = q - q_old;
        cache.flow[inflow.flow_idx] = q;
        cache.flow[outflow.flow_idx] = q;
        if inflow.from.kind == NodeKind::Basin {
            cache.dstorage[inflow.from.idx] = cache.dstorage[inflow.from.idx] - delta;
        }
        if outflow.to.kind == NodeKind::Basin {
            cache.dstorage[outflow.to.idx] = cache.dstorage[outflow.to.idx] + delta;
        }
    }
}

fn level_of<S: Scalar>(
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

/// +1 when the controlled structure drains the listened basin, -1 when
/// it fills it. Determines the direction of the derivative feedback.
fn pid_flow_sign(listen: NodeId, src: NodeId, dst: NodeId) -> f64 {
    if src == listen {
        1.0
    } else if dst == listen {
        -1.0
    } else {
        0.0
    }
}
