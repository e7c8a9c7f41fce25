use std::collections::HashMap;

use crate::control::ControlUpdate;
use crate::network::graph::{Graph, NodeId, NodeKind};
use crate::nodes::{
    Basin, ContinuousControl, DiscreteControl, FlowBoundary, FlowDemand, LevelBoundary,
    LevelDemand, LinearResistance, ManningResistance, Outlet, PidControl, Pump,
    TabulatedRatingCurve, UserDemand,
};
use crate::state::{build_incidence, StateLayout, StorageIncidence};

/// The parameter store: one struct-of-arrays per node kind plus the
/// derived state bookkeeping. Built once at load; afterwards its shape
/// is frozen and only designated writers touch its numeric buffers (the
/// discrete-control transition handler, the allocation writer, and the
/// rating curve switch callback).
#[derive(Default)]
pub struct ParameterStore {
    pub basin: Basin,
    pub flow_boundary: FlowBoundary,
    pub level_boundary: LevelBoundary,
    pub linear_resistance: LinearResistance,
    pub manning_resistance: ManningResistance,
    pub rating_curve: TabulatedRatingCurve,
    pub pump: Pump,
    pub outlet: Outlet,
    pub user_demand: UserDemand,
    pub level_demand: LevelDemand,
    pub flow_demand: FlowDemand,
    pub discrete_control: DiscreteControl,
    pub continuous_control: ContinuousControl,
    pub pid_control: PidControl,

    /// Parameter updates per (discrete control node, control state).
    pub control_mappings: HashMap<(NodeId, String), Vec<ControlUpdate>>,

    /// Allocation subnetwork id per node; 0 means none.
    pub node_subnetwork: HashMap<NodeId, u32>,

    /// All demand priorities in the model, ascending. Demand and
    /// allocation arrays are aligned with this list.
    pub priorities: Vec<u32>,

    /// Opt-in lower bound on the magnitude of the PID derivative-term
    /// denominator. Off by default: a vanishing denominator then
    /// surfaces as divergence rather than silently altered numerics.
    pub pid_derivative_floor: Option<f64>,

    pub layout: StateLayout,
    pub incidence: StorageIncidence,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the state layout and the storage incidence once every
    /// parameter array is filled.
    pub fn finalize(&mut self, graph: &Graph) {
        self.layout = StateLayout::new(
            self.rating_curve.len(),
            self.pump.len(),
            self.outlet.len(),
            self.user_demand.len(),
            self.linear_resistance.len(),
            self.manning_resistance.len(),
            self.basin.len(),
            self.pid_control.len(),
        );
        self.incidence = build_incidence(graph, &self.layout, self.basin.len());
    }

    /// The reduced initial state: cumulative flows and PID integrals all
    /// start at zero.
    pub fn initial_state(&self) -> Vec<f64> {
        vec![0.0; self.layout.len()]
    }

    /// Number of dense entries for a node kind.
    pub fn kind_count(&self, kind: NodeKind) -> usize {
        match kind {
            NodeKind::Basin => self.basin.len(),
            NodeKind::FlowBoundary => self.flow_boundary.len(),
            NodeKind::LevelBoundary => self.level_boundary.len(),
            NodeKind::LinearResistance => self.linear_resistance.len(),
            NodeKind::ManningResistance => self.manning_resistance.len(),
            NodeKind::TabulatedRatingCurve => self.rating_curve.len(),
            NodeKind::Pump => self.pump.len(),
            NodeKind::Outlet => self.outlet.len(),
            NodeKind::UserDemand => self.user_demand.len(),
            NodeKind::LevelDemand => self.level_demand.len(),
            NodeKind::FlowDemand => self.flow_demand.len(),
            NodeKind::DiscreteControl => self.discrete_control.len(),
            NodeKind::ContinuousControl => self.continuous_control.len(),
            NodeKind::PidControl => self.pid_control.len(),
            NodeKind::Terminal | NodeKind::Junction => 0,
        }
    }

    /// Index of a priority in the global ascending list.
    pub fn priority_index(&self, priority: u32) -> usize {
        self.priorities
            .iter()
            .position(|&p| p == priority)
            .unwrap_or(0)
    }

    /// Every breakpoint of every time series in the store. The
    /// scheduler uses these to make the integrator land exactly on
    /// forcing discontinuities.
    pub fn collect_breakpoints(&self, out: &mut Vec<f64>) {
        let mut push = |itp: &crate::numerical::interpolation::Interpolation| {
            if !itp.is_constant() {
                out.extend_from_slice(itp.breakpoints());
            }
        };
        for i in 0..self.basin.len() {
            push(&self.basin.precipitation[i]);
            push(&self.basin.surface_runoff[i]);
            push(&self.basin.drainage[i]);
            push(&self.basin.evaporation[i]);
            push(&self.basin.infiltration[i]);
        }
        for itp in &self.flow_boundary.flow_rate {
            push(itp);
        }
        for itp in &self.level_boundary.level {
            push(itp);
        }
        for i in 0..self.pump.len() {
            push(&self.pump.flow_rate[i]);
            push(&self.pump.min_flow_rate[i]);
            push(&self.pump.max_flow_rate[i]);
            push(&self.pump.min_upstream_level[i]);
            push(&self.pump.max_downstream_level[i]);
        }
        for i in 0..self.outlet.len() {
            push(&self.outlet.flow_rate[i]);
            push(&self.outlet.min_flow_rate[i]);
            push(&self.outlet.max_flow_rate[i]);
            push(&self.outlet.min_upstream_level[i]);
            push(&self.outlet.max_downstream_level[i]);
        }
        for i in 0..self.pid_control.len() {
            push(&self.pid_control.target[i]);
            push(&self.pid_control.proportional[i]);
            push(&self.pid_control.integral[i]);
            push(&self.pid_control.derivative[i]);
        }
        for demands in &self.user_demand.demand {
            for itp in demands {
                push(itp);
            }
        }
        for i in 0..self.level_demand.len() {
            push(&self.level_demand.min_level[i]);
            push(&self.level_demand.max_level[i]);
        }
        for itp in &self.flow_demand.demand {
            push(itp);
        }
    }
}
