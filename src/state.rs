use std::ops::Range;

use crate::network::graph::{Graph, NodeKind};

/// The ODE state is made of cumulative flows plus the PID integrals:
/// integrating flows instead of juggling storages directly lets the
/// solver step adaptively while storages are reconstructed exactly.
/// The component order below is declared once and never reshuffled
/// during a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StateComponent {
    RatingCurve,
    Pump,
    Outlet,
    UserDemandInflow,
    UserDemandOutflow,
    LinearResistance,
    ManningResistance,
    Evaporation,
    Infiltration,
    PidIntegral,
}

pub const STATE_COMPONENTS: [StateComponent; 10] = [
    StateComponent::RatingCurve,
    StateComponent::Pump,
    StateComponent::Outlet,
    StateComponent::UserDemandInflow,
    StateComponent::UserDemandOutflow,
    StateComponent::LinearResistance,
    StateComponent::ManningResistance,
    StateComponent::Evaporation,
    StateComponent::Infiltration,
    StateComponent::PidIntegral,
];

/// Partition of the state vector into named ranges, one per component.
#[derive(Clone, Debug, Default)]
pub struct StateLayout {
    offsets: [usize; 10],
    counts: [usize; 10],
    total: usize,
}

impl StateLayout {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        n_rating_curve: usize,
        n_pump: usize,
        n_outlet: usize,
        n_user_demand: usize,
        n_linear_resistance: usize,
        n_manning_resistance: usize,
        n_basin: usize,
        n_pid: usize,
    ) -> Self {
        let counts = [
            n_rating_curve,
            n_pump,
            n_outlet,
            n_user_demand,
            n_user_demand,
            n_linear_resistance,
            n_manning_resistance,
            n_basin,
            n_basin,
            n_pid,
        ];
        let mut offsets = [0usize; 10];
        let mut total = 0;
        for (k, &c) in counts.iter().enumerate() {
            offsets[k] = total;
            total += c;
        }
        Self {
            offsets,
            counts,
            total,
        }
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Flat state index of the i-th node of a component.
    pub fn index(&self, component: StateComponent, i: usize) -> usize {
        let k = component as usize;
        debug_assert!(i < self.counts[k]);
        self.offsets[k] + i
    }

    pub fn range(&self, component: StateComponent) -> Range<usize> {
        let k = component as usize;
        self.offsets[k]..self.offsets[k] + self.counts[k]
    }

    pub fn count(&self, component: StateComponent) -> usize {
        self.counts[component as usize]
    }
}

/// Sparse incidence of the state vector on basin storages, one row of
/// (state index, +-1) pairs per basin, plus the per-flow-link state
/// index the right-hand side writes through.
#[derive(Clone, Debug, Default)]
pub struct StorageIncidence {
    /// rows[basin idx] lists (state index, coefficient).
    pub rows: Vec<Vec<(usize, f64)>>,
    /// State index behind each dense flow index; None for flow
    /// boundary links, whose volume integrates analytically.
    pub flow_state: Vec<Option<usize>>,
    /// Flow boundary indices feeding each basin.
    pub boundary_inflows: Vec<Vec<usize>>,
}

/// The state component that carries a structure's cumulative flow.
fn flow_component(kind: NodeKind) -> Option<StateComponent> {
    Some(match kind {
        NodeKind::TabulatedRatingCurve => StateComponent::RatingCurve,
        NodeKind::Pump => StateComponent::Pump,
        NodeKind::Outlet => StateComponent::Outlet,
        NodeKind::LinearResistance => StateComponent::LinearResistance,
        NodeKind::ManningResistance => StateComponent::ManningResistance,
        _ => return None,
    })
}

pub fn build_incidence(graph: &Graph, layout: &StateLayout, n_basin: usize) -> StorageIncidence {
    let mut rows = vec![vec![]; n_basin];
    let mut flow_state = vec![None; graph.flow_count()];
    let mut boundary_inflows = vec![vec![]; n_basin];

    for link in graph.internal_links() {
        // Which state does this link's flow integrate into?
        let state = if link.from.kind == NodeKind::UserDemand {
            Some(layout.index(StateComponent::UserDemandOutflow, link.from.idx))
        } else if link.to.kind == NodeKind::UserDemand {
            Some(layout.index(StateComponent::UserDemandInflow, link.to.idx))
        } else if let Some(component) = flow_component(link.from.kind) {
            Some(layout.index(component, link.from.idx))
        } else if let Some(component) = flow_component(link.to.kind) {
            Some(layout.index(component, link.to.idx))
        } else {
            None
        };
        flow_state[link.flow_idx] = state;

        match state {
            Some(s) => {
                if link.to.kind == NodeKind::Basin {
                    rows[link.to.idx].push((s, 1.0));
                }
                if link.from.kind == NodeKind::Basin {
                    rows[link.from.idx].push((s, -1.0));
                }
            }
            None => {
                // Only flow boundaries write flows without a state
                if link.from.kind == NodeKind::FlowBoundary && link.to.kind == NodeKind::Basin {
                    boundary_inflows[link.to.idx].push(link.from.idx);
                }
            }
        }
    }

    // Vertical losses carried as states
    for b in 0..n_basin {
        rows[b].push((layout.index(StateComponent::Evaporation, b), -1.0));
        rows[b].push((layout.index(StateComponent::Infiltration, b), -1.0));
    }

    StorageIncidence {
        rows,
        flow_state,
        boundary_inflows,
    }
}
