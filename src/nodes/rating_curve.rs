use crate::numerical::dual::Scalar;
use crate::numerical::interpolation::{IndexLookup, Interpolation};
use crate::network::graph::NodeId;

/// Discharge as a tabulated, piecewise monotone function of the
/// upstream level. A node may carry several table variants: scheduled
/// switches pick the variant by time, a discrete control transition may
/// swap it outright. During integration the active table is a constant,
/// the swap happens between integrator steps.
#[derive(Default)]
pub struct TabulatedRatingCurve {
    pub node_ids: Vec<NodeId>,
    /// Table variants per node; `active` selects one.
    pub tables: Vec<Vec<Interpolation>>,
    pub active: Vec<usize>,
    /// Scheduled time-to-variant switching, None for static curves.
    pub switch: Vec<Option<IndexLookup>>,
}

impl TabulatedRatingCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    /// Q = phi_low(upstream storage) * table(upstream level).
    pub fn flow<S: Scalar>(&self, i: usize, h_up: S, factor_up: S) -> S {
        let table = &self.tables[i][self.active[i]];
        factor_up * table.eval_scalar(h_up)
    }
}
