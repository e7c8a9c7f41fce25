use crate::numerical::dual::Scalar;
use crate::numerical::interpolation::Interpolation;
use crate::numerical::smoothing::wet_depth_factor;
use crate::network::graph::NodeId;

/// Abstraction from a basin with an immediate partial return flow.
/// Demands are stacked per allocation priority; what may actually be
/// taken is the per-priority minimum of demand and allocation. Without
/// an allocation layer the allocated amounts stay infinite and demand
/// alone drives the abstraction.
#[derive(Default)]
pub struct UserDemand {
    pub node_ids: Vec<NodeId>,
    /// demand[user][priority index], aligned with the store's global
    /// priority list.
    pub demand: Vec<Vec<Interpolation>>,
    /// allocated[user][priority index], written by the allocation
    /// callback.
    pub allocated: Vec<Vec<f64>>,
    /// Which priorities this user actually declared a demand at; the
    /// demand record only reports declared pairs.
    pub has_priority: Vec<Vec<bool>>,
    pub return_factor: Vec<Interpolation>,
    /// Abstraction fades out as the source level approaches this.
    pub min_level: Vec<f64>,
}

impl UserDemand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    /// Total demand across priorities at time t.
    pub fn total_demand(&self, i: usize, t: f64) -> f64 {
        self.demand[i].iter().map(|d| d.eval(t)).sum()
    }

    /// Abstracted inflow and the returned outflow.
    pub fn flow<S: Scalar>(&self, i: usize, t: f64, src_factor: S, src_level: S) -> (S, S) {
        let mut rate = 0.0;
        for (p, demand) in self.demand[i].iter().enumerate() {
            rate += demand.eval(t).min(self.allocated[i][p]);
        }
        let factor = src_factor * wet_depth_factor(src_level - self.min_level[i]);
        let q_in = factor * rate;
        let q_out = q_in * self.return_factor[i].eval(t);
        (q_in, q_out)
    }
}
