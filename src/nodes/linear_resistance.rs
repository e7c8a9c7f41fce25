use crate::numerical::dual::Scalar;
use crate::network::graph::NodeId;

/// Flow proportional to the head difference over the link, clamped to a
/// maximum magnitude.
#[derive(Default)]
pub struct LinearResistance {
    pub node_ids: Vec<NodeId>,
    pub resistance: Vec<f64>,
    pub max_flow_rate: Vec<f64>,
}

impl LinearResistance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    /// Q = clamp((h_a - h_b)/R, +-Qmax), reduced by the low-storage
    /// factor of whichever side is being drained.
    pub fn flow<S: Scalar>(&self, i: usize, h_a: S, h_b: S, factor_a: S, factor_b: S) -> S {
        let qmax = self.max_flow_rate[i];
        let q = ((h_a - h_b) / self.resistance[i])
            .min(S::constant(qmax))
            .max(S::constant(-qmax));
        if q.value() >= 0.0 {
            q * factor_a
        } else {
            q * factor_b
        }
    }
}
