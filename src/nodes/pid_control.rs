use crate::numerical::interpolation::Interpolation;
use crate::network::graph::NodeId;

/// Level regulation of a basin through a pump or outlet. Each node owns
/// one extra ODE state, the integral of the level error; gains and the
/// target level are time series.
#[derive(Default)]
pub struct PidControl {
    pub node_ids: Vec<NodeId>,
    /// Basin whose level is regulated.
    pub listen: Vec<NodeId>,
    /// Pump or outlet whose flow rate is written.
    pub controlled: Vec<NodeId>,
    pub target: Vec<Interpolation>,
    pub proportional: Vec<Interpolation>,
    pub integral: Vec<Interpolation>,
    pub derivative: Vec<Interpolation>,
    /// A discrete control transition may disengage a controller; the
    /// controlled structure then falls back to its own flow rate.
    pub active: Vec<bool>,
}

impl PidControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }
}
