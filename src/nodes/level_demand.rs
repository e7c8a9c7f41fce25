use crate::numerical::interpolation::Interpolation;
use crate::network::graph::NodeId;

/// Storage demand on a basin, expressed as a band of levels: allocation
/// tries to refill the basin to the minimum level at this node's
/// priority and may draw it down to the maximum level for lower
/// priority demands elsewhere.
#[derive(Default)]
pub struct LevelDemand {
    pub node_ids: Vec<NodeId>,
    pub min_level: Vec<Interpolation>,
    pub max_level: Vec<Interpolation>,
    pub priority: Vec<u32>,
    /// Target basin, resolved over the control link.
    pub target_basin: Vec<NodeId>,
}

impl LevelDemand {
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
