use crate::nodes::compound::CompoundVariable;
use crate::numerical::interpolation::Interpolation;
use crate::network::graph::NodeId;

/// Which parameter of the controlled node a controller writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlledParameter {
    FlowRate,
    MinFlowRate,
    MaxFlowRate,
    Resistance,
    /// Index of the active rating-curve table variant.
    RatingTable,
    /// Whether a PID controller is engaged.
    Active,
}

impl ControlledParameter {
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "flow_rate" => ControlledParameter::FlowRate,
            "min_flow_rate" => ControlledParameter::MinFlowRate,
            "max_flow_rate" => ControlledParameter::MaxFlowRate,
            "resistance" => ControlledParameter::Resistance,
            "rating_table" => ControlledParameter::RatingTable,
            "active" => ControlledParameter::Active,
            _ => return None,
        })
    }
}

/// Function-table control: the compound variable is pushed through a
/// piecewise linear table and the result lands on one parameter of one
/// node, re-evaluated on every right-hand-side call.
#[derive(Default)]
pub struct ContinuousControl {
    pub node_ids: Vec<NodeId>,
    pub compound: Vec<CompoundVariable>,
    pub function: Vec<Interpolation>,
    pub target: Vec<NodeId>,
    pub parameter: Vec<ControlledParameter>,
}

impl ContinuousControl {
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
