use crate::network::graph::NodeId;

/// What a controller samples from a listened node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenVariable {
    /// Water level of a basin or level boundary.
    Level,
    /// Storage of a basin.
    Storage,
    /// Flow over the listened structure.
    Flow,
}

impl ListenVariable {
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "level" => ListenVariable::Level,
            "storage" => ListenVariable::Storage,
            "flow_rate" | "flow" => ListenVariable::Flow,
            _ => return None,
        })
    }
}

/// One weighted observation inside a compound variable. The look-ahead
/// shifts the sampling time of listened time series, so a controller can
/// act on a forcing it knows is coming.
#[derive(Clone, Debug)]
pub struct CompoundTerm {
    pub listen: NodeId,
    pub variable: ListenVariable,
    pub weight: f64,
    pub look_ahead: f64,
}

/// A weighted sum of observations, the quantity controllers compare
/// against thresholds or feed through function tables.
#[derive(Clone, Debug, Default)]
pub struct CompoundVariable {
    pub terms: Vec<CompoundTerm>,
}
