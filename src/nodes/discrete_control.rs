use std::collections::HashMap;

use crate::nodes::compound::CompoundVariable;
use crate::network::graph::NodeId;

/// One threshold pair on a compound variable. The high threshold arms
/// the condition, the low threshold clears it: in between the condition
/// keeps its previous truth value, which is what gives the controller
/// hysteresis instead of chatter.
#[derive(Clone, Debug)]
pub struct Condition {
    /// Index into the owning node's compound variable list.
    pub compound: usize,
    pub threshold_high: f64,
    pub threshold_low: f64,
}

/// Truth-state driven parameter switching. The concatenated condition
/// booleans form a truth state string ("TF..." style), the logic table
/// maps it to a named control state, and the store applies that state's
/// parameter updates on transition.
#[derive(Default)]
pub struct DiscreteControl {
    pub node_ids: Vec<NodeId>,
    pub compound_variables: Vec<Vec<CompoundVariable>>,
    pub conditions: Vec<Vec<Condition>>,
    /// Truth state to control state, wildcards already expanded.
    pub logic: Vec<HashMap<String, String>>,

    // Runtime state, owned by the transition handler.
    pub truth_state: Vec<Vec<bool>>,
    pub active_state: Vec<String>,
}

impl DiscreteControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    pub fn truth_string(&self, i: usize) -> String {
        self.truth_state[i]
            .iter()
            .map(|&b| if b { 'T' } else { 'F' })
            .collect()
    }
}

/// Expand `*` wildcards in a logic table key to all concrete truth
/// states. "T*" becomes "TT" and "TF".
pub fn expand_wildcards(state: &str) -> Vec<String> {
    let mut states = vec![String::new()];
    for c in state.chars() {
        let choices: &[char] = match c {
            '*' => &['T', 'F'],
            other => {
                states.iter_mut().for_each(|s| s.push(other));
                continue;
            }
        };
        let mut expanded = Vec::with_capacity(states.len() * choices.len());
        for s in &states {
            for &c in choices {
                let mut e = s.clone();
                e.push(c);
                expanded.push(e);
            }
        }
        states = expanded;
    }
    states
}
