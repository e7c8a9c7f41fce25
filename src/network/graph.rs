use std::collections::HashMap;
use std::fmt;

use crate::errors::{ValidationIssue, ValidationReport};

/// Every node kind the engine knows. The set is closed: the right-hand
/// side dispatches over a fixed ordered table of these, there is no
/// user-defined extension point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Basin,
    FlowBoundary,
    LevelBoundary,
    LinearResistance,
    ManningResistance,
    TabulatedRatingCurve,
    Pump,
    Outlet,
    Terminal,
    Junction,
    DiscreteControl,
    ContinuousControl,
    PidControl,
    UserDemand,
    LevelDemand,
    FlowDemand,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Basin => "Basin",
            NodeKind::FlowBoundary => "FlowBoundary",
            NodeKind::LevelBoundary => "LevelBoundary",
            NodeKind::LinearResistance => "LinearResistance",
            NodeKind::ManningResistance => "ManningResistance",
            NodeKind::TabulatedRatingCurve => "TabulatedRatingCurve",
            NodeKind::Pump => "Pump",
            NodeKind::Outlet => "Outlet",
            NodeKind::Terminal => "Terminal",
            NodeKind::Junction => "Junction",
            NodeKind::DiscreteControl => "DiscreteControl",
            NodeKind::ContinuousControl => "ContinuousControl",
            NodeKind::PidControl => "PidControl",
            NodeKind::UserDemand => "UserDemand",
            NodeKind::LevelDemand => "LevelDemand",
            NodeKind::FlowDemand => "FlowDemand",
        }
    }

    pub fn from_str(s: &str) -> Option<NodeKind> {
        Some(match s {
            "Basin" => NodeKind::Basin,
            "FlowBoundary" => NodeKind::FlowBoundary,
            "LevelBoundary" => NodeKind::LevelBoundary,
            "LinearResistance" => NodeKind::LinearResistance,
            "ManningResistance" => NodeKind::ManningResistance,
            "TabulatedRatingCurve" => NodeKind::TabulatedRatingCurve,
            "Pump" => NodeKind::Pump,
            "Outlet" => NodeKind::Outlet,
            "Terminal" => NodeKind::Terminal,
            "Junction" => NodeKind::Junction,
            "DiscreteControl" => NodeKind::DiscreteControl,
            "ContinuousControl" => NodeKind::ContinuousControl,
            "PidControl" => NodeKind::PidControl,
            "UserDemand" => NodeKind::UserDemand,
            "LevelDemand" => NodeKind::LevelDemand,
            "FlowDemand" => NodeKind::FlowDemand,
            _ => return None,
        })
    }

    /// Kinds that compute a flow of their own and write it onto their
    /// incident flow links.
    pub fn writes_flow(&self) -> bool {
        matches!(
            self,
            NodeKind::FlowBoundary
                | NodeKind::LinearResistance
                | NodeKind::ManningResistance
                | NodeKind::TabulatedRatingCurve
                | NodeKind::Pump
                | NodeKind::Outlet
                | NodeKind::UserDemand
        )
    }

    /// Kinds that can terminate a flow path: they accept whatever flow
    /// their neighbours put on the shared link.
    pub fn is_passive(&self) -> bool {
        matches!(
            self,
            NodeKind::Basin | NodeKind::LevelBoundary | NodeKind::Terminal
        )
    }

    /// Kinds whose inflow must equal their outflow at all times.
    pub fn is_conservative(&self) -> bool {
        matches!(
            self,
            NodeKind::LinearResistance
                | NodeKind::ManningResistance
                | NodeKind::TabulatedRatingCurve
                | NodeKind::Pump
                | NodeKind::Outlet
        )
    }

    pub fn is_control(&self) -> bool {
        matches!(
            self,
            NodeKind::DiscreteControl
                | NodeKind::ContinuousControl
                | NodeKind::PidControl
                | NodeKind::LevelDemand
                | NodeKind::FlowDemand
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node reference: kind, the external integer id, and the dense index
/// into the kind's parameter arrays. Identity is (kind, id); the index
/// is derived and carried along for O(1) parameter access.
#[derive(Clone, Copy, Debug)]
pub struct NodeId {
    pub kind: NodeKind,
    pub id: i64,
    pub idx: usize,
}

impl NodeId {
    pub fn new(kind: NodeKind, id: i64, idx: usize) -> Self {
        Self { kind, id, idx }
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

impl Eq for NodeId {}

impl std::hash::Hash for NodeId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind, self.id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkKind {
    Flow,
    Control,
}

/// A link as declared in the input, kept for the external (output) view.
#[derive(Clone, Debug)]
pub struct LinkMetadata {
    pub id: i64,
    pub from: NodeId,
    pub to: NodeId,
    pub kind: LinkKind,
    /// 0 means the link belongs to no allocation subnetwork.
    pub subnetwork: u32,
}

/// A flow link in the junction-collapsed view. Its index in the graph's
/// internal list doubles as the dense flow index.
#[derive(Clone, Debug)]
pub struct InternalFlowLink {
    pub from: NodeId,
    pub to: NodeId,
    pub flow_idx: usize,
    /// External link indices this internal link passes through, in
    /// upstream-to-downstream order.
    pub external_path: Vec<usize>,
    pub subnetwork: u32,
}

/// The frozen node graph. Built once at load, never mutated afterwards.
pub struct Graph {
    nodes: Vec<NodeId>,
    node_lookup: HashMap<(NodeKind, i64), usize>,
    links: Vec<LinkMetadata>,
    /// Per node: incident external link indices, flow links first so the
    /// by-kind neighbour iteration skips contiguously.
    out_links: Vec<Vec<usize>>,
    in_links: Vec<Vec<usize>>,
    internal: Vec<InternalFlowLink>,
    /// Per node: resolved internal flow links (structures have at most
    /// one of each; basins may have many).
    internal_in: Vec<Vec<usize>>,
    internal_out: Vec<Vec<usize>>,
    /// Per external link: internal flow indices routed through it.
    external_flows: Vec<Vec<usize>>,
    flow_lookup: HashMap<(NodeId, NodeId), usize>,
}

impl Graph {
    /// Assemble the graph from resolved nodes and links. Topology
    /// problems are collected into the report; the returned graph is
    /// only meaningful when the report stays clean.
    pub fn new(nodes: Vec<NodeId>, links: Vec<LinkMetadata>, report: &mut ValidationReport) -> Self {
        let mut node_lookup = HashMap::new();
        for (i, n) in nodes.iter().enumerate() {
            node_lookup.insert((n.kind, n.id), i);
        }

        let mut out_links = vec![vec![]; nodes.len()];
        let mut in_links = vec![vec![]; nodes.len()];
        for (li, link) in links.iter().enumerate() {
            out_links[node_lookup[&(link.from.kind, link.from.id)]].push(li);
            in_links[node_lookup[&(link.to.kind, link.to.id)]].push(li);
        }
        // Flow links first, then control, for branch-predictable
        // neighbour iteration.
        for list in out_links.iter_mut().chain(in_links.iter_mut()) {
            list.sort_by_key(|&li| (links[li].kind, links[li].id));
        }

        let mut graph = Self {
            nodes,
            node_lookup,
            links,
            out_links,
            in_links,
            internal: vec![],
            internal_in: vec![],
            internal_out: vec![],
            external_flows: vec![],
            flow_lookup: HashMap::new(),
        };
        graph.check_duplicate_links(report);
        graph.collapse_junctions(report);
        graph
    }

    fn check_duplicate_links(&self, report: &mut ValidationReport) {
        let mut seen: HashMap<(NodeId, NodeId), i64> = HashMap::new();
        for link in &self.links {
            if link.kind != LinkKind::Flow {
                continue;
            }
            if seen.insert((link.from, link.to), link.id).is_some() {
                report.push(ValidationIssue::DuplicateLink {
                    link_id: link.id,
                    from: link.from,
                    to: link.to,
                });
            }
        }
    }

    /// Build the junction-collapsed flow view. Each flow-writing node
    /// traces its incident flow links through any junctions to the first
    /// non-junction node; the traced path becomes one internal link with
    /// one dense flow index.
    fn collapse_junctions(&mut self, report: &mut ValidationReport) {
        let n = self.nodes.len();
        self.internal_in = vec![vec![]; n];
        self.internal_out = vec![vec![]; n];
        self.external_flows = vec![vec![]; self.links.len()];
        let mut used = vec![false; self.links.len()];

        for ni in 0..n {
            let node = self.nodes[ni];
            if !node.kind.writes_flow() {
                continue;
            }

            // Upstream side (flow boundaries have none)
            if node.kind != NodeKind::FlowBoundary {
                let inbound: Vec<usize> = self.flow_links_in(ni).collect();
                for li in inbound {
                    if let Some((endpoint, path)) = self.trace(li, Direction::Upstream, report) {
                        self.add_internal(endpoint, node, path, &mut used);
                    }
                }
            }
            let outbound: Vec<usize> = self.flow_links_out(ni).collect();
            for li in outbound {
                if let Some((endpoint, path)) = self.trace(li, Direction::Downstream, report) {
                    self.add_internal(node, endpoint, path, &mut used);
                }
            }
        }

        // Whatever flow link no trace passed through has no node that
        // could ever set its flow.
        for (li, link) in self.links.iter().enumerate() {
            if link.kind == LinkKind::Flow && !used[li] {
                report.push(ValidationIssue::Link {
                    link_id: link.id,
                    message: format!(
                        "flow link from {} to {} is not connected to any flow-controlling node",
                        link.from, link.to
                    ),
                });
            }
        }
    }

    fn add_internal(&mut self, from: NodeId, to: NodeId, path: Vec<usize>, used: &mut [bool]) {
        let flow_idx = self.internal.len();
        for &li in &path {
            used[li] = true;
            self.external_flows[li].push(flow_idx);
        }
        let to_idx = self.index_of(to);
        let from_idx = self.index_of(from);
        self.internal_in[to_idx].push(flow_idx);
        self.internal_out[from_idx].push(flow_idx);
        self.flow_lookup.insert((from, to), flow_idx);
        let subnetwork = path.iter().map(|&li| self.links[li].subnetwork).max().unwrap_or(0);
        self.internal.push(InternalFlowLink {
            from,
            to,
            flow_idx,
            external_path: path,
            subnetwork,
        });
    }

    /// Follow a flow link through junctions until a non-junction node.
    /// Returns the endpoint and the external links traversed.
    fn trace(
        &self,
        start_link: usize,
        direction: Direction,
        report: &mut ValidationReport,
    ) -> Option<(NodeId, Vec<usize>)> {
        let mut path = vec![start_link];
        let mut link = &self.links[start_link];
        loop {
            let next = match direction {
                Direction::Upstream => link.from,
                Direction::Downstream => link.to,
            };
            if next.kind != NodeKind::Junction {
                if next.kind.writes_flow() {
                    report.push(ValidationIssue::Link {
                        link_id: self.links[start_link].id,
                        message: format!(
                            "flow path connects two flow-controlling nodes; {} must be separated by a basin or boundary",
                            next
                        ),
                    });
                    return None;
                }
                if direction == Direction::Upstream {
                    path.reverse();
                }
                return Some((next, path));
            }
            let ji = self.index_of(next);
            let continuation: Vec<usize> = match direction {
                Direction::Upstream => self.flow_links_in(ji).collect(),
                Direction::Downstream => self.flow_links_out(ji).collect(),
            };
            if continuation.len() != 1 {
                report.push(ValidationIssue::Node {
                    node: next,
                    message: format!(
                        "junction must continue a traced flow path through exactly one {} link, found {}",
                        match direction {
                            Direction::Upstream => "inflow",
                            Direction::Downstream => "outflow",
                        },
                        continuation.len()
                    ),
                });
                return None;
            }
            path.push(continuation[0]);
            link = &self.links[continuation[0]];
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn links(&self) -> &[LinkMetadata] {
        &self.links
    }

    pub fn metadata(&self, link_idx: usize) -> &LinkMetadata {
        &self.links[link_idx]
    }

    pub fn internal_links(&self) -> &[InternalFlowLink] {
        &self.internal
    }

    pub fn flow_count(&self) -> usize {
        self.internal.len()
    }

    /// Resolve a node reference to its global index.
    pub fn index_of(&self, node: NodeId) -> usize {
        self.node_lookup[&(node.kind, node.id)]
    }

    pub fn resolve(&self, kind: NodeKind, id: i64) -> Option<NodeId> {
        self.node_lookup.get(&(kind, id)).map(|&i| self.nodes[i])
    }

    pub fn resolve_by_id(&self, id: i64) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.id == id).copied()
    }

    /// Lazy neighbour iteration by link kind, outgoing direction.
    pub fn neighbours_out(&self, node: NodeId, kind: LinkKind) -> impl Iterator<Item = NodeId> + '_ {
        let ni = self.index_of(node);
        self.out_links[ni]
            .iter()
            .filter(move |&&li| self.links[li].kind == kind)
            .map(move |&li| self.links[li].to)
    }

    pub fn neighbours_in(&self, node: NodeId, kind: LinkKind) -> impl Iterator<Item = NodeId> + '_ {
        let ni = self.index_of(node);
        self.in_links[ni]
            .iter()
            .filter(move |&&li| self.links[li].kind == kind)
            .map(move |&li| self.links[li].from)
    }

    fn flow_links_in(&self, ni: usize) -> impl Iterator<Item = usize> + '_ {
        self.in_links[ni]
            .iter()
            .copied()
            .filter(move |&li| self.links[li].kind == LinkKind::Flow)
    }

    fn flow_links_out(&self, ni: usize) -> impl Iterator<Item = usize> + '_ {
        self.out_links[ni]
            .iter()
            .copied()
            .filter(move |&li| self.links[li].kind == LinkKind::Flow)
    }

    pub fn flow_link_count_in(&self, node: NodeId) -> usize {
        self.flow_links_in(self.index_of(node)).count()
    }

    pub fn flow_link_count_out(&self, node: NodeId) -> usize {
        self.flow_links_out(self.index_of(node)).count()
    }

    pub fn control_link_count_out(&self, node: NodeId) -> usize {
        let ni = self.index_of(node);
        self.out_links[ni]
            .iter()
            .filter(|&&li| self.links[li].kind == LinkKind::Control)
            .count()
    }

    /// The unique collapsed inflow link of a structure node.
    pub fn inflow_link(&self, node: NodeId) -> Option<&InternalFlowLink> {
        let ni = self.index_of(node);
        self.internal_in[ni].first().map(|&fi| &self.internal[fi])
    }

    /// The unique collapsed outflow link of a structure node.
    pub fn outflow_link(&self, node: NodeId) -> Option<&InternalFlowLink> {
        let ni = self.index_of(node);
        self.internal_out[ni].first().map(|&fi| &self.internal[fi])
    }

    /// All collapsed inflow links of a node (basins may have many).
    pub fn inflow_links(&self, node: NodeId) -> impl Iterator<Item = &InternalFlowLink> + '_ {
        let ni = self.index_of(node);
        self.internal_in[ni].iter().map(move |&fi| &self.internal[fi])
    }

    pub fn outflow_links(&self, node: NodeId) -> impl Iterator<Item = &InternalFlowLink> + '_ {
        let ni = self.index_of(node);
        self.internal_out[ni].iter().map(move |&fi| &self.internal[fi])
    }

    /// Dense flow index of the collapsed link from src to dst.
    pub fn flow_index(&self, src: NodeId, dst: NodeId) -> Result<usize, String> {
        self.flow_lookup
            .get(&(src, dst))
            .copied()
            .ok_or_else(|| format!("no flow link from {} to {}", src, dst))
    }

    /// Internal flow indices that pass through an external link, for the
    /// output view where junctions are preserved.
    pub fn external_link_flows(&self, link_idx: usize) -> &[usize] {
        &self.external_flows[link_idx]
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Upstream,
    Downstream,
}
