//! Allocation: distributing scarce water between demands.
//!
//! At a fixed interval each subnetwork is turned into a small linear
//! program over its collapsed flow links. Objectives run
//! lexicographically: per demand priority first the flow demands, then
//! the storage demands, then keeping basins out of their low-storage
//! band, and finally source routing by source priority. Each stage's
//! optimum is locked in with an epigraph row before the next stage runs.
//!
//! Subnetwork 1, when present, is the primary network: it is solved
//! first and the flows it sends into each secondary subnetwork become
//! fixed source capacities there.

use std::collections::HashMap;

use tracing::debug;

use crate::errors::RunError;
use crate::network::graph::{Graph, NodeId, NodeKind};
use crate::numerical::interpolation::Interpolation;
use crate::numerical::simplex::{LpProblem, LpStatus};
use crate::numerical::smoothing::LOW_STORAGE_THRESHOLD;
use crate::store::ParameterStore;

const LP_MAX_ITERATIONS: usize = 2000;
const LOCK_SLACK: f64 = 1e-9;

/// Source preference weights per source kind, lower is preferred.
#[derive(Clone, Copy, Debug)]
pub struct SourcePriorities {
    pub flow_boundary: u32,
    pub main_inlet: u32,
    pub basin: u32,
}

impl Default for SourcePriorities {
    fn default() -> Self {
        Self {
            flow_boundary: 1,
            main_inlet: 2,
            basin: 3,
        }
    }
}

/// One demand record row per declared (user, priority) pair per solve.
#[derive(Clone, Debug, PartialEq)]
pub struct DemandRecord {
    pub t: f64,
    pub subnetwork: u32,
    pub node_id: i64,
    pub priority: u32,
    pub demand: f64,
    pub allocated: f64,
    pub realized: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlowRecord {
    pub t: f64,
    pub subnetwork: u32,
    pub from_id: i64,
    pub to_id: i64,
    pub flow: f64,
}

/// Persistent allocation bookkeeping across a run.
pub struct AllocationState {
    pub interval: f64,
    pub last_t: Option<f64>,
    pub subnetworks: Vec<u32>,
    /// Solved transfer per (secondary subnetwork, inlet flow index).
    transfers: HashMap<(u32, usize), f64>,
    pub source_priorities: SourcePriorities,
    pub demand_records: Vec<DemandRecord>,
    pub flow_records: Vec<FlowRecord>,
}

impl AllocationState {
    pub fn new(interval: f64, graph: &Graph, source_priorities: SourcePriorities) -> Self {
        let mut subnetworks: Vec<u32> = graph
            .internal_links()
            .iter()
            .map(|l| l.subnetwork)
            .filter(|&s| s > 0)
            .collect();
        subnetworks.sort_unstable();
        subnetworks.dedup();
        Self {
            interval,
            last_t: None,
            subnetworks,
            transfers: HashMap::new(),
            source_priorities,
            demand_records: vec![],
            flow_records: vec![],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Var {
    /// Planned mean flow over a collapsed link.
    Link(usize),
    /// Water allocated to a user at one priority.
    UserAlloc(usize, usize),
    /// Aggregated demand of a secondary subnetwork served over a
    /// primary-network inlet link.
    TransferAlloc(usize, usize),
    /// Flow-demand satisfaction at the target structure.
    FlowDemandAlloc(usize),
    /// Storage recovered towards a level demand's minimum level.
    LevelRefill(usize),
    /// Storage kept above zero up to the low-storage threshold.
    LowStorage(usize),
}

struct SubnetworkLp {
    vars: Vec<Var>,
    link_var: HashMap<usize, usize>,
}

impl SubnetworkLp {
    fn var(&mut self, v: Var) -> usize {
        if let Var::Link(fi) = v {
            if let Some(&existing) = self.link_var.get(&fi) {
                return existing;
            }
        }
        let idx = self.vars.len();
        self.vars.push(v);
        if let Var::Link(fi) = v {
            self.link_var.insert(fi, idx);
        }
        idx
    }
}

/// Run one allocation pass over every subnetwork.
pub fn allocate(
    store: &mut ParameterStore,
    graph: &Graph,
    storages: &[f64],
    flows: &[f64],
    t: f64,
    state: &mut AllocationState,
) -> Result<(), RunError> {
    let subnetworks = state.subnetworks.clone();
    for &sn in &subnetworks {
        allocate_subnetwork(store, graph, storages, flows, t, state, sn)?;
    }
    state.last_t = Some(t);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn allocate_subnetwork(
    store: &mut ParameterStore,
    graph: &Graph,
    storages: &[f64],
    flows: &[f64],
    t: f64,
    state: &mut AllocationState,
    sn: u32,
) -> Result<(), RunError> {
    let dt = match state.last_t {
        Some(prev) if t > prev => t - prev,
        _ => state.interval,
    };

    // Collect the subnetwork's links. The primary network additionally
    // carries the links crossing into each secondary subnetwork; a
    // secondary treats those same links as its capacity-fixed inlets.
    let mut links: Vec<usize> = vec![];
    let mut inlets: Vec<usize> = vec![];
    for link in graph.internal_links() {
        let from_sub = store.node_subnetwork.get(&link.from).copied().unwrap_or(0);
        if link.subnetwork == sn {
            if sn != 1 && from_sub == 1 {
                inlets.push(link.flow_idx);
            }
            links.push(link.flow_idx);
        } else if sn == 1 && link.subnetwork > 1 && from_sub == 1 {
            links.push(link.flow_idx);
        }
    }
    if links.is_empty() {
        return Ok(());
    }

    let mut lp = SubnetworkLp {
        vars: vec![],
        link_var: HashMap::new(),
    };
    for &fi in &links {
        lp.var(Var::Link(fi));
    }

    // Membership and per-basin link incidence
    let mut basin_in: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut basin_out: HashMap<usize, Vec<usize>> = HashMap::new();
    for &fi in &links {
        let link = &graph.internal_links()[fi];
        let v = lp.link_var[&fi];
        if link.to.kind == NodeKind::Basin {
            basin_in.entry(link.to.idx).or_default().push(v);
        }
        if link.from.kind == NodeKind::Basin {
            basin_out.entry(link.from.idx).or_default().push(v);
        }
    }

    let in_subnetwork = |node: NodeId| -> bool {
        store.node_subnetwork.get(&node).copied().unwrap_or(0) == sn
    };

    // Users, flow demands and level demands of this subnetwork
    let users: Vec<usize> = (0..store.user_demand.len())
        .filter(|&u| in_subnetwork(store.user_demand.node_ids[u]))
        .collect();
    let flow_demands: Vec<usize> = (0..store.flow_demand.len())
        .filter(|&d| in_subnetwork(store.flow_demand.node_ids[d]))
        .collect();
    let level_demands: Vec<usize> = (0..store.level_demand.len())
        .filter(|&d| in_subnetwork(store.level_demand.node_ids[d]))
        .collect();

    let n_priorities = store.priorities.len();
    for &u in &users {
        for p in 0..n_priorities {
            if store.user_demand.has_priority[u][p] {
                lp.var(Var::UserAlloc(u, p));
            }
        }
    }
    for &d in &flow_demands {
        lp.var(Var::FlowDemandAlloc(d));
    }
    for &d in &level_demands {
        lp.var(Var::LevelRefill(d));
    }
    let basins: Vec<usize> = {
        let mut b: Vec<usize> = basin_in.keys().chain(basin_out.keys()).copied().collect();
        b.sort_unstable();
        b.dedup();
        b
    };
    for &b in &basins {
        lp.var(Var::LowStorage(b));
    }

    // Secondary demands served through primary inlets
    let mut secondary_demand: HashMap<(u32, usize), f64> = HashMap::new();
    if sn == 1 {
        for u in 0..store.user_demand.len() {
            let sub = store
                .node_subnetwork
                .get(&store.user_demand.node_ids[u])
                .copied()
                .unwrap_or(0);
            if sub > 1 {
                for p in 0..n_priorities {
                    if store.user_demand.has_priority[u][p] {
                        *secondary_demand.entry((sub, p)).or_default() +=
                            store.user_demand.demand[u][p].eval(t);
                    }
                }
            }
        }
        let crossing: Vec<(usize, u32)> = graph
            .internal_links()
            .iter()
            .filter(|l| l.subnetwork > 1)
            .filter(|l| store.node_subnetwork.get(&l.from).copied().unwrap_or(0) == 1)
            .map(|l| (l.flow_idx, l.subnetwork))
            .collect();
        for p in 0..n_priorities {
            for (fi, sub) in &crossing {
                if secondary_demand.contains_key(&(*sub, p)) {
                    lp.var(Var::TransferAlloc(*fi, p));
                }
            }
        }
    }

    let n = lp.vars.len();
    let mut problem = LpProblem::new(n);
    let row = |entries: &[(usize, f64)]| -> Vec<f64> {
        let mut r = vec![0.0; n];
        for &(j, c) in entries {
            r[j] = c;
        }
        r
    };

    // Structure conservation and capacities
    for &fi in &links {
        let link = &graph.internal_links()[fi];
        let v = lp.link_var[&fi];

        // Flow boundary sources: bounded by the mean inflow since the
        // previous solve
        if link.from.kind == NodeKind::FlowBoundary {
            let capacity = match state.last_t {
                Some(prev) if t > prev => {
                    store.flow_boundary.flow_rate[link.from.idx].integrate(prev, t) / dt
                }
                _ => store.flow_boundary.flow_rate[link.from.idx].eval(t),
            };
            problem.add_upper_bound(v, capacity.max(0.0));
        }

        // Primary-network inlets of a secondary subnetwork
        if inlets.contains(&fi) {
            let capacity = state.transfers.get(&(sn, fi)).copied().unwrap_or(0.0);
            problem.add_upper_bound(v, capacity);
        }

        // Structure rate caps, when finite
        let cap = match link.to.kind {
            NodeKind::Pump => Some(store.pump.max_flow_rate[link.to.idx].eval(t)),
            NodeKind::Outlet => Some(store.outlet.max_flow_rate[link.to.idx].eval(t)),
            _ => None,
        };
        if let Some(cap) = cap {
            if cap.is_finite() {
                problem.add_upper_bound(v, cap);
            }
        }
    }

    // Conservation across conservative structures
    for node in graph.nodes() {
        if !node.kind.is_conservative() {
            continue;
        }
        let (Some(inflow), Some(outflow)) = (graph.inflow_link(*node), graph.outflow_link(*node))
        else {
            continue;
        };
        if let (Some(&vi), Some(&vo)) = (
            lp.link_var.get(&inflow.flow_idx),
            lp.link_var.get(&outflow.flow_idx),
        ) {
            problem.add_eq(row(&[(vi, 1.0), (vo, -1.0)]), 0.0);
        }
    }

    // User demand nodes: abstraction splits into per-priority
    // allocations, the return flow is a fixed fraction
    for &u in &users {
        let node = store.user_demand.node_ids[u];
        let (Some(inflow), Some(outflow)) = (graph.inflow_link(node), graph.outflow_link(node))
        else {
            continue;
        };
        let Some(&vi) = lp.link_var.get(&inflow.flow_idx) else {
            continue;
        };
        let mut balance = vec![(vi, -1.0)];
        for p in 0..n_priorities {
            if store.user_demand.has_priority[u][p] {
                let va = lp.vars.iter().position(|v| *v == Var::UserAlloc(u, p)).unwrap();
                balance.push((va, 1.0));
                problem.add_upper_bound(va, store.user_demand.demand[u][p].eval(t).max(0.0));
            }
        }
        problem.add_eq(row(&balance), 0.0);
        if let Some(&vo) = lp.link_var.get(&outflow.flow_idx) {
            let rf = store.user_demand.return_factor[u].eval(t);
            problem.add_eq(row(&[(vo, 1.0), (vi, -rf)]), 0.0);
        }
    }

    // Transfer allocations ride on their inlet link
    if sn == 1 {
        let transfer_vars: Vec<(usize, usize, usize)> = lp
            .vars
            .iter()
            .enumerate()
            .filter_map(|(j, v)| match v {
                Var::TransferAlloc(fi, p) => Some((j, *fi, *p)),
                _ => None,
            })
            .collect();
        let mut by_link: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
        for (j, fi, p) in transfer_vars {
            by_link.entry(fi).or_default().push((j, p));
            let sub = graph.internal_links()[fi].subnetwork;
            let demand = secondary_demand.get(&(sub, p)).copied().unwrap_or(0.0);
            problem.add_upper_bound(j, demand.max(0.0));
        }
        let mut by_link: Vec<(usize, Vec<(usize, usize)>)> = by_link.into_iter().collect();
        by_link.sort_by_key(|(fi, _)| *fi);
        for (fi, allocs) in by_link {
            let v = lp.link_var[&fi];
            let mut balance = vec![(v, -1.0)];
            for (j, _) in allocs {
                balance.push((j, 1.0));
            }
            // The inlet carries exactly what the secondary was granted
            problem.add_eq(row(&balance), 0.0);
        }
    }

    // Flow demands bound by both wish and achieved flow
    for &d in &flow_demands {
        let va = lp
            .vars
            .iter()
            .position(|v| *v == Var::FlowDemandAlloc(d))
            .unwrap();
        problem.add_upper_bound(va, store.flow_demand.demand[d].eval(t).max(0.0));
        let target = store.flow_demand.target[d];
        if let Some(inflow) = graph.inflow_link(target) {
            if let Some(&vt) = lp.link_var.get(&inflow.flow_idx) {
                problem.add_le(row(&[(va, 1.0), (vt, -1.0)]), 0.0);
            }
        }
    }

    // Basin budgets: what a basin can supply or absorb over the interval
    for &b in &basins {
        let ins = basin_in.get(&b).cloned().unwrap_or_default();
        let outs = basin_out.get(&b).cloned().unwrap_or_default();
        let storage = storages[b];

        // Supply: net outflow cannot exceed the stored volume
        let mut supply = vec![];
        for &v in &outs {
            supply.push((v, 1.0));
        }
        for &v in &ins {
            supply.push((v, -1.0));
        }
        problem.add_le(row(&supply), (storage / dt).max(0.0));

        // Level demand band on this basin
        for &d in &level_demands {
            if store.level_demand.target_basin[d].idx != b {
                continue;
            }
            let profile = &store.basin.profile[b];
            let s_min = profile.storage_from_level(store.level_demand.min_level[d].eval(t));
            let s_max = profile.storage_from_level(store.level_demand.max_level[d].eval(t));
            let deficit = (s_min - storage).max(0.0);
            let headroom = (s_max - storage).max(0.0);

            let vr = lp
                .vars
                .iter()
                .position(|v| *v == Var::LevelRefill(d))
                .unwrap();
            problem.add_upper_bound(vr, deficit / dt);
            // Refill only counts when the basin actually nets inflow
            let mut refill = vec![(vr, 1.0)];
            for &v in &ins {
                refill.push((v, -1.0));
            }
            for &v in &outs {
                refill.push((v, 1.0));
            }
            problem.add_le(row(&refill), 0.0);

            // Absorb cap up to the maximum level, when bounded
            if headroom.is_finite() {
                let mut absorb = vec![];
                for &v in &ins {
                    absorb.push((v, 1.0));
                }
                for &v in &outs {
                    absorb.push((v, -1.0));
                }
                problem.add_le(row(&absorb), headroom / dt);
            }
        }

        // Low storage stage variable
        let vl = lp
            .vars
            .iter()
            .position(|v| *v == Var::LowStorage(b))
            .unwrap();
        problem.add_upper_bound(vl, LOW_STORAGE_THRESHOLD);
        let mut kept = vec![(vl, 1.0)];
        for &v in &ins {
            kept.push((v, -dt));
        }
        for &v in &outs {
            kept.push((v, dt));
        }
        problem.add_le(row(&kept), storage);
    }

    // Lexicographic stages
    for p in 0..n_priorities {
        let flow_terms: Vec<usize> = lp
            .vars
            .iter()
            .enumerate()
            .filter_map(|(j, v)| match v {
                Var::UserAlloc(_, vp) if *vp == p => Some(j),
                Var::TransferAlloc(_, vp) if *vp == p => Some(j),
                Var::FlowDemandAlloc(d)
                    if store.priority_index(store.flow_demand.priority[*d]) == p =>
                {
                    Some(j)
                }
                _ => None,
            })
            .collect();
        solve_stage(&mut problem, &flow_terms, sn, t)?;

        let storage_terms: Vec<usize> = lp
            .vars
            .iter()
            .enumerate()
            .filter_map(|(j, v)| match v {
                Var::LevelRefill(d)
                    if store.priority_index(store.level_demand.priority[*d]) == p =>
                {
                    Some(j)
                }
                _ => None,
            })
            .collect();
        solve_stage(&mut problem, &storage_terms, sn, t)?;
    }

    let low_terms: Vec<usize> = lp
        .vars
        .iter()
        .enumerate()
        .filter_map(|(j, v)| match v {
            Var::LowStorage(_) => Some(j),
            _ => None,
        })
        .collect();
    solve_stage(&mut problem, &low_terms, sn, t)?;

    // Route by source preference: cheapest sources first, and a small
    // uniform cost so unused capacity is not shuffled around basins
    let mut routing = vec![0.0; n];
    for (j, v) in lp.vars.iter().enumerate() {
        if let Var::Link(fi) = v {
            let link = &graph.internal_links()[*fi];
            let weight = if link.from.kind == NodeKind::FlowBoundary {
                state.source_priorities.flow_boundary
            } else if inlets.contains(fi) {
                state.source_priorities.main_inlet
            } else if link.from.kind == NodeKind::Basin {
                state.source_priorities.basin
            } else {
                0
            };
            routing[j] = weight as f64 + 1e-3;
        }
    }
    problem.set_objective(routing);
    let final_solution = solve_lp(&problem, sn, t)?;
    let x = final_solution.x;
    debug!(subnetwork = sn, t, vars = n, "allocation solved");

    // Write results back into the store
    for &u in &users {
        for p in 0..n_priorities {
            if !store.user_demand.has_priority[u][p] {
                continue;
            }
            let j = lp
                .vars
                .iter()
                .position(|v| *v == Var::UserAlloc(u, p))
                .unwrap();
            store.user_demand.allocated[u][p] = x[j];

            let node = store.user_demand.node_ids[u];
            let realized = graph
                .inflow_link(node)
                .map(|l| flows[l.flow_idx])
                .unwrap_or(0.0);
            state.demand_records.push(DemandRecord {
                t,
                subnetwork: sn,
                node_id: node.id,
                priority: store.priorities[p],
                demand: store.user_demand.demand[u][p].eval(t),
                allocated: x[j],
                realized,
            });
        }
    }

    for i in 0..store.pump.len() {
        if !store.pump.allocation_controlled[i] {
            continue;
        }
        let node = store.pump.node_ids[i];
        if let Some(inflow) = graph.inflow_link(node) {
            if let Some(&v) = lp.link_var.get(&inflow.flow_idx) {
                store.pump.flow_rate[i] = Interpolation::constant(x[v]);
            }
        }
    }
    for i in 0..store.outlet.len() {
        if !store.outlet.allocation_controlled[i] {
            continue;
        }
        let node = store.outlet.node_ids[i];
        if let Some(inflow) = graph.inflow_link(node) {
            if let Some(&v) = lp.link_var.get(&inflow.flow_idx) {
                store.outlet.flow_rate[i] = Interpolation::constant(x[v]);
            }
        }
    }

    // Record link flows and, for the primary network, fix the transfer
    // capacities the secondaries will see
    for (j, v) in lp.vars.iter().enumerate() {
        if let Var::Link(fi) = v {
            let link = &graph.internal_links()[*fi];
            state.flow_records.push(FlowRecord {
                t,
                subnetwork: sn,
                from_id: link.from.id,
                to_id: link.to.id,
                flow: x[j],
            });
            if sn == 1 && link.subnetwork > 1 {
                state.transfers.insert((link.subnetwork, *fi), x[j]);
            }
        }
    }

    Ok(())
}

/// Maximize sum(terms); afterwards lock the achieved value in with an
/// epigraph row so later stages cannot undo it.
fn solve_stage(
    problem: &mut LpProblem,
    terms: &[usize],
    sn: u32,
    t: f64,
) -> Result<(), RunError> {
    if terms.is_empty() {
        return Ok(());
    }
    let n = problem.n_vars();
    let mut objective = vec![0.0; n];
    for &j in terms {
        objective[j] = -1.0;
    }
    problem.set_objective(objective);
    let solved = solve_lp(problem, sn, t)?;

    let achieved: f64 = terms.iter().map(|&j| solved.x[j]).sum();
    let mut lock = vec![0.0; n];
    for &j in terms {
        lock[j] = 1.0;
    }
    problem.add_ge(lock, achieved - LOCK_SLACK * (1.0 + achieved.abs()));
    Ok(())
}

fn solve_lp(
    problem: &LpProblem,
    sn: u32,
    t: f64,
) -> Result<crate::numerical::simplex::LpSolution, RunError> {
    let mut solution = problem.solve(LP_MAX_ITERATIONS);
    if solution.status == LpStatus::IterationLimit {
        // One retry with a larger budget before giving up
        solution = problem.solve(LP_MAX_ITERATIONS * 10);
        if solution.status == LpStatus::IterationLimit {
            return Err(RunError::AllocationTimeout { subnetwork: sn, t });
        }
    }
    match solution.status {
        LpStatus::Optimal => Ok(solution),
        LpStatus::Infeasible => Err(RunError::AllocationInfeasible {
            subnetwork: sn,
            t,
            message: "linear program is infeasible".to_string(),
        }),
        LpStatus::Unbounded => Err(RunError::AllocationInfeasible {
            subnetwork: sn,
            t,
            message: "linear program is unbounded".to_string(),
        }),
        LpStatus::IterationLimit => unreachable!("retried above"),
    }
}
