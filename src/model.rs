use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::allocation::{allocate, AllocationState};
use crate::cache::CachePair;
use crate::control::{check_transitions, ControlTransition};
use crate::errors::{ModelError, RunError};
use crate::io::output::{BasinSaveRow, ConcentrationSaveRow, FlowSaveRow, SavedResults};
use crate::misc::configuration::Configuration;
use crate::network::graph::{Graph, LinkKind, NodeKind};
use crate::numerical::dual::Dual;
use crate::solver::callbacks::{CallbackKind, CallbackQueue};
use crate::solver::integrator::{create_integrator, Integrator, RhsSystem, StepOutcome};
use crate::solver::rhs::formulate_rhs;
use crate::state::StateComponent;
use crate::store::ParameterStore;

/// A loaded model, ready to simulate. Time is seconds since the
/// configured start; the reduced state `u` holds cumulative flows and
/// PID integrals.
pub struct Model {
    pub configuration: Configuration,
    pub graph: Graph,
    pub store: ParameterStore,
    pub caches: CachePair,
    pub u: Vec<f64>,
    pub t: f64,
    pub t_end: f64,
    integrator: Box<dyn Integrator>,
    queue: CallbackQueue,
    pub allocation: Option<AllocationState>,
    pub transitions: Vec<ControlTransition>,
    pub saved: SavedResults,
    /// State and time at the previous save, for interval volumes.
    u_prev_save: Vec<f64>,
    t_prev_save: f64,
    cancel: AtomicBool,
}

/// The view of the model an integrator drives.
struct System<'a> {
    store: &'a ParameterStore,
    graph: &'a Graph,
    caches: &'a mut CachePair,
}

impl RhsSystem for System<'_> {
    fn n(&self) -> usize {
        self.store.layout.len()
    }

    fn rhs(&mut self, u: &[f64], t: f64, du: &mut [f64]) {
        formulate_rhs(
            self.store,
            self.graph,
            &mut self.caches.time,
            &mut self.caches.real,
            u,
            du,
            t,
            0.0,
        );
    }

    fn rhs_dual(&mut self, u: &[Dual], t: f64, du: &mut [Dual]) {
        formulate_rhs(
            self.store,
            self.graph,
            &mut self.caches.time,
            &mut self.caches.dual,
            u,
            du,
            t,
            0.0,
        );
    }

    fn event_values(&mut self, u: &[f64], t: f64) -> Vec<f64> {
        let mut du = vec![0.0; self.store.layout.len()];
        formulate_rhs(
            self.store,
            self.graph,
            &mut self.caches.time,
            &mut self.caches.real,
            u,
            &mut du,
            t,
            0.0,
        );
        crate::control::discrete::condition_values(
            self.store,
            self.graph,
            &self.caches.time,
            &self.caches.real,
            t,
        )
    }
}

impl Model {
    /// Assemble a runnable model from a built store. The loader is the
    /// only caller; it has already validated everything.
    pub fn new(
        configuration: Configuration,
        graph: Graph,
        store: ParameterStore,
    ) -> Result<Model, ModelError> {
        let t_end = configuration.duration()?;
        let caches = CachePair::new(&store);
        let u = store.initial_state();
        let integrator = create_integrator(
            configuration.algorithm()?,
            configuration.integrator_settings(),
        );

        let allocation = if configuration.allocation.use_allocation {
            Some(AllocationState::new(
                configuration.allocation.timestep,
                &graph,
                configuration.source_priorities(),
            ))
        } else {
            None
        };

        let mut model = Model {
            configuration,
            graph,
            store,
            caches,
            u,
            t: 0.0,
            t_end,
            integrator,
            queue: CallbackQueue::new(),
            allocation,
            transitions: vec![],
            saved: SavedResults::default(),
            u_prev_save: vec![],
            t_prev_save: 0.0,
            cancel: AtomicBool::new(false),
        };
        model.u_prev_save = model.u.clone();
        model.schedule_callbacks();
        model.initialize()?;
        Ok(model)
    }

    /// Fill the schedule: saves, allocation solves, rating curve
    /// switches, and a forcing refresh at every breakpoint of every
    /// time series in the store.
    fn schedule_callbacks(&mut self) {
        let mut k = 0u64;
        loop {
            let t = k as f64 * self.configuration.saveat;
            if t >= self.t_end {
                break;
            }
            self.queue.push(t, CallbackKind::Save);
            k += 1;
        }
        self.queue.push(self.t_end, CallbackKind::Save);

        if let Some(allocation) = &self.allocation {
            let mut k = 0u64;
            loop {
                let t = k as f64 * allocation.interval;
                if t > self.t_end {
                    break;
                }
                self.queue.push(t, CallbackKind::Allocation);
                k += 1;
            }
        }

        for switch in self.store.rating_curve.switch.iter().flatten() {
            for &t in switch.switch_times() {
                if t > 0.0 && t < self.t_end {
                    self.queue.push(t, CallbackKind::RatingCurveSwitch);
                }
            }
        }

        let mut breakpoints: Vec<f64> = vec![];
        self.store.collect_breakpoints(&mut breakpoints);
        breakpoints.retain(|&t| t > 0.0 && t < self.t_end);
        breakpoints.sort_by(f64::total_cmp);
        breakpoints.dedup();
        for t in breakpoints {
            self.queue.push(t, CallbackKind::ForcingUpdate);
        }
    }

    /// First refresh, initial discrete-control states, and sanity
    /// warnings. The initial control state is applied without being
    /// recorded: only actual transitions land in the log.
    fn initialize(&mut self) -> Result<(), ModelError> {
        self.refresh_real_cache();
        if let Some(node) = self.caches.time.find_nan(&self.store) {
            return Err(RunError::ForcingNan { node, t: self.t }.into());
        }

        for i in 0..self.store.discrete_control.len() {
            for c in 0..self.store.discrete_control.conditions[i].len() {
                let (compound, high) = {
                    let condition = &self.store.discrete_control.conditions[i][c];
                    (condition.compound, condition.threshold_high)
                };
                let value = crate::solver::rhs::compound_value(
                    &self.store,
                    &self.graph,
                    &self.caches.time,
                    &self.caches.real,
                    &self.store.discrete_control.compound_variables[i][compound],
                    self.t,
                );
                self.store.discrete_control.truth_state[i][c] = value >= high;
            }
            let truth = self.store.discrete_control.truth_string(i);
            let node = self.store.discrete_control.node_ids[i];
            if let Some(state) = self.store.discrete_control.logic[i].get(&truth).cloned() {
                let updates = self.store.control_mappings.get(&(node, state.clone())).cloned();
                for update in updates.unwrap_or_default() {
                    crate::control::apply_update(&mut self.store, &update);
                }
                self.store.discrete_control.active_state[i] = state;
            }
        }
        self.caches.invalidate();
        self.refresh_real_cache();

        let threshold = self.configuration.numerics.level_difference_threshold;
        for i in 0..self.store.outlet.len() {
            let node = self.store.outlet.node_ids[i];
            if let Some(inflow) = self.graph.inflow_link(node) {
                if inflow.from.kind == NodeKind::Basin {
                    let crest = self.store.outlet.min_upstream_level[i].eval(0.0);
                    let level = self.caches.real.level[inflow.from.idx];
                    if crest > level + threshold {
                        warn!(outlet = %node, crest, level, "outlet crest starts above its source level");
                    }
                }
            }
        }
        Ok(())
    }

    /// Run the full simulation and keep results in memory; the caller
    /// decides where they go afterwards.
    pub fn run(&mut self) -> Result<(), ModelError> {
        info!(t_end = self.t_end, "starting simulation");
        self.advance_to(self.t_end)?;
        info!("simulation finished");
        Ok(())
    }

    /// Advance to a target time, firing scheduled callbacks and
    /// discrete-control transitions on the way.
    pub fn advance_to(&mut self, t_target: f64) -> Result<(), ModelError> {
        let t_target = t_target.min(self.t_end);
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(RunError::Cancelled { t: self.t }.into());
            }

            // Fire everything due at the current time first
            let due = self.queue.pop_due(self.t);
            for entry in due {
                self.run_callback(entry.kind)?;
            }
            if self.t >= t_target {
                return Ok(());
            }

            let t_stop = match self.queue.next_time() {
                Some(t) if t < t_target => t,
                _ => t_target,
            };

            let outcome = {
                let Model {
                    ref store,
                    ref graph,
                    ref mut caches,
                    ref mut integrator,
                    ref mut u,
                    ref mut t,
                    ..
                } = *self;
                let mut system = System { store, graph, caches };
                integrator.advance(&mut system, u, t, t_stop)?
            };

            if outcome == StepOutcome::Event {
                self.refresh_real_cache();
                let fired = check_transitions(
                    &mut self.store,
                    &self.graph,
                    &self.caches.time,
                    &self.caches.real,
                    self.t,
                );
                if !fired.is_empty() {
                    self.transitions.extend(fired);
                    self.caches.invalidate();
                    self.integrator.reinitialize();
                }
            }
        }
    }

    /// Cooperative cancellation; takes effect at the next callback
    /// boundary.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn run_callback(&mut self, kind: CallbackKind) -> Result<(), ModelError> {
        match kind {
            CallbackKind::Allocation => {
                self.refresh_real_cache();
                {
                    let Model {
                        ref mut store,
                        ref graph,
                        ref caches,
                        ref mut allocation,
                        t,
                        ..
                    } = *self;
                    if let Some(state) = allocation {
                        allocate(
                            store,
                            graph,
                            &caches.real.storage,
                            &caches.real.flow,
                            t,
                            state,
                        )?;
                    }
                }
                self.caches.invalidate();
            }
            CallbackKind::RatingCurveSwitch => {
                for i in 0..self.store.rating_curve.len() {
                    if let Some(switch) = &self.store.rating_curve.switch[i] {
                        let active = switch.lookup(self.t);
                        if active != self.store.rating_curve.active[i] {
                            self.store.rating_curve.active[i] = active;
                            self.caches.invalidate();
                        }
                    }
                }
            }
            CallbackKind::ForcingUpdate => {
                // Interpolations are evaluated continuously; the entry
                // exists so the integrator lands exactly on the
                // breakpoint and the refreshed values are checked.
                self.caches.time.invalidate();
                self.refresh_real_cache();
                if let Some(node) = self.caches.time.find_nan(&self.store) {
                    return Err(RunError::ForcingNan { node, t: self.t }.into());
                }
            }
            CallbackKind::Save => {
                self.save()?;
            }
        }
        Ok(())
    }

    fn refresh_real_cache(&mut self) {
        let Model {
            ref store,
            ref graph,
            ref mut caches,
            ref u,
            t,
            ..
        } = *self;
        let mut du = vec![0.0; store.layout.len()];
        formulate_rhs(
            store,
            graph,
            &mut caches.time,
            &mut caches.real,
            u,
            &mut du,
            t,
            0.0,
        );
    }

    /// Record one save frame: basin storages and levels with their
    /// balance error, flows per external link, and the tracer mix.
    fn save(&mut self) -> Result<(), ModelError> {
        self.refresh_real_cache();
        let t = self.t;

        self.update_concentrations();

        for b in 0..self.store.basin.len() {
            let node = self.store.basin.node_ids[b];
            let storage = self.caches.real.storage[b];
            let error = self.balance_error(b);
            let tolerance = self.configuration.numerics.water_balance_abstol
                + self.configuration.numerics.water_balance_reltol * storage.abs();
            if error.abs() > tolerance {
                return Err(RunError::WaterBalance {
                    t,
                    node,
                    error,
                }
                .into());
            }
            if storage < -tolerance {
                warn!(basin = %node, storage, t, "negative storage at save point");
            }
            self.saved.basin.push(BasinSaveRow {
                t,
                node_id: node.id,
                storage,
                level: self.caches.real.level[b],
                balance_error: error,
            });

            for (s, substance) in self.store.basin.substances.iter().enumerate() {
                self.saved.concentration.push(ConcentrationSaveRow {
                    t,
                    node_id: node.id,
                    substance: substance.clone(),
                    concentration: self.store.basin.concentration[b][s],
                });
            }
        }

        for (li, link) in self.graph.links().iter().enumerate() {
            if link.kind != LinkKind::Flow {
                continue;
            }
            let flow: f64 = self
                .graph
                .external_link_flows(li)
                .iter()
                .map(|&fi| self.caches.real.flow[fi])
                .sum();
            self.saved.flow.push(FlowSaveRow {
                t,
                link_id: link.id,
                from_id: link.from.id,
                to_id: link.to.id,
                flow,
            });
        }

        self.u_prev_save = self.u.clone();
        self.t_prev_save = t;
        Ok(())
    }

    /// Residual of the storage reconstruction against the volumes
    /// integrated since the previous save.
    fn balance_error(&self, b: usize) -> f64 {
        let mut expected = 0.0;
        for &(s, c) in &self.store.incidence.rows[b] {
            expected += c * (self.u[s] - self.u_prev_save[s]);
        }
        for &fb in &self.store.incidence.boundary_inflows[b] {
            expected += self.store.flow_boundary.flow_rate[fb].integrate(self.t_prev_save, self.t);
        }
        expected += self.store.basin.forcing_volume(b, self.t_prev_save, self.t);

        let previous = {
            // Reconstruct the storage of the previous save frame
            let mut storage =
                self.store.basin.storage0[b] + self.store.basin.forcing_volume(b, 0.0, self.t_prev_save);
            for &(s, c) in &self.store.incidence.rows[b] {
                storage += c * self.u_prev_save[s];
            }
            for &fb in &self.store.incidence.boundary_inflows[b] {
                storage += self.store.flow_boundary.flow_rate[fb].integrate(0.0, self.t_prev_save);
            }
            storage
        };
        self.caches.real.storage[b] - previous - expected
    }

    /// Flow-weighted tracer mixing over the save interval: every basin
    /// absorbs the volumes that arrived since the last save at the
    /// concentration of their source.
    fn update_concentrations(&mut self) {
        let n_substances = self.store.basin.substances.len();
        if n_substances == 0 {
            return;
        }
        let dt_span = self.t - self.t_prev_save;
        if dt_span <= 0.0 {
            return;
        }

        let mut mixed: Vec<Vec<f64>> = self.store.basin.concentration.clone();
        for b in 0..self.store.basin.len() {
            let node = self.store.basin.node_ids[b];

            // Gather the inflow volumes with their source mixes.
            // Outflow leaves at the basin's own concentration and does
            // not change the mix, so only inflows matter.
            let mut inflows: Vec<(f64, Vec<f64>)> = vec![];
            for link in self.graph.inflow_links(node) {
                let volume = self.link_volume(link.flow_idx);
                if volume > 0.0 {
                    inflows.push((volume, self.link_source_concentration(link.flow_idx)));
                }
            }
            for &fb in &self.store.incidence.boundary_inflows[b] {
                let volume =
                    self.store.flow_boundary.flow_rate[fb].integrate(self.t_prev_save, self.t);
                if volume > 0.0 {
                    inflows.push((volume, self.store.flow_boundary.concentration[fb].clone()));
                }
            }

            let inflow_total: f64 = inflows.iter().map(|(v, _)| v).sum();
            let mut storage = (self.caches.real.storage[b] - inflow_total).max(0.0);
            for (volume, source) in inflows {
                let total = storage + volume;
                if total > 0.0 {
                    for s in 0..n_substances {
                        let incoming = source.get(s).copied().unwrap_or(0.0);
                        mixed[b][s] = (mixed[b][s] * storage + incoming * volume) / total;
                    }
                }
                storage += volume;
            }
        }
        self.store.basin.concentration = mixed;
    }

    /// Volume moved over a state-backed flow link since the last save.
    fn link_volume(&self, flow_idx: usize) -> f64 {
        match self.store.incidence.flow_state[flow_idx] {
            Some(s) => self.u[s] - self.u_prev_save[s],
            None => 0.0,
        }
    }

    /// Concentration of the water a link delivers: the upstream passive
    /// node's mix, resolved through the writing structure.
    fn link_source_concentration(&self, flow_idx: usize) -> Vec<f64> {
        let n_substances = self.store.basin.substances.len();
        let link = &self.graph.internal_links()[flow_idx];
        let mut source = link.from;
        if source.kind.writes_flow() && source.kind != NodeKind::FlowBoundary {
            if let Some(upstream) = self.graph.inflow_link(source) {
                source = upstream.from;
            }
        }
        match source.kind {
            NodeKind::Basin => self.store.basin.concentration[source.idx].clone(),
            NodeKind::FlowBoundary => self.store.flow_boundary.concentration[source.idx].clone(),
            NodeKind::LevelBoundary => self.store.level_boundary.concentration[source.idx].clone(),
            _ => vec![0.0; n_substances],
        }
    }

    /// Dense flow vector at the current (state, time), for the C facade.
    pub fn flows(&mut self) -> &[f64] {
        self.refresh_real_cache();
        &self.caches.real.flow
    }

    /// Current PID integral states, mostly useful in tests.
    pub fn pid_integral(&self, i: usize) -> f64 {
        self.u[self.store.layout.index(StateComponent::PidIntegral, i)]
    }

    /// Current storage of a basin by dense index.
    pub fn storage(&mut self, b: usize) -> f64 {
        self.refresh_real_cache();
        self.caches.real.storage[b]
    }

    pub fn level(&mut self, b: usize) -> f64 {
        self.refresh_real_cache();
        self.caches.real.level[b]
    }

    /// Write all in-memory results to the configured results directory.
    pub fn write_outputs(&self) -> Result<(), ModelError> {
        let (demand_records, flow_records) = match &self.allocation {
            Some(state) => (&state.demand_records[..], &state.flow_records[..]),
            None => (&[][..], &[][..]),
        };
        crate::io::output::write_outputs(
            &self.configuration.results_dir,
            &self.saved,
            &self.transitions,
            demand_records,
            flow_records,
        )?;
        Ok(())
    }
}
