use crate::network::graph::NodeId;
use crate::numerical::dual::{Dual, Scalar};
use crate::numerical::smoothing::low_storage_factor;
use crate::store::ParameterStore;

/// Everything that depends on time alone: interpolated forcings,
/// boundary values, structure brackets, gains and demands. Refreshed
/// when the integrator moves to a new t, reused otherwise.
#[derive(Default)]
pub struct TimeCache {
    last_t: f64,
    valid: bool,

    pub flow_boundary_rate: Vec<f64>,
    pub boundary_level: Vec<f64>,

    pub basin_forcing_rate: Vec<f64>,
    pub basin_evap_potential: Vec<f64>,
    pub basin_infiltration_potential: Vec<f64>,

    pub pump_rate: Vec<f64>,
    pub pump_min: Vec<f64>,
    pub pump_max: Vec<f64>,
    pub pump_min_upstream: Vec<f64>,
    pub pump_max_downstream: Vec<f64>,

    pub outlet_rate: Vec<f64>,
    pub outlet_min: Vec<f64>,
    pub outlet_max: Vec<f64>,
    pub outlet_crest: Vec<f64>,
    pub outlet_max_downstream: Vec<f64>,

    pub pid_target: Vec<f64>,
    pub pid_target_derivative: Vec<f64>,
    pub pid_kp: Vec<f64>,
    pub pid_ki: Vec<f64>,
    pub pid_kd: Vec<f64>,

    /// demand[user][priority index] at the current time.
    pub demand: Vec<Vec<f64>>,
}

impl TimeCache {
    pub fn new(store: &ParameterStore) -> Self {
        let n_priorities = store.priorities.len();
        Self {
            last_t: f64::NAN,
            valid: false,
            flow_boundary_rate: vec![0.0; store.flow_boundary.len()],
            boundary_level: vec![0.0; store.level_boundary.len()],
            basin_forcing_rate: vec![0.0; store.basin.len()],
            basin_evap_potential: vec![0.0; store.basin.len()],
            basin_infiltration_potential: vec![0.0; store.basin.len()],
            pump_rate: vec![0.0; store.pump.len()],
            pump_min: vec![0.0; store.pump.len()],
            pump_max: vec![0.0; store.pump.len()],
            pump_min_upstream: vec![0.0; store.pump.len()],
            pump_max_downstream: vec![0.0; store.pump.len()],
            outlet_rate: vec![0.0; store.outlet.len()],
            outlet_min: vec![0.0; store.outlet.len()],
            outlet_max: vec![0.0; store.outlet.len()],
            outlet_crest: vec![0.0; store.outlet.len()],
            outlet_max_downstream: vec![0.0; store.outlet.len()],
            pid_target: vec![0.0; store.pid_control.len()],
            pid_target_derivative: vec![0.0; store.pid_control.len()],
            pid_kp: vec![0.0; store.pid_control.len()],
            pid_ki: vec![0.0; store.pid_control.len()],
            pid_kd: vec![0.0; store.pid_control.len()],
            demand: vec![vec![0.0; n_priorities]; store.user_demand.len()],
        }
    }

    /// Drop the memoised time so the next refresh recomputes, used after
    /// a callback rewrites store parameters.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn refresh(&mut self, store: &ParameterStore, t: f64) {
        if self.valid && self.last_t == t {
            return;
        }

        for i in 0..store.flow_boundary.len() {
            self.flow_boundary_rate[i] = store.flow_boundary.flow_rate[i].eval(t);
        }
        for i in 0..store.level_boundary.len() {
            self.boundary_level[i] = store.level_boundary.level[i].eval(t);
        }
        for i in 0..store.basin.len() {
            self.basin_forcing_rate[i] = store.basin.forcing_rate(i, t);
            self.basin_evap_potential[i] = store.basin.evaporation[i].eval(t);
            self.basin_infiltration_potential[i] = store.basin.infiltration[i].eval(t);
        }
        for i in 0..store.pump.len() {
            self.pump_rate[i] = store.pump.flow_rate[i].eval(t);
            self.pump_min[i] = store.pump.min_flow_rate[i].eval(t);
            self.pump_max[i] = store.pump.max_flow_rate[i].eval(t);
            self.pump_min_upstream[i] = store.pump.min_upstream_level[i].eval(t);
            self.pump_max_downstream[i] = store.pump.max_downstream_level[i].eval(t);
        }
        for i in 0..store.outlet.len() {
            self.outlet_rate[i] = store.outlet.flow_rate[i].eval(t);
            self.outlet_min[i] = store.outlet.min_flow_rate[i].eval(t);
            self.outlet_max[i] = store.outlet.max_flow_rate[i].eval(t);
            self.outlet_crest[i] = store.outlet.min_upstream_level[i].eval(t);
            self.outlet_max_downstream[i] = store.outlet.max_downstream_level[i].eval(t);
        }
        for i in 0..store.pid_control.len() {
            self.pid_target[i] = store.pid_control.target[i].eval(t);
            self.pid_target_derivative[i] = store.pid_control.target[i].derivative(t);
            self.pid_kp[i] = store.pid_control.proportional[i].eval(t);
            self.pid_ki[i] = store.pid_control.integral[i].eval(t);
            self.pid_kd[i] = store.pid_control.derivative[i].eval(t);
        }
        for i in 0..store.user_demand.len() {
            for (p, demand) in store.user_demand.demand[i].iter().enumerate() {
                self.demand[i][p] = demand.eval(t);
            }
        }

        self.last_t = t;
        self.valid = true;
    }

    /// Scan the interpolated forcings for a NaN, which a boundary series
    /// can produce at a malformed breakpoint. Checked at callback
    /// boundaries; a hit is fatal.
    pub fn find_nan(&self, store: &ParameterStore) -> Option<NodeId> {
        for (i, v) in self.flow_boundary_rate.iter().enumerate() {
            if v.is_nan() {
                return Some(store.flow_boundary.node_ids[i]);
            }
        }
        for (i, v) in self.boundary_level.iter().enumerate() {
            if v.is_nan() {
                return Some(store.level_boundary.node_ids[i]);
            }
        }
        for i in 0..store.basin.len() {
            if self.basin_forcing_rate[i].is_nan()
                || self.basin_evap_potential[i].is_nan()
                || self.basin_infiltration_potential[i].is_nan()
            {
                return Some(store.basin.node_ids[i]);
            }
        }
        None
    }
}

/// Everything that depends on both state and time: reconstructed
/// storages, levels, areas, smoothing factors, the dense flow vector,
/// the working structure rates and the PID errors. The refresh memoises
/// its last input and skips work when the integrator probes the same
/// point twice.
pub struct StateTimeCache<S: Scalar> {
    last_t: f64,
    last_u: Vec<S>,
    valid: bool,

    pub storage: Vec<S>,
    pub level: Vec<S>,
    pub area: Vec<S>,
    pub low_storage: Vec<S>,

    /// Dense flow per collapsed flow link.
    pub flow: Vec<S>,
    /// Working rates after continuous control, before smoothing.
    pub pump_rate: Vec<S>,
    pub outlet_rate: Vec<S>,
    /// Actual vertical loss fluxes after the dry-out smoothing.
    pub evaporation: Vec<S>,
    pub infiltration: Vec<S>,
    pub pid_error: Vec<S>,
    /// Basin storage derivative as accumulated before the PID pass.
    pub dstorage: Vec<S>,
}

impl<S: Scalar> StateTimeCache<S> {
    pub fn new(store: &ParameterStore) -> Self {
        let n_basin = store.basin.len();
        Self {
            last_t: f64::NAN,
            last_u: vec![],
            valid: false,
            storage: vec![S::constant(0.0); n_basin],
            level: vec![S::constant(0.0); n_basin],
            area: vec![S::constant(0.0); n_basin],
            low_storage: vec![S::constant(0.0); n_basin],
            flow: vec![S::constant(0.0); store.incidence.flow_state.len()],
            pump_rate: vec![S::constant(0.0); store.pump.len()],
            outlet_rate: vec![S::constant(0.0); store.outlet.len()],
            evaporation: vec![S::constant(0.0); n_basin],
            infiltration: vec![S::constant(0.0); n_basin],
            pid_error: vec![S::constant(0.0); store.pid_control.len()],
            dstorage: vec![S::constant(0.0); n_basin],
        }
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// True when (u, t) matches the memoised refresh input.
    pub fn matches(&self, u: &[S], t: f64) -> bool {
        self.valid && self.last_t == t && self.last_u.as_slice() == u
    }

    pub fn remember(&mut self, u: &[S], t: f64) {
        self.last_t = t;
        self.last_u.clear();
        self.last_u.extend_from_slice(u);
        self.valid = true;
    }

    /// Reconstruct basin storages from the cumulative-flow state and the
    /// exactly integrated forcing volumes, then derive levels, areas and
    /// the low-storage factors.
    pub fn refresh_basins(&mut self, store: &ParameterStore, u: &[S], t: f64, t0: f64) {
        for b in 0..store.basin.len() {
            let mut storage = S::constant(store.basin.storage0[b] + store.basin.forcing_volume(b, t0, t));
            for &(s, c) in &store.incidence.rows[b] {
                storage = storage + u[s] * c;
            }
            for &fb in &store.incidence.boundary_inflows[b] {
                storage = storage + store.flow_boundary.flow_rate[fb].integrate(t0, t);
            }
            self.storage[b] = storage;
            self.level[b] = store.basin.profile[b].level_from_storage(storage);
            self.area[b] = store.basin.profile[b].area_from_level(self.level[b]);
            self.low_storage[b] = low_storage_factor(storage);
        }
    }
}

/// One cache per scalar type: the integrator itself works on plain
/// floats, Jacobian assembly runs the identical code on duals.
pub struct CachePair {
    pub time: TimeCache,
    pub real: StateTimeCache<f64>,
    pub dual: StateTimeCache<Dual>,
}

impl CachePair {
    pub fn new(store: &ParameterStore) -> Self {
        Self {
            time: TimeCache::new(store),
            real: StateTimeCache::new(store),
            dual: StateTimeCache::new(store),
        }
    }

    pub fn invalidate(&mut self) {
        self.time.invalidate();
        self.real.invalidate();
        self.dual.invalidate();
    }
}
