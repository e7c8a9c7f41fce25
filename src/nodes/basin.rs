use crate::numerical::interpolation::Interpolation;
use crate::numerical::profile::BasinProfile;
use crate::network::graph::NodeId;

/// The state-bearing reservoirs, one entry per basin in dense-index
/// order. Vertical fluxes split two ways: precipitation, surface runoff
/// and drainage do not depend on the water level, so their volumes are
/// integrated exactly from the forcing series; evaporation and
/// infiltration scale with the wetted area and shut down smoothly as the
/// basin dries, so they ride along as ODE states.
#[derive(Default)]
pub struct Basin {
    pub node_ids: Vec<NodeId>,
    pub storage0: Vec<f64>,
    pub profile: Vec<BasinProfile>,

    // Vertical flux forcings
    pub precipitation: Vec<Interpolation>,
    pub surface_runoff: Vec<Interpolation>,
    pub drainage: Vec<Interpolation>,
    pub evaporation: Vec<Interpolation>,
    pub infiltration: Vec<Interpolation>,

    // Passive tracers: substance names and one concentration row per
    // basin, flow-weighted mixing applied at save points.
    pub substances: Vec<String>,
    pub concentration: Vec<Vec<f64>>,
}

impl Basin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    /// Net state-independent vertical flux rate at time t: rainfall on
    /// the full profile area plus runoff and drainage inflows.
    pub fn forcing_rate(&self, i: usize, t: f64) -> f64 {
        self.precipitation[i].eval(t) * self.profile[i].fixed_area()
            + self.surface_runoff[i].eval(t)
            + self.drainage[i].eval(t)
    }

    /// Exact volume delivered by the state-independent vertical fluxes
    /// over [t0, t].
    pub fn forcing_volume(&self, i: usize, t0: f64, t: f64) -> f64 {
        self.precipitation[i].integrate(t0, t) * self.profile[i].fixed_area()
            + self.surface_runoff[i].integrate(t0, t)
            + self.drainage[i].integrate(t0, t)
    }
}
