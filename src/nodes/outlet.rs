use crate::numerical::dual::Scalar;
use crate::numerical::interpolation::Interpolation;
use crate::numerical::smoothing::wet_depth_factor;
use crate::network::graph::NodeId;

/// Gravity-driven release through a controllable opening. Shares the
/// pump's bracket fields; its minimum upstream level doubles as the
/// crest, and flow dies off smoothly when the head difference over the
/// structure or the head over the crest closes.
#[derive(Default)]
pub struct Outlet {
    pub node_ids: Vec<NodeId>,
    pub flow_rate: Vec<Interpolation>,
    pub min_flow_rate: Vec<Interpolation>,
    pub max_flow_rate: Vec<Interpolation>,
    /// Crest level: no flow once the source level drops to it.
    pub min_upstream_level: Vec<Interpolation>,
    pub max_downstream_level: Vec<Interpolation>,
    pub pid_controlled: Vec<bool>,
    pub allocation_controlled: Vec<bool>,
}

impl Outlet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    /// Smoothing factor shared with the PID controller.
    pub fn reduction<S: Scalar>(
        src_factor: S,
        src_level: S,
        dst_level: Option<S>,
        crest_level: f64,
        max_downstream_level: f64,
    ) -> S {
        let mut factor = src_factor * wet_depth_factor(src_level - crest_level);
        if let Some(dst) = dst_level {
            // Outlets cannot push water uphill
            factor = factor * wet_depth_factor(src_level - dst);
            factor = factor * wet_depth_factor(-dst + max_downstream_level);
        }
        factor
    }

    #[allow(clippy::too_many_arguments)]
    pub fn flow<S: Scalar>(
        &self,
        rate: S,
        src_factor: S,
        src_level: S,
        dst_level: Option<S>,
        crest_level: f64,
        max_downstream_level: f64,
        min_rate: f64,
        max_rate: f64,
    ) -> S {
        let factor = Self::reduction(
            src_factor,
            src_level,
            dst_level,
            crest_level,
            max_downstream_level,
        );
        (rate * factor)
            .max(S::constant(min_rate))
            .min(S::constant(max_rate))
    }
}
