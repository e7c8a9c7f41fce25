use crate::numerical::dual::Scalar;
use crate::numerical::interpolation::Interpolation;
use crate::numerical::smoothing::wet_depth_factor;
use crate::network::graph::NodeId;

/// Forced flow against the head gradient. The working rate is whatever
/// was latched last: the static series, a continuous-control output, an
/// allocation result, or a PID overwrite.
#[derive(Default)]
pub struct Pump {
    pub node_ids: Vec<NodeId>,
    pub flow_rate: Vec<Interpolation>,
    pub min_flow_rate: Vec<Interpolation>,
    pub max_flow_rate: Vec<Interpolation>,
    pub min_upstream_level: Vec<Interpolation>,
    pub max_downstream_level: Vec<Interpolation>,
    /// Set when a PID controller owns this node's flow; the plain
    /// formulation then leaves the links to the controller.
    pub pid_controlled: Vec<bool>,
    /// Set when the allocation writer latches this node's rate.
    pub allocation_controlled: Vec<bool>,
}

impl Pump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    /// Smoothing factor shared with the PID controller: low-storage
    /// reduction of the source times the level bracket ramps.
    pub fn reduction<S: Scalar>(
        src_factor: S,
        src_level: S,
        dst_level: Option<S>,
        min_upstream_level: f64,
        max_downstream_level: f64,
    ) -> S {
        let mut factor = src_factor * wet_depth_factor(src_level - min_upstream_level);
        if let Some(dst) = dst_level {
            factor = factor * wet_depth_factor(-dst + max_downstream_level);
        }
        factor
    }

    /// The non-PID flow: latched rate, smoothed, then clamped to the
    /// configured bracket.
    #[allow(clippy::too_many_arguments)]
    pub fn flow<S: Scalar>(
        &self,
        rate: S,
        src_factor: S,
        src_level: S,
        dst_level: Option<S>,
        min_upstream_level: f64,
        max_downstream_level: f64,
        min_rate: f64,
        max_rate: f64,
    ) -> S {
        let factor = Self::reduction(
            src_factor,
            src_level,
            dst_level,
            min_upstream_level,
            max_downstream_level,
        );
        (rate * factor)
            .max(S::constant(min_rate))
            .min(S::constant(max_rate))
    }
}
