use crate::numerical::dual::Scalar;
use crate::network::graph::NodeId;

/// A trapezoidal open-channel reach between two basins, with the
/// Gauckler-Manning flow computed from depth and area averaged across
/// the endpoints.
#[derive(Default)]
pub struct ManningResistance {
    pub node_ids: Vec<NodeId>,
    pub length: Vec<f64>,
    pub manning_n: Vec<f64>,
    pub profile_width: Vec<f64>,
    pub profile_slope: Vec<f64>,
}

/// Steepness of the atan surrogate for |dh| near zero.
const HEAD_SURROGATE_K: f64 = 1000.0;

/// Keeps the square root away from an exact zero so the Jacobian stays
/// finite at equilibrium.
const HEAD_SURROGATE_EPS: f64 = 1e-200;

impl ManningResistance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    /// Flow between endpoint levels h_a and h_b above endpoint bottoms
    /// b_a and b_b. The sqrt(dh) of the plain Manning formula is not
    /// differentiable at dh = 0, which sits exactly at the equilibrium
    /// the integrator converges to; the atan surrogate keeps it smooth.
    pub fn flow<S: Scalar>(&self, i: usize, h_a: S, h_b: S, b_a: f64, b_b: f64) -> S {
        let width = self.profile_width[i];
        let slope = self.profile_slope[i];
        let n = self.manning_n[i];
        let length = self.length[i];

        let d_a = (h_a - b_a).max(S::constant(0.0));
        let d_b = (h_b - b_b).max(S::constant(0.0));
        let d = (d_a + d_b) / 2.0;

        let area_a = d * width + d_a * d_a * slope;
        let area_b = d * width + d_b * d_b * slope;
        let area = (area_a + area_b) / 2.0;

        let slope_unit = (slope * slope + 1.0).sqrt();
        let perimeter_a = d_a * (2.0 * slope_unit) + width;
        let perimeter_b = d_b * (2.0 * slope_unit) + width;
        let hydraulic_radius = (area_a / perimeter_a + area_b / perimeter_b) / 2.0;

        let dh = h_a - h_b;
        let sign = if dh.value() >= 0.0 { 1.0 } else { -1.0 };
        let surrogate =
            dh / length * ((dh * HEAD_SURROGATE_K).atan() * std::f64::consts::FRAC_2_PI)
                + HEAD_SURROGATE_EPS;

        area * hydraulic_radius.powf(2.0 / 3.0) * surrogate.sqrt() * (sign / n)
    }
}
