use crate::numerical::dual::Scalar;

/// Storage below this many storage units drains with a smoothly reduced
/// rate so basins empty asymptotically instead of crossing zero.
pub const LOW_STORAGE_THRESHOLD: f64 = 10.0;

/// Depth (or head difference) below this many metres shuts a flux down
/// smoothly.
pub const DRY_DEPTH_THRESHOLD: f64 = 0.1;

/// C1 smoothstep ramp: 0 at x <= 0, 1 at x >= threshold, monotone cubic
/// in between. Every flow that approaches a physical limit is multiplied
/// by one of these so the derivatives the integrator sees stay
/// continuous. A hard clamp here stalls the step size controller.
pub fn reduction_factor<S: Scalar>(x: S, threshold: f64) -> S {
    if x.value() <= 0.0 {
        S::constant(0.0)
    } else if x.value() >= threshold {
        S::constant(1.0)
    } else {
        let r = x / threshold;
        r * r * (S::constant(3.0) - r * 2.0)
    }
}

/// Reduction on outflow from a basin that is nearly empty.
pub fn low_storage_factor<S: Scalar>(storage: S) -> S {
    reduction_factor(storage, LOW_STORAGE_THRESHOLD)
}

/// Reduction on fluxes that vanish as a basin dries out, keyed on depth
/// or on a head difference.
pub fn wet_depth_factor<S: Scalar>(depth: S) -> S {
    reduction_factor(depth, DRY_DEPTH_THRESHOLD)
}
