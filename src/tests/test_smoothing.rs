use float_cmp::assert_approx_eq;

use crate::numerical::dual::{Dual, Scalar};
use crate::numerical::smoothing::{
    low_storage_factor, reduction_factor, wet_depth_factor, DRY_DEPTH_THRESHOLD,
    LOW_STORAGE_THRESHOLD,
};

#[test]
fn test_reduction_factor_endpoints() {
    assert_eq!(reduction_factor(-1.0, 10.0), 0.0);
    assert_eq!(reduction_factor(0.0, 10.0), 0.0);
    assert_eq!(reduction_factor(10.0, 10.0), 1.0);
    assert_eq!(reduction_factor(1e12, 10.0), 1.0);
    // Midpoint of the smoothstep is exactly one half
    assert_approx_eq!(f64, reduction_factor(5.0, 10.0), 0.5);
}

#[test]
fn test_reduction_factor_is_monotone() {
    let mut previous = 0.0;
    for k in 0..=1000 {
        let x = 10.0 * k as f64 / 1000.0;
        let value = reduction_factor(x, 10.0);
        assert!(value >= previous);
        previous = value;
    }
}

#[test]
fn test_reduction_factor_derivative_vanishes_at_ends() {
    // The ramp joins its plateaus with zero slope, which is what keeps
    // the right-hand side C1
    let d0 = Dual::new(1e-9, 1.0);
    assert!(reduction_factor(d0, 10.0).d < 1e-6);
    let d1 = Dual::new(10.0 - 1e-9, 1.0);
    assert!(reduction_factor(d1, 10.0).d < 1e-6);
    // Steepest in the middle: s'(1/2) = 1.5 / threshold
    let dm = Dual::new(5.0, 1.0);
    assert_approx_eq!(f64, reduction_factor(dm, 10.0).d, 0.15, epsilon = 1e-12);
}

#[test]
fn test_named_factors_use_their_thresholds() {
    assert_eq!(low_storage_factor(LOW_STORAGE_THRESHOLD), 1.0);
    assert_approx_eq!(f64, low_storage_factor(LOW_STORAGE_THRESHOLD / 2.0), 0.5);
    assert_eq!(wet_depth_factor(DRY_DEPTH_THRESHOLD), 1.0);
    assert_approx_eq!(f64, wet_depth_factor(DRY_DEPTH_THRESHOLD / 2.0), 0.5);
    assert_eq!(wet_depth_factor(f64::INFINITY), 1.0);
}

#[test]
fn test_dual_value_matches_plain_evaluation() {
    for k in 0..50 {
        let x = 0.3 * k as f64;
        let dual = reduction_factor(Dual::seeded(x), 10.0);
        assert_approx_eq!(f64, dual.value(), reduction_factor(x, 10.0));
    }
}
