use float_cmp::assert_approx_eq;

use crate::numerical::dual::Dual;
use crate::numerical::profile::BasinProfile;

fn trapezoid() -> BasinProfile {
    // Area grows linearly from 100 at the bottom to 300 at 10 m
    BasinProfile::new(vec![0.0, 10.0], vec![100.0, 300.0]).unwrap()
}

#[test]
fn test_storage_is_integral_of_area() {
    let profile = trapezoid();
    assert_approx_eq!(f64, profile.storage_from_level(0.0), 0.0);
    // Trapezoid: (100 + 300)/2 * 10
    assert_approx_eq!(f64, profile.storage_from_level(10.0), 2000.0);
    // Halfway: (100 + 200)/2 * 5
    assert_approx_eq!(f64, profile.storage_from_level(5.0), 750.0);
}

#[test]
fn test_level_storage_round_trip() {
    let profile = BasinProfile::new(vec![1.0, 3.0, 10.0], vec![50.0, 120.0, 120.0]).unwrap();
    for k in 0..=100 {
        let level = 1.0 + 9.0 * k as f64 / 100.0;
        let storage = profile.storage_from_level(level);
        let back: f64 = profile.level_from_storage(storage);
        assert_approx_eq!(f64, back, level, epsilon = 1e-9);
    }
}

#[test]
fn test_level_extrapolates_constant_left_linear_right() {
    let profile = trapezoid();
    // Empty and (transiently) negative storages sit at the bottom
    assert_approx_eq!(f64, profile.level_from_storage(0.0), 0.0);
    assert_approx_eq!(f64, profile.level_from_storage(-5.0), 0.0);
    // Above the top the profile extends with the top area
    let level: f64 = profile.level_from_storage(2000.0 + 600.0);
    assert_approx_eq!(f64, level, 12.0);
}

#[test]
fn test_area_lookup() {
    let profile = trapezoid();
    assert_approx_eq!(f64, profile.area_from_level(0.0), 100.0);
    assert_approx_eq!(f64, profile.area_from_level(5.0), 200.0);
    assert_approx_eq!(f64, profile.area_from_level(10.0), 300.0);
    assert_approx_eq!(f64, profile.area_from_level(-1.0), 100.0);
    assert_approx_eq!(f64, profile.area_from_level(11.0), 300.0);
    assert_approx_eq!(f64, profile.fixed_area(), 300.0);
}

#[test]
fn test_level_from_storage_carries_derivatives() {
    let profile = trapezoid();
    let storage = 750.0;
    let dual: Dual = profile.level_from_storage(Dual::seeded(storage));
    // dh/ds = 1 / area(level)
    let area: f64 = profile.area_from_level(dual.v);
    assert_approx_eq!(f64, dual.d, 1.0 / area, epsilon = 1e-9);

    // Finite-difference cross-check
    let eps = 1e-4;
    let up: f64 = profile.level_from_storage(storage + eps);
    let down: f64 = profile.level_from_storage(storage - eps);
    assert_approx_eq!(f64, dual.d, (up - down) / (2.0 * eps), epsilon = 1e-6);
}

#[test]
fn test_rejects_bad_profiles() {
    assert!(BasinProfile::new(vec![0.0], vec![1.0]).is_err());
    assert!(BasinProfile::new(vec![0.0, 0.0], vec![1.0, 1.0]).is_err());
    assert!(BasinProfile::new(vec![1.0, 0.0], vec![1.0, 1.0]).is_err());
    assert!(BasinProfile::new(vec![0.0, 1.0], vec![0.0, 1.0]).is_err());
    assert!(BasinProfile::new(vec![0.0, 1.0], vec![2.0, 1.0]).is_err());
    assert!(BasinProfile::new(vec![0.0, 1.0], vec![1.0]).is_err());
}
