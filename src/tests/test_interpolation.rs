use float_cmp::assert_approx_eq;

use crate::numerical::interpolation::{
    Extrapolation, IndexLookup, Interpolation, InterpolationMethod,
};

#[test]
fn test_linear_eval_and_extrapolation() {
    let itp = Interpolation::linear(vec![0.0, 10.0, 20.0], vec![0.0, 5.0, 5.0]).unwrap();
    assert_approx_eq!(f64, itp.eval(5.0), 2.5);
    assert_approx_eq!(f64, itp.eval(15.0), 5.0);
    // Constant extension on both sides
    assert_approx_eq!(f64, itp.eval(-100.0), 0.0);
    assert_approx_eq!(f64, itp.eval(100.0), 5.0);
}

#[test]
fn test_linear_integral_is_exact() {
    let itp = Interpolation::linear(vec![0.0, 10.0], vec![0.0, 10.0]).unwrap();
    // Triangle area plus constant extension
    assert_approx_eq!(f64, itp.integrate(0.0, 10.0), 50.0);
    assert_approx_eq!(f64, itp.integrate(0.0, 20.0), 150.0);
    assert_approx_eq!(f64, itp.integrate(-10.0, 0.0), 0.0);
    assert_approx_eq!(f64, itp.integrate(2.0, 4.0), 6.0);
}

#[test]
fn test_block_holds_previous_value() {
    let itp = Interpolation::new(
        InterpolationMethod::Block,
        Extrapolation::Constant,
        vec![0.0, 10.0, 20.0],
        vec![1.0, 3.0, 7.0],
    )
    .unwrap();
    assert_approx_eq!(f64, itp.eval(0.0), 1.0);
    assert_approx_eq!(f64, itp.eval(9.999), 1.0);
    assert_approx_eq!(f64, itp.eval(10.0), 3.0);
    assert_approx_eq!(f64, itp.eval(25.0), 7.0);
    assert_approx_eq!(f64, itp.derivative(5.0), 0.0);
    // Rectangles: 10*1 + 5*3
    assert_approx_eq!(f64, itp.integrate(0.0, 15.0), 25.0);
}

#[test]
fn test_pchip_is_monotone_and_hits_breakpoints() {
    let x = vec![0.0, 1.0, 2.0, 3.0];
    let y = vec![0.0, 0.1, 5.0, 5.1];
    let itp = Interpolation::new(
        InterpolationMethod::Pchip,
        Extrapolation::Constant,
        x.clone(),
        y.clone(),
    )
    .unwrap();
    for (xv, yv) in x.iter().zip(y.iter()) {
        assert_approx_eq!(f64, itp.eval(*xv), *yv, epsilon = 1e-12);
    }
    // Shape preservation: no dips below the data on an increasing set
    let mut previous = itp.eval(0.0);
    for k in 1..=300 {
        let value = itp.eval(3.0 * k as f64 / 300.0);
        assert!(value >= previous - 1e-12);
        previous = value;
    }
}

#[test]
fn test_pchip_integral_matches_quadrature() {
    let itp = Interpolation::new(
        InterpolationMethod::Pchip,
        Extrapolation::Constant,
        vec![0.0, 1.0, 3.0, 4.0],
        vec![0.0, 2.0, 3.0, 10.0],
    )
    .unwrap();
    // Fine trapezoid sum as the reference
    let n = 200_000;
    let mut reference = 0.0;
    for k in 0..n {
        let a = 4.0 * k as f64 / n as f64;
        let b = 4.0 * (k + 1) as f64 / n as f64;
        reference += 0.5 * (itp.eval(a) + itp.eval(b)) * (b - a);
    }
    assert_approx_eq!(f64, itp.integrate(0.0, 4.0), reference, epsilon = 1e-6);
}

#[test]
fn test_periodic_wraps_and_integrates() {
    let itp = Interpolation::new(
        InterpolationMethod::Linear,
        Extrapolation::Periodic,
        vec![0.0, 2.0, 4.0],
        vec![0.0, 4.0, 0.0],
    )
    .unwrap();
    assert_approx_eq!(f64, itp.eval(1.0), 2.0);
    assert_approx_eq!(f64, itp.eval(5.0), 2.0);
    assert_approx_eq!(f64, itp.eval(-3.0), 2.0);
    // One full period integrates to the triangle area 8
    assert_approx_eq!(f64, itp.integrate(0.0, 4.0), 8.0);
    assert_approx_eq!(f64, itp.integrate(0.0, 12.0), 24.0);
    assert_approx_eq!(f64, itp.integrate(2.0, 6.0), 8.0, epsilon = 1e-12);
}

#[test]
fn test_rejects_unsorted_breakpoints() {
    assert!(Interpolation::linear(vec![0.0, 1.0, 1.0], vec![0.0, 1.0, 2.0]).is_err());
    assert!(Interpolation::linear(vec![2.0, 1.0], vec![0.0, 1.0]).is_err());
    assert!(Interpolation::linear(vec![], vec![]).is_err());
}

#[test]
fn test_derivative_of_linear_segments() {
    let itp = Interpolation::linear(vec![0.0, 10.0, 20.0], vec![0.0, 5.0, 5.0]).unwrap();
    assert_approx_eq!(f64, itp.derivative(5.0), 0.5);
    assert_approx_eq!(f64, itp.derivative(15.0), 0.0);
    assert_approx_eq!(f64, itp.derivative(-1.0), 0.0);
}

#[test]
fn test_index_lookup_switches_at_breakpoints() {
    let lookup = IndexLookup::new(vec![0.0, 100.0], vec![0, 1]).unwrap();
    assert_eq!(lookup.lookup(-5.0), 0);
    assert_eq!(lookup.lookup(0.0), 0);
    assert_eq!(lookup.lookup(99.9), 0);
    assert_eq!(lookup.lookup(100.0), 1);
    assert_eq!(lookup.lookup(1e9), 1);
}
