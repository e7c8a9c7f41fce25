use float_cmp::assert_approx_eq;

use crate::numerical::dual::Dual;
use crate::solver::integrator::{
    create_integrator, AlgorithmKind, IntegratorSettings, RhsSystem, StepOutcome,
};

/// du/dt = lambda * u, the classic.
struct Decay {
    lambda: f64,
}

impl RhsSystem for Decay {
    fn n(&self) -> usize {
        1
    }

    fn rhs(&mut self, u: &[f64], _t: f64, du: &mut [f64]) {
        du[0] = self.lambda * u[0];
    }

    fn rhs_dual(&mut self, u: &[Dual], _t: f64, du: &mut [Dual]) {
        du[0] = u[0] * self.lambda;
    }

    fn event_values(&mut self, _u: &[f64], _t: f64) -> Vec<f64> {
        vec![]
    }
}

/// du/dt = 1 with an event when u crosses 2.
struct Ramp;

impl RhsSystem for Ramp {
    fn n(&self) -> usize {
        1
    }

    fn rhs(&mut self, _u: &[f64], _t: f64, du: &mut [f64]) {
        du[0] = 1.0;
    }

    fn rhs_dual(&mut self, _u: &[Dual], _t: f64, du: &mut [Dual]) {
        du[0] = Dual::new(1.0, 0.0);
    }

    fn event_values(&mut self, u: &[f64], _t: f64) -> Vec<f64> {
        vec![u[0] - 2.0]
    }
}

fn settings(dt: f64) -> IntegratorSettings {
    IntegratorSettings {
        abstol: 1e-10,
        reltol: 1e-9,
        dt_initial: dt,
        dtmin: 1e-14,
        dtmax: 1.0,
    }
}

#[test]
fn test_rk23_matches_the_exponential() {
    let mut integrator = create_integrator(AlgorithmKind::Rk23, settings(0.01));
    let mut system = Decay { lambda: -1.0 };
    let mut u = vec![1.0];
    let mut t = 0.0;
    let outcome = integrator.advance(&mut system, &mut u, &mut t, 5.0).unwrap();
    assert_eq!(outcome, StepOutcome::Reached);
    assert_approx_eq!(f64, t, 5.0);
    assert_approx_eq!(f64, u[0], (-5.0_f64).exp(), epsilon = 1e-6);
}

#[test]
fn test_euler_converges_with_small_steps() {
    let mut integrator = create_integrator(AlgorithmKind::Euler, settings(1e-4));
    let mut system = Decay { lambda: -1.0 };
    let mut u = vec![1.0];
    let mut t = 0.0;
    integrator.advance(&mut system, &mut u, &mut t, 1.0).unwrap();
    assert_approx_eq!(f64, u[0], (-1.0_f64).exp(), epsilon = 1e-3);
}

#[test]
fn test_implicit_euler_handles_a_stiff_decay() {
    // Explicit Euler at this step size would explode (|1 + h*lambda| =
    // 99); backward Euler just walks down
    let mut integrator = create_integrator(AlgorithmKind::ImplicitEuler, settings(0.1));
    let mut system = Decay { lambda: -1000.0 };
    let mut u = vec![1.0];
    let mut t = 0.0;
    integrator.advance(&mut system, &mut u, &mut t, 1.0).unwrap();
    assert!(u[0].abs() < 1e-3, "stiff decay left {}", u[0]);
    assert!(u[0] >= 0.0);
}

#[test]
fn test_implicit_euler_is_first_order_accurate() {
    let run = |dt: f64| -> f64 {
        let mut integrator = create_integrator(AlgorithmKind::ImplicitEuler, settings(dt));
        let mut system = Decay { lambda: -1.0 };
        let mut u = vec![1.0];
        let mut t = 0.0;
        integrator.advance(&mut system, &mut u, &mut t, 1.0).unwrap();
        (u[0] - (-1.0_f64).exp()).abs()
    };
    let coarse = run(0.1);
    let fine = run(0.01);
    // Error shrinks roughly linearly with the step
    assert!(fine < coarse / 5.0);
}

#[test]
fn test_event_is_localised_by_bisection() {
    for kind in [AlgorithmKind::Euler, AlgorithmKind::Rk23, AlgorithmKind::ImplicitEuler] {
        let mut integrator = create_integrator(kind, settings(0.3));
        let mut system = Ramp;
        let mut u = vec![0.0];
        let mut t = 0.0;
        let outcome = integrator.advance(&mut system, &mut u, &mut t, 10.0).unwrap();
        assert_eq!(outcome, StepOutcome::Event, "{:?}", kind);
        assert_approx_eq!(f64, t, 2.0, epsilon = 1e-6);
        assert!(u[0] >= 2.0, "state must sit just past the crossing");

        // Continuing past the event reaches the stop time
        let outcome = integrator.advance(&mut system, &mut u, &mut t, 10.0).unwrap();
        assert_eq!(outcome, StepOutcome::Reached);
        assert_approx_eq!(f64, t, 10.0);
    }
}

#[test]
fn test_unknown_algorithm_name() {
    assert!(AlgorithmKind::from_name("rk23").is_ok());
    assert!(AlgorithmKind::from_name("cash_karp").is_err());
}
