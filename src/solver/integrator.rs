//! The integrator contract and the built-in algorithms.
//!
//! The core hands an integrator a reduced state vector, a pure
//! right-hand side, and a set of event functions whose zero crossings
//! mark discrete-control transitions. An integrator advances the state
//! to a stop time, stopping early (with the state localised by
//! bisection) when an event fires. The implicit algorithm assembles its
//! Jacobian column by column through the dual-scalar right-hand side.

use crate::errors::{ConfigError, RunError};
use crate::numerical::dual::Dual;
use crate::numerical::mathfn::solve_linear_system;

/// What the integrator needs from the model.
pub trait RhsSystem {
    fn n(&self) -> usize;
    fn rhs(&mut self, u: &[f64], t: f64, du: &mut [f64]);
    fn rhs_dual(&mut self, u: &[Dual], t: f64, du: &mut [Dual]);
    /// Signed event functions; a sign change between accepted steps
    /// means a discrete-control condition crossed its armed threshold.
    fn event_values(&mut self, u: &[f64], t: f64) -> Vec<f64>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepOutcome {
    /// Advanced all the way to the stop time.
    Reached,
    /// Stopped early because an event function changed sign.
    Event,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlgorithmKind {
    Euler,
    Rk23,
    ImplicitEuler,
}

impl AlgorithmKind {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Ok(match name {
            "euler" => AlgorithmKind::Euler,
            "rk23" => AlgorithmKind::Rk23,
            "implicit_euler" => AlgorithmKind::ImplicitEuler,
            other => return Err(ConfigError::UnknownAlgorithm(other.to_string())),
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct IntegratorSettings {
    pub abstol: f64,
    pub reltol: f64,
    pub dt_initial: f64,
    pub dtmin: f64,
    pub dtmax: f64,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            abstol: 1e-6,
            reltol: 1e-5,
            dt_initial: 1e-3,
            dtmin: 1e-12,
            dtmax: f64::INFINITY,
        }
    }
}

pub fn create_integrator(
    kind: AlgorithmKind,
    settings: IntegratorSettings,
) -> Box<dyn Integrator> {
    match kind {
        AlgorithmKind::Euler => Box::new(Euler::new(settings)),
        AlgorithmKind::Rk23 => Box::new(Rk23::new(settings)),
        AlgorithmKind::ImplicitEuler => Box::new(ImplicitEuler::new(settings)),
    }
}

/// Integrators are Send so a loaded model can sit in the process-wide
/// slot behind the C facade.
pub trait Integrator: Send {
    /// Advance (u, t) to t_stop, or to the first event crossing inside
    /// the span. The state and time are updated in place.
    fn advance(
        &mut self,
        sys: &mut dyn RhsSystem,
        u: &mut Vec<f64>,
        t: &mut f64,
        t_stop: f64,
    ) -> Result<StepOutcome, RunError>;

    /// Forget adapted step sizes after a discontinuous parameter change.
    fn reinitialize(&mut self);
}

/// Relative time tolerance for localising an event crossing.
const EVENT_LOCATE_REL: f64 = 1e-9;

/// Check for an event sign change over an accepted step and, if one
/// fired, bisect the (linearly interpolated) step down to the crossing.
/// Returns the crossing time and state just past it.
fn locate_event(
    sys: &mut dyn RhsSystem,
    g0: &[f64],
    g1: &[f64],
    u0: &[f64],
    u1: &[f64],
    t0: f64,
    t1: f64,
) -> Option<(f64, Vec<f64>)> {
    let crossed =
        |a: &[f64], b: &[f64]| a.iter().zip(b.iter()).any(|(x, y)| (*x < 0.0) != (*y < 0.0));
    if !crossed(g0, g1) {
        return None;
    }

    let interp = |theta: f64| -> Vec<f64> {
        u0.iter()
            .zip(u1.iter())
            .map(|(a, b)| a + theta * (b - a))
            .collect()
    };

    let mut lo = 0.0;
    let mut hi = 1.0;
    let tol = EVENT_LOCATE_REL * (t1 - t0).max(1e-300);
    while (hi - lo) * (t1 - t0) > tol {
        let mid = 0.5 * (lo + hi);
        let um = interp(mid);
        let gm = sys.event_values(&um, t0 + mid * (t1 - t0));
        if crossed(g0, &gm) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    // Hand back the state just past the crossing so the transition
    // handler sees the new side.
    let theta = hi;
    Some((t0 + theta * (t1 - t0), interp(theta)))
}

fn check_finite(u: &[f64], t: f64) -> Result<(), RunError> {
    if u.iter().any(|v| !v.is_finite()) {
        return Err(RunError::Diverged {
            t,
            message: "state contains a non-finite value".to_string(),
        });
    }
    Ok(())
}

/// Fixed-step explicit Euler. Mostly useful for debugging; the adaptive
/// methods are the ones a real model wants.
pub struct Euler {
    settings: IntegratorSettings,
}

impl Euler {
    pub fn new(settings: IntegratorSettings) -> Self {
        Self { settings }
    }
}

impl Integrator for Euler {
    fn advance(
        &mut self,
        sys: &mut dyn RhsSystem,
        u: &mut Vec<f64>,
        t: &mut f64,
        t_stop: f64,
    ) -> Result<StepOutcome, RunError> {
        let n = sys.n();
        let mut du = vec![0.0; n];
        let mut g0 = sys.event_values(u, *t);

        while *t < t_stop {
            let h = self.settings.dt_initial.min(t_stop - *t);
            sys.rhs(u, *t, &mut du);
            let u1: Vec<f64> = u.iter().zip(du.iter()).map(|(a, d)| a + h * d).collect();
            let t1 = *t + h;
            check_finite(&u1, t1)?;

            let g1 = sys.event_values(&u1, t1);
            if let Some((t_event, u_event)) = locate_event(sys, &g0, &g1, u, &u1, *t, t1) {
                *u = u_event;
                *t = t_event;
                return Ok(StepOutcome::Event);
            }
            *u = u1;
            *t = t1;
            g0 = g1;
        }
        Ok(StepOutcome::Reached)
    }

    fn reinitialize(&mut self) {}
}

/// Adaptive Bogacki-Shampine 2(3) pair.
pub struct Rk23 {
    settings: IntegratorSettings,
    h: f64,
}

impl Rk23 {
    pub fn new(settings: IntegratorSettings) -> Self {
        Self {
            h: settings.dt_initial,
            settings,
        }
    }
}

impl Integrator for Rk23 {
    fn advance(
        &mut self,
        sys: &mut dyn RhsSystem,
        u: &mut Vec<f64>,
        t: &mut f64,
        t_stop: f64,
    ) -> Result<StepOutcome, RunError> {
        let n = sys.n();
        let mut k1 = vec![0.0; n];
        let mut k2 = vec![0.0; n];
        let mut k3 = vec![0.0; n];
        let mut k4 = vec![0.0; n];
        let mut g0 = sys.event_values(u, *t);

        while *t < t_stop {
            let h = self.h.min(self.settings.dtmax).min(t_stop - *t);
            if h < self.settings.dtmin {
                return Err(RunError::Diverged {
                    t: *t,
                    message: format!("step size {h:e} fell below the minimum"),
                });
            }

            sys.rhs(u, *t, &mut k1);
            let stage2: Vec<f64> = u
                .iter()
                .zip(k1.iter())
                .map(|(a, d)| a + 0.5 * h * d)
                .collect();
            sys.rhs(&stage2, *t + 0.5 * h, &mut k2);
            let stage3: Vec<f64> = u
                .iter()
                .zip(k2.iter())
                .map(|(a, d)| a + 0.75 * h * d)
                .collect();
            sys.rhs(&stage3, *t + 0.75 * h, &mut k3);

            // Third-order solution
            let u1: Vec<f64> = (0..n)
                .map(|i| u[i] + h * (2.0 / 9.0 * k1[i] + 1.0 / 3.0 * k2[i] + 4.0 / 9.0 * k3[i]))
                .collect();
            let t1 = *t + h;
            sys.rhs(&u1, t1, &mut k4);

            // Embedded second-order error estimate
            let mut err: f64 = 0.0;
            for i in 0..n {
                let u2 = u[i]
                    + h * (7.0 / 24.0 * k1[i] + 0.25 * k2[i] + 1.0 / 3.0 * k3[i] + 0.125 * k4[i]);
                let scale = self.settings.abstol
                    + self.settings.reltol * u1[i].abs().max(u[i].abs());
                let e = (u1[i] - u2) / scale;
                err += e * e;
            }
            let err = (err / n.max(1) as f64).sqrt();

            if !err.is_finite() {
                return Err(RunError::Diverged {
                    t: *t,
                    message: "error estimate is not finite".to_string(),
                });
            }

            if err <= 1.0 {
                check_finite(&u1, t1)?;
                let g1 = sys.event_values(&u1, t1);
                if let Some((t_event, u_event)) = locate_event(sys, &g0, &g1, u, &u1, *t, t1) {
                    *u = u_event;
                    *t = t_event;
                    self.h = (self.h * 0.5).max(self.settings.dtmin);
                    return Ok(StepOutcome::Event);
                }
                *u = u1;
                *t = t1;
                g0 = g1;
                let grow = 0.9 * (1.0 / err.max(1e-12)).powf(1.0 / 3.0);
                self.h = (h * grow.min(5.0)).min(self.settings.dtmax);
            } else {
                let shrink = 0.9 * (1.0 / err).powf(1.0 / 3.0);
                self.h = h * shrink.max(0.2);
            }
        }
        Ok(StepOutcome::Reached)
    }

    fn reinitialize(&mut self) {
        self.h = self.settings.dt_initial;
    }
}

/// Fixed-step backward Euler with a Newton iteration; the Jacobian comes
/// from seeding one dual direction per state column. Slow but steady on
/// stiff problems where the explicit pair grinds to a halt.
pub struct ImplicitEuler {
    settings: IntegratorSettings,
}

impl ImplicitEuler {
    pub fn new(settings: IntegratorSettings) -> Self {
        Self { settings }
    }

    fn jacobian(sys: &mut dyn RhsSystem, u: &[f64], t: f64) -> Vec<Vec<f64>> {
        let n = u.len();
        let mut jac = vec![vec![0.0; n]; n];
        let mut du = vec![Dual::default(); n];
        for col in 0..n {
            let seeded: Vec<Dual> = u
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    if i == col {
                        Dual::seeded(v)
                    } else {
                        Dual::new(v, 0.0)
                    }
                })
                .collect();
            sys.rhs_dual(&seeded, t, &mut du);
            for row in 0..n {
                jac[row][col] = du[row].d;
            }
        }
        jac
    }
}

const NEWTON_MAX_ITER: usize = 12;
const NEWTON_TOL: f64 = 1e-10;

impl Integrator for ImplicitEuler {
    fn advance(
        &mut self,
        sys: &mut dyn RhsSystem,
        u: &mut Vec<f64>,
        t: &mut f64,
        t_stop: f64,
    ) -> Result<StepOutcome, RunError> {
        let n = sys.n();
        let mut du = vec![0.0; n];
        let mut g0 = sys.event_values(u, *t);

        while *t < t_stop {
            let h = self.settings.dt_initial.min(t_stop - *t);
            let t1 = *t + h;

            // Newton on r(v) = v - u - h f(v, t1)
            let mut v = u.clone();
            let mut converged = false;
            for _ in 0..NEWTON_MAX_ITER {
                sys.rhs(&v, t1, &mut du);
                let residual: Vec<f64> = (0..n).map(|i| v[i] - u[i] - h * du[i]).collect();
                let norm = residual.iter().map(|r| r * r).sum::<f64>().sqrt();
                if norm < NEWTON_TOL * (1.0 + u.iter().map(|x| x.abs()).fold(0.0, f64::max)) {
                    converged = true;
                    break;
                }

                let jac = Self::jacobian(sys, &v, t1);
                // I - h J
                let mut a = vec![vec![0.0; n]; n];
                for i in 0..n {
                    for j in 0..n {
                        a[i][j] = if i == j { 1.0 } else { 0.0 } - h * jac[i][j];
                    }
                }
                let rhs: Vec<f64> = residual.iter().map(|r| -r).collect();
                let delta = solve_linear_system(a, rhs).map_err(|message| RunError::Diverged {
                    t: *t,
                    message,
                })?;
                for i in 0..n {
                    v[i] += delta[i];
                }
            }
            if !converged {
                return Err(RunError::Diverged {
                    t: *t,
                    message: "newton iteration did not converge".to_string(),
                });
            }
            check_finite(&v, t1)?;

            let g1 = sys.event_values(&v, t1);
            if let Some((t_event, u_event)) = locate_event(sys, &g0, &g1, u, &v, *t, t1) {
                *u = u_event;
                *t = t_event;
                return Ok(StepOutcome::Event);
            }
            *u = v;
            *t = t1;
            g0 = g1;
        }
        Ok(StepOutcome::Reached)
    }

    fn reinitialize(&mut self) {}
}
