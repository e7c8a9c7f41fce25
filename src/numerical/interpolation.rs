/// Time interpolation for forcings, boundary levels, demands, control
/// targets and gains. Breakpoints are strictly increasing; outside the
/// breakpoint span a series either holds its end values (Constant) or
/// wraps around with the breakpoint span as the period (Periodic, used
/// for nodes flagged as cyclic).
///
/// Besides point evaluation the series knows its own exact integral,
/// which is how state-independent fluxes enter basin storages without
/// being carried as ODE states.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpolationMethod {
    /// Piecewise linear between breakpoints.
    Linear,
    /// Previous-value step function.
    Block,
    /// Shape-preserving cubic (Fritsch-Carlson slopes).
    Pchip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extrapolation {
    Constant,
    Periodic,
}

#[derive(Clone, Debug)]
pub struct Interpolation {
    method: InterpolationMethod,
    extrapolation: Extrapolation,
    x: Vec<f64>,
    y: Vec<f64>,
    /// Endpoint slopes per breakpoint, only populated for Pchip.
    slopes: Vec<f64>,
    /// cum[i] is the integral from x[0] to x[i].
    cum: Vec<f64>,
}

impl Interpolation {
    /// A series that is the same value everywhere.
    pub fn constant(value: f64) -> Self {
        Self {
            method: InterpolationMethod::Linear,
            extrapolation: Extrapolation::Constant,
            x: vec![0.0],
            y: vec![value],
            slopes: vec![],
            cum: vec![0.0],
        }
    }

    pub fn new(
        method: InterpolationMethod,
        extrapolation: Extrapolation,
        x: Vec<f64>,
        y: Vec<f64>,
    ) -> Result<Self, String> {
        if x.is_empty() {
            return Err("interpolation needs at least one breakpoint".to_string());
        }
        if x.len() != y.len() {
            return Err(format!(
                "interpolation has {} breakpoints but {} values",
                x.len(),
                y.len()
            ));
        }
        for i in 1..x.len() {
            if x[i] <= x[i - 1] {
                return Err(format!(
                    "interpolation breakpoints must be strictly increasing, got {} after {}",
                    x[i],
                    x[i - 1]
                ));
            }
        }
        let mut itp = Self {
            method,
            extrapolation,
            x,
            y,
            slopes: vec![],
            cum: vec![],
        };
        if itp.method == InterpolationMethod::Pchip {
            itp.slopes = pchip_slopes(&itp.x, &itp.y);
        }
        itp.cum = itp.build_cumulative();
        Ok(itp)
    }

    /// Convenience for a linear series with constant end extension.
    pub fn linear(x: Vec<f64>, y: Vec<f64>) -> Result<Self, String> {
        Self::new(InterpolationMethod::Linear, Extrapolation::Constant, x, y)
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// True when the series is a single value with nothing to schedule.
    pub fn is_constant(&self) -> bool {
        self.x.len() == 1
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.x
    }

    pub fn first_x(&self) -> f64 {
        self.x[0]
    }

    pub fn last_x(&self) -> f64 {
        self.x[self.x.len() - 1]
    }

    /// Evaluate the series at time t.
    pub fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        if n == 1 {
            return self.y[0];
        }
        let t = match self.extrapolation {
            Extrapolation::Constant => {
                if t <= self.x[0] {
                    return self.y[0];
                }
                if t >= self.x[n - 1] {
                    return self.y[n - 1];
                }
                t
            }
            Extrapolation::Periodic => self.wrap(t),
        };
        let i = self.segment(t);
        self.eval_segment(i, t)
    }

    /// Time derivative of the series at t. Outside a constant-extrapolated
    /// span this is zero; for block series it is zero everywhere.
    pub fn derivative(&self, t: f64) -> f64 {
        let n = self.x.len();
        if n == 1 {
            return 0.0;
        }
        let t = match self.extrapolation {
            Extrapolation::Constant => {
                if t <= self.x[0] || t >= self.x[n - 1] {
                    return 0.0;
                }
                t
            }
            Extrapolation::Periodic => self.wrap(t),
        };
        let i = self.segment(t);
        match self.method {
            InterpolationMethod::Block => 0.0,
            InterpolationMethod::Linear => {
                (self.y[i + 1] - self.y[i]) / (self.x[i + 1] - self.x[i])
            }
            InterpolationMethod::Pchip => {
                let (_, b, c, d) = self.hermite_coeffs(i);
                let u = t - self.x[i];
                b + u * (2.0 * c + u * 3.0 * d)
            }
        }
    }

    /// Evaluate at a state-dependent argument. The table itself is data,
    /// so sensitivities enter through a first-order expansion around the
    /// argument's point value.
    pub fn eval_scalar<S: crate::numerical::dual::Scalar>(&self, x: S) -> S {
        let v = self.eval(x.value());
        let slope = self.derivative(x.value());
        (x - x.value()) * slope + v
    }

    /// Exact integral of the series over [a, b], a <= b.
    pub fn integrate(&self, a: f64, b: f64) -> f64 {
        debug_assert!(b >= a);
        let n = self.x.len();
        if n == 1 {
            return self.y[0] * (b - a);
        }
        match self.extrapolation {
            Extrapolation::Constant => self.integral_to(b) - self.integral_to(a),
            Extrapolation::Periodic => self.periodic_integral_to(b) - self.periodic_integral_to(a),
        }
    }

    /// Integral from x[0] to t with constant extension on both sides.
    fn integral_to(&self, t: f64) -> f64 {
        let n = self.x.len();
        if t <= self.x[0] {
            return self.y[0] * (t - self.x[0]);
        }
        if t >= self.x[n - 1] {
            return self.cum[n - 1] + self.y[n - 1] * (t - self.x[n - 1]);
        }
        let i = self.segment(t);
        self.cum[i] + self.segment_integral(i, t)
    }

    /// Integral from x[0] to t of the periodically wrapped series.
    fn periodic_integral_to(&self, t: f64) -> f64 {
        let n = self.x.len();
        let period = self.x[n - 1] - self.x[0];
        let total = self.cum[n - 1];
        let offset = t - self.x[0];
        let cycles = (offset / period).floor();
        let partial = self.x[0] + (offset - cycles * period);
        let i = self.segment(partial.min(self.x[n - 1]));
        cycles * total + self.cum[i] + self.segment_integral(i, partial)
    }

    fn wrap(&self, t: f64) -> f64 {
        let n = self.x.len();
        let period = self.x[n - 1] - self.x[0];
        self.x[0] + (t - self.x[0]).rem_euclid(period)
    }

    /// Index of the segment containing t: largest i with x[i] <= t,
    /// clamped to a valid segment.
    fn segment(&self, t: f64) -> usize {
        let n = self.x.len();
        let i = self.x.partition_point(|&xv| xv <= t);
        if i == 0 {
            0
        } else {
            (i - 1).min(n - 2)
        }
    }

    fn eval_segment(&self, i: usize, t: f64) -> f64 {
        match self.method {
            InterpolationMethod::Block => self.y[i],
            InterpolationMethod::Linear => {
                let w = (t - self.x[i]) / (self.x[i + 1] - self.x[i]);
                self.y[i] + w * (self.y[i + 1] - self.y[i])
            }
            InterpolationMethod::Pchip => {
                let (a, b, c, d) = self.hermite_coeffs(i);
                let u = t - self.x[i];
                a + u * (b + u * (c + u * d))
            }
        }
    }

    /// Integral over [x[i], t] within segment i.
    fn segment_integral(&self, i: usize, t: f64) -> f64 {
        let u = t - self.x[i];
        match self.method {
            InterpolationMethod::Block => self.y[i] * u,
            InterpolationMethod::Linear => {
                let h = self.x[i + 1] - self.x[i];
                let slope = (self.y[i + 1] - self.y[i]) / h;
                u * (self.y[i] + 0.5 * slope * u)
            }
            InterpolationMethod::Pchip => {
                let (a, b, c, d) = self.hermite_coeffs(i);
                u * (a + u * (b / 2.0 + u * (c / 3.0 + u * d / 4.0)))
            }
        }
    }

    /// Cubic coefficients of segment i around x[i].
    fn hermite_coeffs(&self, i: usize) -> (f64, f64, f64, f64) {
        let h = self.x[i + 1] - self.x[i];
        let delta = (self.y[i + 1] - self.y[i]) / h;
        let d0 = self.slopes[i];
        let d1 = self.slopes[i + 1];
        let a = self.y[i];
        let b = d0;
        let c = (3.0 * delta - 2.0 * d0 - d1) / h;
        let d = (d0 + d1 - 2.0 * delta) / (h * h);
        (a, b, c, d)
    }

    fn build_cumulative(&self) -> Vec<f64> {
        let n = self.x.len();
        let mut cum = vec![0.0; n];
        for i in 0..n.saturating_sub(1) {
            cum[i + 1] = cum[i] + self.segment_integral(i, self.x[i + 1]);
        }
        cum
    }
}

/// Fritsch-Carlson monotone slopes for a shape-preserving cubic.
fn pchip_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 1 {
        return vec![0.0];
    }
    let mut h = vec![0.0; n - 1];
    let mut delta = vec![0.0; n - 1];
    for i in 0..n - 1 {
        h[i] = x[i + 1] - x[i];
        delta[i] = (y[i + 1] - y[i]) / h[i];
    }
    if n == 2 {
        return vec![delta[0], delta[0]];
    }

    let mut d = vec![0.0; n];
    for i in 1..n - 1 {
        if delta[i - 1] * delta[i] <= 0.0 {
            d[i] = 0.0;
        } else {
            let w1 = 2.0 * h[i] + h[i - 1];
            let w2 = h[i] + 2.0 * h[i - 1];
            d[i] = (w1 + w2) / (w1 / delta[i - 1] + w2 / delta[i]);
        }
    }
    d[0] = edge_slope(h[0], h[1], delta[0], delta[1]);
    d[n - 1] = edge_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
    d
}

/// One-sided three-point estimate for an endpoint slope, clamped so the
/// interpolant stays monotone on its end segment.
fn edge_slope(h0: f64, h1: f64, delta0: f64, delta1: f64) -> f64 {
    let mut d = ((2.0 * h0 + h1) * delta0 - h0 * delta1) / (h0 + h1);
    if d * delta0 <= 0.0 {
        d = 0.0;
    } else if delta0 * delta1 < 0.0 && d.abs() > 3.0 * delta0.abs() {
        d = 3.0 * delta0;
    }
    d
}

/// Step lookup from time to an integer index, used to switch a rating
/// curve between tabulated variants at scheduled times.
#[derive(Clone, Debug)]
pub struct IndexLookup {
    t: Vec<f64>,
    index: Vec<usize>,
}

impl IndexLookup {
    pub fn new(t: Vec<f64>, index: Vec<usize>) -> Result<Self, String> {
        if t.is_empty() || t.len() != index.len() {
            return Err("index lookup needs matching, non-empty time and index columns".to_string());
        }
        for i in 1..t.len() {
            if t[i] <= t[i - 1] {
                return Err("index lookup times must be strictly increasing".to_string());
            }
        }
        Ok(Self { t, index })
    }

    pub fn lookup(&self, time: f64) -> usize {
        let i = self.t.partition_point(|&tv| tv <= time);
        if i == 0 {
            self.index[0]
        } else {
            self.index[i - 1]
        }
    }

    pub fn switch_times(&self) -> &[f64] {
        &self.t
    }
}
