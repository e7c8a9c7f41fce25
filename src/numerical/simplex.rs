//! Dense two-phase primal simplex.
//!
//! The allocation layer builds small linear programs (tens of variables)
//! per subnetwork, so a dense tableau with Bland's anti-cycling rule is
//! plenty. Problems are stated as
//!
//!   minimize c.x   subject to   A_eq.x = b_eq,  A_ub.x <= b_ub,  x >= 0.

const PIVOT_TOL: f64 = 1e-9;
const FEAS_TOL: f64 = 1e-7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LpStatus {
    Optimal,
    Infeasible,
    Unbounded,
    IterationLimit,
}

#[derive(Clone, Debug)]
pub struct LpSolution {
    pub status: LpStatus,
    pub x: Vec<f64>,
    pub objective: f64,
    pub iterations: usize,
}

#[derive(Clone, Debug)]
pub struct LpProblem {
    n: usize,
    objective: Vec<f64>,
    eq: Vec<(Vec<f64>, f64)>,
    le: Vec<(Vec<f64>, f64)>,
}

impl LpProblem {
    pub fn new(n_vars: usize) -> Self {
        Self {
            n: n_vars,
            objective: vec![0.0; n_vars],
            eq: vec![],
            le: vec![],
        }
    }

    pub fn n_vars(&self) -> usize {
        self.n
    }

    /// Replace the objective; the solver minimizes it.
    pub fn set_objective(&mut self, c: Vec<f64>) {
        debug_assert_eq!(c.len(), self.n);
        self.objective = c;
    }

    pub fn add_eq(&mut self, row: Vec<f64>, rhs: f64) {
        debug_assert_eq!(row.len(), self.n);
        self.eq.push((row, rhs));
    }

    pub fn add_le(&mut self, row: Vec<f64>, rhs: f64) {
        debug_assert_eq!(row.len(), self.n);
        self.le.push((row, rhs));
    }

    pub fn add_ge(&mut self, row: Vec<f64>, rhs: f64) {
        let negated = row.iter().map(|v| -v).collect();
        self.le.push((negated, -rhs));
    }

    /// Bound a single variable from above.
    pub fn add_upper_bound(&mut self, var: usize, bound: f64) {
        let mut row = vec![0.0; self.n];
        row[var] = 1.0;
        self.add_le(row, bound);
    }

    pub fn solve(&self, max_iterations: usize) -> LpSolution {
        Tableau::build(self).solve(max_iterations)
    }
}

/// Augmented simplex tableau: constraint rows plus a reduced-cost row.
struct Tableau {
    /// rows[r] has structural, slack and artificial columns, rhs last.
    rows: Vec<Vec<f64>>,
    cost: Vec<f64>,
    basis: Vec<usize>,
    /// The caller's objective over the structural columns.
    objective: Vec<f64>,
    n_struct: usize,
    n_cols: usize,
    first_artificial: usize,
}

impl Tableau {
    fn build(p: &LpProblem) -> Self {
        let m = p.eq.len() + p.le.len();
        let n_slack = p.le.len();

        // Normalize rhs to be nonnegative; negated inequality rows and
        // all equality rows need an artificial variable.
        let mut needs_artificial = vec![false; m];
        let mut normalized: Vec<(Vec<f64>, f64, Option<usize>)> = Vec::with_capacity(m);
        for (k, (row, rhs)) in p.le.iter().enumerate() {
            if *rhs >= 0.0 {
                normalized.push((row.clone(), *rhs, Some(k)));
            } else {
                let negated: Vec<f64> = row.iter().map(|v| -v).collect();
                needs_artificial[normalized.len()] = true;
                normalized.push((negated, -rhs, Some(k)));
            }
        }
        for (row, rhs) in &p.eq {
            if *rhs >= 0.0 {
                needs_artificial[normalized.len()] = true;
                normalized.push((row.clone(), *rhs, None));
            } else {
                let negated: Vec<f64> = row.iter().map(|v| -v).collect();
                needs_artificial[normalized.len()] = true;
                normalized.push((negated, -rhs, None));
            }
        }

        let n_artificial = needs_artificial.iter().filter(|&&v| v).count();
        let first_artificial = p.n + n_slack;
        let n_cols = p.n + n_slack + n_artificial;

        let mut rows = Vec::with_capacity(m);
        let mut basis = vec![0usize; m];
        let mut next_artificial = first_artificial;
        for (r, (row, rhs, slack)) in normalized.iter().enumerate() {
            let mut full = vec![0.0; n_cols + 1];
            full[..p.n].copy_from_slice(row);
            if let Some(k) = slack {
                // Plain rows get +1 slack, negated rows -1 surplus
                full[p.n + k] = if needs_artificial[r] { -1.0 } else { 1.0 };
            }
            if needs_artificial[r] {
                full[next_artificial] = 1.0;
                basis[r] = next_artificial;
                next_artificial += 1;
            } else {
                basis[r] = p.n + slack.unwrap();
            }
            full[n_cols] = *rhs;
            rows.push(full);
        }

        Self {
            rows,
            cost: vec![0.0; n_cols + 1],
            basis,
            objective: p.objective.clone(),
            n_struct: p.n,
            n_cols,
            first_artificial,
        }
    }

    fn solve(mut self, max_iterations: usize) -> LpSolution {
        let mut iterations = 0;

        // Phase 1: drive the artificials to zero
        if self.first_artificial < self.n_cols {
            let mut phase1 = vec![0.0; self.n_cols + 1];
            for j in self.first_artificial..self.n_cols {
                phase1[j] = 1.0;
            }
            self.load_cost(&phase1);
            match self.iterate(max_iterations, &mut iterations, true) {
                LpStatus::Optimal => {}
                status => return self.extract(status, &[]),
            }
            if -self.cost[self.n_cols] > FEAS_TOL {
                return self.extract(LpStatus::Infeasible, &[]);
            }
            self.drive_out_artificials();
        }

        // Phase 2: the real objective
        let c = self.full_objective();
        self.load_cost(&c);
        let status = self.iterate(max_iterations, &mut iterations, false);
        let mut solution = self.extract(status, &c);
        solution.iterations = iterations;
        solution
    }

    /// The caller's objective padded onto the full column set.
    fn full_objective(&self) -> Vec<f64> {
        let mut c = vec![0.0; self.n_cols + 1];
        c[..self.n_struct].copy_from_slice(&self.objective);
        c
    }

    /// Canonicalize the cost row against the current basis.
    fn load_cost(&mut self, c: &[f64]) {
        self.cost = c.to_vec();
        for r in 0..self.rows.len() {
            let cb = c[self.basis[r]];
            if cb != 0.0 {
                for j in 0..=self.n_cols {
                    self.cost[j] -= cb * self.rows[r][j];
                }
            }
        }
    }

    /// Bland's rule simplex iterations on the current cost row.
    fn iterate(
        &mut self,
        max_iterations: usize,
        iterations: &mut usize,
        allow_artificial_entering: bool,
    ) -> LpStatus {
        loop {
            if *iterations >= max_iterations {
                return LpStatus::IterationLimit;
            }

            // Entering column: smallest index with a negative reduced cost
            let limit = if allow_artificial_entering {
                self.n_cols
            } else {
                self.first_artificial
            };
            let mut entering = None;
            for j in 0..limit {
                if self.cost[j] < -PIVOT_TOL {
                    entering = Some(j);
                    break;
                }
            }
            let Some(e) = entering else {
                return LpStatus::Optimal;
            };

            // Leaving row: minimum ratio, ties broken on basis index
            let mut leaving: Option<(usize, f64)> = None;
            for r in 0..self.rows.len() {
                let a = self.rows[r][e];
                if a > PIVOT_TOL {
                    let ratio = self.rows[r][self.n_cols] / a;
                    let better = match leaving {
                        None => true,
                        Some((lr, lratio)) => {
                            ratio < lratio - PIVOT_TOL
                                || (ratio < lratio + PIVOT_TOL
                                    && self.basis[r] < self.basis[lr])
                        }
                    };
                    if better {
                        leaving = Some((r, ratio));
                    }
                }
            }
            let Some((l, _)) = leaving else {
                return LpStatus::Unbounded;
            };

            self.pivot(l, e);
            *iterations += 1;
        }
    }

    fn pivot(&mut self, l: usize, e: usize) {
        let pivot = self.rows[l][e];
        for j in 0..=self.n_cols {
            self.rows[l][j] /= pivot;
        }
        for r in 0..self.rows.len() {
            if r != l {
                let factor = self.rows[r][e];
                if factor != 0.0 {
                    for j in 0..=self.n_cols {
                        self.rows[r][j] -= factor * self.rows[l][j];
                    }
                }
            }
        }
        let factor = self.cost[e];
        if factor != 0.0 {
            for j in 0..=self.n_cols {
                self.cost[j] -= factor * self.rows[l][j];
            }
        }
        self.basis[l] = e;
    }

    /// Pivot basic artificials onto real columns where possible so phase
    /// 2 cannot reactivate them. A row with no real pivot is redundant
    /// and keeps its artificial basic at level zero.
    fn drive_out_artificials(&mut self) {
        for r in 0..self.rows.len() {
            if self.basis[r] >= self.first_artificial {
                let mut col = None;
                for j in 0..self.first_artificial {
                    if self.rows[r][j].abs() > PIVOT_TOL {
                        col = Some(j);
                        break;
                    }
                }
                if let Some(j) = col {
                    self.pivot(r, j);
                }
            }
        }
    }

    fn extract(&self, status: LpStatus, c: &[f64]) -> LpSolution {
        let mut x = vec![0.0; self.n_struct];
        for (r, &b) in self.basis.iter().enumerate() {
            if b < self.n_struct {
                x[b] = self.rows[r][self.n_cols];
            }
        }
        let objective = if c.is_empty() {
            0.0
        } else {
            x.iter()
                .zip(c.iter())
                .map(|(xi, ci)| xi * ci)
                .sum()
        };
        LpSolution {
            status,
            x,
            objective,
            iterations: 0,
        }
    }
}
