use crate::numerical::dual::Scalar;

/// Larger root of a*x^2 + b*x + c = 0, degrading to the linear solution
/// when a vanishes. The constant term may carry a derivative.
pub fn quadratic_plus<S: Scalar>(a: f64, b: f64, c: S) -> S {
    if a == 0.0 {
        return -c / b;
    }
    let disc = c * (-4.0 * a) + b * b;
    if disc.value() < 0.0 {
        return S::constant(f64::NAN);
    }
    (disc.sqrt() - b) / (2.0 * a)
}

/// Solve a dense linear system in place by Gaussian elimination with
/// partial pivoting. The matrix and right-hand side are consumed.
pub fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, String> {
    let n = b.len();
    for row in &a {
        if row.len() != n {
            return Err("linear system matrix is not square".to_string());
        }
    }

    for col in 0..n {
        // Pivot on the largest remaining entry in this column
        let mut pivot = col;
        for row in col + 1..n {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-300 {
            return Err(format!("linear system is singular at column {}", col));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    // Back substitution
    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut sum = b[col];
        for k in col + 1..n {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }
    Ok(x)
}
