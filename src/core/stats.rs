//! Descriptive statistics and closed-form least squares

/// Minimum number of paired observations for a correlation.
pub const MIN_CORR_OBS: usize = 5;

pub fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Mean of the present values, `None` when there are none.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, n) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        return None;
    }
    finite(sum / n as f64)
}

/// Pearson correlation over pairwise-complete observations.
pub fn pearson<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (Option<f64>, Option<f64>)>,
{
    let complete: Vec<(f64, f64)> = pairs
        .into_iter()
        .filter_map(|(a, b)| Some((a?, b?)))
        .collect();
    if complete.len() < MIN_CORR_OBS {
        return None;
    }

    let n = complete.len() as f64;
    let mean_a = complete.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_b = complete.iter().map(|(_, b)| b).sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (a, b) in &complete {
        let da = a - mean_a;
        let db = b - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    finite(cov / (var_a.sqrt() * var_b.sqrt()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub beta: Vec<f64>,
    pub std_err: Vec<f64>,
    pub t_stat: Vec<f64>,
    pub r2: Option<f64>,
    pub n_obs: usize,
    pub n_params: usize,
}

/// Ordinary least squares via the normal equations. `x` holds one row per
/// observation and must include the intercept column if one is wanted.
/// Returns `None` when there are fewer observations than parameters or the
/// design matrix is rank deficient.
pub fn ols(x: &[Vec<f64>], y: &[f64]) -> Option<OlsFit> {
    let n = y.len();
    let k = x.first()?.len();
    if n != x.len() || n < k || k == 0 {
        return None;
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, yi) in x.iter().zip(y) {
        for i in 0..k {
            xty[i] += row[i] * yi;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let xtx_inv = invert(&xtx)?;
    let beta: Vec<f64> = (0..k)
        .map(|i| (0..k).map(|j| xtx_inv[i][j] * xty[j]).sum())
        .collect();

    let mean_y = y.iter().sum::<f64>() / n as f64;
    let (mut ss_res, mut ss_tot) = (0.0, 0.0);
    for (row, yi) in x.iter().zip(y) {
        let fitted: f64 = row.iter().zip(&beta).map(|(a, b)| a * b).sum();
        ss_res += (yi - fitted).powi(2);
        ss_tot += (yi - mean_y).powi(2);
    }

    let dof = n.saturating_sub(k).max(1) as f64;
    let sigma2 = ss_res / dof;
    let std_err: Vec<f64> = (0..k).map(|i| (sigma2 * xtx_inv[i][i]).sqrt()).collect();
    let t_stat = beta.iter().zip(&std_err).map(|(b, se)| b / se).collect();
    let r2 = if ss_tot > 0.0 {
        finite(1.0 - ss_res / ss_tot)
    } else {
        None
    };

    Some(OlsFit {
        beta,
        std_err,
        t_stat,
        r2,
        n_obs: n,
        n_params: k,
    })
}

/// Gauss-Jordan inversion with partial pivoting.
fn invert(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let k = matrix.len();
    let scale = matrix
        .iter()
        .flatten()
        .fold(0.0_f64, |m, v| m.max(v.abs()));
    if scale == 0.0 {
        return None;
    }
    let tolerance = scale * 1e-12;

    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..k)
        .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..k {
        let pivot = (col..k).max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))?;
        if a[pivot][col].abs() <= tolerance {
            return None;
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);

        let p = a[col][col];
        for j in 0..k {
            a[col][j] /= p;
            inv[col][j] /= p;
        }
        for row in 0..k {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..k {
                a[row][j] -= factor * a[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }
    Some(inv)
}
