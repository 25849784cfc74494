//! Pieces shared by the dense and partitioned reference algorithms.

use super::Task;
use crate::bigmath::BlockSource;
use crate::error::{Result, RlsError};
use crate::matrix::Matrix;
use crate::options::{OptionsList, TaskKind};
use bigrls_kernels::cholesky_solve;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// An empty result map named after its stage.
pub fn result_list(kind: TaskKind) -> OptionsList {
    OptionsList::new(kind.name())
}

/// `nholdouts` random permutations of `0..n`, one per row, and the number of leading
/// entries of each row that are training samples.
///
/// A `seed` option makes the permutations reproducible.
pub fn holdout_split(n: usize, opt: &OptionsList) -> Result<(Matrix<f64>, Vec<f64>)> {
    let nholdouts = opt.get_number("nholdouts")?.max(1.0) as usize;
    let proportion = opt.get_number("hoproportion")?;
    if !(0.0..=1.0).contains(&proportion) {
        return Err(RlsError::Config(format!(
            "hoproportion must lie in [0, 1], got {proportion}"
        )));
    }

    let mut rng = match opt.get_number("seed") {
        Ok(seed) => StdRng::seed_from_u64(seed as u64),
        Err(_) => StdRng::from_rng(&mut rand::rng()),
    };

    let mut indices = Matrix::zeros(nholdouts, n);
    let mut order: Vec<usize> = (0..n).collect();
    for row in 0..nholdouts {
        order.shuffle(&mut rng);
        for (col, &i) in order.iter().enumerate() {
            indices[(row, col)] = i as f64;
        }
    }

    let last = n - (n as f64 * proportion).round() as usize;
    Ok((indices, vec![last as f64; nholdouts]))
}

/// The single regularization parameter: `singlelambda` applied to `paramsel.lambdas`.
pub fn select_lambda(opt: &OptionsList) -> Result<f64> {
    let lambdas = opt.get_number_list("paramsel.lambdas")?;
    let combine = opt.get_function("singlelambda")?;
    combine
        .apply(lambdas)
        .ok_or_else(|| RlsError::NotDefined("paramsel.lambdas".to_string()))
}

/// Solves `(XᵗX + n·λ·I) W = XᵗY` for `W`.
pub fn solve_primal(
    mut xtx: Matrix<f64>,
    xty: &Matrix<f64>,
    n: usize,
    lambda: f64,
) -> Result<Matrix<f64>> {
    let d = xtx.rows();
    if xtx.shape() != [d, d] || xty.rows() != d {
        return Err(RlsError::SizeMismatch {
            expected: vec![d, d],
            got: vec![xtx.cols(), xty.rows()],
        });
    }

    let shift = n as f64 * lambda;
    for i in 0..d {
        xtx[(i, i)] += shift;
    }

    let w = cholesky_solve(xtx.data(), d, xty.data(), xty.cols())?;
    Matrix::new(w, d, xty.cols())
}

fn argmax(row: &[f64]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

/// Per-class hit counts for macro-averaged accuracy.
///
/// Laid out as `[correct_0 .. correct_t, total_0 .. total_t]` so partial counts from
/// several ranks can be summed element-wise.
pub fn class_counts(y: &Matrix<f64>, pred: &Matrix<f64>) -> Result<Vec<f64>> {
    if y.shape() != pred.shape() {
        return Err(RlsError::SizeMismatch {
            expected: y.shape().to_vec(),
            got: pred.shape().to_vec(),
        });
    }

    let t = y.cols();
    let mut counts = vec![0.0; 2 * t];
    for r in 0..y.rows() {
        let truth = argmax(y.row(r));
        counts[t + truth] += 1.0;
        if argmax(pred.row(r)) == truth {
            counts[truth] += 1.0;
        }
    }
    Ok(counts)
}

/// Turns summed [`class_counts`] into per-class accuracy and their mean.
///
/// Classes that never occur get accuracy 0 and are left out of the mean.
pub fn macroavg_result(counts: &[f64]) -> Result<OptionsList> {
    let t = counts.len() / 2;
    let (correct, totals) = counts.split_at(t);

    let acc: Vec<f64> = correct
        .iter()
        .zip(totals)
        .map(|(&c, &n)| if n > 0.0 { c / n } else { 0.0 })
        .collect();
    let present: Vec<f64> = acc
        .iter()
        .zip(totals)
        .filter_map(|(&a, &n)| (n > 0.0).then_some(a))
        .collect();
    let macroavg = if present.is_empty() {
        0.0
    } else {
        present.iter().sum::<f64>() / present.len() as f64
    };

    let mut out = result_list(TaskKind::Performance);
    out.add("acc", acc)?;
    out.add("macroavg", macroavg)?;
    Ok(out)
}

/// Per-column sums of squared errors.
pub fn squared_errors(y: &Matrix<f64>, pred: &Matrix<f64>) -> Result<Vec<f64>> {
    if y.shape() != pred.shape() {
        return Err(RlsError::SizeMismatch {
            expected: y.shape().to_vec(),
            got: pred.shape().to_vec(),
        });
    }

    let mut sums = vec![0.0; y.cols()];
    for r in 0..y.rows() {
        for (sum, (a, b)) in sums.iter_mut().zip(y.row(r).iter().zip(pred.row(r))) {
            *sum += (a - b).powi(2);
        }
    }
    Ok(sums)
}

/// Turns summed [`squared_errors`] over `n` rows into per-column RMSE.
pub fn rmse_result(sums: &[f64], n: usize) -> Result<OptionsList> {
    let n = n.max(1) as f64;
    let rmse: Vec<f64> = sums.iter().map(|s| (s / n).sqrt()).collect();

    let mut out = result_list(TaskKind::Performance);
    out.add("rmse", rmse)?;
    Ok(out)
}

/// `paramsel:fixlambda`: the `lambda` option, once per label column.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixLambda;

impl<X: BlockSource<f64>> Task<X> for FixLambda {
    fn execute(&self, _x: &X, y: &X, opt: &OptionsList) -> Result<OptionsList> {
        let lambda = opt.get_number("lambda")?;
        let mut out = result_list(TaskKind::Paramsel);
        out.add("lambdas", vec![lambda; y.shape()[1]])?;
        Ok(out)
    }
}
