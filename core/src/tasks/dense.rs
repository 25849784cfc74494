//! Reference algorithms over in-memory matrices.

use super::common::{self, result_list};
use super::Task;
use crate::error::{Result, RlsError};
use crate::matrix::Matrix;
use crate::options::{OptionsList, TaskKind};

/// `split:ho`
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldoutSplit;

impl Task<Matrix<f64>> for HoldoutSplit {
    fn execute(&self, x: &Matrix<f64>, _y: &Matrix<f64>, opt: &OptionsList) -> Result<OptionsList> {
        let (indices, lasts) = common::holdout_split(x.rows(), opt)?;
        let mut out = result_list(TaskKind::Split);
        out.add("indices", indices)?;
        out.add("lasts", lasts)?;
        Ok(out)
    }
}

/// `kernel:linear`: `K = X·Xᵗ`
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearKernel;

impl Task<Matrix<f64>> for LinearKernel {
    fn execute(
        &self,
        x: &Matrix<f64>,
        _y: &Matrix<f64>,
        _opt: &OptionsList,
    ) -> Result<OptionsList> {
        let mut out = result_list(TaskKind::Kernel);
        out.add("type", "linear")?;
        out.add("K", x.matmul_t(x)?)?;
        Ok(out)
    }
}

/// `optimizer:rlsprimal`
#[derive(Debug, Clone, Copy, Default)]
pub struct RlsPrimal;

impl Task<Matrix<f64>> for RlsPrimal {
    fn execute(&self, x: &Matrix<f64>, y: &Matrix<f64>, opt: &OptionsList) -> Result<OptionsList> {
        if x.rows() != y.rows() {
            return Err(RlsError::SizeMismatch {
                expected: vec![x.rows()],
                got: vec![y.rows()],
            });
        }
        let lambda = common::select_lambda(opt)?;
        let w = common::solve_primal(x.t_matmul(x)?, &x.t_matmul(y)?, x.rows(), lambda)?;

        let mut out = result_list(TaskKind::Optimizer);
        out.add("W", w)?;
        out.add("lambda", lambda)?;
        Ok(out)
    }
}

/// `predictor:primal`: `pred = X·W`
#[derive(Debug, Clone, Copy, Default)]
pub struct PredPrimal;

impl Task<Matrix<f64>> for PredPrimal {
    fn execute(&self, x: &Matrix<f64>, _y: &Matrix<f64>, opt: &OptionsList) -> Result<OptionsList> {
        let w = opt.get_local_matrix::<f64>("optimizer.W")?;
        let mut out = result_list(TaskKind::Predictor);
        out.add("pred", x.matmul(w)?)?;
        Ok(out)
    }
}

/// `performance:macroavg`
#[derive(Debug, Clone, Copy, Default)]
pub struct MacroAvg;

impl Task<Matrix<f64>> for MacroAvg {
    fn execute(&self, _x: &Matrix<f64>, y: &Matrix<f64>, opt: &OptionsList) -> Result<OptionsList> {
        let pred = opt.get_local_matrix::<f64>("predictor.pred")?;
        common::macroavg_result(&common::class_counts(y, pred)?)
    }
}

/// `performance:rmse`
#[derive(Debug, Clone, Copy, Default)]
pub struct Rmse;

impl Task<Matrix<f64>> for Rmse {
    fn execute(&self, _x: &Matrix<f64>, y: &Matrix<f64>, opt: &OptionsList) -> Result<OptionsList> {
        let pred = opt.get_local_matrix::<f64>("predictor.pred")?;
        common::rmse_result(&common::squared_errors(y, pred)?, y.rows())
    }
}
