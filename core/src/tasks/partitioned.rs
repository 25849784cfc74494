//! Reference algorithms over partitioned matrices.
//!
//! Every rank executes the same task with the same option tree. Anything that could fail
//! on one rank but not another (file access, mostly) is settled with an agreement before
//! the next collective; failures that depend only on the options fail on every rank alike.

use super::common::{self, result_list};
use super::Task;
use crate::big::BigMatrix;
use crate::bigmath::{self, MemoryBudget};
use crate::distributed::Collective;
use crate::error::{Result, RlsError};
use crate::matrix::Matrix;
use crate::options::{OptionsList, TaskKind};
use std::path::PathBuf;

/// What a partitioned task needs besides its inputs: the rank group, the per-rank memory
/// budget for block products and a shared directory for intermediate matrices.
pub struct BigContext<'a, C> {
    pub comm: &'a C,
    pub budget: MemoryBudget,
    pub work_dir: PathBuf,
}

impl<C> Clone for BigContext<'_, C> {
    fn clone(&self) -> Self {
        Self {
            comm: self.comm,
            budget: self.budget,
            work_dir: self.work_dir.clone(),
        }
    }
}

impl<'a, C: Collective> BigContext<'a, C> {
    pub fn new(comm: &'a C, budget: MemoryBudget, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            comm,
            budget,
            work_dir: work_dir.into(),
        }
    }

    /// Backing file for an intermediate matrix of a stage.
    pub fn path(&self, kind: TaskKind, name: &str) -> PathBuf {
        self.work_dir.join(format!("{kind}_{name}.bgrm"))
    }

    /// Deletes an intermediate matrix once every rank is done with it.
    fn discard(&self, matrix: BigMatrix<f64>) -> Result<()> {
        self.comm.barrier()?;
        let removed = if self.comm.is_root() {
            matrix.remove()
        } else {
            Ok(())
        };
        self.comm.agree(removed)
    }

    /// Publishes a small local matrix, identical on every rank, as a partitioned one.
    fn publish(&self, path: PathBuf, matrix: &Matrix<f64>) -> Result<BigMatrix<f64>> {
        let mut big = BigMatrix::create_shared(path, matrix.rows(), matrix.cols(), self.comm)?;
        let written = if self.comm.is_root() {
            big.write_block(0, 0, matrix)
        } else {
            Ok(())
        };
        self.comm.agree(written)?;
        Ok(big)
    }

    /// Rows of `y` and the stored prediction owned by this rank.
    fn local_labels_and_pred(
        &self,
        y: &BigMatrix<f64>,
        opt: &OptionsList,
    ) -> Result<(Matrix<f64>, Matrix<f64>)> {
        let reference = opt.get_partitioned("predictor.pred")?;
        if reference.shape() != y.shape() {
            return Err(RlsError::SizeMismatch {
                expected: y.shape().to_vec(),
                got: reference.shape().to_vec(),
            });
        }

        let local = (|| {
            let pred = BigMatrix::<f64>::from_ref(reference)?;
            let rows = y.local_rows(self.comm);
            Ok((y.read_rows(rows.clone())?, pred.read_rows(rows)?))
        })();
        self.comm.agree(local)
    }
}

macro_rules! partitioned_task {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name<'a, C> {
            ctx: BigContext<'a, C>,
        }

        impl<'a, C> $name<'a, C> {
            pub fn new(ctx: BigContext<'a, C>) -> Self {
                Self { ctx }
            }
        }
    };
}

partitioned_task!(
    /// `split:ho`. Rank 0 draws the permutations and every rank receives a copy.
    HoldoutSplit
);
partitioned_task!(
    /// `kernel:linear`: `K = X·Xᵗ` as a new partitioned matrix.
    LinearKernel
);
partitioned_task!(
    /// `optimizer:rlsprimal` with `XᵗX` and `XᵗY` from the memory-bounded block product.
    RlsPrimal
);
partitioned_task!(
    /// `predictor:primal`: `pred = X·W` as a new partitioned matrix.
    PredPrimal
);
partitioned_task!(
    /// `performance:macroavg`, each rank scoring its own row partition.
    MacroAvg
);
partitioned_task!(
    /// `performance:rmse`, each rank scoring its own row partition.
    Rmse
);

impl<C: Collective> Task<BigMatrix<f64>> for HoldoutSplit<'_, C> {
    fn execute(
        &self,
        x: &BigMatrix<f64>,
        _y: &BigMatrix<f64>,
        opt: &OptionsList,
    ) -> Result<OptionsList> {
        let comm = self.ctx.comm;
        let (mut indices, mut lasts) = comm.agree(common::holdout_split(x.rows(), opt))?;

        // Broadcast rank 0's draw.
        if !comm.is_root() {
            indices.data_mut().fill(0.0);
            lasts.fill(0.0);
        }
        comm.all_reduce_sum(indices.data_mut())?;
        comm.all_reduce_sum(&mut lasts)?;

        let mut out = result_list(TaskKind::Split);
        out.add("indices", indices)?;
        out.add("lasts", lasts)?;
        Ok(out)
    }
}

impl<C: Collective> Task<BigMatrix<f64>> for LinearKernel<'_, C> {
    fn execute(
        &self,
        x: &BigMatrix<f64>,
        _y: &BigMatrix<f64>,
        _opt: &OptionsList,
    ) -> Result<OptionsList> {
        let k = bigmath::mat_mult_abt(x, x, self.ctx.path(TaskKind::Kernel, "K"), self.ctx.comm)?;

        let mut out = result_list(TaskKind::Kernel);
        out.add("type", "linear")?;
        out.add("K", k.reference())?;
        Ok(out)
    }
}

impl<C: Collective> Task<BigMatrix<f64>> for RlsPrimal<'_, C> {
    fn execute(
        &self,
        x: &BigMatrix<f64>,
        y: &BigMatrix<f64>,
        opt: &OptionsList,
    ) -> Result<OptionsList> {
        if x.rows() != y.rows() {
            return Err(RlsError::SizeMismatch {
                expected: vec![x.rows()],
                got: vec![y.rows()],
            });
        }
        let lambda = common::select_lambda(opt)?;
        let ctx = &self.ctx;

        let xtx_path = ctx.path(TaskKind::Optimizer, "XtX");
        let xty_path = ctx.path(TaskKind::Optimizer, "XtY");
        let xtx = bigmath::mat_mult_atb(x, x, xtx_path, ctx.budget, ctx.comm)?;
        let xty = bigmath::mat_mult_atb(x, y, xty_path, ctx.budget, ctx.comm)?;
        let local = xtx.to_matrix().and_then(|a| Ok((a, xty.to_matrix()?)));
        let (xtx_local, xty_local) = ctx.comm.agree(local)?;
        ctx.discard(xtx)?;
        ctx.discard(xty)?;

        // Same inputs on every rank, so every rank solves to the same W.
        let w = common::solve_primal(xtx_local, &xty_local, x.rows(), lambda)?;

        let mut out = result_list(TaskKind::Optimizer);
        out.add("W", w)?;
        out.add("lambda", lambda)?;
        Ok(out)
    }
}

impl<C: Collective> Task<BigMatrix<f64>> for PredPrimal<'_, C> {
    fn execute(
        &self,
        x: &BigMatrix<f64>,
        _y: &BigMatrix<f64>,
        opt: &OptionsList,
    ) -> Result<OptionsList> {
        let w = opt.get_local_matrix::<f64>("optimizer.W")?;
        if x.cols() != w.rows() {
            return Err(RlsError::SizeMismatch {
                expected: vec![x.cols()],
                got: vec![w.rows()],
            });
        }
        let ctx = &self.ctx;

        let w_big = ctx.publish(ctx.path(TaskKind::Predictor, "W"), w)?;
        let pred = bigmath::mat_mult_ab(
            x,
            &w_big,
            ctx.path(TaskKind::Predictor, "pred"),
            ctx.budget,
            ctx.comm,
        )?;
        ctx.discard(w_big)?;

        let mut out = result_list(TaskKind::Predictor);
        out.add("pred", pred.reference())?;
        Ok(out)
    }
}

impl<C: Collective> Task<BigMatrix<f64>> for MacroAvg<'_, C> {
    fn execute(
        &self,
        _x: &BigMatrix<f64>,
        y: &BigMatrix<f64>,
        opt: &OptionsList,
    ) -> Result<OptionsList> {
        let (y_local, pred_local) = self.ctx.local_labels_and_pred(y, opt)?;
        let mut counts = common::class_counts(&y_local, &pred_local)?;
        self.ctx.comm.all_reduce_sum(&mut counts)?;
        common::macroavg_result(&counts)
    }
}

impl<C: Collective> Task<BigMatrix<f64>> for Rmse<'_, C> {
    fn execute(
        &self,
        _x: &BigMatrix<f64>,
        y: &BigMatrix<f64>,
        opt: &OptionsList,
    ) -> Result<OptionsList> {
        let (y_local, pred_local) = self.ctx.local_labels_and_pred(y, opt)?;
        let mut sums = common::squared_errors(&y_local, &pred_local)?;
        self.ctx.comm.all_reduce_sum(&mut sums)?;
        common::rmse_result(&sums, y.rows())
    }
}
