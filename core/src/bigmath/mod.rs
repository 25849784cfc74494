//! # Distributed Block Products
//!
//! The three products the learning algorithms need, computed on partitioned matrices by
//! every rank of a group at once:
//!
//! | Product | Split                                   | Combine                       |
//! |---------|-----------------------------------------|-------------------------------|
//! | `A·B`   | row blocks of A x column blocks of B    | disjoint tiles, no reduction  |
//! | `Aᵗ·B`  | row blocks of the contraction axis      | sum-reduction to rank 0       |
//! | `A·Bᵗ`  | one column slice per rank               | sum-reduction to rank 0       |
//!
//! Each product has a memory-bounded variant driven by a [`MemoryBudget`] and a
//! `_resident` variant for operands small enough to read whole.
//!
//! All ranks must make the same call with the same arguments. Shapes are checked before
//! any file is touched. Each local phase ends in [`Collective::agree`], so when one rank
//! fails the others return [`RlsError::PeerFailure`] instead of waiting on it, and that
//! agreement is also the barrier after which the result is readable everywhere.
//!
//! ```rust
//! use bigrls::big::BigMatrix;
//! use bigrls::bigmath::{mat_mult_ab, MemoryBudget};
//! use bigrls::distributed::launch;
//! use bigrls::matrix::Matrix;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let a = Matrix::<f64>::from_fn(6, 4, |r, c| (r * 4 + c + 1) as f64);
//! let b = Matrix::<f64>::from_fn(4, 5, |r, c| (r * 5 + c + 1) as f64);
//! BigMatrix::from_matrix(dir.path().join("a"), &a).unwrap();
//! BigMatrix::from_matrix(dir.path().join("b"), &b).unwrap();
//!
//! let products = launch(2, |comm| {
//!     let a = BigMatrix::<f64>::attach(dir.path().join("a")).unwrap();
//!     let b = BigMatrix::<f64>::attach(dir.path().join("b")).unwrap();
//!     let c = mat_mult_ab(&a, &b, dir.path().join("c"), MemoryBudget::elements(8), comm).unwrap();
//!     c.to_matrix().unwrap()
//! })
//! .unwrap();
//!
//! assert_eq!(products[0], a.matmul(&b).unwrap());
//! ```

use crate::big::BigMatrix;
use crate::distributed::Collective;
use crate::error::{Result, RlsError};
use crate::matrix::{Matrix, MatrixElem};
use std::path::Path;

pub mod block;
pub mod plan;

pub use block::{BlockSink, BlockSource};
pub use plan::{AtbPlan, MemoryBudget};

fn check_dim(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(RlsError::SizeMismatch {
            expected: vec![expected],
            got: vec![got],
        });
    }
    Ok(())
}

/// Memory-bounded `A·B`.
///
/// The block count is `ceil(d * max(n, t) / cells)`; see [`plan::plain_block_count`].
pub fn mat_mult_ab<T, C>(
    a: &BigMatrix<T>,
    b: &BigMatrix<T>,
    result: impl AsRef<Path>,
    budget: MemoryBudget,
    comm: &C,
) -> Result<BigMatrix<T>>
where
    T: MatrixElem,
    C: Collective,
{
    check_dim(a.cols(), b.rows())?;
    let num_blocks = plan::plain_block_count(a.rows(), a.cols(), b.cols(), budget)?;
    mat_mult_ab_with_blocks(a, b, result, num_blocks, comm)
}

/// `A·B` with an explicit block count instead of a budget.
pub fn mat_mult_ab_with_blocks<T, C>(
    a: &BigMatrix<T>,
    b: &BigMatrix<T>,
    result: impl AsRef<Path>,
    num_blocks: usize,
    comm: &C,
) -> Result<BigMatrix<T>>
where
    T: MatrixElem,
    C: Collective,
{
    check_dim(a.cols(), b.rows())?;
    let num_blocks = num_blocks.clamp(1, a.rows().max(1));
    let _span = tracing::debug_span!(
        "mat_mult_ab",
        rank = comm.rank(),
        n = a.rows(),
        d = a.cols(),
        t = b.cols(),
        num_blocks
    )
    .entered();

    let mut out = BigMatrix::create_shared(result, a.rows(), b.cols(), comm)?;
    let tiles = block::ab_rank(a, b, &mut out, num_blocks, comm.rank(), comm.world_size());
    let tiles = comm.agree(tiles)?;

    tracing::debug!(tiles, "tiles written");
    Ok(out)
}

/// `A·B` where every rank reads B whole and computes its own row partition of A.
pub fn mat_mult_ab_resident<T, C>(
    a: &BigMatrix<T>,
    b: &BigMatrix<T>,
    result: impl AsRef<Path>,
    comm: &C,
) -> Result<BigMatrix<T>>
where
    T: MatrixElem,
    C: Collective,
{
    check_dim(a.cols(), b.rows())?;
    let _span = tracing::debug_span!("mat_mult_ab_resident", rank = comm.rank()).entered();

    let mut out = BigMatrix::create_shared(result, a.rows(), b.cols(), comm)?;
    let local = block::ab_rank_resident(a, b, &mut out, comm.rank(), comm.world_size());
    comm.agree(local)?;
    Ok(out)
}

/// Memory-bounded `Aᵗ·B`, contracting over the shared row axis.
///
/// # Errors
///
/// `InsufficientMemory` if the budget holds fewer than `2dt + d + t` elements.
pub fn mat_mult_atb<T, C>(
    a: &BigMatrix<T>,
    b: &BigMatrix<T>,
    result: impl AsRef<Path>,
    budget: MemoryBudget,
    comm: &C,
) -> Result<BigMatrix<T>>
where
    T: MatrixElem,
    C: Collective,
{
    check_dim(a.rows(), b.rows())?;
    let plan = AtbPlan::new(a.rows(), a.cols(), b.cols(), budget, comm.world_size())?;
    let _span = tracing::debug_span!(
        "mat_mult_atb",
        rank = comm.rank(),
        num_blocks = plan.num_blocks,
        scratch = plan.scratch
    )
    .entered();

    let partial = block::atb_rank(a, b, &plan, comm.rank(), comm.world_size());
    reduce_into(partial, result, comm)
}

/// `Aᵗ·B` where every rank contracts over its own row partition in one go.
pub fn mat_mult_atb_resident<T, C>(
    a: &BigMatrix<T>,
    b: &BigMatrix<T>,
    result: impl AsRef<Path>,
    comm: &C,
) -> Result<BigMatrix<T>>
where
    T: MatrixElem,
    C: Collective,
{
    check_dim(a.rows(), b.rows())?;
    let _span = tracing::debug_span!("mat_mult_atb_resident", rank = comm.rank()).entered();

    let partial = block::atb_rank_resident(a, b, comm.rank(), comm.world_size());
    reduce_into(partial, result, comm)
}

/// `A·Bᵗ`, contracting over the shared column axis.
pub fn mat_mult_abt<T, C>(
    a: &BigMatrix<T>,
    b: &BigMatrix<T>,
    result: impl AsRef<Path>,
    comm: &C,
) -> Result<BigMatrix<T>>
where
    T: MatrixElem,
    C: Collective,
{
    check_dim(a.cols(), b.cols())?;
    let _span = tracing::debug_span!(
        "mat_mult_abt",
        rank = comm.rank(),
        rows = a.rows(),
        cols = b.rows()
    )
    .entered();

    let partial = block::abt_rank(a, b, comm.rank(), comm.world_size());
    reduce_into(partial, result, comm)
}

/// Sums every rank's partial on rank 0, which writes it to a new partitioned matrix.
fn reduce_into<T, C>(
    partial: Result<Matrix<T>>,
    result: impl AsRef<Path>,
    comm: &C,
) -> Result<BigMatrix<T>>
where
    T: MatrixElem,
    C: Collective,
{
    let mut sum = comm.agree(partial)?;
    let is_root = comm.reduce_sum(sum.data_mut(), 0)?;

    let mut out = BigMatrix::create_shared(result, sum.rows(), sum.cols(), comm)?;
    let written = if is_root {
        out.write_block(0, 0, &sum)
    } else {
        Ok(())
    };
    comm.agree(written)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::SoloComm;
    use tempfile::tempdir;

    fn counting(rows: usize, cols: usize) -> Matrix<f64> {
        Matrix::from_fn(rows, cols, |r, c| (r * cols + c + 1) as f64)
    }

    #[test]
    fn test_solo_products() {
        let dir = tempdir().unwrap();
        let a = BigMatrix::from_matrix(dir.path().join("a"), &counting(6, 4)).unwrap();
        let b = BigMatrix::from_matrix(dir.path().join("b"), &counting(4, 5)).unwrap();
        let c = BigMatrix::from_matrix(dir.path().join("c"), &counting(6, 5)).unwrap();

        let budget = MemoryBudget::elements(12);
        let ab = mat_mult_ab(&a, &b, dir.path().join("ab"), budget, &SoloComm).unwrap();
        let expected = counting(6, 4).matmul(&counting(4, 5)).unwrap();
        assert_eq!(ab.to_matrix().unwrap(), expected);

        let resident = mat_mult_ab_resident(&a, &b, dir.path().join("abr"), &SoloComm).unwrap();
        assert_eq!(resident.to_matrix().unwrap(), expected);

        let budget = MemoryBudget::elements(1000);
        let atb = mat_mult_atb(&a, &c, dir.path().join("atb"), budget, &SoloComm).unwrap();
        assert_eq!(atb.shape(), [4, 5]);
        assert_eq!(atb.to_matrix().unwrap(), counting(6, 4).t_matmul(&counting(6, 5)).unwrap());
    }

    #[test]
    fn test_mismatch_creates_nothing() {
        let dir = tempdir().unwrap();
        let a = BigMatrix::from_matrix(dir.path().join("a"), &counting(6, 4)).unwrap();
        let b = BigMatrix::from_matrix(dir.path().join("b"), &counting(5, 5)).unwrap();
        let out = dir.path().join("out");

        let err = mat_mult_ab(&a, &b, &out, MemoryBudget::elements(100), &SoloComm).unwrap_err();
        assert!(matches!(err, RlsError::SizeMismatch { .. }));
        assert!(!out.exists());

        let err = mat_mult_abt(&a, &b, &out, &SoloComm).unwrap_err();
        assert!(matches!(err, RlsError::SizeMismatch { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn test_atb_insufficient_memory() {
        let dir = tempdir().unwrap();
        let a = BigMatrix::from_matrix(dir.path().join("a"), &counting(6, 4)).unwrap();
        let b = BigMatrix::from_matrix(dir.path().join("b"), &counting(6, 5)).unwrap();

        let budget = MemoryBudget::elements(10);
        let err = mat_mult_atb(&a, &b, dir.path().join("out"), budget, &SoloComm).unwrap_err();
        assert!(matches!(err, RlsError::InsufficientMemory { required: 49, .. }));
    }
}
