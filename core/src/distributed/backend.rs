use crate::error::{Result, RlsError};
use crate::matrix::MatrixElem;

/// Membership in a fixed group of ranks.
///
/// This half of the substrate is object safe so the pipeline can hold a
/// `&dyn Group` without knowing which transport the ranks use.
pub trait Group: Send + Sync {
    /// Returns the rank of the current process/thread.
    fn rank(&self) -> usize;

    /// Returns the total number of ranks, fixed for the lifetime of the group.
    fn world_size(&self) -> usize;

    /// Blocks until every rank of the group has called `barrier`.
    ///
    /// Fails if the substrate notices that a peer is gone; it never times out.
    fn barrier(&self) -> Result<()>;

    /// Sums one failure flag per rank and hands every rank the total.
    ///
    /// Synchronizes like a barrier.
    fn count_failures(&self, failed: bool) -> Result<usize>;

    fn is_root(&self) -> bool {
        self.rank() == 0
    }
}

/// Agrees on the outcome of a local phase before the next collective.
///
/// Every rank contributes whether its `local` result failed, so all ranks either continue
/// together or stop together. A failing rank gets its own error back, the others get
/// [`RlsError::PeerFailure`].
pub fn agree<G, R>(group: &G, local: Result<R>) -> Result<R>
where
    G: Group + ?Sized,
{
    let failed = group.count_failures(local.is_err())?;

    match local {
        Err(err) => {
            tracing::error!(rank = group.rank(), error = %err, "local failure before collective");
            Err(err)
        }
        Ok(_) if failed > 0 => Err(RlsError::PeerFailure { failed }),
        Ok(value) => Ok(value),
    }
}

/// Abstraction for the collective communication substrate.
///
/// The block multiplier needs exactly two primitives from its environment: a barrier
/// (from [`Group`]) and an element-wise sum reduction.
pub trait Collective: Group {
    /// Element-wise sum of `data` across all ranks. On return every rank holds the sum.
    fn all_reduce_sum<T: MatrixElem>(&self, data: &mut [T]) -> Result<()>;

    /// Element-wise sum of `data` delivered to `root`.
    ///
    /// Returns `true` on the root, whose `data` then holds the sum. The content of
    /// `data` on other ranks is unspecified afterwards.
    fn reduce_sum<T: MatrixElem>(&self, data: &mut [T], root: usize) -> Result<bool> {
        self.all_reduce_sum(data)?;
        Ok(self.rank() == root)
    }

    /// See [`agree`].
    fn agree<R>(&self, local: Result<R>) -> Result<R> {
        agree(self, local)
    }
}
