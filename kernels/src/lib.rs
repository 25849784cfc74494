//! Dense CPU kernels for `bigrls`.
//!
//! Every kernel works on flat, row-major slices and knows nothing about partitioned
//! storage or ranks. The block algorithms in `bigrls::bigmath` call into this crate for
//! each in-memory tile, so swapping these bodies for a BLAS binding is a local change.

use num_traits::{Float, FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod cholesky;
pub mod cpu_matmul;
pub mod cpu_transpose;

pub use cholesky::cholesky_solve;
pub use cpu_matmul::{cpu_gemm, Transpose};
pub use cpu_transpose::cpu_transpose;

#[derive(Error, Debug, PartialEq)]
pub enum KernelError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// The factorized matrix has a non-positive pivot.
    #[error("Matrix is not positive definite (pivot {pivot} is {value})")]
    NotPositiveDefinite { pivot: usize, value: f64 },
}

pub type Result<T> = std::result::Result<T, KernelError>;

/// Trait bound for elements that can be processed by kernels.
/// This mirrors `MatrixElem` in the main crate to avoid circular dependencies.
pub trait KernelElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> KernelElem for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + PartialOrd
{
}

/// Elements that support the square roots needed by factorizations.
pub trait FloatElem: KernelElem + Float {}

impl<T> FloatElem for T where T: KernelElem + Float {}
