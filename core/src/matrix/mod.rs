//! Local dense matrices.
//!
//! A [`Matrix`] is a row-major block of elements that fits in one rank's memory. It is
//! what a partitioned matrix hands out when a sub-block is read, what the block
//! multiplier multiplies tile by tile, and what option nodes hold as learned weights.
//!
//! ```rust
//! use bigrls::matrix::Matrix;
//!
//! let a = Matrix::<f64>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
//! let b = Matrix::<f64>::new(vec![7.0, 8.0, 9.0, 1.0, 2.0, 3.0], 3, 2).unwrap();
//!
//! let c = a.matmul(&b).unwrap();
//! assert_eq!(c.data(), &[31.0, 19.0, 85.0, 55.0]);
//! ```
//!
//! The three products the learning algorithms need all go through one kernel call:
//! `matmul` (A·B), `t_matmul` (Aᵗ·B) and `matmul_t` (A·Bᵗ). None of them materializes
//! a transposed copy of a whole operand outside the kernel.

use crate::error::{Result, RlsError};
use bigrls_kernels::{cpu_gemm, Transpose};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::ops::{Index, IndexMut};

pub mod elem;
pub(crate) mod float_serde;

pub use elem::{AnyMatrix, Dtype, MatrixElem};

/// Row-major dense matrix.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: MatrixElem")]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    #[serde(with = "float_serde::seq")]
    data: Vec<T>,
}

impl<T: MatrixElem> Matrix<T> {
    /// Creates a matrix from row-major data.
    ///
    /// # Errors
    ///
    /// Returns `RlsError::SizeMismatch` if `data.len() != rows * cols`.
    pub fn new(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(RlsError::SizeMismatch {
                expected: vec![rows * cols],
                got: vec![data.len()],
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::zero(); rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = T::one();
        }
        m
    }

    /// Builds a matrix by evaluating `f(row, col)` for every element.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    pub const fn rows(&self) -> usize {
        self.rows
    }

    pub const fn cols(&self) -> usize {
        self.cols
    }

    pub const fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    /// Total number of elements.
    pub const fn size(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Element at `(r, c)`, or `None` outside the matrix.
    pub fn get(&self, r: usize, c: usize) -> Option<T> {
        (r < self.rows && c < self.cols).then(|| self.data[r * self.cols + c])
    }

    pub fn set(&mut self, r: usize, c: usize, value: T) -> Result<()> {
        if r >= self.rows || c >= self.cols {
            return Err(RlsError::OutOfBounds {
                row: r,
                col: c,
                rows: 1,
                cols: 1,
                shape: self.shape(),
            });
        }
        self.data[r * self.cols + c] = value;
        Ok(())
    }

    pub fn row(&self, r: usize) -> &[T] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// A·B
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        self.product(Transpose::No, rhs, Transpose::No)
    }

    /// Aᵗ·B, contracting over the shared row dimension.
    pub fn t_matmul(&self, rhs: &Self) -> Result<Self> {
        self.product(Transpose::Yes, rhs, Transpose::No)
    }

    /// A·Bᵗ, contracting over the shared column dimension.
    pub fn matmul_t(&self, rhs: &Self) -> Result<Self> {
        self.product(Transpose::No, rhs, Transpose::Yes)
    }

    /// Computes `out = Aᵗ·B`, or `out += Aᵗ·B` when `accumulate` is set.
    pub fn t_matmul_into(&self, rhs: &Self, out: &mut Self, accumulate: bool) -> Result<()> {
        if self.rows != rhs.rows {
            return Err(RlsError::SizeMismatch {
                expected: vec![self.rows],
                got: vec![rhs.rows],
            });
        }
        if out.shape() != [self.cols, rhs.cols] {
            return Err(RlsError::SizeMismatch {
                expected: vec![self.cols, rhs.cols],
                got: out.shape().to_vec(),
            });
        }
        cpu_gemm(
            &self.data,
            (self.rows, self.cols),
            Transpose::Yes,
            &rhs.data,
            (rhs.rows, rhs.cols),
            Transpose::No,
            &mut out.data,
            accumulate,
        )?;
        Ok(())
    }

    fn product(&self, trans_a: Transpose, rhs: &Self, trans_b: Transpose) -> Result<Self> {
        let (m, k) = logical(self.shape(), trans_a);
        let (k_b, n) = logical(rhs.shape(), trans_b);
        if k != k_b {
            return Err(RlsError::SizeMismatch {
                expected: vec![k],
                got: vec![k_b],
            });
        }

        let mut out = Self::zeros(m, n);
        cpu_gemm(
            &self.data,
            (self.rows, self.cols),
            trans_a,
            &rhs.data,
            (rhs.rows, rhs.cols),
            trans_b,
            &mut out.data,
            false,
        )?;
        Ok(out)
    }

    pub fn transpose(&self) -> Result<Self> {
        let data = bigrls_kernels::cpu_transpose(&self.data, self.rows, self.cols)?;
        Ok(Self {
            rows: self.cols,
            cols: self.rows,
            data,
        })
    }

    /// Copies out the `rows x cols` block starting at `(row, col)`.
    pub fn sub_matrix(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<Self> {
        self.check_block(row, col, rows, cols)?;
        let mut data = Vec::with_capacity(rows * cols);
        for r in row..row + rows {
            let start = r * self.cols + col;
            data.extend_from_slice(&self.data[start..start + cols]);
        }
        Ok(Self { rows, cols, data })
    }

    /// Overwrites the block starting at `(row, col)` with `block`.
    pub fn set_sub_matrix(&mut self, row: usize, col: usize, block: &Self) -> Result<()> {
        self.check_block(row, col, block.rows, block.cols)?;
        for r in 0..block.rows {
            let start = (row + r) * self.cols + col;
            self.data[start..start + block.cols].copy_from_slice(block.row(r));
        }
        Ok(())
    }

    /// Element-wise `self += rhs`.
    pub fn add_assign(&mut self, rhs: &Self) -> Result<()> {
        if self.shape() != rhs.shape() {
            return Err(RlsError::SizeMismatch {
                expected: self.shape().to_vec(),
                got: rhs.shape().to_vec(),
            });
        }
        for (a, &b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// Largest absolute element-wise difference, as `f64`.
    pub fn max_abs_diff(&self, rhs: &Self) -> Result<f64> {
        if self.shape() != rhs.shape() {
            return Err(RlsError::SizeMismatch {
                expected: self.shape().to_vec(),
                got: rhs.shape().to_vec(),
            });
        }
        Ok(self
            .data
            .iter()
            .zip(rhs.data.iter())
            .map(|(&a, &b)| (a - b).abs().to_f64().unwrap_or(f64::INFINITY))
            .fold(0.0, f64::max))
    }

    fn check_block(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<()> {
        if row + rows > self.rows || col + cols > self.cols {
            return Err(RlsError::OutOfBounds {
                row,
                col,
                rows,
                cols,
                shape: self.shape(),
            });
        }
        Ok(())
    }
}

fn logical(shape: [usize; 2], trans: Transpose) -> (usize, usize) {
    match trans {
        Transpose::No => (shape[0], shape[1]),
        Transpose::Yes => (shape[1], shape[0]),
    }
}

impl<T: MatrixElem> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    fn index(&self, (r, c): (usize, usize)) -> &T {
        &self.data[r * self.cols + c]
    }
}

impl<T: MatrixElem> IndexMut<(usize, usize)> for Matrix<T> {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut T {
        &mut self.data[r * self.cols + c]
    }
}

impl<T: MatrixElem> Debug for Matrix<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matrix")
            .field("shape", &self.shape())
            .field("dtype", &T::DTYPE)
            .field("data_len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting(rows: usize, cols: usize) -> Matrix<f64> {
        Matrix::from_fn(rows, cols, |r, c| (r * cols + c + 1) as f64)
    }

    #[test]
    fn test_matrix_creation() {
        let m = Matrix::<f64>::new(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        assert_eq!(m.shape(), [2, 2]);
        assert_eq!(m[(1, 0)], 3.0);

        let err = Matrix::<f64>::new(vec![1.0, 2.0, 3.0], 2, 2);
        assert!(matches!(err, Err(RlsError::SizeMismatch { .. })));
    }

    #[test]
    fn test_identity_and_zeros() {
        let i = Matrix::<f32>::identity(3);
        assert_eq!(i.data(), &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(Matrix::<f32>::zeros(2, 2).data(), &[0.0; 4]);
    }

    #[test]
    fn test_products_agree_with_transpose() {
        let a = counting(6, 4);
        let b = counting(6, 5);

        let direct = a.transpose().unwrap().matmul(&b).unwrap();
        let fused = a.t_matmul(&b).unwrap();
        assert_eq!(fused.shape(), [4, 5]);
        assert_eq!(direct, fused);

        let c = counting(5, 4);
        let direct = a.matmul(&c.transpose().unwrap()).unwrap();
        let fused = a.matmul_t(&c).unwrap();
        assert_eq!(direct, fused);
    }

    #[test]
    fn test_matmul_mismatch() {
        let a = Matrix::<f64>::zeros(2, 3);
        let b = Matrix::<f64>::zeros(4, 2);
        assert!(matches!(a.matmul(&b), Err(RlsError::SizeMismatch { .. })));
        assert!(matches!(a.t_matmul(&b), Err(RlsError::SizeMismatch { .. })));
    }

    #[test]
    fn test_t_matmul_into_accumulates() {
        let a = counting(3, 2);
        let b = counting(3, 2);
        let mut out = Matrix::zeros(2, 2);

        a.t_matmul_into(&b, &mut out, false).unwrap();
        let once = out.clone();
        a.t_matmul_into(&b, &mut out, true).unwrap();

        for (twice, single) in out.data().iter().zip(once.data()) {
            assert_eq!(*twice, 2.0 * single);
        }
    }

    #[test]
    fn test_sub_matrix_round_trip() {
        let m = counting(4, 4);
        let block = m.sub_matrix(1, 2, 2, 2).unwrap();
        assert_eq!(block.data(), &[7.0, 8.0, 11.0, 12.0]);

        let mut target = Matrix::<f64>::zeros(4, 4);
        target.set_sub_matrix(1, 2, &block).unwrap();
        assert_eq!(target[(2, 3)], 12.0);
        assert_eq!(target[(0, 0)], 0.0);

        assert!(matches!(
            m.sub_matrix(3, 0, 2, 1),
            Err(RlsError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_add_assign_and_diff() {
        let mut a = counting(2, 2);
        let b = counting(2, 2);
        a.add_assign(&b).unwrap();
        assert_eq!(a.data(), &[2.0, 4.0, 6.0, 8.0]);
        assert_eq!(a.max_abs_diff(&b).unwrap(), 4.0);
    }

    #[test]
    fn test_get_set() {
        let mut m = Matrix::<f64>::zeros(2, 3);
        m.set(1, 2, 4.5).unwrap();
        assert_eq!(m.get(1, 2), Some(4.5));
        assert_eq!(m[(1, 2)], 4.5);
        assert_eq!(m.get(2, 0), None);
        assert!(matches!(m.set(0, 3, 1.0), Err(RlsError::OutOfBounds { .. })));
    }

    #[test]
    fn test_matrix_debug() {
        let m = Matrix::<f64>::zeros(1, 2);
        let debug_str = format!("{:?}", m);
        assert!(debug_str.contains("Matrix"));
        assert!(debug_str.contains("F64"));
    }
}
