use crate::{KernelElem, KernelError, Result};
use rayon::prelude::*;

/// Whether an operand enters the product as stored or transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    No,
    Yes,
}

impl Transpose {
    /// Logical `(rows, cols)` of an operand stored as `rows x cols`.
    fn apply(self, rows: usize, cols: usize) -> (usize, usize) {
        match self {
            Transpose::No => (rows, cols),
            Transpose::Yes => (cols, rows),
        }
    }
}

/// CPU general matrix product on row-major slices.
///
/// Computes `out = op(A) · op(B)` or, when `accumulate` is set, `out += op(A) · op(B)`.
/// `a_shape` and `b_shape` are the *stored* shapes; `op` applies the transpose flag.
///
/// This is the only place the crate does the `dot`/`axpy` work of a product, so it
/// can be replaced by a `cblas` `dgemm` call with `beta = accumulate as T`.
#[allow(clippy::too_many_arguments)]
pub fn cpu_gemm<T>(
    a: &[T],
    a_shape: (usize, usize),
    trans_a: Transpose,
    b: &[T],
    b_shape: (usize, usize),
    trans_b: Transpose,
    out: &mut [T],
    accumulate: bool,
) -> Result<()>
where
    T: KernelElem,
{
    check_len(a, a_shape)?;
    check_len(b, b_shape)?;

    let (m, k) = trans_a.apply(a_shape.0, a_shape.1);
    let (k_b, n) = trans_b.apply(b_shape.0, b_shape.1);

    if k != k_b {
        return Err(KernelError::ShapeMismatch {
            expected: vec![k],
            got: vec![k_b],
        });
    }
    if out.len() != m * n {
        return Err(KernelError::ShapeMismatch {
            expected: vec![m, n],
            got: vec![out.len()],
        });
    }
    if n == 0 {
        return Ok(());
    }

    // Bring both operands into "row of A" / "row of Bᵗ" layout so the inner loop
    // walks two contiguous slices.
    let a_rows: std::borrow::Cow<'_, [T]> = match trans_a {
        Transpose::No => a.into(),
        Transpose::Yes => crate::cpu_transpose(a, a_shape.0, a_shape.1)?.into(),
    };
    let b_cols: std::borrow::Cow<'_, [T]> = match trans_b {
        Transpose::No => crate::cpu_transpose(b, b_shape.0, b_shape.1)?.into(),
        Transpose::Yes => b.into(),
    };

    out.par_chunks_mut(n)
        .enumerate()
        .for_each(|(row, out_row)| {
            let a_slice = &a_rows[row * k..(row + 1) * k];

            for (col, out_elem) in out_row.iter_mut().enumerate() {
                let b_slice = &b_cols[col * k..(col + 1) * k];

                let mut sum = T::zero();
                for (&val_a, &val_b) in a_slice.iter().zip(b_slice.iter()) {
                    sum += val_a * val_b;
                }

                if accumulate {
                    *out_elem += sum;
                } else {
                    *out_elem = sum;
                }
            }
        });

    Ok(())
}

fn check_len<T>(data: &[T], shape: (usize, usize)) -> Result<()> {
    if data.len() != shape.0 * shape.1 {
        return Err(KernelError::ShapeMismatch {
            expected: vec![shape.0, shape.1],
            got: vec![data.len()],
        });
    }
    Ok(())
}
