use crate::{FloatElem, KernelError, Result};

/// Solves `A · X = B` for a symmetric positive definite `A` (`n x n`) and `B` (`n x t`).
///
/// Factorizes `A = L·Lᵗ` and runs one forward and one backward substitution per column
/// of `B`. Only the lower triangle of `A` is read.
pub fn cholesky_solve<T>(a: &[T], n: usize, b: &[T], t: usize) -> Result<Vec<T>>
where
    T: FloatElem,
{
    if a.len() != n * n {
        return Err(KernelError::ShapeMismatch {
            expected: vec![n, n],
            got: vec![a.len()],
        });
    }
    if b.len() != n * t {
        return Err(KernelError::ShapeMismatch {
            expected: vec![n, t],
            got: vec![b.len()],
        });
    }

    let l = factorize(a, n)?;
    let mut x = b.to_vec();

    for col in 0..t {
        // L · z = b
        for i in 0..n {
            let mut sum = x[i * t + col];
            for k in 0..i {
                sum -= l[i * n + k] * x[k * t + col];
            }
            x[i * t + col] = sum / l[i * n + i];
        }
        // Lᵗ · x = z
        for i in (0..n).rev() {
            let mut sum = x[i * t + col];
            for k in i + 1..n {
                sum -= l[k * n + i] * x[k * t + col];
            }
            x[i * t + col] = sum / l[i * n + i];
        }
    }

    Ok(x)
}

fn factorize<T: FloatElem>(a: &[T], n: usize) -> Result<Vec<T>> {
    let mut l = vec![T::zero(); n * n];

    for j in 0..n {
        let mut diag = a[j * n + j];
        for k in 0..j {
            diag -= l[j * n + k] * l[j * n + k];
        }
        if diag <= T::zero() {
            return Err(KernelError::NotPositiveDefinite {
                pivot: j,
                value: diag.to_f64().unwrap_or(f64::NAN),
            });
        }
        let pivot = diag.sqrt();
        l[j * n + j] = pivot;

        for i in j + 1..n {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            l[i * n + j] = sum / pivot;
        }
    }

    Ok(l)
}
