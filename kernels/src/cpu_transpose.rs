use crate::{KernelElem, KernelError, Result};
use rayon::prelude::*;

/// CPU Implementation of Transpose.
///
/// Turns a row-major `rows x cols` matrix into its row-major `cols x rows` transpose.
pub fn cpu_transpose<T>(data: &[T], rows: usize, cols: usize) -> Result<Vec<T>>
where
    T: KernelElem,
{
    if data.len() != rows * cols {
        return Err(KernelError::ShapeMismatch {
            expected: vec![rows, cols],
            got: vec![data.len()],
        });
    }

    let mut out_data = vec![T::zero(); rows * cols];
    if rows == 0 {
        return Ok(out_data);
    }

    // Each output row is one input column.
    out_data
        .as_mut_slice()
        .par_chunks_mut(rows)
        .enumerate()
        .for_each(|(col_idx, out_row)| {
            for (r, out_elem) in out_row.iter_mut().enumerate() {
                *out_elem = data[r * cols + col_idx];
            }
        });

    Ok(out_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose_simple() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2x3

        let result = cpu_transpose(&data, 2, 3).unwrap();
        // Expected 3x2:
        // [1, 4]
        // [2, 5]
        // [3, 6]
        assert_eq!(result, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_transpose_column_vector() {
        let data = vec![1.0, 2.0, 3.0];
        let result = cpu_transpose(&data, 3, 1).unwrap();
        assert_eq!(result, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_transpose_bad_len() {
        let err = cpu_transpose(&[1.0, 2.0, 3.0], 2, 2);
        assert!(matches!(err, Err(KernelError::ShapeMismatch { .. })));
    }
}
