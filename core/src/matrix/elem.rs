//! Element types and the element-erased matrix wrapper.
//!
//! A matrix element has to do three things beyond arithmetic: name its on-disk type
//! ([`Dtype`]), encode itself to little-endian bytes for partitioned storage and for
//! the collective substrate, and move in and out of [`AnyMatrix`] so option nodes can
//! hold matrices without being generic.

use super::Matrix;
use bigrls_kernels::FloatElem;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// On-disk element type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    F32,
    F64,
}

impl Dtype {
    /// Width of one element in bytes.
    pub const fn width(self) -> usize {
        match self {
            Dtype::F32 => 4,
            Dtype::F64 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Dtype::F32 => "f32",
            Dtype::F64 => "f64",
        }
    }

    pub(crate) const fn tag(self) -> u32 {
        match self {
            Dtype::F32 => 1,
            Dtype::F64 => 2,
        }
    }

    pub(crate) fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Dtype::F32),
            2 => Some(Dtype::F64),
            _ => None,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trait bound for elements that can be stored in a [`Matrix`] or a partitioned matrix.
///
/// Implemented for `f32` and `f64`.
pub trait MatrixElem: FloatElem + Serialize + DeserializeOwned + 'static {
    const DTYPE: Dtype;

    /// Writes `self` into `out`, which is exactly `DTYPE.width()` bytes long.
    fn write_le(self, out: &mut [u8]);

    /// Reads a value from exactly `DTYPE.width()` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    fn into_any(matrix: Matrix<Self>) -> AnyMatrix;

    fn from_any(matrix: &AnyMatrix) -> Option<&Matrix<Self>>;
}

macro_rules! impl_matrix_elem {
    ($ty:ty, $dtype:ident) => {
        impl MatrixElem for $ty {
            const DTYPE: Dtype = Dtype::$dtype;

            fn write_le(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }

            fn into_any(matrix: Matrix<Self>) -> AnyMatrix {
                AnyMatrix::$dtype(matrix)
            }

            fn from_any(matrix: &AnyMatrix) -> Option<&Matrix<Self>> {
                match matrix {
                    AnyMatrix::$dtype(m) => Some(m),
                    _ => None,
                }
            }
        }
    };
}

impl_matrix_elem!(f32, F32);
impl_matrix_elem!(f64, F64);

/// Encodes a slice of elements as contiguous little-endian bytes.
pub fn encode<T: MatrixElem>(values: &[T]) -> Vec<u8> {
    let width = T::DTYPE.width();
    let mut bytes = vec![0u8; values.len() * width];
    for (value, chunk) in values.iter().zip(bytes.chunks_exact_mut(width)) {
        value.write_le(chunk);
    }
    bytes
}

/// Decodes little-endian bytes produced by [`encode`]. Trailing partial elements are ignored.
pub fn decode<T: MatrixElem>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::DTYPE.width())
        .map(T::read_le)
        .collect()
}

/// A local dense matrix of either element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnyMatrix {
    F32(Matrix<f32>),
    F64(Matrix<f64>),
}

impl AnyMatrix {
    pub fn dtype(&self) -> Dtype {
        match self {
            AnyMatrix::F32(_) => Dtype::F32,
            AnyMatrix::F64(_) => Dtype::F64,
        }
    }

    pub fn shape(&self) -> [usize; 2] {
        match self {
            AnyMatrix::F32(m) => m.shape(),
            AnyMatrix::F64(m) => m.shape(),
        }
    }

    /// Borrows the matrix as `Matrix<T>` if the element type matches.
    pub fn downcast_ref<T: MatrixElem>(&self) -> Option<&Matrix<T>> {
        T::from_any(self)
    }
}

impl<T: MatrixElem> From<Matrix<T>> for AnyMatrix {
    fn from(matrix: Matrix<T>) -> Self {
        T::into_any(matrix)
    }
}
