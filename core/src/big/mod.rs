//! # Partitioned Matrices
//!
//! A [`BigMatrix`] is a dense matrix that lives in a file on storage every rank can see.
//! Each rank maps the same file, so any rank can read any block. Rows are logically
//! split into one contiguous range per rank ([`row_partition`]); the split only decides
//! who *writes* what.
//!
//! There is no locking. Concurrent writers must target disjoint regions, and content is
//! only guaranteed consistent after a barrier that follows the write phase.

use crate::distributed::{Collective, Group};
use crate::error::{Result, RlsError};
use crate::matrix::{Dtype, Matrix, MatrixElem};
use memmap2::MmapMut;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::ops::Range;
use std::path::{Path, PathBuf};

pub mod header;

use header::{Header, HEADER_LEN};

/// Contiguous row range owned by `rank` out of `world_size`.
///
/// Every rank gets `rows / world_size` rows; the last one also takes the remainder.
pub fn row_partition(rows: usize, rank: usize, world_size: usize) -> Range<usize> {
    let world_size = world_size.max(1);
    let base = rows / world_size;
    let start = (rank * base).min(rows);
    let end = if rank + 1 >= world_size {
        rows
    } else {
        ((rank + 1) * base).min(rows)
    };
    start..end
}

/// A serializable handle to a partitioned matrix, as stored in an option tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionedRef {
    pub path: PathBuf,
    pub rows: usize,
    pub cols: usize,
    pub dtype: Dtype,
}

impl PartitionedRef {
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }
}

/// A file-backed, memory-mapped dense matrix.
pub struct BigMatrix<T> {
    path: PathBuf,
    rows: usize,
    cols: usize,
    map: MmapMut,
    _elem: PhantomData<T>,
}

impl<T: MatrixElem> BigMatrix<T> {
    /// Creates (or truncates) the backing file and zero-fills it.
    pub fn create(path: impl AsRef<Path>, rows: usize, cols: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let header = Header {
            rows,
            cols,
            dtype: T::DTYPE,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| RlsError::io(&path, e))?;
        file.set_len(header.file_len() as u64)
            .map_err(|e| RlsError::io(&path, e))?;

        let mut map = map_file(&file, &path)?;
        map[..HEADER_LEN].copy_from_slice(&header.encode());

        tracing::debug!(
            path = %path.display(),
            rows,
            cols,
            dtype = %T::DTYPE,
            "created partitioned matrix"
        );
        Ok(Self {
            path,
            rows,
            cols,
            map,
            _elem: PhantomData,
        })
    }

    /// Maps an existing file, taking the dimensions from its header.
    ///
    /// # Errors
    ///
    /// `IllegalCast` if the file holds a different element type, `Serialization` if it is
    /// not a partitioned matrix or is shorter than its header claims.
    pub fn attach(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| RlsError::io(&path, e))?;
        let map = map_file(&file, &path)?;

        let header = Header::decode(&map)?;
        if header.dtype != T::DTYPE {
            return Err(RlsError::IllegalCast {
                expected: T::DTYPE.name(),
                found: header.dtype.name(),
            });
        }
        if map.len() < header.file_len() {
            return Err(RlsError::Serialization(format!(
                "{} is truncated: {} bytes, expected {}",
                path.display(),
                map.len(),
                header.file_len()
            )));
        }

        Ok(Self {
            path,
            rows: header.rows,
            cols: header.cols,
            map,
            _elem: PhantomData,
        })
    }

    /// Attaches if the file exists, otherwise creates it.
    ///
    /// An existing file with other dimensions is a `SizeMismatch`.
    pub fn open(path: impl AsRef<Path>, rows: usize, cols: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Self::create(path, rows, cols);
        }

        let existing = Self::attach(path)?;
        if existing.shape() != [rows, cols] {
            return Err(RlsError::SizeMismatch {
                expected: vec![rows, cols],
                got: existing.shape().to_vec(),
            });
        }
        Ok(existing)
    }

    /// Attaches to the matrix behind a stored reference, checking that it still matches.
    pub fn from_ref(reference: &PartitionedRef) -> Result<Self> {
        if reference.dtype != T::DTYPE {
            return Err(RlsError::IllegalCast {
                expected: T::DTYPE.name(),
                found: reference.dtype.name(),
            });
        }
        let attached = Self::attach(&reference.path)?;
        if attached.shape() != reference.shape() {
            return Err(RlsError::SizeMismatch {
                expected: reference.shape().to_vec(),
                got: attached.shape().to_vec(),
            });
        }
        Ok(attached)
    }

    /// Collective creation: the root creates the file, everybody else attaches once it
    /// exists. All ranks must call this.
    pub fn create_shared<C: Collective>(
        path: impl AsRef<Path>,
        rows: usize,
        cols: usize,
        comm: &C,
    ) -> Result<Self> {
        let path = path.as_ref();
        let created = if comm.is_root() {
            Self::create(path, rows, cols).map(Some)
        } else {
            Ok(None)
        };

        // The agreement doubles as the barrier between creation and attachment.
        match comm.agree(created)? {
            Some(matrix) => Ok(matrix),
            None => {
                let attached = Self::attach(path)?;
                if attached.shape() != [rows, cols] {
                    return Err(RlsError::SizeMismatch {
                        expected: vec![rows, cols],
                        got: attached.shape().to_vec(),
                    });
                }
                Ok(attached)
            }
        }
    }

    /// Writes a local matrix to a new backing file.
    pub fn from_matrix(path: impl AsRef<Path>, matrix: &Matrix<T>) -> Result<Self> {
        let mut big = Self::create(path, matrix.rows(), matrix.cols())?;
        big.write_block(0, 0, matrix)?;
        Ok(big)
    }

    /// Reads the whole matrix into memory.
    pub fn to_matrix(&self) -> Result<Matrix<T>> {
        self.read_block(0, 0, self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn dtype(&self) -> Dtype {
        T::DTYPE
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reference(&self) -> PartitionedRef {
        PartitionedRef {
            path: self.path.clone(),
            rows: self.rows,
            cols: self.cols,
            dtype: T::DTYPE,
        }
    }

    /// Rows owned by `rank` in a group of `world_size`.
    pub fn partition(&self, rank: usize, world_size: usize) -> Range<usize> {
        row_partition(self.rows, rank, world_size)
    }

    /// Rows owned by the calling rank of `group`.
    pub fn local_rows(&self, group: &dyn Group) -> Range<usize> {
        self.partition(group.rank(), group.world_size())
    }

    /// Materializes the `rows x cols` block at `(row, col)`, whichever rank owns it.
    pub fn read_block(
        &self,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    ) -> Result<Matrix<T>> {
        self.check_block(row, col, rows, cols)?;
        let width = T::DTYPE.width();

        let mut data = Vec::with_capacity(rows * cols);
        for r in row..row + rows {
            let start = self.offset(r, col);
            let bytes = &self.map[start..start + cols * width];
            data.extend(bytes.chunks_exact(width).map(T::read_le));
        }
        Matrix::new(data, rows, cols)
    }

    /// Reads full rows `range` of the matrix.
    pub fn read_rows(&self, range: Range<usize>) -> Result<Matrix<T>> {
        self.read_block(range.start, 0, range.len(), self.cols)
    }

    /// Writes `block` with its top-left corner at `(row, col)`.
    pub fn write_block(&mut self, row: usize, col: usize, block: &Matrix<T>) -> Result<()> {
        self.check_block(row, col, block.rows(), block.cols())?;
        let width = T::DTYPE.width();

        for r in 0..block.rows() {
            let start = self.offset(row + r, col);
            let bytes = &mut self.map[start..start + block.cols() * width];
            for (value, chunk) in block.row(r).iter().zip(bytes.chunks_exact_mut(width)) {
                value.write_le(chunk);
            }
        }
        Ok(())
    }

    /// Flushes outstanding writes to the backing file.
    pub fn flush(&self) -> Result<()> {
        self.map.flush().map_err(|e| RlsError::io(&self.path, e))
    }

    /// Unmaps and deletes the backing file.
    pub fn remove(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(&path).map_err(|e| RlsError::io(&path, e))
    }

    fn offset(&self, row: usize, col: usize) -> usize {
        HEADER_LEN + (row * self.cols + col) * T::DTYPE.width()
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

impl<T: MatrixElem> std::fmt::Debug for BigMatrix<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigMatrix")
            .field("path", &self.path)
            .field("shape", &self.shape())
            .field("dtype", &T::DTYPE)
            .finish()
    }
}

fn map_file(file: &File, path: &Path) -> Result<MmapMut> {
    // SAFETY: the file stays open for the lifetime of the map. Other ranks map the same
    // file, but writers only ever touch disjoint regions between barriers.
    unsafe { MmapMut::map_mut(file) }.map_err(|e| RlsError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::launch;
    use tempfile::tempdir;

    fn counting(rows: usize, cols: usize) -> Matrix<f64> {
        Matrix::from_fn(rows, cols, |r, c| (r * cols + c + 1) as f64)
    }

    #[test]
    fn test_row_partition_covers_rows() {
        for world in 1..=7 {
            let mut next = 0;
            for rank in 0..world {
                let range = row_partition(10, rank, world);
                assert_eq!(range.start, next);
                next = range.end;
            }
            assert_eq!(next, 10);
        }
        // Last rank absorbs the remainder.
        assert_eq!(row_partition(10, 2, 3), 6..10);
        // More ranks than rows leaves the early ranks empty.
        assert_eq!(row_partition(2, 0, 4), 0..0);
        assert_eq!(row_partition(2, 3, 4), 0..2);
    }

    #[test]
    fn test_create_write_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bgrm");
        let source = counting(6, 4);

        let big = BigMatrix::from_matrix(&path, &source).unwrap();
        assert_eq!(big.shape(), [6, 4]);
        assert_eq!(big.to_matrix().unwrap(), source);

        let block = big.read_block(2, 1, 3, 2).unwrap();
        assert_eq!(block, source.sub_matrix(2, 1, 3, 2).unwrap());
        assert_eq!(big.read_rows(4..6).unwrap().row(1), source.row(5));
    }

    #[test]
    fn test_reopen_sees_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.bgrm");

        let mut big = BigMatrix::<f32>::open(&path, 3, 3).unwrap();
        big.write_block(1, 1, &Matrix::new(vec![5.0, 6.0], 1, 2).unwrap())
            .unwrap();
        big.flush().unwrap();

        let again = BigMatrix::<f32>::open(&path, 3, 3).unwrap();
        assert_eq!(again.read_block(1, 1, 1, 2).unwrap().data(), &[5.0, 6.0]);
        assert_eq!(again.read_block(0, 0, 1, 1).unwrap().data(), &[0.0]);

        assert!(matches!(
            BigMatrix::<f32>::open(&path, 3, 4),
            Err(RlsError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_attach_wrong_dtype() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.bgrm");
        BigMatrix::<f32>::create(&path, 2, 2).unwrap();

        assert!(matches!(
            BigMatrix::<f64>::attach(&path),
            Err(RlsError::IllegalCast {
                expected: "f64",
                found: "f32"
            })
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        let dir = tempdir().unwrap();
        let mut big = BigMatrix::<f64>::create(dir.path().join("d.bgrm"), 2, 3).unwrap();

        assert!(matches!(
            big.read_block(1, 0, 2, 1),
            Err(RlsError::OutOfBounds { .. })
        ));
        assert!(matches!(
            big.write_block(0, 2, &Matrix::zeros(1, 2)),
            Err(RlsError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_remove_deletes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("e.bgrm");
        let big = BigMatrix::<f64>::create(&path, 1, 1).unwrap();
        assert!(path.exists());
        big.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_create_shared_and_disjoint_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.bgrm");

        launch(3, |comm| {
            let mut big = BigMatrix::<f64>::create_shared(&path, 7, 2, comm).unwrap();
            let rows = big.local_rows(comm);
            let block = Matrix::from_fn(rows.len(), 2, |r, _| (rows.start + r) as f64);
            big.write_block(rows.start, 0, &block).unwrap();
            comm.barrier().unwrap();

            // Every rank sees every rank's rows.
            let all = big.to_matrix().unwrap();
            (0..7).all(|r| all[(r, 1)] == r as f64)
        })
        .unwrap()
        .into_iter()
        .for_each(|ok| assert!(ok));
    }
}
