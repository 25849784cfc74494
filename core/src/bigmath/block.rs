//! Per-rank block computations.
//!
//! These functions do one rank's share of a product and nothing else: no barriers, no
//! reductions. They read operands through [`BlockSource`] and write tiles through
//! [`BlockSink`], so the same code runs against in-memory matrices in unit tests and
//! against partitioned matrices in the orchestrator.

use super::plan::{chunk, owned_blocks, AtbPlan};
use crate::big::{row_partition, BigMatrix};
use crate::error::Result;
use crate::matrix::{Matrix, MatrixElem};

/// Random-access read of sub-blocks.
pub trait BlockSource<T: MatrixElem> {
    fn shape(&self) -> [usize; 2];

    fn read_block(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<Matrix<T>>;
}

/// Random-access write of sub-blocks.
pub trait BlockSink<T: MatrixElem> {
    fn write_block(&mut self, row: usize, col: usize, block: &Matrix<T>) -> Result<()>;
}

impl<T: MatrixElem> BlockSource<T> for Matrix<T> {
    fn shape(&self) -> [usize; 2] {
        Matrix::shape(self)
    }

    fn read_block(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<Matrix<T>> {
        self.sub_matrix(row, col, rows, cols)
    }
}

impl<T: MatrixElem> BlockSink<T> for Matrix<T> {
    fn write_block(&mut self, row: usize, col: usize, block: &Matrix<T>) -> Result<()> {
        self.set_sub_matrix(row, col, block)
    }
}

impl<T: MatrixElem> BlockSource<T> for BigMatrix<T> {
    fn shape(&self) -> [usize; 2] {
        BigMatrix::shape(self)
    }

    fn read_block(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<Matrix<T>> {
        BigMatrix::read_block(self, row, col, rows, cols)
    }
}

impl<T: MatrixElem> BlockSink<T> for BigMatrix<T> {
    fn write_block(&mut self, row: usize, col: usize, block: &Matrix<T>) -> Result<()> {
        BigMatrix::write_block(self, row, col, block)
    }
}

/// Writes this rank's tiles of `A·B` into `out`.
///
/// Rows of A and columns of B are cut into `num_blocks` chunks each. The rank owns row
/// blocks round robin and computes each of them against every column block, so the tiles
/// it writes never overlap another rank's. Returns the number of tiles written.
pub fn ab_rank<T, A, B, S>(
    a: &A,
    b: &B,
    out: &mut S,
    num_blocks: usize,
    rank: usize,
    world_size: usize,
) -> Result<usize>
where
    T: MatrixElem,
    A: BlockSource<T> + ?Sized,
    B: BlockSource<T> + ?Sized,
    S: BlockSink<T> + ?Sized,
{
    let [n, d] = a.shape();
    let t = b.shape()[1];
    let mut tiles = 0;

    for block in owned_blocks(num_blocks, rank, world_size) {
        let rows = chunk(n, num_blocks, block);
        if rows.is_empty() {
            continue;
        }
        let u = a.read_block(rows.start, 0, rows.len(), d)?;

        for cblock in 0..num_blocks {
            let cols = chunk(t, num_blocks, cblock);
            if cols.is_empty() {
                continue;
            }
            let v = b.read_block(0, cols.start, d, cols.len())?;
            out.write_block(rows.start, cols.start, &u.matmul(&v)?)?;
            tiles += 1;
        }
    }

    Ok(tiles)
}

/// Writes this rank's contiguous row partition of `A·B`, with B read whole.
pub fn ab_rank_resident<T, A, B, S>(
    a: &A,
    b: &B,
    out: &mut S,
    rank: usize,
    world_size: usize,
) -> Result<()>
where
    T: MatrixElem,
    A: BlockSource<T> + ?Sized,
    B: BlockSource<T> + ?Sized,
    S: BlockSink<T> + ?Sized,
{
    let [n, d] = a.shape();
    let [_, t] = b.shape();
    let rows = row_partition(n, rank, world_size);
    if rows.is_empty() {
        return Ok(());
    }

    let v = b.read_block(0, 0, d, t)?;
    let u = a.read_block(rows.start, 0, rows.len(), d)?;
    out.write_block(rows.start, 0, &u.matmul(&v)?)
}

/// This rank's partial sum of `Aᵗ·B` over its round-robin row blocks.
pub fn atb_rank<T, A, B>(
    a: &A,
    b: &B,
    plan: &AtbPlan,
    rank: usize,
    world_size: usize,
) -> Result<Matrix<T>>
where
    T: MatrixElem,
    A: BlockSource<T> + ?Sized,
    B: BlockSource<T> + ?Sized,
{
    let [n, d] = a.shape();
    let t = b.shape()[1];

    let mut sum = Matrix::zeros(d, t);
    let mut scratch = plan.scratch.then(|| Matrix::zeros(d, t));

    for block in owned_blocks(plan.num_blocks, rank, world_size) {
        let rows = chunk(n, plan.num_blocks, block);
        if rows.is_empty() {
            continue;
        }
        let u = a.read_block(rows.start, 0, rows.len(), d)?;
        let v = b.read_block(rows.start, 0, rows.len(), t)?;

        match scratch.as_mut() {
            Some(buffer) => {
                u.t_matmul_into(&v, buffer, false)?;
                sum.add_assign(buffer)?;
            }
            None => u.t_matmul_into(&v, &mut sum, true)?,
        }
    }

    Ok(sum)
}

/// This rank's partial sum of `Aᵗ·B` over its contiguous row partition.
pub fn atb_rank_resident<T, A, B>(a: &A, b: &B, rank: usize, world_size: usize) -> Result<Matrix<T>>
where
    T: MatrixElem,
    A: BlockSource<T> + ?Sized,
    B: BlockSource<T> + ?Sized,
{
    let [n, d] = a.shape();
    let t = b.shape()[1];
    let rows = row_partition(n, rank, world_size);

    let mut sum = Matrix::zeros(d, t);
    if !rows.is_empty() {
        let u = a.read_block(rows.start, 0, rows.len(), d)?;
        let v = b.read_block(rows.start, 0, rows.len(), t)?;
        u.t_matmul_into(&v, &mut sum, false)?;
    }
    Ok(sum)
}

/// This rank's partial `A·Bᵗ` over its slice of the shared column axis.
///
/// The columns are cut into one chunk per rank, the last absorbing the remainder.
pub fn abt_rank<T, A, B>(a: &A, b: &B, rank: usize, world_size: usize) -> Result<Matrix<T>>
where
    T: MatrixElem,
    A: BlockSource<T> + ?Sized,
    B: BlockSource<T> + ?Sized,
{
    let [rows_a, d] = a.shape();
    let rows_b = b.shape()[0];
    let cols = chunk(d, world_size, rank);

    if cols.is_empty() {
        return Ok(Matrix::zeros(rows_a, rows_b));
    }
    let u = a.read_block(0, cols.start, rows_a, cols.len())?;
    let v = b.read_block(0, cols.start, rows_b, cols.len())?;
    u.matmul_t(&v)
}
