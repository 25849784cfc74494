//! Block planning: how many blocks, which rows and columns each one covers, and which
//! rank computes it. Everything here is pure arithmetic on dimensions.

use crate::error::{Result, RlsError};
use crate::matrix::MatrixElem;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// How many matrix elements one rank may hold at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBudget {
    cells: usize,
}

impl MemoryBudget {
    pub const fn elements(cells: usize) -> Self {
        Self { cells }
    }

    /// Converts a byte budget into an element count for `T`.
    pub fn from_bytes<T: MatrixElem>(bytes: usize) -> Self {
        Self {
            cells: bytes / T::DTYPE.width(),
        }
    }

    pub const fn cells(&self) -> usize {
        self.cells
    }
}

/// Range of chunk `index` when `total` is split into `parts` near-equal chunks.
///
/// Every chunk has `total / parts` elements except the last, which absorbs the
/// remainder.
pub fn chunk(total: usize, parts: usize, index: usize) -> Range<usize> {
    let parts = parts.max(1);
    let base = total / parts;
    let start = (index * base).min(total);
    let end = if index + 1 >= parts {
        total
    } else {
        (start + base).min(total)
    };
    start..end
}

/// Global block indices owned by `rank`: `rank, rank + world, rank + 2 * world, ...`
pub fn owned_blocks(
    num_blocks: usize,
    rank: usize,
    world_size: usize,
) -> impl Iterator<Item = usize> {
    (rank..num_blocks).step_by(world_size.max(1))
}

/// Block count for the memory-bounded A·B with `A: n x d` and `B: d x t`.
///
/// `ceil(d * max(n, t) / cells)`, clamped so no row block of A is empty. When `t` is
/// smaller than the count, the leading column chunks of B are empty and the last one
/// takes every column.
pub fn plain_block_count(
    n: usize,
    d: usize,
    t: usize,
    budget: MemoryBudget,
) -> Result<usize> {
    if budget.cells() == 0 {
        return Err(RlsError::InsufficientMemory {
            required: 1,
            available: 0,
        });
    }

    let blocks = (d * n.max(t)).div_ceil(budget.cells());
    Ok(blocks.clamp(1, n.max(1)))
}

/// Working-set plan for the memory-bounded Aᵗ·B with `A: n x d` and `B: n x t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtbPlan {
    /// Number of row blocks the contraction axis is cut into.
    pub num_blocks: usize,
    /// Set when a rank owns more than one block and each block product goes through a
    /// scratch buffer before being added to the accumulator.
    pub scratch: bool,
}

impl AtbPlan {
    pub fn new(
        n: usize,
        d: usize,
        t: usize,
        budget: MemoryBudget,
        world_size: usize,
    ) -> Result<Self> {
        let cells = budget.cells();
        let required = 2 * d * t + d + t;
        if cells < required {
            return Err(RlsError::InsufficientMemory {
                required,
                available: cells,
            });
        }

        let width = d + t;
        if width == 0 {
            return Ok(Self {
                num_blocks: 1,
                scratch: false,
            });
        }

        // One accumulator plus one row block of each operand.
        let max_rows = ((cells - d * t) / width).max(1);
        let mut num_blocks = n.div_ceil(max_rows);
        let mut scratch = false;

        if world_size < num_blocks {
            // Reserve room for the scratch buffer as well.
            let max_rows = ((cells - 2 * d * t) / width).max(1);
            num_blocks = n.div_ceil(max_rows);
            scratch = true;
        }

        Ok(Self {
            num_blocks: num_blocks.clamp(1, n.max(1)),
            scratch,
        })
    }
}
