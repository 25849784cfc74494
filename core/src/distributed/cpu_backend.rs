use super::backend::{Collective, Group};
use crate::error::{Result, RlsError};
use crate::matrix::elem::{decode, encode};
use crate::matrix::MatrixElem;
use crossbeam::channel::{unbounded, Receiver, Sender};

/// An in-process SPMD group: each rank is a thread.
///
/// Implements the **Ring All-Reduce** algorithm using `crossbeam` channels, so the data
/// movement matches what a multi-process transport does. Barriers are a one-element
/// all-reduce: no rank can leave before every rank has contributed.
pub struct ThreadComm {
    rank: usize,
    world_size: usize,
    left_rx: Receiver<Vec<u8>>, // Receive from rank - 1
    right_tx: Sender<Vec<u8>>,  // Send to rank + 1
}

impl ThreadComm {
    pub fn new(
        rank: usize,
        world_size: usize,
        left_rx: Receiver<Vec<u8>>,
        right_tx: Sender<Vec<u8>>,
    ) -> Self {
        Self {
            rank,
            world_size,
            left_rx,
            right_tx,
        }
    }

    /// Wires up a ring of `world_size` ranks, returned in rank order.
    ///
    /// Channel `i` connects rank `i` to rank `i + 1`.
    pub fn group(world_size: usize) -> Result<Vec<ThreadComm>> {
        if world_size == 0 {
            return Err(RlsError::Config("a rank group needs at least one rank".into()));
        }

        let (txs, rxs): (Vec<_>, Vec<_>) = (0..world_size).map(|_| unbounded()).unzip();

        Ok((0..world_size)
            .map(|rank| {
                let left = (rank + world_size - 1) % world_size;
                ThreadComm::new(rank, world_size, rxs[left].clone(), txs[rank].clone())
            })
            .collect())
    }

    fn send(&self, bytes: Vec<u8>) -> Result<()> {
        self.right_tx.send(bytes).map_err(|_| {
            RlsError::Collective(format!("rank {} lost its right neighbour", self.rank))
        })
    }

    fn recv(&self) -> Result<Vec<u8>> {
        self.left_rx.recv().map_err(|_| {
            RlsError::Collective(format!("rank {} lost its left neighbour", self.rank))
        })
    }

    /// Element range of ring chunk `idx`.
    fn chunk(&self, idx: usize, chunk_size: usize, total: usize) -> std::ops::Range<usize> {
        let start = (idx * chunk_size).min(total);
        let end = (start + chunk_size).min(total);
        start..end
    }

    fn ring_index(&self, offset: isize) -> usize {
        (self.rank as isize + offset).rem_euclid(self.world_size as isize) as usize
    }
}

impl Group for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn barrier(&self) -> Result<()> {
        self.count_failures(false).map(|_| ())
    }

    fn count_failures(&self, failed: bool) -> Result<usize> {
        let mut flag = [if failed { 1.0f64 } else { 0.0 }];
        self.all_reduce_sum(&mut flag)?;
        Ok(flag[0].round() as usize)
    }
}

impl Collective for ThreadComm {
    fn all_reduce_sum<T: MatrixElem>(&self, data: &mut [T]) -> Result<()> {
        if self.world_size == 1 {
            return Ok(());
        }

        let total_elements = data.len();
        let chunk_size = total_elements.div_ceil(self.world_size).max(1);

        // --- Phase 1: Scatter-Reduce ---
        // In step s, rank r sends chunk (r - s) and adds the chunk (r - s - 1) it receives.
        for step in 0..self.world_size - 1 {
            let send = self.chunk(self.ring_index(-(step as isize)), chunk_size, total_elements);
            self.send(encode(&data[send]))?;

            let recv = self.chunk(
                self.ring_index(-(step as isize) - 1),
                chunk_size,
                total_elements,
            );
            let incoming = decode::<T>(&self.recv()?);
            if incoming.len() != recv.len() {
                return Err(RlsError::Collective(format!(
                    "rank {} received {} elements, expected {}",
                    self.rank,
                    incoming.len(),
                    recv.len()
                )));
            }
            for (slot, value) in data[recv].iter_mut().zip(incoming) {
                *slot += value;
            }
        }

        // --- Phase 2: All-Gather ---
        // Each rank now owns one fully reduced chunk and passes it around the ring.
        for step in 0..self.world_size - 1 {
            let send = self.chunk(
                self.ring_index(1 - step as isize),
                chunk_size,
                total_elements,
            );
            self.send(encode(&data[send]))?;

            let recv = self.chunk(self.ring_index(-(step as isize)), chunk_size, total_elements);
            let incoming = decode::<T>(&self.recv()?);
            if incoming.len() != recv.len() {
                return Err(RlsError::Collective(format!(
                    "rank {} received {} elements, expected {}",
                    self.rank,
                    incoming.len(),
                    recv.len()
                )));
            }
            data[recv].copy_from_slice(&incoming);
        }

        Ok(())
    }
}

/// The trivial group of one rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloComm;

impl Group for SoloComm {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn count_failures(&self, failed: bool) -> Result<usize> {
        Ok(usize::from(failed))
    }
}

impl Collective for SoloComm {
    fn all_reduce_sum<T: MatrixElem>(&self, _data: &mut [T]) -> Result<()> {
        Ok(())
    }
}

/// Runs `f` once per rank of a fresh [`ThreadComm`] group and returns the results in
/// rank order.
///
/// A rank that panics is reported as [`RlsError::Collective`]; its neighbours see their
/// channels close and fail their next collective instead of blocking.
pub fn launch<R, F>(world_size: usize, f: F) -> Result<Vec<R>>
where
    F: Fn(&ThreadComm) -> R + Sync,
    R: Send,
{
    let comms = ThreadComm::group(world_size)?;
    let f = &f;

    std::thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| scope.spawn(move || f(&comm)))
            .collect();

        // Join every rank before looking at the outcomes.
        let joined: Vec<_> = handles.into_iter().map(|handle| handle.join()).collect();
        joined
            .into_iter()
            .enumerate()
            .map(|(rank, outcome)| {
                outcome.map_err(|_| RlsError::Collective(format!("rank {rank} panicked")))
            })
            .collect()
    })
}
