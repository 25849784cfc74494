//! # Rank Groups & Collectives
//!
//! The block products run SPMD: every rank executes the same call on the same
//! partitioned operands and only the blocks it touches differ.
//!
//! ## 🧩 What a rank needs from its environment
//!
//! *   **Identity**: its rank and the (fixed) world size.
//! *   **Barrier**: a point nobody passes until everybody has arrived.
//! *   **Sum reduction**: element-wise addition of equally sized buffers across ranks.
//!
//! [`Group`] covers the first two and is object safe. [`Collective`] adds the
//! reduction, generic over the element type.
//!
//! ## 📦 Module Contents
//!
//! *   [`ThreadComm`]: one thread per rank, **Ring All-Reduce** over `crossbeam`
//!     channels. [`launch`] spins a group up and collects the per-rank results.
//! *   [`SoloComm`]: the group of one, used when nothing is distributed.

pub mod backend;
pub mod cpu_backend;

pub use backend::{agree, Collective, Group};
pub use cpu_backend::{launch, SoloComm, ThreadComm};
