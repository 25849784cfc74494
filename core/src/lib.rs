//! # bigrls
//!
//! `bigrls` runs regularized least squares experiments as cacheable, resumable pipelines,
//! either on in-memory matrices or on matrices too large for one process: file-backed,
//! row-partitioned across a fixed group of ranks that all execute the same code.
//!
//! ## Modules
//!
//! - [`options`]: the option tree every stage reads from and writes to, plus archives.
//! - [`tasks`]: the task contract and the registry mapping `kind:name` to algorithms.
//! - [`pipeline`]: runs a process plan over a task sequence.
//! - [`big`]: memory-mapped, partitioned matrices.
//! - [`bigmath`]: memory-bounded, rank-distributed block products.
//! - [`distributed`]: rank groups, barriers and sum reductions.
//! - [`matrix`]: the local dense matrix.
//!
//! ## Example
//!
//! ```rust
//! use bigrls::options::{Action, OptionsList, ProcessPlan, TaskSequence};
//! use bigrls::{Matrix, Pipeline, TaskRegistry};
//!
//! let x = Matrix::from_fn(6, 2, |r, c| if (r < 3) == (c == 0) { 1.0 } else { 0.1 });
//! let y = Matrix::from_fn(6, 2, |r, c| if (r < 3) == (c == 0) { 1.0 } else { -1.0 });
//!
//! let mut opt = OptionsList::with_defaults("demo");
//! opt.add("seq", TaskSequence::parse(["paramsel:fixlambda", "optimizer:rlsprimal"])?)?;
//! let mut processes = OptionsList::new("processes");
//! processes.add("train", ProcessPlan::from_iter([Action::Compute, Action::Compute]))?;
//! opt.add("processes", processes)?;
//!
//! Pipeline::new(TaskRegistry::dense()).run(&x, &y, &mut opt, "train")?;
//! assert_eq!(opt.get_local_matrix::<f64>("optimizer.W")?.shape(), [2, 2]);
//! # Ok::<(), bigrls::RlsError>(())
//! ```

pub mod big;
pub mod bigmath;
pub mod config;
pub mod distributed;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod matrix;
pub mod options;
pub mod pipeline;
pub mod tasks;

pub use big::{BigMatrix, PartitionedRef};
pub use bigmath::MemoryBudget;
pub use config::RunConfig;
pub use distributed::{launch, Collective, Group, SoloComm, ThreadComm};
pub use error::{Result, RlsError};
#[cfg(feature = "logging")]
pub use logging::init_logging;
pub use matrix::{Dtype, Matrix, MatrixElem};
pub use options::{OptionValue, OptionsList};
pub use pipeline::Pipeline;
pub use tasks::{BigContext, Task, TaskRegistry};
