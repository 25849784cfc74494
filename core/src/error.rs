//! Error type shared by every module of the crate.
//!
//! All variants are fatal for the operation that raised them: nothing in the crate
//! retries. In a multi-rank run the block products agree on failures before their
//! collectives (see [`crate::distributed::Collective::agree`]), so a local error on one
//! rank surfaces as [`RlsError::PeerFailure`] on the others instead of a hang.

use bigrls_kernels::KernelError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RlsError {
    /// No task is registered under this stage kind and algorithm name.
    #[error("Cannot create task '{name}' for stage '{kind}'")]
    Creation { kind: String, name: String },

    /// Operand dimensions are incompatible.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    SizeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// A required option path does not resolve.
    #[error("Option not defined: {0}")]
    NotDefined(String),

    /// The key already exists at that level of the option tree.
    #[error("Option already defined: {0}")]
    AlreadyDefined(String),

    /// A node was accessed under the wrong tag.
    #[error("Illegal cast: expected {expected}, found {found}")]
    IllegalCast {
        expected: &'static str,
        found: &'static str,
    },

    /// A task descriptor is not of the form `kind:algorithm`.
    #[error("Invalid task descriptor: {0}")]
    InvalidTask(String),

    /// The memory budget cannot hold the minimum working set of a block product.
    #[error("Not enough memory: need at least {required} elements, budget is {available}")]
    InsufficientMemory { required: usize, available: usize },

    /// A block request falls outside the matrix.
    #[error("Block [{row}+{rows}, {col}+{cols}] is out of bounds for a {shape:?} matrix")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
        shape: [usize; 2],
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The collective substrate itself failed (a peer hung up or panicked).
    #[error("Collective failure: {0}")]
    Collective(String),

    /// Another rank failed before a collective this rank was about to enter.
    #[error("{failed} rank(s) reported a failure before the collective")]
    PeerFailure { failed: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

pub type Result<T> = std::result::Result<T, RlsError>;

impl RlsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RlsError::Io {
            path: path.into(),
            source,
        }
    }
}
