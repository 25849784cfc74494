//! # Tasks
//!
//! A task is one algorithm for one stage kind. The pipeline never names algorithms
//! directly: it asks a [`TaskRegistry`] for `kind:name` and calls [`Task::execute`].
//!
//! Registries are plain values built at start-up. [`TaskRegistry::dense`] carries the
//! reference algorithms for in-memory matrices and [`TaskRegistry::partitioned`] their
//! counterparts for partitioned matrices.
//!
//! | Descriptor             | Reads                              | Writes under the kind       |
//! |------------------------|------------------------------------|-----------------------------|
//! | `split:ho`             | `nholdouts`, `hoproportion`, `seed`| `indices`, `lasts`          |
//! | `kernel:linear`        |                                    | `type`, `K`                 |
//! | `paramsel:fixlambda`   | `lambda`                           | `lambdas`                   |
//! | `optimizer:rlsprimal`  | `paramsel.lambdas`, `singlelambda` | `W`, `lambda`               |
//! | `predictor:primal`     | `optimizer.W`                      | `pred`                      |
//! | `performance:macroavg` | `predictor.pred`                   | `acc`, `macroavg`           |
//! | `performance:rmse`     | `predictor.pred`                   | `rmse`                      |

use crate::big::BigMatrix;
use crate::distributed::Collective;
use crate::error::{Result, RlsError};
use crate::matrix::Matrix;
use crate::options::{OptionsList, TaskKind};
use std::collections::HashMap;

pub mod common;
pub mod dense;
pub mod partitioned;

pub use partitioned::BigContext;

/// The contract every algorithm behind the registry satisfies.
///
/// `x` holds the samples, `y` the labels, `opt` the accumulated option tree. The
/// returned list becomes the stage's result map.
pub trait Task<X: ?Sized> {
    fn execute(&self, x: &X, y: &X, opt: &OptionsList) -> Result<OptionsList>;
}

type Factory<'a, X> = Box<dyn Fn() -> Box<dyn Task<X> + 'a> + 'a>;

/// Table from `(kind, algorithm)` to a task constructor.
pub struct TaskRegistry<'a, X> {
    factories: HashMap<(TaskKind, String), Factory<'a, X>>,
}

impl<'a, X> Default for TaskRegistry<'a, X> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<'a, X> TaskRegistry<'a, X> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor, replacing any previous one under the same name.
    pub fn register<F, T>(&mut self, kind: TaskKind, name: impl Into<String>, factory: F)
    where
        F: Fn() -> T + 'a,
        T: Task<X> + 'a,
    {
        self.factories.insert(
            (kind, name.into()),
            Box::new(move || Box::new(factory()) as Box<dyn Task<X> + 'a>),
        );
    }

    /// Builds the task registered under `kind:name`.
    ///
    /// # Errors
    ///
    /// `Creation` if nothing is registered under that pair.
    pub fn create(&self, kind: TaskKind, name: &str) -> Result<Box<dyn Task<X> + 'a>> {
        self.factories
            .get(&(kind, name.to_string()))
            .map(|factory| factory())
            .ok_or_else(|| RlsError::Creation {
                kind: kind.name().to_string(),
                name: name.to_string(),
            })
    }

    pub fn contains(&self, kind: TaskKind, name: &str) -> bool {
        self.factories.contains_key(&(kind, name.to_string()))
    }

    /// Registered algorithm names for `kind`, sorted.
    pub fn names(&self, kind: TaskKind) -> Vec<&str> {
        let mut names: Vec<_> = self
            .factories
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

impl TaskRegistry<'static, Matrix<f64>> {
    /// Reference algorithms over in-memory matrices.
    pub fn dense() -> Self {
        let mut registry = Self::new();
        registry.register(TaskKind::Split, "ho", || dense::HoldoutSplit);
        registry.register(TaskKind::Kernel, "linear", || dense::LinearKernel);
        registry.register(TaskKind::Paramsel, "fixlambda", || common::FixLambda);
        registry.register(TaskKind::Optimizer, "rlsprimal", || dense::RlsPrimal);
        registry.register(TaskKind::Predictor, "primal", || dense::PredPrimal);
        registry.register(TaskKind::Performance, "macroavg", || dense::MacroAvg);
        registry.register(TaskKind::Performance, "rmse", || dense::Rmse);
        registry
    }
}

impl<'a> TaskRegistry<'a, BigMatrix<f64>> {
    /// Reference algorithms over partitioned matrices. Every rank builds its own
    /// registry around its own context and runs the same sequence.
    pub fn partitioned<C: Collective>(ctx: BigContext<'a, C>) -> Self {
        let mut registry = Self::new();

        let c = ctx.clone();
        registry.register(TaskKind::Split, "ho", move || partitioned::HoldoutSplit::new(c.clone()));
        let c = ctx.clone();
        registry.register(TaskKind::Kernel, "linear", move || {
            partitioned::LinearKernel::new(c.clone())
        });
        registry.register(TaskKind::Paramsel, "fixlambda", || common::FixLambda);
        let c = ctx.clone();
        registry.register(TaskKind::Optimizer, "rlsprimal", move || {
            partitioned::RlsPrimal::new(c.clone())
        });
        let c = ctx.clone();
        registry.register(TaskKind::Predictor, "primal", move || {
            partitioned::PredPrimal::new(c.clone())
        });
        let c = ctx.clone();
        registry.register(TaskKind::Performance, "macroavg", move || {
            partitioned::MacroAvg::new(c.clone())
        });
        registry.register(TaskKind::Performance, "rmse", move || {
            partitioned::Rmse::new(ctx.clone())
        });
        registry
    }
}
