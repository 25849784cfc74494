//! # Pipeline Runner
//!
//! Executes one named process of an experiment. The option tree carries everything:
//!
//! *   `seq`: the [`TaskSequence`](crate::options::TaskSequence), one `kind:name` per stage.
//! *   `processes.<job>`: the [`ProcessPlan`](crate::options::ProcessPlan), one
//!     [`Action`] per stage, aligned with `seq` by position.
//! *   `savefile`: the archive file name, resolved against the runner's archive directory.
//!
//! Stage results land under the stage's kind (`paramsel.*`, `optimizer.*`, ...). Later
//! stages find earlier results only through those paths. Wall time per stage is recorded
//! under `time.<job>`.
//!
//! In a partitioned run every rank calls [`Pipeline::run`] with its own registry. Only
//! rank 0 touches the archive and the ranks agree on the outcome after every write.

use crate::distributed::{self, Group};
use crate::error::{Result, RlsError};
use crate::options::{Action, ArchiveFormat, OptionsList, TaskKind};
use crate::tasks::TaskRegistry;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub struct Pipeline<'a, X> {
    registry: TaskRegistry<'a, X>,
    group: Option<&'a dyn Group>,
    archive_dir: PathBuf,
}

impl<'a, X> Pipeline<'a, X> {
    /// A single-process runner writing archives to the current directory.
    pub fn new(registry: TaskRegistry<'a, X>) -> Self {
        Self {
            registry,
            group: None,
            archive_dir: PathBuf::from("."),
        }
    }

    /// Runs as one rank of `group`.
    pub fn with_group(mut self, group: &'a dyn Group) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }

    pub fn registry(&self) -> &TaskRegistry<'a, X> {
        &self.registry
    }

    /// Where the experiment described by `opt` is persisted.
    pub fn archive_path(&self, opt: &OptionsList) -> PathBuf {
        let file = opt
            .get_string("savefile")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let extension = ArchiveFormat::default().extension();
                PathBuf::from(format!("{}.{extension}", opt.name()))
            });
        self.archive_dir.join(file)
    }

    /// Runs process `job` over samples `x` and labels `y`, accumulating into `opt`.
    ///
    /// # Errors
    ///
    /// Whatever the first failing stage reports. Nothing is retried and the stages after
    /// it do not run. `SizeMismatch` if the plan is longer than the sequence.
    pub fn run(&self, x: &X, y: &X, opt: &mut OptionsList, job: &str) -> Result<()> {
        let sequence = opt.get_sequence("seq")?.clone();
        let plan = opt.get_process(&format!("processes.{job}"))?.clone();
        if plan.len() > sequence.len() {
            return Err(RlsError::SizeMismatch {
                expected: vec![sequence.len()],
                got: vec![plan.len()],
            });
        }

        let archive = self.archive_path(opt);
        let mut archived: Option<OptionsList> = None;
        let mut times = Vec::with_capacity(plan.len());

        for (stage, (action, task)) in plan.iter().zip(sequence.iter()).enumerate() {
            let _span = tracing::info_span!("stage", job, stage, %task, %action).entered();
            let kind = task.kind;
            let start = Instant::now();

            match action {
                Action::Ignore => {}
                Action::Compute | Action::ComputeAndPersist => {
                    let result = self.registry.create(kind, &task.name)?.execute(x, y, opt)?;
                    opt.set(kind.name(), result)?;
                    if action == Action::ComputeAndPersist {
                        self.persist(opt, &archive)?;
                        archived = None;
                    }
                }
                Action::Load => {
                    let from = match archived.take() {
                        Some(tree) => tree,
                        None => self.agree(OptionsList::load(&archive))?,
                    };
                    let result = from.get_list(kind.name())?.clone();
                    opt.set(kind.name(), result)?;
                    archived = Some(from);
                }
                Action::Delete => {
                    opt.remove(kind.name());
                    self.delete_archived(kind, &archive)?;
                    archived = None;
                }
            }

            let elapsed = start.elapsed().as_secs_f64();
            tracing::info!(elapsed, "stage done");
            times.push(elapsed);
        }

        if !opt.has("time") {
            opt.add("time", OptionsList::new("time"))?;
        }
        opt.set(&format!("time.{job}"), times)?;
        Ok(())
    }

    fn is_root(&self) -> bool {
        self.group.map_or(true, |g| g.is_root())
    }

    fn agree<R>(&self, local: Result<R>) -> Result<R> {
        match self.group {
            Some(group) => distributed::agree(group, local),
            None => local,
        }
    }

    fn persist(&self, opt: &OptionsList, archive: &Path) -> Result<()> {
        let written = if self.is_root() {
            ensure_parent(archive).and_then(|()| opt.save(archive))
        } else {
            Ok(())
        };
        self.agree(written)
    }

    fn delete_archived(&self, kind: TaskKind, archive: &Path) -> Result<()> {
        let rewritten = if self.is_root() && archive.exists() {
            OptionsList::load(archive).and_then(|mut tree| {
                tree.remove(kind.name());
                tree.save(archive)
            })
        } else {
            Ok(())
        };
        self.agree(rewritten)
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|e| RlsError::io(dir, e))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use crate::options::{ProcessPlan, TaskSequence};
    use tempfile::tempdir;

    fn data() -> (Matrix<f64>, Matrix<f64>) {
        let x = Matrix::from_fn(8, 3, |r, c| ((r * 3 + c) as f64).sin());
        let y = Matrix::from_fn(8, 2, |r, c| if (r % 2 == 0) == (c == 0) { 1.0 } else { -1.0 });
        (x, y)
    }

    fn experiment(jobs: &[(&str, &[Action])]) -> OptionsList {
        let mut opt = OptionsList::with_defaults("exp");
        let seq = TaskSequence::parse([
            "paramsel:fixlambda",
            "optimizer:rlsprimal",
            "pred:primal",
            "perf:rmse",
        ])
        .unwrap();
        opt.add("seq", seq).unwrap();

        let mut processes = OptionsList::new("processes");
        for (job, actions) in jobs {
            processes
                .add(job, actions.iter().copied().collect::<ProcessPlan>())
                .unwrap();
        }
        opt.add("processes", processes).unwrap();
        opt
    }

    #[test]
    fn test_compute_threads_results() {
        use Action::*;
        let (x, y) = data();
        let mut opt = experiment(&[("train", &[Compute, Compute, Compute, Compute])]);
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(TaskRegistry::dense()).with_archive_dir(dir.path());

        pipeline.run(&x, &y, &mut opt, "train").unwrap();

        assert_eq!(opt.get_local_matrix::<f64>("optimizer.W").unwrap().shape(), [3, 2]);
        assert_eq!(opt.get_number_list("performance.rmse").unwrap().len(), 2);
        assert_eq!(opt.get_number_list("time.train").unwrap().len(), 4);
        assert!(!pipeline.archive_path(&opt).exists());
    }

    #[test]
    fn test_ignore_leaves_store_alone() {
        use Action::*;
        let (x, y) = data();
        let mut opt = experiment(&[("noop", &[Ignore, Ignore])]);
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(TaskRegistry::dense()).with_archive_dir(dir.path());

        pipeline.run(&x, &y, &mut opt, "noop").unwrap();
        assert!(!opt.has("paramsel"));
        assert!(!opt.has("optimizer"));
        assert!(!pipeline.archive_path(&opt).exists());
    }

    #[test]
    fn test_persist_then_load() {
        use Action::*;
        let (x, y) = data();
        let jobs: &[(&str, &[Action])] = &[
            ("train", &[ComputeAndPersist, ComputeAndPersist]),
            ("reload", &[Load, Load]),
        ];
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(TaskRegistry::dense()).with_archive_dir(dir.path());

        let mut trained = experiment(jobs);
        pipeline.run(&x, &y, &mut trained, "train").unwrap();
        assert!(pipeline.archive_path(&trained).exists());

        let mut fresh = experiment(jobs);
        pipeline.run(&x, &y, &mut fresh, "reload").unwrap();
        assert_eq!(fresh.get("paramsel").unwrap(), trained.get("paramsel").unwrap());
        assert_eq!(fresh.get("optimizer").unwrap(), trained.get("optimizer").unwrap());
    }

    #[test]
    fn test_delete_removes_from_archive() {
        use Action::*;
        let (x, y) = data();
        let jobs: &[(&str, &[Action])] = &[
            ("train", &[ComputeAndPersist]),
            ("drop", &[Delete]),
            ("reload", &[Load]),
        ];
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(TaskRegistry::dense()).with_archive_dir(dir.path());

        let mut opt = experiment(jobs);
        pipeline.run(&x, &y, &mut opt, "train").unwrap();
        pipeline.run(&x, &y, &mut opt, "drop").unwrap();
        assert!(!opt.has("paramsel"));

        let err = pipeline.run(&x, &y, &mut opt, "reload").unwrap_err();
        assert!(matches!(err, RlsError::NotDefined(ref path) if path == "paramsel"));
    }

    #[test]
    fn test_plan_errors() {
        use Action::*;
        let (x, y) = data();
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(TaskRegistry::dense()).with_archive_dir(dir.path());

        let mut opt = experiment(&[("long", &[Ignore, Ignore, Ignore, Ignore, Ignore])]);
        assert!(matches!(
            pipeline.run(&x, &y, &mut opt, "long"),
            Err(RlsError::SizeMismatch { .. })
        ));
        assert!(matches!(
            pipeline.run(&x, &y, &mut opt, "missing"),
            Err(RlsError::NotDefined(_))
        ));

        // The optimizer needs paramsel.lambdas.
        let mut opt = experiment(&[("skip", &[Ignore, Compute])]);
        assert!(matches!(
            pipeline.run(&x, &y, &mut opt, "skip"),
            Err(RlsError::NotDefined(_))
        ));
    }

    #[test]
    fn test_unknown_algorithm() {
        let (x, y) = data();
        let mut opt = experiment(&[("train", &[Action::Compute])]);
        opt.set("seq", TaskSequence::parse(["paramsel:loocv"]).unwrap()).unwrap();

        let pipeline = Pipeline::new(TaskRegistry::dense());
        assert!(matches!(
            pipeline.run(&x, &y, &mut opt, "train"),
            Err(RlsError::Creation { .. })
        ));
    }
}
