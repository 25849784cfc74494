use bigrls::options::{Action, OptionsList, ProcessPlan, TaskSequence};
use bigrls::{launch, BigContext, BigMatrix, Matrix, MemoryBudget, Pipeline, TaskRegistry};
use tempfile::tempdir;

const STAGES: [&str; 6] = [
    "split:ho",
    "kernel:linear",
    "paramsel:fixlambda",
    "optimizer:rlsprimal",
    "predictor:primal",
    "performance:macroavg",
];

/// Two classes around (1, 1, 0) and (-1, -1, 0), one-vs-all labels.
fn dataset() -> (Matrix<f64>, Matrix<f64>) {
    let x = Matrix::from_fn(12, 3, |r, c| {
        let centre = if r % 2 == 0 { 1.0 } else { -1.0 };
        let jitter = ((r * 3 + c) as f64 * 1.7).sin() * 0.2;
        if c == 2 {
            jitter
        } else {
            centre + jitter
        }
    });
    let y = Matrix::from_fn(12, 2, |r, c| if (r % 2 == 0) == (c == 0) { 1.0 } else { -1.0 });
    (x, y)
}

fn experiment() -> OptionsList {
    let mut opt = OptionsList::with_defaults("blobs");
    opt.set("seed", 11.0).unwrap();
    opt.add("seq", TaskSequence::parse(STAGES).unwrap()).unwrap();

    let mut processes = OptionsList::new("processes");
    processes
        .add("train", ProcessPlan::from_iter([Action::ComputeAndPersist; 6]))
        .unwrap();
    processes
        .add("reload", ProcessPlan::from_iter([Action::Load; 6]))
        .unwrap();
    processes
        .add(
            "weights",
            ProcessPlan::from_iter([
                Action::Ignore,
                Action::Ignore,
                Action::Compute,
                Action::Compute,
            ]),
        )
        .unwrap();
    opt.add("processes", processes).unwrap();
    opt
}

#[test]
fn test_dense_train_then_reload() {
    let (x, y) = dataset();
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(TaskRegistry::dense()).with_archive_dir(dir.path());

    let mut trained = experiment();
    pipeline.run(&x, &y, &mut trained, "train").unwrap();
    assert_eq!(trained.get_number("performance.macroavg").unwrap(), 1.0);
    assert_eq!(trained.get_local_matrix::<f64>("kernel.K").unwrap().shape(), [12, 12]);

    let mut reloaded = experiment();
    pipeline.run(&x, &y, &mut reloaded, "reload").unwrap();
    for stage in ["split", "kernel", "paramsel", "optimizer", "predictor", "performance"] {
        assert_eq!(reloaded.get(stage).unwrap(), trained.get(stage).unwrap(), "{stage}");
    }
}

#[test]
fn test_partitioned_matches_dense() {
    let (x, y) = dataset();
    let dir = tempdir().unwrap();
    let x_path = dir.path().join("x.bgrm");
    let y_path = dir.path().join("y.bgrm");
    BigMatrix::from_matrix(&x_path, &x).unwrap();
    BigMatrix::from_matrix(&y_path, &y).unwrap();

    let mut dense = experiment();
    Pipeline::new(TaskRegistry::dense())
        .with_archive_dir(dir.path().join("dense"))
        .run(&x, &y, &mut dense, "weights")
        .unwrap();
    let dense_w = dense.get_local_matrix::<f64>("optimizer.W").unwrap().clone();

    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();

    let runs = launch(3, |comm| {
        let ctx = BigContext::new(comm, MemoryBudget::elements(30), &work);
        let pipeline = Pipeline::new(TaskRegistry::partitioned(ctx))
            .with_group(comm)
            .with_archive_dir(&work);
        let xb = BigMatrix::<f64>::attach(&x_path).unwrap();
        let yb = BigMatrix::<f64>::attach(&y_path).unwrap();

        let mut trained = experiment();
        pipeline.run(&xb, &yb, &mut trained, "train").unwrap();

        let mut reloaded = experiment();
        pipeline.run(&xb, &yb, &mut reloaded, "reload").unwrap();
        (trained, reloaded)
    })
    .unwrap();

    for (trained, reloaded) in &runs {
        let w = trained.get_local_matrix::<f64>("optimizer.W").unwrap();
        assert!(w.max_abs_diff(&dense_w).unwrap() < 1e-9);
        assert_eq!(trained.get_number("performance.macroavg").unwrap(), 1.0);
        assert_eq!(reloaded.get("optimizer").unwrap(), trained.get("optimizer").unwrap());
        assert_eq!(reloaded.get("performance").unwrap(), trained.get("performance").unwrap());
    }

    // Every rank drew the same split.
    let indices = runs[0].0.get("split.indices").unwrap();
    assert!(runs.iter().all(|(t, _)| t.get("split.indices").unwrap() == indices));

    // The kernel and the prediction stay on disk, the temporaries do not.
    let k = BigMatrix::<f64>::from_ref(runs[0].0.get_partitioned("kernel.K").unwrap()).unwrap();
    assert!(k.to_matrix().unwrap().max_abs_diff(&x.matmul_t(&x).unwrap()).unwrap() < 1e-9);
    assert!(work.join("predictor_pred.bgrm").exists());
    assert!(!work.join("optimizer_XtX.bgrm").exists());
    assert!(!work.join("predictor_W.bgrm").exists());
}
