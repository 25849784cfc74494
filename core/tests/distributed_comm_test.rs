use bigrls::distributed::{Collective, Group, ThreadComm};
use bigrls::{launch, RlsError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[test]
fn test_ring_all_reduce_hand_wired() {
    let world_size = 4;
    let (txs, rxs): (Vec<_>, Vec<_>) = (0..world_size)
        .map(|_| crossbeam::channel::unbounded())
        .unzip();

    let mut handles = vec![];
    for rank in 0..world_size {
        // Channel i carries traffic from rank i to rank i + 1.
        let right_tx = txs[rank].clone();
        let left_rx = rxs[(rank + world_size - 1) % world_size].clone();

        handles.push(thread::spawn(move || {
            let comm = ThreadComm::new(rank, world_size, left_rx, right_tx);

            // Rank 0 holds 1s, rank 1 holds 2s, ... so every element sums to 10.
            let mut data = vec![(rank + 1) as f32; 8];
            comm.all_reduce_sum(&mut data).unwrap();
            data
        }));
    }

    for handle in handles {
        let data = handle.join().unwrap();
        for val in data {
            assert!((val - 10.0).abs() < 1e-5, "expected 10, got {val}");
        }
    }
}

#[test]
fn test_reduce_to_root() {
    let results = launch(3, |comm| {
        let mut data = vec![comm.rank() as f64; 4];
        let is_root = comm.reduce_sum(&mut data, 0).unwrap();
        (is_root, data)
    })
    .unwrap();

    assert!(results[0].0);
    assert!(!results[1].0 && !results[2].0);
    assert_eq!(results[0].1, vec![3.0; 4]);
}

#[test]
fn test_barrier_waits_for_everyone() {
    let arrived = AtomicUsize::new(0);
    let seen = launch(5, |comm| {
        arrived.fetch_add(1, Ordering::SeqCst);
        comm.barrier().unwrap();
        arrived.load(Ordering::SeqCst)
    })
    .unwrap();

    assert!(seen.iter().all(|&n| n == 5));
}

#[test]
fn test_agree_lets_all_ranks_stop() {
    let results = launch(4, |comm| {
        let local = if comm.rank() == 2 || comm.rank() == 3 {
            Err(RlsError::Config("bad".into()))
        } else {
            Ok(comm.rank())
        };
        let outcome = comm.agree(local);

        // The group is still usable afterwards.
        comm.barrier().unwrap();
        outcome
    })
    .unwrap();

    assert!(matches!(results[0], Err(RlsError::PeerFailure { failed: 2 })));
    assert!(matches!(results[1], Err(RlsError::PeerFailure { failed: 2 })));
    assert!(matches!(results[2], Err(RlsError::Config(_))));
    assert!(matches!(results[3], Err(RlsError::Config(_))));
}

#[test]
fn test_panicking_rank_does_not_hang() {
    let outcome = launch(3, |comm| {
        if comm.rank() == 1 {
            panic!("rank 1 gives up");
        }
        comm.barrier().is_err()
    });

    assert!(matches!(outcome, Err(RlsError::Collective(ref msg)) if msg == "rank 1 panicked"));
}
