//! # Dispatcher Ordering Tests
//!
//! Randomized task graphs: every declared edge must be observed in the
//! recorded execution order, across many frames on one pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use keystone_core::{CoreError, ThreadPool, UpdateDispatcher};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[test]
fn random_graphs_respect_edges() {
    let pool = Arc::new(ThreadPool::new(4).unwrap());
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);

    for _frame in 0..50 {
        let mut dispatcher = UpdateDispatcher::new(Arc::clone(&pool));
        let clock = Arc::new(AtomicUsize::new(0));
        let task_count = rng.gen_range(1..64);
        let mut tasks = Vec::with_capacity(task_count);
        let mut edges = Vec::new();

        for i in 0..task_count {
            // Inputs only point backwards, so the graph is acyclic.
            let inputs: Vec<usize> = (0..i).filter(|_| rng.gen_bool(0.1)).collect();
            edges.extend(inputs.iter().map(|&input| (input, i)));
            let clock = Arc::clone(&clock);
            let task = dispatcher.add::<usize, _, _>(
                |builder, _| {
                    for &input in &inputs {
                        builder.add_input(&tasks[input]);
                    }
                },
                move |stamp, _| *stamp = clock.fetch_add(1, Ordering::SeqCst) + 1,
            );
            tasks.push(task);
        }

        dispatcher.execute().unwrap();

        let stamps: Vec<usize> = tasks.iter().map(|t| *t.data()).collect();
        assert!(stamps.iter().all(|&s| s > 0), "every task ran");
        for (before, after) in edges {
            assert!(
                stamps[before] < stamps[after],
                "task {before} must run before task {after}"
            );
        }
    }
}

#[test]
fn frames_reuse_pool_and_ids() {
    let pool = Arc::new(ThreadPool::new(2).unwrap());
    let log = Arc::new(Mutex::new(Vec::new()));

    for frame in 0..10 {
        let mut dispatcher = UpdateDispatcher::new(Arc::clone(&pool));
        let l = Arc::clone(&log);
        dispatcher.add_with_id::<(), _, _>(1, |_, _| {}, move |_, _| l.lock().push((frame, 'a')));
        let l = Arc::clone(&log);
        dispatcher.add::<(), _, _>(
            |b, _| {
                b.add_input_id(1);
            },
            move |_, _| l.lock().push((frame, 'b')),
        );
        dispatcher.execute().unwrap();
    }

    let log = log.lock();
    assert_eq!(log.len(), 20);
    for pair in log.chunks(2) {
        assert_eq!(pair[0].0, pair[1].0);
        assert_eq!((pair[0].1, pair[1].1), ('a', 'b'));
    }
}

#[test]
fn failure_leaves_independent_tasks_running() {
    let pool = Arc::new(ThreadPool::new(2).unwrap());
    let mut dispatcher = UpdateDispatcher::new(Arc::clone(&pool));
    let ran = Arc::new(AtomicUsize::new(0));

    let bad = dispatcher.add::<(), _, _>(
        |b, _| {
            b.set_debug_string("bad");
        },
        |_, _| panic!("boom"),
    );
    let r = Arc::clone(&ran);
    dispatcher.add::<(), _, _>(
        |b, _| {
            b.add_input(&bad);
        },
        move |_, _| {
            r.fetch_add(100, Ordering::SeqCst);
        },
    );
    let r = Arc::clone(&ran);
    dispatcher.add::<(), _, _>(|_, _| {}, move |_, _| {
        r.fetch_add(1, Ordering::SeqCst);
    });

    let result = dispatcher.execute();
    assert_eq!(result, Err(CoreError::TaskFailed(vec!["bad".to_string()])));
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn scratch_is_reset_between_tasks() {
    let pool = Arc::new(ThreadPool::new(2).unwrap());

    for _frame in 0..10 {
        let mut dispatcher = UpdateDispatcher::new(Arc::clone(&pool));
        let mut previous = None;
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let task = dispatcher.add::<(usize, usize), _, _>(
                |builder, _| {
                    if let Some(input) = &previous {
                        builder.add_input(input);
                    }
                },
                |usage, ctx| {
                    let before = ctx.scratch().used();
                    let buffer = ctx.scratch().alloc_vec::<u64>(128).unwrap();
                    assert_eq!(buffer.len(), 128);
                    *usage = (before, ctx.scratch().used());
                },
            );
            previous = Some(task.clone());
            tasks.push(task);
        }
        dispatcher.execute().unwrap();

        for task in &tasks {
            let (before, during) = *task.data();
            assert_eq!(before, 0, "arena reset after the previous task");
            assert!(during >= 128 * std::mem::size_of::<u64>());
        }
    }
}
