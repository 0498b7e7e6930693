//! Fan-out of independent work items from inside a running task.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use super::barrier::WorkBarrier;
use super::pool::{panic_message, WorkerContext};
use crate::error::{CoreError, CoreResult};

/// Runs `f` once per item, spread over the pool, and waits for all of them.
///
/// Items are pushed to the calling thread's local queue where idle workers
/// steal them; the caller keeps running items while it waits.
///
/// # Errors
///
/// Returns [`CoreError::TaskFailed`] naming the items that panicked.
pub fn parallel_for<T, F>(ctx: &WorkerContext, items: Vec<T>, f: F) -> CoreResult<()>
where
    T: Send + 'static,
    F: Fn(T, &WorkerContext) + Send + Sync + 'static,
{
    if items.is_empty() {
        return Ok(());
    }

    let f = Arc::new(f);
    let barrier = Arc::new(WorkBarrier::new(items.len()));
    let failures = Arc::new(Mutex::new(Vec::new()));

    for (index, item) in items.into_iter().enumerate() {
        let f = Arc::clone(&f);
        let barrier = Arc::clone(&barrier);
        let failures = Arc::clone(&failures);
        ctx.push_local(Box::new(move |ctx: &WorkerContext| {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(item, ctx))) {
                tracing::error!(item = index, panic = %panic_message(panic.as_ref()), "parallel item panicked");
                failures.lock().push(format!("item {index}"));
            }
            barrier.complete();
        }));
    }
    barrier.join(ctx);

    let failures = std::mem::take(&mut *failures.lock());
    if failures.is_empty() {
        Ok(())
    } else {
        Err(CoreError::TaskFailed(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::ThreadPool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parallel_for_visits_every_item() {
        let pool = ThreadPool::new(3).unwrap();
        let ctx = pool.external_context();
        let sum = Arc::new(AtomicUsize::new(0));
        let s = sum.clone();

        parallel_for(&ctx, (1..=100).collect(), move |i: usize, _| {
            s.fetch_add(i, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(sum.load(Ordering::SeqCst), 5050);
    }

    #[test]
    fn test_parallel_for_reports_panics() {
        let pool = ThreadPool::new(1).unwrap();
        let ctx = pool.external_context();
        let result = parallel_for(&ctx, vec![0, 1, 2], |i: i32, _| assert_ne!(i, 1));
        assert_eq!(result, Err(CoreError::TaskFailed(vec!["item 1".into()])));
    }

    #[test]
    fn test_parallel_for_empty() {
        let pool = ThreadPool::new(1).unwrap();
        let ctx = pool.external_context();
        assert!(parallel_for(&ctx, Vec::<u8>::new(), |_, _| {}).is_ok());
    }
}
