//! # Update Dispatcher
//!
//! Builds the per-frame task graph and runs it on the worker pool.
//!
//! ```text
//! add(linkage, update)       linkage runs now, on the calling thread,
//!   └─ builder.add_input(t)  declaring edges to earlier tasks
//! execute()
//!   ├─ validate graph        cycles / unreachable tasks are rejected
//!   ├─ leaves → global queue
//!   ├─ completing task       decrements dependents; the last input pushes
//!   │                        the dependent onto its own local queue
//!   └─ join barrier          calling thread runs work until all finish
//! ```
//!
//! A task that panics poisons its dependents: they are skipped and
//! [`UpdateDispatcher::execute`] reports the failure.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};

use super::barrier::WorkBarrier;
use super::pool::{panic_message, ThreadPool, WorkerContext};
use crate::error::{CoreError, CoreResult};

/// Identifier other tasks can link to without holding a task reference.
pub type TaskId = u32;

type UpdateFn = Box<dyn FnOnce(&WorkerContext) + Send + 'static>;

/// A node of the frame task graph.
pub struct UpdateTask {
    id: Option<TaskId>,
    name: Mutex<String>,
    counter: AtomicUsize,
    leaf: AtomicBool,
    poisoned: AtomicBool,
    completed: AtomicBool,
    continuations: Mutex<Vec<Arc<UpdateTask>>>,
    work: Mutex<Option<UpdateFn>>,
}

impl std::fmt::Debug for UpdateTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateTask")
            .field("id", &self.id)
            .field("name", &*self.name.lock())
            .field("inputs", &self.counter.load(Ordering::Relaxed))
            .field("completed", &self.is_complete())
            .finish()
    }
}

impl UpdateTask {
    fn new(id: Option<TaskId>, work: UpdateFn) -> Self {
        Self {
            id,
            name: Mutex::new(String::new()),
            counter: AtomicUsize::new(0),
            leaf: AtomicBool::new(true),
            poisoned: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            continuations: Mutex::new(Vec::new()),
            work: Mutex::new(Some(work)),
        }
    }

    /// The task's ID, if it was scheduled with one.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<TaskId> {
        self.id
    }

    /// Debug name set during linkage.
    #[must_use]
    pub fn name(&self) -> String {
        let name = self.name.lock();
        if name.is_empty() {
            match self.id {
                Some(id) => format!("task {id:#010x}"),
                None => "unnamed task".to_string(),
            }
        } else {
            name.clone()
        }
    }

    /// `true` while no input has been declared.
    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.leaf.load(Ordering::Acquire)
    }

    /// `true` once the task ran (or was skipped) to completion.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Makes `self` wait for `input`.
    fn add_input(self: &Arc<Self>, input: &Arc<Self>) {
        // Completed inputs (earlier frames) are already satisfied.
        if input.is_complete() {
            return;
        }
        self.counter.fetch_add(1, Ordering::AcqRel);
        self.leaf.store(false, Ordering::Release);
        input.continuations.lock().push(Arc::clone(self));
    }

    /// Drops work and edges of a task that will never run.
    fn retire(&self) {
        self.work.lock().take();
        self.continuations.lock().clear();
        self.completed.store(true, Ordering::Release);
    }
}

/// Anything that names an [`UpdateTask`].
pub trait AsUpdateTask {
    /// The underlying task.
    fn update_task(&self) -> &Arc<UpdateTask>;
}

impl AsUpdateTask for Arc<UpdateTask> {
    fn update_task(&self) -> &Arc<UpdateTask> {
        self
    }
}

/// Handle to a scheduled task and its payload.
///
/// The payload is shared: downstream tasks capture [`TaskRef::shared_data`]
/// and read it once their edge guarantees completion.
pub struct TaskRef<T> {
    task: Arc<UpdateTask>,
    data: Arc<Mutex<T>>,
}

impl<T> Clone for TaskRef<T> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            data: Arc::clone(&self.data),
        }
    }
}

impl<T> std::fmt::Debug for TaskRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TaskRef").field(&self.task).finish()
    }
}

impl<T> TaskRef<T> {
    /// The graph node.
    #[inline]
    #[must_use]
    pub fn task(&self) -> &Arc<UpdateTask> {
        &self.task
    }

    /// Locks the payload.
    pub fn data(&self) -> MutexGuard<'_, T> {
        self.data.lock()
    }

    /// Shared payload for capture by dependent tasks.
    #[must_use]
    pub fn shared_data(&self) -> Arc<Mutex<T>> {
        Arc::clone(&self.data)
    }

    /// `true` once the task completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.task.is_complete()
    }
}

impl<T> AsUpdateTask for TaskRef<T> {
    fn update_task(&self) -> &Arc<UpdateTask> {
        &self.task
    }
}

/// Edge declarations for the task being added.
pub struct UpdateBuilder<'a> {
    task: &'a Arc<UpdateTask>,
    task_map: &'a HashMap<TaskId, Arc<UpdateTask>>,
    link_errors: &'a mut Vec<CoreError>,
}

impl UpdateBuilder<'_> {
    /// Sets the name used in logs and errors.
    pub fn set_debug_string(&mut self, name: impl Into<String>) -> &mut Self {
        *self.task.name.lock() = name.into();
        self
    }

    /// This task runs after `input`.
    pub fn add_input(&mut self, input: &impl AsUpdateTask) -> &mut Self {
        self.task.add_input(input.update_task());
        self
    }

    /// `output` runs after this task.
    pub fn add_output(&mut self, output: &impl AsUpdateTask) -> &mut Self {
        output.update_task().add_input(self.task);
        self
    }

    fn lookup(&mut self, id: TaskId) -> Option<Arc<UpdateTask>> {
        let task = self.task_map.get(&id).cloned();
        if task.is_none() {
            tracing::error!(id, task = %self.task.name(), "linked to unknown task id");
            self.link_errors.push(CoreError::UnknownTask(id));
        }
        task
    }

    /// This task runs after the task scheduled under `id`.
    ///
    /// An unknown ID fails the next [`UpdateDispatcher::execute`].
    pub fn add_input_id(&mut self, id: TaskId) -> &mut Self {
        if let Some(input) = self.lookup(id) {
            self.task.add_input(&input);
        }
        self
    }

    /// The task scheduled under `id` runs after this task.
    ///
    /// An unknown ID fails the next [`UpdateDispatcher::execute`].
    pub fn add_output_id(&mut self, id: TaskId) -> &mut Self {
        if let Some(output) = self.lookup(id) {
            output.add_input(self.task);
        }
        self
    }
}

/// Per-frame task graph executor.
pub struct UpdateDispatcher {
    pool: Arc<ThreadPool>,
    nodes: Vec<Arc<UpdateTask>>,
    task_map: HashMap<TaskId, Arc<UpdateTask>>,
    link_errors: Vec<CoreError>,
}

impl std::fmt::Debug for UpdateDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateDispatcher")
            .field("nodes", &self.nodes.len())
            .field("pool", &self.pool)
            .finish()
    }
}

impl UpdateDispatcher {
    /// Creates a dispatcher running on `pool`.
    #[must_use]
    pub fn new(pool: Arc<ThreadPool>) -> Self {
        Self {
            pool,
            nodes: Vec::new(),
            task_map: HashMap::new(),
            link_errors: Vec::new(),
        }
    }

    /// The worker pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    /// Number of tasks scheduled for the next execute.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The task scheduled under `id` this frame.
    #[must_use]
    pub fn get_task(&self, id: TaskId) -> Option<&Arc<UpdateTask>> {
        self.task_map.get(&id)
    }

    /// Schedules a task with a default payload.
    ///
    /// `linkage` runs immediately and declares edges; `update` runs once
    /// during [`UpdateDispatcher::execute`] on some worker.
    pub fn add<T, L, U>(&mut self, linkage: L, update: U) -> TaskRef<T>
    where
        T: Default + Send + 'static,
        L: FnOnce(&mut UpdateBuilder<'_>, &mut T),
        U: FnOnce(&mut T, &WorkerContext) + Send + 'static,
    {
        self.schedule(None, T::default(), linkage, update)
    }

    /// Schedules a task with an explicit initial payload.
    pub fn add_with_data<T, L, U>(&mut self, data: T, linkage: L, update: U) -> TaskRef<T>
    where
        T: Send + 'static,
        L: FnOnce(&mut UpdateBuilder<'_>, &mut T),
        U: FnOnce(&mut T, &WorkerContext) + Send + 'static,
    {
        self.schedule(None, data, linkage, update)
    }

    /// Schedules a task other tasks can link to by `id`.
    ///
    /// # Panics
    ///
    /// Panics if a task is already scheduled under `id` this frame.
    pub fn add_with_id<T, L, U>(&mut self, id: TaskId, linkage: L, update: U) -> TaskRef<T>
    where
        T: Default + Send + 'static,
        L: FnOnce(&mut UpdateBuilder<'_>, &mut T),
        U: FnOnce(&mut T, &WorkerContext) + Send + 'static,
    {
        if self.task_map.contains_key(&id) {
            tracing::error!(id, "task double scheduled");
            panic!("Task double scheduled: {id:#010x}!");
        }
        self.schedule(Some(id), T::default(), linkage, update)
    }

    fn schedule<T, L, U>(&mut self, id: Option<TaskId>, data: T, linkage: L, update: U) -> TaskRef<T>
    where
        T: Send + 'static,
        L: FnOnce(&mut UpdateBuilder<'_>, &mut T),
        U: FnOnce(&mut T, &WorkerContext) + Send + 'static,
    {
        let data = Arc::new(Mutex::new(data));
        let payload = Arc::clone(&data);
        let task = Arc::new(UpdateTask::new(
            id,
            Box::new(move |ctx: &WorkerContext| update(&mut payload.lock(), ctx)),
        ));

        {
            let mut builder = UpdateBuilder {
                task: &task,
                task_map: &self.task_map,
                link_errors: &mut self.link_errors,
            };
            linkage(&mut builder, &mut data.lock());
        }

        if let Some(id) = id {
            self.task_map.insert(id, Arc::clone(&task));
        }
        self.nodes.push(Arc::clone(&task));
        TaskRef { task, data }
    }

    /// Runs every scheduled task, respecting edges, then clears the graph.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnknownTask`] if linkage referenced an unknown ID
    /// - [`CoreError::UnresolvedTasks`] if the graph contains a cycle
    /// - [`CoreError::TaskFailed`] if a task panicked
    ///
    /// Nothing runs in the first two cases.
    pub fn execute(&mut self) -> CoreResult<()> {
        let nodes = std::mem::take(&mut self.nodes);
        self.task_map.clear();

        if let Some(err) = self.link_errors.drain(..).next() {
            nodes.iter().for_each(|n| n.retire());
            return Err(err);
        }
        if nodes.is_empty() {
            return Ok(());
        }
        if let Err(err) = validate(&nodes) {
            tracing::error!(error = %err, "task graph rejected");
            nodes.iter().for_each(|n| n.retire());
            return Err(err);
        }

        let start = Instant::now();
        let barrier = Arc::new(WorkBarrier::new(nodes.len()));
        let failures = Arc::new(Mutex::new(Vec::new()));
        for node in nodes.iter().filter(|n| n.is_leaf()) {
            let job = task_job(Arc::clone(node), Arc::clone(&barrier), Arc::clone(&failures));
            self.pool.add_work(job);
        }
        barrier.join_local(&self.pool);

        tracing::trace!(
            tasks = nodes.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "task graph executed"
        );

        let failures = std::mem::take(&mut *failures.lock());
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::TaskFailed(failures))
        }
    }
}

impl Drop for UpdateDispatcher {
    fn drop(&mut self) {
        // Unexecuted graphs may hold reference cycles through continuations.
        for node in self.nodes.drain(..) {
            node.retire();
        }
    }
}

fn task_job(
    task: Arc<UpdateTask>,
    barrier: Arc<WorkBarrier>,
    failures: Arc<Mutex<Vec<String>>>,
) -> UpdateFn {
    Box::new(move |ctx: &WorkerContext| run_task(&task, &barrier, &failures, ctx))
}

fn run_task(
    task: &Arc<UpdateTask>,
    barrier: &Arc<WorkBarrier>,
    failures: &Arc<Mutex<Vec<String>>>,
    ctx: &WorkerContext,
) {
    let work = task.work.lock().take();
    let poisoned = task.poisoned.load(Ordering::Acquire);
    if poisoned {
        tracing::warn!(task = %task.name(), "skipped, an input failed");
    } else if let Some(work) = work {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| work(ctx))) {
            let name = task.name();
            tracing::error!(task = %name, panic = %panic_message(panic.as_ref()), "task panicked");
            task.poisoned.store(true, Ordering::Release);
            failures.lock().push(name);
        }
    }
    task.completed.store(true, Ordering::Release);

    let poisoned = task.poisoned.load(Ordering::Acquire);
    let continuations = std::mem::take(&mut *task.continuations.lock());
    for next in continuations {
        if poisoned {
            next.poisoned.store(true, Ordering::Release);
        }
        if next.counter.fetch_sub(1, Ordering::AcqRel) == 1 {
            ctx.push_local(task_job(next, Arc::clone(barrier), Arc::clone(failures)));
        }
    }
    barrier.complete();
}

/// Kahn's algorithm over the frame graph.
///
/// A task whose inputs can never all complete (a cycle, or an input that is
/// not part of this graph) is reported by name.
fn validate(nodes: &[Arc<UpdateTask>]) -> CoreResult<()> {
    let index: HashMap<*const UpdateTask, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (Arc::as_ptr(n), i))
        .collect();
    let mut in_degree: Vec<usize> = nodes
        .iter()
        .map(|n| n.counter.load(Ordering::Acquire))
        .collect();

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted_count = 0;

    while let Some(i) = queue.pop_front() {
        sorted_count += 1;
        for next in nodes[i].continuations.lock().iter() {
            if let Some(&j) = index.get(&Arc::as_ptr(next)) {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    queue.push_back(j);
                }
            }
        }
    }

    if sorted_count == nodes.len() {
        return Ok(());
    }
    let unresolved = nodes
        .iter()
        .zip(&in_degree)
        .filter(|(_, &deg)| deg > 0)
        .map(|(n, _)| n.name())
        .collect();
    Err(CoreError::UnresolvedTasks(unresolved))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> UpdateDispatcher {
        UpdateDispatcher::new(Arc::new(ThreadPool::new(2).unwrap()))
    }

    #[test]
    fn test_linear_chain_passes_data() {
        let mut d = dispatcher();
        let a = d.add(
            |b, _: &mut u32| {
                b.set_debug_string("a");
            },
            |v, _| *v = 20,
        );
        let a_data = a.shared_data();
        let b = d.add(
            |builder, _: &mut u32| {
                builder.add_input(&a).set_debug_string("b");
            },
            move |v, _| *v = *a_data.lock() + 1,
        );
        assert!(a.task().is_leaf());
        assert!(!b.task().is_leaf());

        d.execute().unwrap();
        assert_eq!(*b.data(), 21);
        assert!(a.is_complete() && b.is_complete());
        assert!(d.is_empty());
    }

    #[test]
    fn test_link_by_id() {
        let mut d = dispatcher();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        d.add_with_id(7, |_, _: &mut ()| {}, move |_, _| o.lock().push("first"));
        let o = order.clone();
        d.add(
            |b, _: &mut ()| {
                b.add_input_id(7);
            },
            move |_, _| o.lock().push("second"),
        );
        assert!(d.get_task(7).is_some());
        d.execute().unwrap();
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_add_output_reverses_edge() {
        let mut d = dispatcher();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let late = d.add(|_, _: &mut ()| {}, move |_, _| o.lock().push(2));
        let o = order.clone();
        d.add(
            |b, _: &mut ()| {
                b.add_output(&late);
            },
            move |_, _| o.lock().push(1),
        );
        d.execute().unwrap();
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    #[should_panic(expected = "double scheduled")]
    fn test_double_scheduled_id_panics() {
        let mut d = dispatcher();
        d.add_with_id(1, |_, _: &mut ()| {}, |_, _| {});
        d.add_with_id(1, |_, _: &mut ()| {}, |_, _| {});
    }

    #[test]
    fn test_unknown_id_fails_execute() {
        let mut d = dispatcher();
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        d.add(
            |b, _: &mut ()| {
                b.add_input_id(99);
            },
            move |_, _| r.store(true, Ordering::SeqCst),
        );
        assert_eq!(d.execute(), Err(CoreError::UnknownTask(99)));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(d.is_empty());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut d = dispatcher();
        let a = d.add(|b, _: &mut ()| { b.set_debug_string("a"); }, |_, _| {});
        let b = d.add(
            |builder, _: &mut ()| {
                builder.set_debug_string("b").add_input(&a).add_output(&a);
            },
            |_, _| {},
        );
        d.add(|b, _: &mut ()| { b.set_debug_string("free"); }, |_, _| {});

        match d.execute() {
            Err(CoreError::UnresolvedTasks(names)) => {
                assert_eq!(names.len(), 2);
                assert!(names.contains(&"a".to_string()));
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
        assert!(!b.task().is_leaf());
        // The dispatcher is usable again.
        d.add(|_, _: &mut ()| {}, |_, _| {});
        assert!(d.execute().is_ok());
    }

    #[test]
    fn test_panic_poisons_dependents() {
        let mut d = dispatcher();
        let a = d.add(|b, _: &mut ()| { b.set_debug_string("exploding"); }, |_, _| panic!("boom"));
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        let b = d.add(
            |builder, _: &mut ()| {
                builder.add_input(&a);
            },
            move |_, _| r.store(true, Ordering::SeqCst),
        );

        assert_eq!(d.execute(), Err(CoreError::TaskFailed(vec!["exploding".into()])));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(b.is_complete());
    }

    #[test]
    fn test_completed_input_from_previous_frame_is_satisfied() {
        let mut d = dispatcher();
        let old = d.add(|_, _: &mut u8| {}, |v, _| *v = 3);
        d.execute().unwrap();

        let old_data = old.shared_data();
        let new = d.add(
            |b, _: &mut u8| {
                b.add_input(&old);
            },
            move |v, _| *v = *old_data.lock() * 2,
        );
        assert!(new.task().is_leaf());
        d.execute().unwrap();
        assert_eq!(*new.data(), 6);
    }

    #[test]
    fn test_empty_execute() {
        let mut d = dispatcher();
        assert!(d.execute().is_ok());
    }
}
