//! Worker-pool execution of a [`TaskGraph`] (spec §5, component C4).
//!
//! Grounded on legion's `StageExecutor::execute`/`run_recursive`
//! (`src/system.rs`) for the dependency-countdown cascade dispatched over
//! a `rayon::ThreadPool`, and on `dof/game/GameScheduler.cpp` /
//! `GameTaskArgs.h` for the pinning and partitioned-batch vocabulary
//! (`enki::TaskSetPartition`, `ThreadLocalData`, pinned-to-main-thread
//! tasks) that spec.md's worker pool generalizes from enkiTS into rayon.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::scheduler::graph::TaskGraph;
use crate::storage::Database;

/// Where a task is allowed to run. `None` lets the pool pick any worker;
/// the others pin it, trading parallelism for a guarantee the original
/// enkiTS-based scheduler relied on (e.g. touching non-thread-safe
/// platform APIs only from the main thread).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pinning {
    None,
    MainThread,
    ThreadId(usize),
    /// Runs inline on whatever thread calls `WorkerPool::run`, outside the
    /// rayon pool entirely — for tasks whose cost is dominated by
    /// dispatch overhead rather than work.
    Synchronous,
}

/// Per-invocation arguments handed to a task body, mirroring
/// `GameTaskArgs`: which worker is executing, which sub-range of a
/// partitioned batch this call owns, and a scratch slot for thread-local
/// state the task can reuse across ticks instead of reallocating.
pub struct TaskArgs<'a, L> {
    pub thread_index: usize,
    pub partition: Range<usize>,
    pub thread_local: &'a mut L,
}

pub type TaskBody<L> = Box<dyn Fn(&mut TaskArgs<L>, &mut Database) + Send + Sync>;

/// One schedulable unit: an access set (consumed only by [`TaskGraph`]),
/// a pinning requirement, and an optional partitioning for data-parallel
/// dispatch across a batch of `item_count` elements in chunks of
/// `batch_size`.
pub struct TaskSpec<L> {
    pub pinning: Pinning,
    pub item_count: Option<usize>,
    pub batch_size: usize,
    pub body: TaskBody<L>,
}

impl<L> TaskSpec<L> {
    pub fn new(body: impl Fn(&mut TaskArgs<L>, &mut Database) + Send + Sync + 'static) -> Self {
        TaskSpec { pinning: Pinning::None, item_count: None, batch_size: 1, body: Box::new(body) }
    }

    pub fn pinned(mut self, pinning: Pinning) -> Self {
        self.pinning = pinning;
        self
    }

    pub fn partitioned(mut self, item_count: usize, batch_size: usize) -> Self {
        self.item_count = Some(item_count);
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Owns the rayon thread pool and one `L` slot per worker thread plus one
/// for the calling (main) thread, index `thread_count`.
pub struct WorkerPool<L> {
    pool: rayon::ThreadPool,
    locals: Vec<parking_lot::Mutex<L>>,
}

impl<L: Send> WorkerPool<L> {
    pub fn new(thread_count: usize, mut make_local: impl FnMut(usize) -> L) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .build()
            .unwrap_or_else(|e| crate::error::scheduler_overflow(format!("failed to build worker pool: {}", e)));
        let worker_count = pool.current_num_threads();
        // + 1 for the main/calling thread slot used by Synchronous and
        // MainThread-pinned tasks.
        let locals = (0..=worker_count).map(|i| parking_lot::Mutex::new(make_local(i))).collect();
        WorkerPool { pool, locals }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn main_thread_index(&self) -> usize {
        self.locals.len() - 1
    }

    /// Runs every task in `graph`/`tasks` to completion, honoring
    /// dependency order and each task's pinning. Database access is
    /// serialized behind a single `parking_lot::Mutex` per the access-set
    /// contract enforced at the graph level (tasks without a dependency
    /// edge between them are declared non-conflicting, so contention here
    /// is the scheduling overhead, not a correctness requirement).
    pub fn run(&self, graph: &TaskGraph, tasks: &[TaskSpec<L>], db: &parking_lot::Mutex<Database>) {
        if graph.is_empty() {
            return;
        }
        if graph.len() == 1 {
            self.execute_one(0, graph.name(0), tasks, db);
            return;
        }

        let awaiting: Vec<AtomicUsize> =
            (0..graph.len()).map(|i| AtomicUsize::new(graph.dependency_count(i))).collect();

        self.pool.install(|| {
            use rayon::prelude::*;
            let roots = graph.roots();
            roots.into_par_iter().for_each(|i| self.run_recursive(i, graph, tasks, db, &awaiting));
        });
    }

    fn run_recursive(
        &self,
        i: usize,
        graph: &TaskGraph,
        tasks: &[TaskSpec<L>],
        db: &parking_lot::Mutex<Database>,
        awaiting: &[AtomicUsize],
    ) {
        self.execute_one(i, graph.name(i), tasks, db);

        use rayon::prelude::*;
        graph.dependants(i).par_iter().for_each(|&dep| {
            if awaiting[dep].fetch_sub(1, Ordering::SeqCst) == 1 {
                self.run_recursive(dep, graph, tasks, db, awaiting);
            }
        });
    }

    /// Dispatches task `i`, wrapping it in a `tracing` span named after its
    /// `TaskGraph` declaration.
    fn execute_one(&self, i: usize, name: &str, tasks: &[TaskSpec<L>], db: &parking_lot::Mutex<Database>) {
        let _span = tracing::info_span!("task", name).entered();
        let task = &tasks[i];
        match task.pinning {
            Pinning::Synchronous => self.run_unpartitioned(task, self.main_thread_index(), db),
            Pinning::MainThread => self.run_unpartitioned(task, self.main_thread_index(), db),
            Pinning::ThreadId(t) => self.run_unpartitioned(task, t.min(self.locals.len() - 1), db),
            Pinning::None => self.run_partitioned(task, db),
        }
    }

    fn run_unpartitioned(&self, task: &TaskSpec<L>, thread_index: usize, db: &parking_lot::Mutex<Database>) {
        let range = 0..task.item_count.unwrap_or(1);
        let mut local = self.locals[thread_index].lock();
        let mut args = TaskArgs { thread_index, partition: range, thread_local: &mut local };
        let mut db = db.lock();
        (task.body)(&mut args, &mut db);
    }

    fn run_partitioned(&self, task: &TaskSpec<L>, db: &parking_lot::Mutex<Database>) {
        let count = match task.item_count {
            None => {
                self.run_unpartitioned(task, rayon::current_thread_index().unwrap_or(0), db);
                return;
            }
            Some(0) => return,
            Some(n) => n,
        };
        let batch = task.batch_size;
        let ranges: Vec<Range<usize>> = (0..count).step_by(batch).map(|start| start..(start + batch).min(count)).collect();

        use rayon::prelude::*;
        ranges.into_par_iter().for_each(|range| {
            let thread_index = rayon::current_thread_index().unwrap_or(0).min(self.locals.len() - 1);
            let mut local = self.locals[thread_index].lock();
            let mut args = TaskArgs { thread_index, partition: range, thread_local: &mut local };
            let mut db = db.lock();
            (task.body)(&mut args, &mut db);
        });
    }
}
