//! Task dependency graph construction from per-task row access sets
//! (spec §5, component C4).
//!
//! Grounded on legion's `StageExecutor::new` (`src/system.rs`): the same
//! last-writer/readers-since-last-write bookkeeping, generalized from
//! separate resource/component access sets to the single row-level
//! `AccessSet` spec.md describes, plus an explicit transitive-reduction
//! pass (the original only ever tracked direct dependants, never collapsed
//! redundant longer paths) and the diamond-convergence behavior named in
//! `dof/scheduler/Scheduler.h`'s `TaskBuilder::_addSyncDependency` (a node
//! reachable through more than one parent only ever gets visited, and
//! depended upon, once).

use std::any::TypeId;
use std::collections::HashSet;

use fxhash::FxHashMap;

/// The set of row types a task reads and writes, used purely for
/// dependency inference — it says nothing about how the task is actually
/// invoked.
#[derive(Clone, Debug, Default)]
pub struct AccessSet {
    pub reads: Vec<TypeId>,
    pub writes: Vec<TypeId>,
}

impl AccessSet {
    pub fn new() -> Self {
        AccessSet::default()
    }

    pub fn reading<T: 'static>(mut self) -> Self {
        self.reads.push(TypeId::of::<T>());
        self
    }

    pub fn writing<T: 'static>(mut self) -> Self {
        self.writes.push(TypeId::of::<T>());
        self
    }
}

struct TaskNode {
    name: &'static str,
    access: AccessSet,
}

/// An immutable DAG over a fixed task list: for task `i`,
/// `dependants(i)` are the tasks that must wait for `i` to finish, and
/// `dependency_count(i)` is how many tasks `i` itself waits on.
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    dependants: Vec<Vec<usize>>,
    dependency_counts: Vec<usize>,
}

impl TaskGraph {
    /// Builds the graph from tasks supplied in the order their
    /// side-effects should be observed if run serially — a read conflicts
    /// with every write that precedes it, a write conflicts with every
    /// read or write that precedes it.
    pub fn build(tasks: Vec<(&'static str, AccessSet)>) -> Self {
        let n = tasks.len();
        let mut dependants: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut dependency_counts = vec![0usize; n];
        let mut last_writer: FxHashMap<TypeId, usize> = FxHashMap::default();
        let mut readers_since_write: FxHashMap<TypeId, Vec<usize>> = FxHashMap::default();
        let mut nodes = Vec::with_capacity(n);

        for (i, (name, access)) in tasks.into_iter().enumerate() {
            let mut deps = HashSet::new();
            for ty in &access.reads {
                if let Some(&w) = last_writer.get(ty) {
                    deps.insert(w);
                }
                readers_since_write.entry(*ty).or_insert_with(Vec::new).push(i);
            }
            for ty in &access.writes {
                if let Some(&w) = last_writer.get(ty) {
                    deps.insert(w);
                }
                if let Some(readers) = readers_since_write.get(ty) {
                    for &r in readers {
                        if r != i {
                            deps.insert(r);
                        }
                    }
                }
                last_writer.insert(*ty, i);
                readers_since_write.insert(*ty, Vec::new());
            }

            dependency_counts[i] = deps.len();
            for dep in deps {
                dependants[dep].push(i);
            }
            nodes.push(TaskNode { name, access });
        }

        let mut graph = TaskGraph { nodes, dependants, dependency_counts };
        graph.reduce_transitively();
        graph
    }

    /// Removes a direct edge `u -> v` whenever a longer path from `u` to
    /// `v` already exists through one of `u`'s other dependants — the
    /// edge adds no new ordering constraint, only scheduling overhead.
    fn reduce_transitively(&mut self) {
        for u in 0..self.nodes.len() {
            let direct = self.dependants[u].clone();
            let mut redundant = Vec::new();
            for &v in &direct {
                let reachable_otherwise = direct
                    .iter()
                    .any(|&w| w != v && self.path_exists(w, v));
                if reachable_otherwise {
                    redundant.push(v);
                }
            }
            if !redundant.is_empty() {
                self.dependants[u].retain(|v| !redundant.contains(v));
                for v in redundant {
                    self.dependency_counts[v] -= 1;
                }
            }
        }
    }

    fn path_exists(&self, from: usize, to: usize) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(n) = stack.pop() {
            if n == to {
                return true;
            }
            if !seen.insert(n) {
                continue;
            }
            stack.extend(self.dependants[n].iter().copied());
        }
        false
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, i: usize) -> &'static str {
        self.nodes[i].name
    }

    pub fn access(&self, i: usize) -> &AccessSet {
        &self.nodes[i].access
    }

    pub fn roots(&self) -> Vec<usize> {
        (0..self.nodes.len()).filter(|&i| self.dependency_counts[i] == 0).collect()
    }

    pub fn dependants(&self, i: usize) -> &[usize] {
        &self.dependants[i]
    }

    pub fn dependency_count(&self, i: usize) -> usize {
        self.dependency_counts[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RowA;
    struct RowB;

    #[test]
    fn independent_tasks_have_no_dependants() {
        let graph = TaskGraph::build(vec![
            ("write_a", AccessSet::new().writing::<RowA>()),
            ("write_b", AccessSet::new().writing::<RowB>()),
        ]);
        assert_eq!(graph.roots(), vec![0, 1]);
        assert!(graph.dependants(0).is_empty());
        assert!(graph.dependants(1).is_empty());
    }

    #[test]
    fn a_reader_depends_on_the_prior_writer() {
        let graph = TaskGraph::build(vec![
            ("write_a", AccessSet::new().writing::<RowA>()),
            ("read_a", AccessSet::new().reading::<RowA>()),
        ]);
        assert_eq!(graph.roots(), vec![0]);
        assert_eq!(graph.dependants(0), &[1]);
        assert_eq!(graph.dependency_count(1), 1);
    }

    #[test]
    fn diamond_dependency_collapses_to_one_edge_per_pair() {
        // write_a -> {read_a_1, read_a_2} -> write_a_again
        let graph = TaskGraph::build(vec![
            ("write_a", AccessSet::new().writing::<RowA>()),
            ("read_a_1", AccessSet::new().reading::<RowA>()),
            ("read_a_2", AccessSet::new().reading::<RowA>()),
            ("write_a_again", AccessSet::new().writing::<RowA>()),
        ]);
        assert_eq!(graph.dependency_count(3), 2);
        assert!(graph.dependants(0).contains(&1));
        assert!(graph.dependants(0).contains(&2));
        // the direct write_a -> write_a_again edge is redundant (it is
        // reachable via either reader) and must be reduced away
        assert!(!graph.dependants(0).contains(&3));
    }
}
