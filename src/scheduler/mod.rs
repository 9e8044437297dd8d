//! Task graph scheduler (spec §4.4-§5, component C4): turns a declared
//! list of tasks into a DAG ([`graph::TaskGraph`]) and drives it to
//! completion on a worker pool ([`pool::WorkerPool`]).

pub mod graph;
pub mod pool;

pub use graph::{AccessSet, TaskGraph};
pub use pool::{Pinning, TaskArgs, TaskBody, TaskSpec, WorkerPool};
