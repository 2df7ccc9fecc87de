//! # Task System Core Traits
//!
//! This module defines the building blocks of the task system, which offloads
//! work (cache writes) from the tick thread to background workers.
//!
//! ## Core Components
//! - `Task`: a unit of work executed on a worker thread
//! - `TaskResult`: the outcome of a task, applied back on the tick thread
//!
//! ## Task Lifecycle
//! 1. A `Task` is published via `TaskManager::publish_task()`
//! 2. The task's `process()` method runs on a worker thread (or inline when
//!    the manager has no workers)
//! 3. The task returns a boxed `TaskResult`
//! 4. The result's `handle_result()` runs on the tick thread with the world's
//!    side table
//! 5. The result can spawn new tasks
//!
//! ## Coalescing
//! A task may name the chunk it works on through `coalesce_key()`. The manager
//! keeps at most one task per key in flight, and a newer task for a key
//! replaces one that is still queued.

use crate::engine_state::{voxels::chunk::ChunkPosition, NetworkChunks};

/// A unit of work that can be executed on a worker thread.
///
/// Tasks own all the data they need; nothing is borrowed from the tick thread.
pub trait Task: Send {
    /// Performs the work and returns a result for the tick thread.
    ///
    /// # Implementation Notes
    /// - Must not panic on recoverable errors; report them in the result instead
    /// - Should avoid blocking on anything the tick thread holds
    fn process(&self) -> Box<dyn TaskResult + Send>;

    /// The chunk this task is exclusive on, if any.
    fn coalesce_key(&self) -> Option<ChunkPosition> {
        None
    }
}

/// The result of processing a `Task`.
pub trait TaskResult: Send {
    /// Applies the result on the tick thread.
    ///
    /// # Arguments
    /// * `chunks` - The world's side table; the task's chunk may have been
    ///   unloaded in the meantime
    ///
    /// # Returns
    /// Follow-up tasks to publish (can be empty).
    fn handle_result(self: Box<Self>, chunks: &mut NetworkChunks) -> Vec<Box<dyn Task + Send>>;
}
