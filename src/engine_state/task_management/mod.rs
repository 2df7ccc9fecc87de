//! # Task Management System
//!
//! This module provides the worker pool the engine uses to keep slow work, the
//! region cache writes, off the tick thread.
//!
//! ## Architecture Overview
//!
//! The task management system consists of several key components:
//! - `TaskManager`: Central coordinator for task distribution and worker management
//! - `Task`: A unit of work that can be executed on a worker
//! - `TaskResult`: The result of a completed task, which can spawn additional tasks
//! - `TaskChannel`: Communication channel between the tick thread and one worker thread
//!
//! Each worker is a `std::thread` with a dedicated pair of mpsc channels. Tasks
//! are handed out round-robin, at most `MAX_TASKS_IN_FLIGHT` per worker; the
//! rest wait in a FIFO queue.
//!
//! ## Per-chunk Exclusivity
//!
//! Tasks that name a chunk through `Task::coalesce_key` are exclusive on it:
//! - at most one task per chunk is in flight at any time
//! - publishing a task for a chunk that already has one queued replaces the
//!   queued one (only the newest network grid is worth writing)
//! - `flush(key)` runs a queued task for a chunk synchronously, which is what
//!   unloading a chunk needs; `run_now` does the same for a task that was never
//!   queued
//!
//! ## Inline Mode
//!
//! With zero workers every task is processed inside `publish_task`; its result
//! is applied on the next `process_completed_tasks`. Tests and single-threaded
//! hosts use this to get deterministic behavior.
//!
//! ## Task Lifecycle
//! 1. Tasks are created and published via `TaskManager::publish_task()`
//! 2. The manager distributes tasks to available worker channels using round-robin
//! 3. Workers process tasks and send back results
//! 4. Results are applied on the tick thread in `process_completed_tasks()`
//! 5. Results can spawn new tasks
//! 6. `finish()` drains everything before shutdown
//!
//! ## Example Usage
//! ```ignore
//! let mut task_manager = TaskManager::new(2);
//!
//! // Publish a task for background processing
//! task_manager.publish_task(Box::new(CacheWriteTask::new(cache, snapshot, revision)));
//!
//! // Once per tick:
//! task_manager.process_completed_tasks(&mut chunks);
//! task_manager.process_queued_tasks();
//! ```

pub mod task;

use std::{
    collections::VecDeque,
    sync::mpsc::{channel, Receiver, Sender, TryRecvError},
    thread::{self, JoinHandle},
};

use log::{error, info};
use task::{Task, TaskResult};

use super::{voxels::chunk::ChunkPosition, NetworkChunks};

/// A communication channel between the tick thread and a worker thread.
///
/// # Fields
/// - `task_sender`: Sends tasks from the tick thread to the worker
/// - `result_receiver`: Receives task results from the worker
/// - `in_flight`: Coalesce keys of the tasks sent and not yet answered, oldest first
/// - `_worker`: Handle to the worker thread (kept alive by this struct)
#[derive(Debug)]
pub struct TaskChannel {
    task_sender: Sender<Box<dyn Task + Send>>,
    result_receiver: Receiver<Box<dyn TaskResult + Send>>,
    in_flight: VecDeque<Option<ChunkPosition>>,
    _worker: JoinHandle<()>,
}

/// Manages a pool of worker threads and coordinates task execution.
///
/// # Fields
/// - `channels`: Set of active worker channels
/// - `queued_tasks`: Tasks waiting for an available worker (or for their chunk's
///   in-flight task to finish)
/// - `current_channel`: Index for round-robin scheduling
/// - `inline_results`: Results of tasks processed inline, waiting to be applied
pub struct TaskManager {
    channels: Vec<TaskChannel>,
    queued_tasks: VecDeque<Box<dyn Task + Send>>,
    current_channel: usize,
    inline_results: Vec<Box<dyn TaskResult + Send>>,
}

/// Maximum number of tasks that can be in flight per worker channel.
///
/// This is set to 1 so a busy worker never holds a task another worker could
/// have started.
pub const MAX_TASKS_IN_FLIGHT: usize = 1;

impl TaskManager {
    /// Creates a new `TaskManager` with the specified number of worker threads.
    ///
    /// # Arguments
    /// * `num_workers` - Number of worker threads to create; 0 processes tasks inline
    pub fn new(num_workers: usize) -> Self {
        let mut channels = Vec::with_capacity(num_workers);

        for _ in 0..num_workers {
            let (task_tx, task_rx) = channel::<Box<dyn Task + Send>>();
            let (result_tx, result_rx) = channel::<Box<dyn TaskResult + Send>>();

            let task_closure = move || {
                while let Ok(task) = task_rx.recv() {
                    let result = task.process();
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            };

            let worker = thread::spawn(task_closure);

            channels.push(TaskChannel {
                task_sender: task_tx,
                result_receiver: result_rx,
                in_flight: VecDeque::new(),
                _worker: worker,
            });
        }

        if num_workers > 0 {
            info!(
                "Started {} task workers (available parallelism: {:?})",
                num_workers,
                thread::available_parallelism()
            );
        }

        TaskManager {
            channels,
            queued_tasks: VecDeque::new(),
            current_channel: 0,
            inline_results: Vec::new(),
        }
    }

    /// Attempts to send a task to a specific worker channel.
    ///
    /// # Returns
    /// - `Ok(())` if the task was sent to the worker
    /// - `Err(task)` if the send failed (worker disconnected)
    ///
    /// # Notes
    /// - Records the task's coalesce key as in flight on success
    /// - Panics if `channel_idx` is out of bounds
    fn try_send_task(
        &mut self,
        task: Box<dyn Task + Send>,
        channel_idx: usize,
    ) -> Result<(), Box<dyn Task + Send>> {
        let key = task.coalesce_key();
        match self.channels[channel_idx].task_sender.send(task) {
            Ok(_) => {
                self.channels[channel_idx].in_flight.push_back(key);
                Ok(())
            }
            Err(task) => Err(task.0),
        }
    }

    /// Finds an available worker channel that can accept a new task.
    ///
    /// Round-robin starting from the channel after the last one used, skipping
    /// channels that have reached `MAX_TASKS_IN_FLIGHT`.
    ///
    /// # Returns
    /// - `Some(usize)` index of an available channel
    /// - `None` if all channels are busy or there are no channels
    fn find_available_channel(&self) -> Option<usize> {
        let count = self.channels.len();
        (0..count)
            .map(|offset| (self.current_channel + offset) % count)
            .find(|&index| self.channels[index].in_flight.len() < MAX_TASKS_IN_FLIGHT)
    }

    /// Whether a task for `key` is currently running on a worker.
    pub fn is_in_flight(&self, key: ChunkPosition) -> bool {
        self.channels
            .iter()
            .any(|channel| channel.in_flight.contains(&Some(key)))
    }

    /// Whether a task for `key` is waiting in the queue.
    pub fn is_queued(&self, key: ChunkPosition) -> bool {
        self.queued_tasks
            .iter()
            .any(|task| task.coalesce_key() == Some(key))
    }

    pub fn queued_len(&self) -> usize {
        self.queued_tasks.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.channels.iter().map(|channel| channel.in_flight.len()).sum()
    }

    /// Publishes a new task for execution.
    ///
    /// The task is sent to a free worker, replaces a queued task for the same
    /// chunk, or waits in the queue. Without workers it is processed right away.
    ///
    /// # Returns
    /// - `true` if the task was started (on a worker or inline)
    /// - `false` if it was queued or replaced a queued task
    pub fn publish_task(&mut self, task: Box<dyn Task + Send>) -> bool {
        if self.channels.is_empty() {
            self.inline_results.push(task.process());
            return true;
        }

        if let Some(key) = task.coalesce_key() {
            if let Some(slot) = self
                .queued_tasks
                .iter_mut()
                .find(|queued| queued.coalesce_key() == Some(key))
            {
                *slot = task;
                return false;
            }
            if self.is_in_flight(key) {
                self.queued_tasks.push_back(task);
                return false;
            }
        }

        match self.find_available_channel() {
            Some(channel_idx) => match self.try_send_task(task, channel_idx) {
                Ok(_) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                    true
                }
                Err(task) => {
                    error!("Task worker {} disconnected", channel_idx);
                    self.queued_tasks.push_back(task);
                    false
                }
            },
            None => {
                self.queued_tasks.push_back(task);
                false
            }
        }
    }

    /// Hands queued tasks to free workers.
    ///
    /// Call once per tick. Tasks whose chunk still has a task in flight stay
    /// queued, in order; everything else is dispatched FIFO until the workers
    /// are full.
    pub fn process_queued_tasks(&mut self) {
        if self.queued_tasks.is_empty() || self.channels.is_empty() {
            return;
        }

        let mut waiting = VecDeque::with_capacity(self.queued_tasks.len());
        while let Some(task) = self.queued_tasks.pop_front() {
            if task.coalesce_key().is_some_and(|key| self.is_in_flight(key)) {
                waiting.push_back(task);
                continue;
            }
            let Some(channel_idx) = self.find_available_channel() else {
                waiting.push_back(task);
                break;
            };
            match self.try_send_task(task, channel_idx) {
                Ok(_) => self.current_channel = (channel_idx + 1) % self.channels.len(),
                Err(task) => {
                    // Channel is disconnected, put task back and stop processing
                    waiting.push_back(task);
                    break;
                }
            }
        }
        waiting.extend(self.queued_tasks.drain(..));
        self.queued_tasks = waiting;
    }

    /// Applies every result that is ready.
    ///
    /// # Arguments
    /// * `chunks` - The world's side table, handed to each result
    ///
    /// # Returns
    /// Number of results applied.
    pub fn process_completed_tasks(&mut self, chunks: &mut NetworkChunks) -> usize {
        let mut results = std::mem::take(&mut self.inline_results);
        for (index, channel) in self.channels.iter_mut().enumerate() {
            loop {
                match channel.result_receiver.try_recv() {
                    Ok(result) => {
                        channel.in_flight.pop_front();
                        results.push(result);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if !channel.in_flight.is_empty() {
                            error!(
                                "Task worker {} stopped with {} tasks in flight",
                                index,
                                channel.in_flight.len()
                            );
                            channel.in_flight.clear();
                        }
                        break;
                    }
                }
            }
        }

        self.apply(results, chunks)
    }

    fn apply(&mut self, results: Vec<Box<dyn TaskResult + Send>>, chunks: &mut NetworkChunks) -> usize {
        let count = results.len();
        let mut tasks_to_queue = Vec::new();
        for result in results {
            tasks_to_queue.extend(result.handle_result(chunks));
        }
        for task in tasks_to_queue {
            self.publish_task(task);
        }
        count
    }

    /// Runs the queued task for `key` on this thread and applies its result.
    ///
    /// A task for `key` still running on a worker is waited for first, so the
    /// two never overlap.
    ///
    /// # Returns
    /// `true` if a queued task was found and run.
    pub fn flush(&mut self, key: ChunkPosition, chunks: &mut NetworkChunks) -> bool {
        let Some(index) = self
            .queued_tasks
            .iter()
            .position(|task| task.coalesce_key() == Some(key))
        else {
            return false;
        };
        let Some(task) = self.queued_tasks.remove(index) else {
            return false;
        };
        self.run_now(task, chunks);
        true
    }

    /// Processes `task` on this thread and applies its result right away,
    /// after any task for the same chunk still running on a worker.
    pub fn run_now(&mut self, task: Box<dyn Task + Send>, chunks: &mut NetworkChunks) {
        if let Some(key) = task.coalesce_key() {
            self.wait_for(key, chunks);
        }
        let result = task.process();
        self.apply(vec![result], chunks);
    }

    /// Blocks until no task for `key` is in flight, applying every result
    /// received meanwhile.
    fn wait_for(&mut self, key: ChunkPosition, chunks: &mut NetworkChunks) {
        let mut results = Vec::new();
        while let Some(channel) = self
            .channels
            .iter_mut()
            .find(|channel| channel.in_flight.contains(&Some(key)))
        {
            match channel.result_receiver.recv() {
                Ok(result) => {
                    channel.in_flight.pop_front();
                    results.push(result);
                }
                Err(_) => {
                    error!("Task worker stopped while a task for ({}, {}) was in flight", key.x, key.z);
                    channel.in_flight.clear();
                }
            }
        }
        self.apply(results, chunks);
    }

    /// Waits for all in-flight tasks, then runs everything still queued on this
    /// thread. Used on shutdown.
    pub fn finish(&mut self, chunks: &mut NetworkChunks) {
        let mut results = std::mem::take(&mut self.inline_results);
        for channel in &mut self.channels {
            while !channel.in_flight.is_empty() {
                match channel.result_receiver.recv() {
                    Ok(result) => {
                        channel.in_flight.pop_front();
                        results.push(result);
                    }
                    Err(_) => channel.in_flight.clear(),
                }
            }
        }
        self.apply(results, chunks);

        while let Some(task) = self.queued_tasks.pop_front() {
            let result = task.process();
            self.apply(vec![result], chunks);
        }
    }
}
