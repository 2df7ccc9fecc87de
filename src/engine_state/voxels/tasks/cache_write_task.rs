//! # Cache Write Task
//!
//! This module defines the `CacheWriteTask` which persists a chunk's network
//! grid to the region cache. One is published every time a grid is computed
//! (not when it came from the cache); the task manager keeps at most one per
//! chunk in flight and lets a newer write replace a queued one.

use std::sync::Arc;

use log::{debug, error};

use crate::{
    engine_state::{
        cache::{CachedChunk, RegionCache},
        task_management::task::{Task, TaskResult},
        voxels::chunk::ChunkPosition,
        NetworkChunks,
    },
    errors::ObfuscationError,
};

/// A task that writes one network grid to the region cache.
pub struct CacheWriteTask {
    cache: Arc<RegionCache>,
    snapshot: CachedChunk,
    /// `NetworkChunk::revision` of the grid in `snapshot`.
    revision: u64,
}

impl CacheWriteTask {
    /// Creates a new cache write task.
    ///
    /// # Arguments
    /// * `cache` - The world's region cache
    /// * `snapshot` - The grid to store, with its signature and timestamp
    /// * `revision` - Revision of the grid at the time it was installed
    pub fn new(cache: Arc<RegionCache>, snapshot: CachedChunk, revision: u64) -> Self {
        CacheWriteTask {
            cache,
            snapshot,
            revision,
        }
    }

    pub fn position(&self) -> ChunkPosition {
        self.snapshot.network.position
    }
}

impl Task for CacheWriteTask {
    fn process(&self) -> Box<dyn TaskResult + Send> {
        Box::new(CacheWriteTaskResult {
            position: self.position(),
            revision: self.revision,
            outcome: self.cache.write(&self.snapshot),
        })
    }

    fn coalesce_key(&self) -> Option<ChunkPosition> {
        Some(self.position())
    }
}

/// The outcome of a cache write, applied to the chunk's record on the tick thread.
pub struct CacheWriteTaskResult {
    position: ChunkPosition,
    revision: u64,
    outcome: Result<(), ObfuscationError>,
}

impl TaskResult for CacheWriteTaskResult {
    /// Marks the chunk persisted, or logs the failure and marks it failed so
    /// unloading the chunk writes it again.
    ///
    /// The chunk may have been unloaded or recomputed since the write started;
    /// `NetworkChunk::mark_persisted` ignores results for an older grid.
    fn handle_result(self: Box<Self>, chunks: &mut NetworkChunks) -> Vec<Box<dyn Task + Send>> {
        let persisted = match &self.outcome {
            Ok(()) => {
                debug!("Cached chunk ({}, {}) rev {}", self.position.x, self.position.z, self.revision);
                true
            }
            Err(error) => {
                error!(
                    "Failed to cache chunk ({}, {}): {}",
                    self.position.x, self.position.z, error
                );
                false
            }
        };
        if let Some(chunk) = chunks.get_mut(&self.position) {
            chunk.mark_persisted(self.revision, persisted);
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::*;
    use crate::engine_state::{
        obfuscation::{
            network_chunk::{DisguiseMask, NetworkChunk},
            signature::SignatureBuilder,
        },
        voxels::{
            block::{block_type::BlockType, BlockState},
            chunk::Chunk,
        },
    };

    #[test]
    fn successful_write_marks_current_revision_persisted() {
        let directory = tempdir().unwrap();
        let cache = Arc::new(RegionCache::open(directory.path(), 2).unwrap());
        let position = ChunkPosition::new(5, -5);
        let signature = SignatureBuilder::new().append_str("test").build();
        let network = Chunk::solid(position, BlockState::of(BlockType::STONE), 8);

        let mut record = NetworkChunk::new(position);
        record.install(network.clone(), DisguiseMask::new(), signature.clone(), 0, false);
        let mut chunks: NetworkChunks = HashMap::new();
        chunks.insert(position, record);

        let task = CacheWriteTask::new(
            cache.clone(),
            CachedChunk {
                signature: signature.clone(),
                timestamp: 1,
                network,
                disguised: DisguiseMask::new(),
            },
            1,
        );
        assert_eq!(task.coalesce_key(), Some(position));

        let follow_up = task.process().handle_result(&mut chunks);
        assert!(follow_up.is_empty());
        assert!(chunks[&position].is_persisted());
        assert!(cache.read(position, &signature).is_some());
    }

    #[test]
    fn result_for_unloaded_chunk_is_dropped() {
        let mut chunks: NetworkChunks = HashMap::new();
        let result = Box::new(CacheWriteTaskResult {
            position: ChunkPosition::new(0, 0),
            revision: 1,
            outcome: Err(ObfuscationError::CorruptCache("disk full".to_string())),
        });
        assert!(result.handle_result(&mut chunks).is_empty());
        assert!(chunks.is_empty());
    }
}
