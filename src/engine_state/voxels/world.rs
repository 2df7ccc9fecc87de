//! # World Module
//!
//! The world storage seam. The engine never owns true block data: it reads it
//! through the `WorldStorage` trait, which a host implements over its own chunk
//! store. `World` is the in-memory implementation used by the demo binary and the
//! tests.
//!
//! ## Architecture
//!
//! Only loaded chunks are kept. Each chunk is stored in a thread-safe
//! reference-counted wrapper so the tick can hold read guards on a chunk and its
//! neighbors while a modifier runs.

use std::collections::HashMap;

use cgmath::Point3;
use web_time::{SystemTime, UNIX_EPOCH};

use super::{
    block::BlockState,
    chunk::{Chunk, ChunkPosition},
};
use crate::core::MtResource;

/// Read access to the authoritative block grid.
///
/// Implementations must only change true block data between ticks; the exposure
/// test reads neighbor chunks without coordinating with writers beyond the
/// chunk's own lock.
pub trait WorldStorage {
    /// Returns the chunk at `position` if it is loaded.
    fn chunk(&self, position: ChunkPosition) -> Option<MtResource<Chunk>>;

    /// Whether the chunk at `position` is loaded.
    fn is_chunk_loaded(&self, position: ChunkPosition) -> bool {
        self.chunk(position).is_some()
    }

    /// Reads one true block.
    ///
    /// # Returns
    /// `None` if the owning chunk is not loaded or the position is outside the
    /// world height.
    fn get_block(&self, position: Point3<i32>) -> Option<BlockState> {
        self.chunk(ChunkPosition::from_block(position))
            .and_then(|chunk| chunk.get().try_get_block(position))
    }
}

/// Milliseconds since the Unix epoch, as stored in `Chunk::last_modified` and
/// cache records.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

/// A sparse, in-memory world made of loaded chunks.
pub struct World {
    /// A mapping from chunk coordinates to chunk data.
    pub chunks: HashMap<ChunkPosition, MtResource<Chunk>>,
    /// Seed used when chunks are generated.
    pub seed: u32,
}

impl World {
    /// Creates a new, empty world.
    pub fn new(seed: u32) -> Self {
        World {
            chunks: HashMap::new(),
            seed,
        }
    }

    /// Inserts (or replaces) a chunk and returns its shared handle.
    pub fn insert_chunk(&mut self, chunk: Chunk) -> MtResource<Chunk> {
        let handle = MtResource::new(chunk);
        let position = handle.get().position;
        self.chunks.insert(position, handle.clone());
        handle
    }

    /// Generates and loads the chunk at `position` if it isn't loaded yet.
    pub fn add_chunk_at(&mut self, position: ChunkPosition) -> MtResource<Chunk> {
        if let Some(existing) = self.chunks.get(&position) {
            return existing.clone();
        }
        self.insert_chunk(Chunk::perlin(position, self.seed))
    }

    /// Generates every chunk within `radius` chunks of `center` (a square).
    pub fn add_chunks_around(&mut self, center: ChunkPosition, radius: i32) {
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                self.add_chunk_at(center.offset(dx, dz));
            }
        }
    }

    /// Unloads a chunk.
    pub fn remove_chunk(&mut self, position: ChunkPosition) -> Option<MtResource<Chunk>> {
        self.chunks.remove(&position)
    }

    /// Writes one true block and stamps the chunk as modified.
    ///
    /// # Returns
    /// The previous block, or `None` if the chunk isn't loaded or the position is
    /// outside the world height (nothing is written then).
    pub fn set_block(&mut self, position: Point3<i32>, state: BlockState) -> Option<BlockState> {
        let chunk = self.chunks.get(&ChunkPosition::from_block(position))?;
        let mut chunk = chunk.get_mut();
        if !chunk.contains(position) {
            return None;
        }
        let previous = chunk.set_block(position, state);
        // Strictly increasing so two writes in the same millisecond still
        // invalidate a snapshot taken between them.
        chunk.last_modified = current_timestamp().max(chunk.last_modified + 1);
        Some(previous)
    }
}

impl WorldStorage for World {
    fn chunk(&self, position: ChunkPosition) -> Option<MtResource<Chunk>> {
        self.chunks.get(&position).cloned()
    }

    fn is_chunk_loaded(&self, position: ChunkPosition) -> bool {
        self.chunks.contains_key(&position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;

    #[test]
    fn set_block_stamps_chunk() {
        let mut world = World::new(7);
        world.insert_chunk(Chunk::empty(ChunkPosition::new(0, 0)));

        let position = Point3::new(3, 40, 9);
        let before = world.chunk(ChunkPosition::new(0, 0)).unwrap().get().last_modified;
        assert_eq!(
            world.set_block(position, BlockState::of(BlockType::GLASS)),
            Some(BlockState::AIR)
        );
        let after = world.chunk(ChunkPosition::new(0, 0)).unwrap().get().last_modified;

        assert!(after > before);
        assert_eq!(world.get_block(position), Some(BlockState::of(BlockType::GLASS)));
    }

    #[test]
    fn unloaded_chunks_read_as_none() {
        let mut world = World::new(7);
        world.insert_chunk(Chunk::empty(ChunkPosition::new(0, 0)));

        assert_eq!(world.get_block(Point3::new(-1, 10, 0)), None);
        assert_eq!(world.get_block(Point3::new(0, 300, 0)), None);
        assert_eq!(world.set_block(Point3::new(-1, 10, 0), BlockState::AIR), None);
        assert!(!world.is_chunk_loaded(ChunkPosition::new(-1, 0)));
    }

    #[test]
    fn add_chunks_around_loads_square() {
        let mut world = World::new(1);
        world.add_chunks_around(ChunkPosition::new(0, 0), 1);
        assert_eq!(world.chunks.len(), 9);
        let handle = world.add_chunk_at(ChunkPosition::new(1, 1));
        assert!(handle.ptr_eq(&world.chunk(ChunkPosition::new(1, 1)).unwrap()));
    }
}
