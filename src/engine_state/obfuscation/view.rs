//! # Block Views
//!
//! A `ChunkView` is what a modifier sees while it runs: the true grid of one
//! chunk and its four horizontal neighbors (read-only), and the network grid of
//! the chunk (writable). Reads of true blocks cross chunk borders transparently;
//! writes are confined to the view's own chunk.
//!
//! ## Exposure
//!
//! A block is *exposed* when at least one of its six face neighbors inside the
//! world height is not a full opaque cell on the true grid. Neighbors above the
//! top or below the bottom of the world do not count. A neighbor that cannot be
//! read because its chunk is missing counts as exposing, so a view built without
//! all neighbors never hides a block it can't prove is enclosed.

use cgmath::Point3;

use crate::engine_state::voxels::{
    block::{block_side::BlockSide, BlockState},
    chunk::{chunk_iteration::ChunkBlockIterator, Chunk, ChunkPosition, WORLD_HEIGHT},
};

/// Read/write access to the blocks of one chunk.
pub trait BlockView {
    /// The chunk the view writes to.
    fn position(&self) -> ChunkPosition;

    /// Reads the authoritative block, looking into neighbor chunks at the edges.
    ///
    /// # Returns
    /// `None` if the owning chunk is not part of the view or `position` is
    /// outside the world height.
    fn true_block(&self, position: Point3<i32>) -> Option<BlockState>;

    /// Reads the client-visible block of the view's own chunk.
    fn network_block(&self, position: Point3<i32>) -> Option<BlockState>;

    /// Writes the client-visible block.
    ///
    /// # Panics
    /// Panics if `position` is outside the view's chunk or the world height.
    fn set_network_block(&mut self, position: Point3<i32>, state: BlockState) -> BlockState;

    /// Whether any in-range face neighbor of `position` is a non-occluding cell.
    fn is_exposed(&self, position: Point3<i32>) -> bool {
        BlockSide::all().into_iter().any(|side| {
            let neighbor = position + side.offset();
            if !(0..WORLD_HEIGHT).contains(&neighbor.y) {
                return false;
            }
            self.true_block(neighbor)
                .map_or(true, |block| !block.is_occluding())
        })
    }
}

/// A view over a chunk's true grid (plus neighbors) and its network grid.
pub struct ChunkView<'a> {
    true_chunk: &'a Chunk,
    /// In `ChunkPosition::horizontal_neighbors` order; `None` when unloaded.
    neighbors: [Option<&'a Chunk>; 4],
    network: &'a mut Chunk,
}

impl<'a> ChunkView<'a> {
    /// Creates a view.
    ///
    /// # Arguments
    /// * `true_chunk` - The authoritative chunk
    /// * `neighbors` - The true chunks at `true_chunk.position.horizontal_neighbors()`, in that order
    /// * `network` - The network grid being built for the same position
    pub fn new(true_chunk: &'a Chunk, neighbors: [Option<&'a Chunk>; 4], network: &'a mut Chunk) -> Self {
        debug_assert_eq!(true_chunk.position, network.position);
        ChunkView {
            true_chunk,
            neighbors,
            network,
        }
    }

    /// The authoritative chunk. The reference outlives the view borrow, so a
    /// modifier can iterate it while writing through the view.
    pub fn true_chunk(&self) -> &'a Chunk {
        self.true_chunk
    }

    pub fn network(&self) -> &Chunk {
        self.network
    }

    /// Whether every horizontal neighbor is loaded.
    pub fn neighbors_loaded(&self) -> bool {
        self.neighbors.iter().all(Option::is_some)
    }

    /// Positions of the neighbors that are missing from the view.
    pub fn missing_neighbors(&self) -> Vec<ChunkPosition> {
        self.true_chunk
            .position
            .horizontal_neighbors()
            .into_iter()
            .zip(self.neighbors.iter())
            .filter(|(_, chunk)| chunk.is_none())
            .map(|(position, _)| position)
            .collect()
    }

    /// Non-air true blocks inside `[min, max]`, clamped to the chunk.
    pub fn candidates(&self, min: Point3<i32>, max: Point3<i32>) -> ChunkBlockIterator<'a> {
        ChunkBlockIterator::new(self.true_chunk, min, max)
    }

    fn owning_chunk(&self, position: Point3<i32>) -> Option<&'a Chunk> {
        let owner = ChunkPosition::from_block(position);
        if owner == self.true_chunk.position {
            return Some(self.true_chunk);
        }
        self.neighbors
            .iter()
            .flatten()
            .find(|chunk| chunk.position == owner)
            .copied()
    }
}

impl BlockView for ChunkView<'_> {
    fn position(&self) -> ChunkPosition {
        self.true_chunk.position
    }

    fn true_block(&self, position: Point3<i32>) -> Option<BlockState> {
        self.owning_chunk(position)
            .and_then(|chunk| chunk.try_get_block(position))
    }

    fn network_block(&self, position: Point3<i32>) -> Option<BlockState> {
        self.network.try_get_block(position)
    }

    fn set_network_block(&mut self, position: Point3<i32>, state: BlockState) -> BlockState {
        self.network.set_block(position, state)
    }
}
