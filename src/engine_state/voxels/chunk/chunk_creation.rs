//! # Chunk Creation Module
//!
//! A builder that fills a chunk block by block in storage order (YZX, bottom
//! section first). Sections are only allocated once a non-air block lands in
//! them, so generators can push long runs of air for free.

use super::{Chunk, ChunkPosition, Section, SECTION_COUNT, SECTION_VOLUME};
use crate::engine_state::voxels::block::BlockState;

/// A builder for creating and populating chunks in storage order.
///
/// Each pushed block advances the cursor by one cell: x fastest, then z, then y.
/// Pushing past the top of the world is ignored.
pub struct ChunkCreationIterator {
    /// The position of the chunk being created
    position: ChunkPosition,
    /// Finished and in-progress sections
    sections: Vec<Option<Section>>,
    /// Index of the section the cursor is in
    section_index: usize,
    /// Index of the cursor inside the current section
    block_index: usize,
}

impl ChunkCreationIterator {
    /// Creates a new `ChunkCreationIterator` for building a chunk at the given position.
    pub fn new(position: ChunkPosition) -> Self {
        ChunkCreationIterator {
            position,
            sections: vec![None; SECTION_COUNT],
            section_index: 0,
            block_index: 0,
        }
    }

    /// Finalizes the chunk creation and returns the constructed `Chunk`.
    pub fn return_chunk(self) -> Chunk {
        let mut chunk = Chunk::empty(self.position);
        for (index, section) in self.sections.into_iter().enumerate() {
            chunk.set_section(index, section.filter(|section| !section.is_empty()));
        }
        chunk
    }

    /// Adds a block at the current cursor and advances it.
    pub fn push_block(&mut self, block: BlockState) {
        if self.section_index >= SECTION_COUNT {
            return;
        }

        if !block.is_air() {
            self.sections[self.section_index]
                .get_or_insert_with(Section::new)
                .set(self.block_index, block);
        }

        self.block_index += 1;
        if self.block_index == SECTION_VOLUME {
            self.block_index = 0;
            self.section_index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;

    #[test]
    fn pushes_in_yzx_order() {
        let mut cci = ChunkCreationIterator::new(ChunkPosition::new(0, 0));
        cci.push_block(BlockState::AIR);
        cci.push_block(BlockState::of(BlockType::STONE));
        for _ in 0..15 {
            cci.push_block(BlockState::AIR);
        }
        cci.push_block(BlockState::of(BlockType::DIRT));
        let chunk = cci.return_chunk();

        assert_eq!(chunk.get_block(Point3::new(1, 0, 0)), BlockState::of(BlockType::STONE));
        assert_eq!(chunk.get_block(Point3::new(1, 0, 1)), BlockState::of(BlockType::DIRT));
        assert_eq!(chunk.non_air_count(), 2);
    }

    #[test]
    fn air_only_sections_are_not_allocated() {
        let mut cci = ChunkCreationIterator::new(ChunkPosition::new(0, 0));
        for _ in 0..SECTION_VOLUME * 2 {
            cci.push_block(BlockState::AIR);
        }
        cci.push_block(BlockState::of(BlockType::STONE));
        let chunk = cci.return_chunk();

        assert!(chunk.section(0).is_none());
        assert!(chunk.section(1).is_none());
        assert!(chunk.section(2).is_some());
        assert_eq!(chunk.get_block(Point3::new(0, 32, 0)), BlockState::of(BlockType::STONE));
    }
}
