//! # Chunk Module
//!
//! This module provides the `Chunk` struct: a 16x16 column of blocks spanning
//! the full world height, split into 16 vertical sections of 16x16x16 blocks.
//!
//! The same type backs both grids the engine deals with: the *true* grid owned
//! by world storage, and the *network* grid a `NetworkChunk` derives from it and
//! shows to clients.
//!
//! ## Memory Optimization
//!
//! Sections that contain nothing but air are not allocated at all. This keeps
//! sky-heavy chunks cheap and lets modifiers skip whole sections without looking
//! at a single block.
//!
//! ## Indexing
//!
//! Inside a section blocks are stored in YZX order (`y << 8 | z << 4 | x`), which
//! is also the order the cache containers use.

use cgmath::Point3;
use chunk_creation::ChunkCreationIterator;
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use super::block::{block_type::BlockType, BlockState};

pub mod chunk_creation;
pub mod chunk_iteration;

/// The width and depth of a chunk in blocks.
pub const CHUNK_DIMENSION: i32 = 16;
/// The height of a section in blocks.
pub const SECTION_HEIGHT: i32 = 16;
/// Number of sections stacked in a chunk.
pub const SECTION_COUNT: usize = 16;
/// Total height of the world in blocks.
pub const WORLD_HEIGHT: i32 = SECTION_HEIGHT * SECTION_COUNT as i32;
/// Number of blocks in a section.
pub const SECTION_VOLUME: usize = (CHUNK_DIMENSION * CHUNK_DIMENSION * SECTION_HEIGHT) as usize;

/// Identifies a chunk column by its chunk coordinates (block coordinates / 16).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPosition {
    pub x: i32,
    pub z: i32,
}

impl ChunkPosition {
    pub const fn new(x: i32, z: i32) -> Self {
        ChunkPosition { x, z }
    }

    /// The chunk that owns the given block position. Correct for negative coordinates.
    pub fn from_block(position: Point3<i32>) -> Self {
        ChunkPosition {
            x: position.x >> 4,
            z: position.z >> 4,
        }
    }

    /// The lowest corner of the chunk in block space.
    pub fn min_block(&self) -> Point3<i32> {
        Point3::new(self.x * CHUNK_DIMENSION, 0, self.z * CHUNK_DIMENSION)
    }

    /// The highest corner of the chunk in block space (inclusive).
    pub fn max_block(&self) -> Point3<i32> {
        Point3::new(
            self.x * CHUNK_DIMENSION + CHUNK_DIMENSION - 1,
            WORLD_HEIGHT - 1,
            self.z * CHUNK_DIMENSION + CHUNK_DIMENSION - 1,
        )
    }

    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        ChunkPosition::new(self.x + dx, self.z + dz)
    }

    /// The four chunks sharing a face with this one: -x, +x, -z, +z.
    pub fn horizontal_neighbors(&self) -> [ChunkPosition; 4] {
        [
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(0, -1),
            self.offset(0, 1),
        ]
    }

    /// Whether the block position lies in this chunk column (ignoring height).
    pub fn contains(&self, position: Point3<i32>) -> bool {
        ChunkPosition::from_block(position) == *self
    }
}

/// One 16x16x16 slice of a chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    blocks: Box<[BlockState]>,
    non_air: u16,
}

impl Section {
    /// A section filled with air.
    pub fn new() -> Self {
        Section {
            blocks: vec![BlockState::AIR; SECTION_VOLUME].into_boxed_slice(),
            non_air: 0,
        }
    }

    /// Builds a section from blocks in YZX order.
    ///
    /// # Panics
    /// Panics if `blocks` does not hold exactly `SECTION_VOLUME` entries.
    pub fn from_blocks(blocks: Vec<BlockState>) -> Self {
        assert_eq!(blocks.len(), SECTION_VOLUME, "section must hold {} blocks", SECTION_VOLUME);
        let non_air = blocks.iter().filter(|block| !block.is_air()).count() as u16;
        Section {
            blocks: blocks.into_boxed_slice(),
            non_air,
        }
    }

    /// Index of a section-local coordinate in YZX order.
    pub const fn index(x: usize, y: usize, z: usize) -> usize {
        (y << 8) | (z << 4) | x
    }

    pub fn get(&self, index: usize) -> BlockState {
        self.blocks[index]
    }

    /// Writes a block and returns the previous value.
    pub fn set(&mut self, index: usize, state: BlockState) -> BlockState {
        let previous = std::mem::replace(&mut self.blocks[index], state);
        match (previous.is_air(), state.is_air()) {
            (true, false) => self.non_air += 1,
            (false, true) => self.non_air -= 1,
            _ => {}
        }
        previous
    }

    pub fn blocks(&self) -> &[BlockState] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.non_air == 0
    }
}

impl Default for Section {
    fn default() -> Self {
        Section::new()
    }
}

/// Represents a 16x16 column of blocks over the full world height.
///
/// `last_modified` is a millisecond timestamp bumped by world storage on every
/// write; the region cache compares it with the timestamp of a cached snapshot
/// to decide whether the snapshot still describes this chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// The position of this chunk in chunk coordinates.
    pub position: ChunkPosition,
    sections: Vec<Option<Section>>,
    pub last_modified: u64,
}

/// Height of the stone surface before noise is added, for generated chunks.
pub const BASE_TERRAIN_HEIGHT: f64 = 64.0;
/// Vertical amplitude of the generated surface.
pub const TERRAIN_AMPLITUDE: f64 = 12.0;
/// Scaling factor applied to world coordinates when sampling Perlin noise.
pub const PERLIN_SCALE_FACTOR: f64 = 0.02;
/// Noise value above which an underground cell is carved out as a cave.
pub const CAVE_THRESHOLD: f64 = 0.45;

/// Ores scattered through generated stone: (ore, maximum height, chance per stone cell).
const ORE_DISTRIBUTION: [(BlockType, i32, f64); 6] = [
    (BlockType::COAL_ORE, 128, 0.012),
    (BlockType::IRON_ORE, 64, 0.007),
    (BlockType::GOLD_ORE, 32, 0.002),
    (BlockType::REDSTONE_ORE, 16, 0.004),
    (BlockType::LAPIS_ORE, 32, 0.001),
    (BlockType::DIAMOND_ORE, 16, 0.001),
];

impl Chunk {
    /// Creates a new, completely empty chunk (all blocks are air).
    pub fn empty(position: ChunkPosition) -> Self {
        Chunk {
            position,
            sections: vec![None; SECTION_COUNT],
            last_modified: 0,
        }
    }

    /// Creates a chunk filled with `block` from the bottom of the world up to
    /// (but excluding) `height`.
    pub fn solid(position: ChunkPosition, block: BlockState, height: i32) -> Self {
        let mut cci = ChunkCreationIterator::new(position);
        let height = height.clamp(0, WORLD_HEIGHT);

        for _ in 0..height * CHUNK_DIMENSION * CHUNK_DIMENSION {
            cci.push_block(block);
        }

        cci.return_chunk()
    }

    /// Generates a test chunk: a bedrock floor, a noisy stone layer capped with
    /// dirt and grass, Perlin caves, and ores scattered through the stone.
    ///
    /// Generation is deterministic for a given `seed` and position.
    pub fn perlin(position: ChunkPosition, seed: u32) -> Self {
        let perlin = Perlin::new(seed);
        let mut rng = fastrand::Rng::with_seed(
            (seed as u64) ^ ((position.x as u64) << 32) ^ (position.z as u32 as u64),
        );
        let min = position.min_block();

        let mut heights = [[0i32; CHUNK_DIMENSION as usize]; CHUNK_DIMENSION as usize];
        for (z, row) in heights.iter_mut().enumerate() {
            for (x, height) in row.iter_mut().enumerate() {
                let sample = perlin.get([
                    (min.x + x as i32) as f64 * PERLIN_SCALE_FACTOR,
                    (min.z + z as i32) as f64 * PERLIN_SCALE_FACTOR,
                ]);
                *height = (BASE_TERRAIN_HEIGHT + sample * TERRAIN_AMPLITUDE) as i32;
            }
        }

        let top = heights.iter().flatten().copied().max().unwrap_or(0) + 1;
        let mut cci = ChunkCreationIterator::new(position);

        for y in 0..top.min(WORLD_HEIGHT) {
            for z in 0..CHUNK_DIMENSION {
                for x in 0..CHUNK_DIMENSION {
                    let height = heights[z as usize][x as usize];
                    let block = if y == 0 {
                        BlockType::BEDROCK
                    } else if y > height {
                        BlockType::AIR
                    } else if Self::is_cave(&perlin, Point3::new(min.x + x, y, min.z + z), height) {
                        BlockType::AIR
                    } else if y == height {
                        BlockType::GRASS
                    } else if y + 3 >= height {
                        BlockType::DIRT
                    } else {
                        Self::pick_stone_or_ore(&mut rng, y)
                    };
                    cci.push_block(BlockState::of(block));
                }
            }
        }

        cci.return_chunk()
    }

    fn is_cave(perlin: &Perlin, position: Point3<i32>, surface: i32) -> bool {
        if position.y < 5 || position.y + 4 > surface {
            return false;
        }
        let sample = perlin.get([
            position.x as f64 * PERLIN_SCALE_FACTOR * 3.0,
            position.y as f64 * PERLIN_SCALE_FACTOR * 3.0,
            position.z as f64 * PERLIN_SCALE_FACTOR * 3.0,
        ]);
        sample > CAVE_THRESHOLD
    }

    fn pick_stone_or_ore(rng: &mut fastrand::Rng, y: i32) -> BlockType {
        let roll = rng.f64();
        let mut acc = 0.0;
        for (ore, max_height, chance) in ORE_DISTRIBUTION {
            if y > max_height {
                continue;
            }
            acc += chance;
            if roll < acc {
                return ore;
            }
        }
        BlockType::STONE
    }

    /// Returns the section at `index`, if any block in it has ever been set.
    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index).and_then(|section| section.as_ref())
    }

    /// Replaces the section at `index`.
    ///
    /// # Panics
    /// Panics if `index >= SECTION_COUNT`.
    pub fn set_section(&mut self, index: usize, section: Option<Section>) {
        self.sections[index] = section;
    }

    /// Whether the section holds nothing but air.
    pub fn is_section_empty(&self, index: usize) -> bool {
        self.section(index).map_or(true, Section::is_empty)
    }

    /// Whether the block position belongs to this chunk and lies inside the world height.
    pub fn contains(&self, position: Point3<i32>) -> bool {
        self.position.contains(position) && (0..WORLD_HEIGHT).contains(&position.y)
    }

    /// Reads the block at an absolute position.
    ///
    /// # Returns
    /// `None` if the position is outside this chunk or the world height.
    pub fn try_get_block(&self, position: Point3<i32>) -> Option<BlockState> {
        if !self.contains(position) {
            return None;
        }
        let (section_index, index) = Self::locate(position);
        Some(
            self.section(section_index)
                .map_or(BlockState::AIR, |section| section.get(index)),
        )
    }

    /// Reads the block at an absolute position.
    ///
    /// # Panics
    /// Panics if the position is outside this chunk or the world height.
    pub fn get_block(&self, position: Point3<i32>) -> BlockState {
        match self.try_get_block(position) {
            Some(block) => block,
            None => panic!(
                "block {:?} is outside chunk ({}, {})",
                position, self.position.x, self.position.z
            ),
        }
    }

    /// Writes the block at an absolute position and returns the previous value.
    ///
    /// Does not touch `last_modified`; world storage does that.
    ///
    /// # Panics
    /// Panics if the position is outside this chunk or the world height.
    pub fn set_block(&mut self, position: Point3<i32>, state: BlockState) -> BlockState {
        assert!(
            self.contains(position),
            "block {:?} is outside chunk ({}, {})",
            position,
            self.position.x,
            self.position.z
        );
        let (section_index, index) = Self::locate(position);
        let slot = &mut self.sections[section_index];
        if slot.is_none() && state.is_air() {
            return BlockState::AIR;
        }
        slot.get_or_insert_with(Section::new).set(index, state)
    }

    /// Number of non-air blocks in the chunk.
    pub fn non_air_count(&self) -> usize {
        self.sections
            .iter()
            .flatten()
            .map(|section| section.non_air as usize)
            .sum()
    }

    /// Splits an absolute position into (section index, index inside the section).
    fn locate(position: Point3<i32>) -> (usize, usize) {
        let x = (position.x & 0xF) as usize;
        let z = (position.z & 0xF) as usize;
        let y = position.y as usize;
        (y >> 4, Section::index(x, y & 0xF, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_position_from_negative_blocks() {
        assert_eq!(ChunkPosition::from_block(Point3::new(-1, 10, -16)), ChunkPosition::new(-1, -1));
        assert_eq!(ChunkPosition::from_block(Point3::new(-17, 10, 15)), ChunkPosition::new(-2, 0));
        assert_eq!(ChunkPosition::from_block(Point3::new(16, 0, 31)), ChunkPosition::new(1, 1));
    }

    #[test]
    fn set_and_get_round_trip() {
        let position = ChunkPosition::new(-2, 3);
        let mut chunk = Chunk::empty(position);
        let block = Point3::new(-20, 70, 50);
        let ore = BlockState::of(BlockType::DIAMOND_ORE);

        assert_eq!(chunk.get_block(block), BlockState::AIR);
        assert!(chunk.is_section_empty(4));
        assert_eq!(chunk.set_block(block, ore), BlockState::AIR);
        assert_eq!(chunk.get_block(block), ore);
        assert!(!chunk.is_section_empty(4));
        assert_eq!(chunk.non_air_count(), 1);

        chunk.set_block(block, BlockState::AIR);
        assert!(chunk.is_section_empty(4));
    }

    #[test]
    fn out_of_range_reads_are_none() {
        let chunk = Chunk::empty(ChunkPosition::new(0, 0));
        assert_eq!(chunk.try_get_block(Point3::new(16, 0, 0)), None);
        assert_eq!(chunk.try_get_block(Point3::new(0, -1, 0)), None);
        assert_eq!(chunk.try_get_block(Point3::new(0, WORLD_HEIGHT, 0)), None);
    }

    #[test]
    #[should_panic]
    fn out_of_range_write_panics() {
        let mut chunk = Chunk::empty(ChunkPosition::new(0, 0));
        chunk.set_block(Point3::new(0, 0, 16), BlockState::of(BlockType::STONE));
    }

    #[test]
    fn solid_fills_up_to_height() {
        let chunk = Chunk::solid(ChunkPosition::new(1, 1), BlockState::of(BlockType::STONE), 20);
        assert_eq!(chunk.get_block(Point3::new(16, 19, 16)), BlockState::of(BlockType::STONE));
        assert_eq!(chunk.get_block(Point3::new(31, 20, 31)), BlockState::AIR);
        assert_eq!(chunk.non_air_count(), 16 * 16 * 20);
    }

    #[test]
    fn perlin_generation_is_deterministic() {
        let a = Chunk::perlin(ChunkPosition::new(3, -7), 42);
        let b = Chunk::perlin(ChunkPosition::new(3, -7), 42);
        assert_eq!(a, b);
        assert_eq!(a.get_block(Point3::new(48, 0, -112)), BlockState::of(BlockType::BEDROCK));
    }
}
