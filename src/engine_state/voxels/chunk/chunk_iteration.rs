//! # Chunk Iteration Module
//!
//! An iterator over the non-air blocks of a chunk inside an inclusive block
//! window. Modifiers use it to find candidate blocks without visiting sky.
//!
//! Sections that hold only air are skipped whole, so the cost is proportional to
//! the populated part of the window.

use cgmath::Point3;

use super::{Chunk, SECTION_HEIGHT};
use crate::engine_state::voxels::block::BlockState;

/// An iterator over all non-air blocks of a chunk inside `[min, max]`.
///
/// Positions are absolute block coordinates, visited in storage order (x
/// fastest, then z, then y).
pub struct ChunkBlockIterator<'a> {
    /// Reference to the chunk being iterated over
    chunk_ref: &'a Chunk,
    /// Window clamped to the chunk
    min: Point3<i32>,
    max: Point3<i32>,
    /// Next position to examine; `None` once exhausted
    cursor: Option<Point3<i32>>,
}

impl<'a> ChunkBlockIterator<'a> {
    /// Creates an iterator over the part of `[min, max]` that lies inside `chunk_ref`.
    pub fn new(chunk_ref: &'a Chunk, min: Point3<i32>, max: Point3<i32>) -> Self {
        let chunk_min = chunk_ref.position.min_block();
        let chunk_max = chunk_ref.position.max_block();
        let min = Point3::new(
            min.x.max(chunk_min.x),
            min.y.max(chunk_min.y),
            min.z.max(chunk_min.z),
        );
        let max = Point3::new(
            max.x.min(chunk_max.x),
            max.y.min(chunk_max.y),
            max.z.min(chunk_max.z),
        );
        let cursor = (min.x <= max.x && min.y <= max.y && min.z <= max.z).then_some(min);

        ChunkBlockIterator {
            chunk_ref,
            min,
            max,
            cursor,
        }
    }

    /// Iterates over the whole chunk.
    pub fn whole(chunk_ref: &'a Chunk) -> Self {
        let position = chunk_ref.position;
        Self::new(chunk_ref, position.min_block(), position.max_block())
    }

    /// Gets the next non-air block in the window along with its position.
    pub fn get_next_block(&mut self) -> Option<(Point3<i32>, BlockState)> {
        while let Some(position) = self.cursor {
            let section_index = (position.y / SECTION_HEIGHT) as usize;
            if self.chunk_ref.is_section_empty(section_index) {
                // Jump to the first layer of the next section.
                let next_y = (section_index as i32 + 1) * SECTION_HEIGHT;
                self.cursor = (next_y <= self.max.y)
                    .then(|| Point3::new(self.min.x, next_y, self.min.z));
                continue;
            }

            self.advance(position);
            let block = self.chunk_ref.get_block(position);
            if !block.is_air() {
                return Some((position, block));
            }
        }
        None
    }

    fn advance(&mut self, position: Point3<i32>) {
        let mut next = position;
        next.x += 1;
        if next.x > self.max.x {
            next.x = self.min.x;
            next.z += 1;
            if next.z > self.max.z {
                next.z = self.min.z;
                next.y += 1;
            }
        }
        self.cursor = (next.y <= self.max.y).then_some(next);
    }
}

impl Iterator for ChunkBlockIterator<'_> {
    type Item = (Point3<i32>, BlockState);

    fn next(&mut self) -> Option<Self::Item> {
        self.get_next_block()
    }
}
