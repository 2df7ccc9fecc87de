//! # Voxel Data
//!
//! The block grid the engine reads and derives from.
//!
//! ## Architecture
//!
//! * **Block**: block identity (`BlockState`), the named block table and face directions
//! * **Chunk**: 16x16 columns of full world height, split into 16³ sections
//! * **World**: the `WorldStorage` seam to the host and an in-memory implementation
//! * **Tasks**: background work on voxel data (cache writes)
//!
//! ## Data Flow
//!
//! 1. The host owns the true chunks and hands them out as `MtResource<Chunk>`
//! 2. The tick reads a chunk and its four horizontal neighbors through `WorldStorage`
//! 3. A modifier derives the network grid, which the `NetworkChunk` owns
//! 4. Finished network grids are persisted by a cache write task

pub mod block;
pub mod chunk;
pub mod tasks;
pub mod world;
