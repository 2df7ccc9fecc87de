//! # Voxel Task System
//!
//! Background work on voxel data. Persisting a network grid means compressing
//! sixteen sections and rewriting a region file, which is too slow for the tick
//! thread, so it runs here.

pub mod cache_write_task;
