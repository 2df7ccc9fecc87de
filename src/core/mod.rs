//! # Core Module
//!
//! Fundamental sharing primitives used throughout the obfuscation engine.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking.
//!   True chunks live in the world as `MtResource<Chunk>` and the region cache
//!   keeps its open files behind one, so background cache writers and the tick
//!   thread can share them.

pub mod mt_resource;

pub use mt_resource::MtResource;
