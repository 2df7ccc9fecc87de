//! # Obfuscation
//!
//! Everything that turns a true chunk into the chunk clients see.
//!
//! ## Architecture
//!
//! * **Modifier**: strategies deciding which blocks get disguised, and how
//! * **View**: the window a modifier works through, with the exposure test
//! * **NetworkChunk**: per-chunk view state, change tracking and emission
//! * **Deobfuscation**: immediate reveals around mutations of the true world
//! * **Signature**: configuration digests used as cache keys
//! * **WeightedList**: weighted random draws for decoys

pub mod deobfuscation;
pub mod modifier;
pub mod network_chunk;
pub mod signature;
pub mod view;
pub mod weighted_list;
