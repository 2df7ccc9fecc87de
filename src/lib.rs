#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Obfuscation
//!
//! An anti-xray engine for block-based voxel worlds. The server keeps the true
//! block grid; clients get a *network* grid in which valuable blocks that no
//! player could see are disguised as ordinary ground. When the world changes
//! near a disguised block, the true block is revealed immediately.
//!
//! ## Key Modules
//!
//! * `config` - JSON configuration of the engine and its worlds
//! * `core` - Shared utilities (`MtResource`)
//! * `engine_state` - The per-world context, modifiers, cache and voxel data
//! * `errors` - The crate error type
//!
//! ## Architecture
//!
//! The engine is split into:
//! * World storage (`WorldStorage`), through which true blocks are read
//! * Chunk modifiers, which derive the network grid of one chunk
//! * Per-chunk network state, which tracks staleness and what clients were sent
//! * A region-file cache with background writers, so restarts don't recompute
//!
//! ## Usage
//!
//! ```rust
//! use voxel_obfuscation::{
//!     config::EngineConfig,
//!     engine_state::{
//!         obfuscation::modifier::ModifierRegistry,
//!         voxels::{chunk::ChunkPosition, world::World},
//!         EngineState,
//!     },
//! };
//!
//! voxel_obfuscation::init_logging();
//!
//! let mut config = EngineConfig::default();
//! config.cache.enabled = false;
//!
//! let mut world = World::new(1);
//! world.add_chunks_around(ChunkPosition::new(0, 0), 1);
//!
//! let mut engine = EngineState::new("overworld", &config, &ModifierRegistry::new()).unwrap();
//! engine.observe_chunk(ChunkPosition::new(0, 0));
//! engine.tick(&world);
//! ```

use log::info;

pub mod config;
pub mod core;
pub mod engine_state;
pub mod errors;

pub use config::{EngineConfig, WorldOptions};
pub use engine_state::{ChangeListener, EngineState, TickReport};
pub use errors::{ObfuscationError, Result};

/// Installs the `env_logger` logger, writing to stdout and filtered by
/// `RUST_LOG`. Later calls do nothing.
pub fn init_logging() {
    let mut log_builder = env_logger::Builder::new();
    let installed = log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .try_init()
        .is_ok();

    if installed {
        info!("Logger initialized");
    }
}
