//! # Voxel Obfuscation Demo
//!
//! Runs the engine over a generated world: obfuscates the chunks around the
//! origin, mines a block next to a hidden ore and shows the reveal.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --release [config.json]
//! ```

use std::process::ExitCode;

use cgmath::Point3;
use log::{error, info};
use voxel_obfuscation::{
    engine_state::{
        obfuscation::{
            deobfuscation::{MutationEvent, MutationKind},
            modifier::ModifierRegistry,
            network_chunk::PendingChanges,
        },
        voxels::{
            block::BlockState,
            chunk::{chunk_iteration::ChunkBlockIterator, ChunkPosition},
            world::{World, WorldStorage},
        },
    },
    EngineConfig, EngineState,
};

const WORLD_NAME: &str = "overworld";
const WORLD_SEED: u32 = 42;
const LOAD_RADIUS: i32 = 2;

fn main() -> ExitCode {
    voxel_obfuscation::init_logging();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{}", error);
            ExitCode::FAILURE
        }
    }
}

fn run() -> voxel_obfuscation::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    let mut world = World::new(WORLD_SEED);
    let origin = ChunkPosition::new(0, 0);
    world.add_chunks_around(origin, LOAD_RADIUS + 1);

    let mut engine = EngineState::new(WORLD_NAME, &config, &ModifierRegistry::new())?;
    for dx in -LOAD_RADIUS..=LOAD_RADIUS {
        for dz in -LOAD_RADIUS..=LOAD_RADIUS {
            engine.observe_chunk(origin.offset(dx, dz));
        }
    }

    let report = engine.tick(&world);
    info!(
        "First tick: {} obfuscated, {} from cache, {} deferred",
        report.obfuscated, report.cache_hits, report.deferred
    );

    let mut disguised = 0;
    for dx in -LOAD_RADIUS..=LOAD_RADIUS {
        for dz in -LOAD_RADIUS..=LOAD_RADIUS {
            let position = origin.offset(dx, dz);
            if let Some(chunk) = engine.network_chunk(position) {
                disguised += chunk.disguised().count();
            }
            engine.take_pending_changes(position);
        }
    }
    info!("{} blocks disguised around the origin", disguised);

    // Mine the block above the first disguised cell of the origin chunk.
    let target = engine.network_chunk(origin).and_then(|chunk| {
        let network = chunk.network()?;
        ChunkBlockIterator::whole(network).find_map(|(position, _)| {
            chunk
                .disguised()
                .is_disguised(position)
                .then(|| Point3::new(position.x, position.y + 1, position.z))
        })
    });

    match target {
        Some(above) => {
            let below = Point3::new(above.x, above.y - 1, above.z);
            let before = engine.network_block(&world, below);
            world.set_block(above, BlockState::AIR);
            let reveal = engine.on_mutation(&world, MutationEvent::new(above, MutationKind::Break, true));
            info!(
                "Broke {:?}: {} cells revealed, {} chunks to re-obfuscate; {:?} now shows {:?} (was {:?}, true {:?})",
                above,
                reveal.revealed,
                reveal.marked.len(),
                below,
                engine.network_block(&world, below),
                before,
                world.get_block(below)
            );
        }
        None => info!("Nothing disguised in the origin chunk"),
    }

    let report = engine.tick(&world);
    info!("Second tick: {} re-obfuscated", report.obfuscated);

    if let Some(PendingChanges::Blocks(blocks)) = engine.take_pending_changes(origin) {
        info!("{} cells of the origin chunk changed for clients", blocks.len());
    }

    engine.shutdown();
    Ok(())
}
