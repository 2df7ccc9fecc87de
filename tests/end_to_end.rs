use std::sync::Arc;

use cgmath::Point3;
use test_case::test_case;
use voxel_obfuscation::{
    config::{CacheOptions, EngineConfig},
    engine_state::{
        obfuscation::{
            deobfuscation::{MutationEvent, MutationKind},
            modifier::{ChunkModifier, ModifierKind, ModifierRegistry},
            network_chunk::{ChunkState, PendingChanges},
            signature::{Signature, SignatureBuilder},
            view::{BlockView, ChunkView},
        },
        voxels::{
            block::{block_type::BlockType, BlockState},
            chunk::{Chunk, ChunkPosition},
            world::World,
        },
    },
    EngineState, WorldOptions,
};

/// The buried diamond; `above()` is the stone on top of it.
fn ore() -> Point3<i32> {
    Point3::new(8, 20, 8)
}

fn above() -> Point3<i32> {
    Point3::new(8, 21, 8)
}

fn stone() -> BlockState {
    BlockState::of(BlockType::STONE)
}

fn diamond() -> BlockState {
    BlockState::of(BlockType::DIAMOND_ORE)
}

/// Nine chunks of solid stone up to y = 63 with one diamond ore in the middle one.
fn world_with_buried_diamond() -> World {
    let mut world = World::new(0);
    for dx in -1..=1 {
        for dz in -1..=1 {
            let mut chunk = Chunk::solid(ChunkPosition::new(dx, dz), stone(), 64);
            if dx == 0 && dz == 0 {
                chunk.set_block(ore(), diamond());
            }
            world.insert_chunk(chunk);
        }
    }
    world
}

fn config(modifier: ModifierKind) -> EngineConfig {
    EngineConfig {
        cache: CacheOptions {
            enabled: false,
            ..CacheOptions::default()
        },
        default_world: WorldOptions {
            modifier,
            ..WorldOptions::default()
        },
        ..EngineConfig::default()
    }
}

#[test_case(ModifierKind::HideAll ; "hide all")]
#[test_case(ModifierKind::Obvious ; "obvious")]
fn mining_next_to_a_hidden_ore_reveals_it(modifier: ModifierKind) {
    let mut world = world_with_buried_diamond();
    let origin = ChunkPosition::new(0, 0);
    let mut engine = EngineState::new("overworld", &config(modifier), &ModifierRegistry::new()).unwrap();

    engine.observe_chunk(origin);
    let report = engine.tick(&world);
    assert_eq!(report.obfuscated, 1);
    assert_eq!(engine.network_block(&world, ore()), Some(stone()));
    assert_eq!(engine.network_chunk(origin).unwrap().disguised().count(), 1);

    world.set_block(above(), BlockState::AIR);
    let reveal = engine.on_mutation(&world, MutationEvent::new(above(), MutationKind::Break, true));
    assert_eq!(reveal.revealed, 2);
    assert_eq!(engine.network_block(&world, ore()), Some(diamond()));
    assert_eq!(engine.network_block(&world, above()), Some(BlockState::AIR));
    assert_eq!(engine.chunk_state(origin), ChunkState::NeedReobfuscation);

    let report = engine.tick(&world);
    assert_eq!(report.obfuscated, 1);
    assert_eq!(engine.chunk_state(origin), ChunkState::Obfuscated);
    // Exposed now, so the recomputed grid leaves it real.
    assert_eq!(engine.network_block(&world, ore()), Some(diamond()));
    assert_eq!(engine.network_chunk(origin).unwrap().disguised().count(), 0);
}

#[test]
fn clients_only_get_what_changed() {
    let mut world = world_with_buried_diamond();
    let origin = ChunkPosition::new(0, 0);
    let mut engine = EngineState::new("overworld", &config(ModifierKind::HideAll), &ModifierRegistry::new()).unwrap();

    engine.observe_chunk(origin);
    engine.tick(&world);

    match engine.take_pending_changes(origin) {
        Some(PendingChanges::FullChunk(chunk)) => assert_eq!(chunk.get_block(ore()), stone()),
        other => panic!("expected the full chunk first, got {:?}", other.map(|_| ())),
    }
    assert!(engine.take_pending_changes(origin).is_none());

    // Nothing changes on a plain re-tick.
    engine.tick(&world);
    assert!(engine.take_pending_changes(origin).is_none());

    world.set_block(above(), BlockState::AIR);
    engine.on_mutation(&world, MutationEvent::new(above(), MutationKind::Break, true));
    assert_eq!(
        engine.take_pending_changes(origin),
        Some(PendingChanges::Blocks(vec![(ore(), diamond()), (above(), BlockState::AIR)]))
    );

    // Recomputing gives the grid clients already have.
    engine.tick(&world);
    assert!(engine.take_pending_changes(origin).is_none());
}

#[test]
fn natural_changes_far_away_leave_the_chunk_alone() {
    let mut world = world_with_buried_diamond();
    let origin = ChunkPosition::new(0, 0);
    let mut engine = EngineState::new("overworld", &config(ModifierKind::HideAll), &ModifierRegistry::new()).unwrap();
    engine.observe_chunk(origin);
    engine.tick(&world);

    let far = Point3::new(40, 30, 40);
    world.set_block(far, BlockState::AIR);
    let report = engine.on_mutation(&world, MutationEvent::new(far, MutationKind::Break, false));
    assert_eq!(report.revealed, 0);
    assert!(report.marked.is_empty());
    assert_eq!(engine.chunk_state(origin), ChunkState::Obfuscated);
}

#[test]
fn random_is_deterministic_per_seed() {
    let mut world = World::new(9);
    world.add_chunks_around(ChunkPosition::new(0, 0), 1);

    let build = |seed: u64| {
        let mut config = config(ModifierKind::Random);
        config.default_world.seed = seed;
        config.default_world.ore_density = 0.3;
        let mut engine = EngineState::new("overworld", &config, &ModifierRegistry::new()).unwrap();
        engine.observe_chunk(ChunkPosition::new(0, 0));
        engine.tick(&world);
        engine
            .network_chunk(ChunkPosition::new(0, 0))
            .and_then(|chunk| chunk.network().cloned())
            .unwrap()
    };

    assert_eq!(build(5), build(5));
}

struct GlassWalls;

impl ChunkModifier for GlassWalls {
    fn name(&self) -> &str {
        "glass_walls"
    }

    fn modify(&self, view: &mut ChunkView<'_>, min: Point3<i32>, max: Point3<i32>, _rng: &mut fastrand::Rng) {
        let cells: Vec<_> = view.candidates(min, max).collect();
        for (position, _) in cells {
            if position.x == min.x {
                view.set_network_block(position, BlockState::of(BlockType::GLASS));
            }
        }
    }

    fn require_cache(&self) -> bool {
        false
    }

    fn signature(&self) -> Signature {
        SignatureBuilder::new().append_str(self.name()).build()
    }
}

#[test]
fn custom_modifier_runs_without_a_cache() {
    let world = world_with_buried_diamond();
    let mut config = config(ModifierKind::Custom("glass_walls".to_string()));
    config.cache.enabled = true;
    config.cache.directory = std::env::temp_dir().join("never-created-by-glass-walls");

    let mut registry = ModifierRegistry::new();
    registry.register("glass_walls", |_options: &WorldOptions| {
        Ok(Arc::new(GlassWalls) as Arc<dyn ChunkModifier>)
    });

    let mut engine = EngineState::new("overworld", &config, &registry).unwrap();
    assert!(engine.cache().is_none());

    engine.observe_chunk(ChunkPosition::new(0, 0));
    engine.tick(&world);
    assert_eq!(
        engine.network_block(&world, Point3::new(0, 10, 5)),
        Some(BlockState::of(BlockType::GLASS))
    );
    assert_eq!(engine.network_block(&world, Point3::new(1, 10, 5)), Some(stone()));
}
