//! # HideAll Modifier
//!
//! Replaces every enclosed ore and common block with the ground block. Clients
//! see solid ground wherever a resource isn't already visible, so X-ray shows
//! nothing at all. Deterministic; the RNG is ignored.

use cgmath::Point3;

use super::{conceal, BlockSet, ChunkModifier};
use crate::{
    config::WorldOptions,
    engine_state::{
        obfuscation::{
            signature::{Signature, SignatureBuilder},
            view::ChunkView,
        },
        voxels::block::BlockState,
    },
    errors::{ObfuscationError, Result},
};

const VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HideAllModifier {
    ground: BlockState,
    resources: BlockSet,
}

impl HideAllModifier {
    /// Resolves the ground block and the resource set (ores and common blocks).
    ///
    /// # Errors
    /// `InvalidConfig` if the resource set is empty or the ground block is air.
    pub fn new(options: &WorldOptions) -> Result<Self> {
        let resources = BlockSet::new(options.resource_set());
        if resources.is_empty() {
            return Err(ObfuscationError::InvalidConfig(
                "hide_all needs at least one resource block".to_string(),
            ));
        }
        if options.ground_block.is_air() {
            return Err(ObfuscationError::InvalidConfig(
                "ground_block must not be air".to_string(),
            ));
        }
        Ok(HideAllModifier {
            ground: options.ground_block,
            resources,
        })
    }
}

impl ChunkModifier for HideAllModifier {
    fn name(&self) -> &str {
        "hide_all"
    }

    fn modify(&self, view: &mut ChunkView<'_>, min: Point3<i32>, max: Point3<i32>, _rng: &mut fastrand::Rng) {
        let ground = self.ground;
        conceal(view, min, max, &self.resources, ground, |_| ground);
    }

    fn signature(&self) -> Signature {
        SignatureBuilder::new()
            .append_str(self.name())
            .append_u32(VERSION)
            .append_block(self.ground)
            .append_block_set(self.resources.as_slice())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::WeightedBlock,
        engine_state::{
            obfuscation::modifier::test_support::{neighbor_refs, stone_fixture},
            voxels::{
                block::block_type::BlockType,
                chunk::{Chunk, ChunkPosition},
            },
        },
    };

    fn run(modifier: &HideAllModifier, center: &Chunk, neighbors: &[Chunk]) -> Chunk {
        let mut network = center.clone();
        let mut view = ChunkView::new(center, neighbor_refs(neighbors), &mut network);
        let position = center.position;
        modifier.modify(
            &mut view,
            position.min_block(),
            position.max_block(),
            &mut fastrand::Rng::with_seed(0),
        );
        network
    }

    #[test]
    fn enclosed_ore_becomes_ground() {
        let position = ChunkPosition::new(0, 0);
        let ore = Point3::new(8, 30, 8);
        let (center, neighbors) = stone_fixture(position, &[(ore, BlockType::DIAMOND_ORE)]);
        let modifier = HideAllModifier::new(&WorldOptions::default()).unwrap();

        let network = run(&modifier, &center, &neighbors);
        assert_eq!(network.get_block(ore), BlockState::of(BlockType::STONE));
        assert_eq!(center.get_block(ore), BlockState::of(BlockType::DIAMOND_ORE));
    }

    #[test]
    fn exposed_ore_stays_real() {
        let position = ChunkPosition::new(0, 0);
        let ore = Point3::new(8, 30, 8);
        let (center, neighbors) = stone_fixture(
            position,
            &[(ore, BlockType::DIAMOND_ORE), (Point3::new(8, 31, 8), BlockType::AIR)],
        );
        let modifier = HideAllModifier::new(&WorldOptions::default()).unwrap();

        let network = run(&modifier, &center, &neighbors);
        assert_eq!(network.get_block(ore), BlockState::of(BlockType::DIAMOND_ORE));
    }

    #[test]
    fn common_blocks_are_hidden_too() {
        let position = ChunkPosition::new(1, 1);
        let min = position.min_block();
        let gravel = Point3::new(min.x + 5, 12, min.z + 5);
        let (center, neighbors) = stone_fixture(position, &[(gravel, BlockType::GRAVEL)]);
        let options = WorldOptions {
            common_blocks: vec![WeightedBlock::Plain(BlockState::of(BlockType::GRAVEL))],
            ..WorldOptions::default()
        };
        let modifier = HideAllModifier::new(&options).unwrap();

        let network = run(&modifier, &center, &neighbors);
        assert_eq!(network.get_block(gravel), BlockState::of(BlockType::STONE));
    }

    #[test]
    fn running_twice_gives_the_same_view() {
        let world = ChunkPosition::new(0, 0);
        let center = Chunk::perlin(world, 42);
        let neighbors: Vec<Chunk> = world
            .horizontal_neighbors()
            .into_iter()
            .map(|position| Chunk::perlin(position, 42))
            .collect();
        let modifier = HideAllModifier::new(&WorldOptions::default()).unwrap();

        let first = run(&modifier, &center, &neighbors);
        let second = run(&modifier, &center, &neighbors);
        assert_eq!(first, second);
        // Idempotent on its own output as well.
        let mut again = first.clone();
        let mut view = ChunkView::new(&center, neighbor_refs(&neighbors), &mut again);
        modifier.modify(&mut view, world.min_block(), world.max_block(), &mut fastrand::Rng::new());
        assert_eq!(again, first);
    }

    #[test]
    fn signature_tracks_configuration() {
        let base = HideAllModifier::new(&WorldOptions::default()).unwrap();
        let reordered = WorldOptions {
            ore_blocks: WorldOptions::default().ore_blocks.into_iter().rev().collect(),
            ..WorldOptions::default()
        };
        let other_ground = WorldOptions {
            ground_block: BlockState::of(BlockType::NETHERRACK),
            ..WorldOptions::default()
        };

        assert_eq!(base.signature(), HideAllModifier::new(&reordered).unwrap().signature());
        assert_ne!(base.signature(), HideAllModifier::new(&other_ground).unwrap().signature());
    }
}
