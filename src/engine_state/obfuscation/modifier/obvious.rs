//! Hides enclosed ores only. Common blocks keep their true identity, which
//! makes the network grid cheaper to diff and leaves caves of gravel and dirt
//! looking natural.

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
pub struct ObviousModifier {
    ground: BlockState,
    ores: BlockSet,
}

impl ObviousModifier {
    /// # Errors
    /// `InvalidConfig` if there are no ore blocks or the ground block is air.
    pub fn new(options: &WorldOptions) -> Result<Self> {
        let ores = BlockSet::new(options.ore_set());
        if ores.is_empty() {
            return Err(ObfuscationError::InvalidConfig(
                "obvious needs at least one ore block".to_string(),
            ));
        }
        if options.ground_block.is_air() {
            return Err(ObfuscationError::InvalidConfig(
                "ground_block must not be air".to_string(),
            ));
        }
        Ok(ObviousModifier {
            ground: options.ground_block,
            ores,
        })
    }
}

impl ChunkModifier for ObviousModifier {
    fn name(&self) -> &str {
        "obvious"
    }

    fn modify(&self, view: &mut ChunkView<'_>, min: Point3<i32>, max: Point3<i32>, _rng: &mut fastrand::Rng) {
        let ground = self.ground;
        conceal(view, min, max, &self.ores, ground, |_| ground);
    }

    fn signature(&self) -> Signature {
        SignatureBuilder::new()
            .append_str(self.name())
            .append_u32(VERSION)
            .append_block(self.ground)
            .append_block_set(self.ores.as_slice())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::WeightedBlock,
        engine_state::{
            obfuscation::modifier::{
                hide_all::HideAllModifier,
                test_support::{neighbor_refs, stone_fixture},
            },
            voxels::{block::block_type::BlockType, chunk::ChunkPosition},
        },
    };

    #[test]
    fn hides_ores_but_not_common_blocks() {
        let position = ChunkPosition::new(-1, 0);
        let min = position.min_block();
        let ore = Point3::new(min.x + 3, 20, min.z + 3);
        let gravel = Point3::new(min.x + 10, 20, min.z + 10);
        let (center, neighbors) = stone_fixture(
            position,
            &[(ore, BlockType::GOLD_ORE), (gravel, BlockType::GRAVEL)],
        );
        let options = WorldOptions {
            common_blocks: vec![WeightedBlock::Plain(BlockState::of(BlockType::GRAVEL))],
            ..WorldOptions::default()
        };
        let modifier = ObviousModifier::new(&options).unwrap();

        let mut network = center.clone();
        let mut view = ChunkView::new(&center, neighbor_refs(&neighbors), &mut network);
        modifier.modify(&mut view, position.min_block(), position.max_block(), &mut fastrand::Rng::with_seed(3));

        assert_eq!(network.get_block(ore), BlockState::of(BlockType::STONE));
        assert_eq!(network.get_block(gravel), BlockState::of(BlockType::GRAVEL));
    }

    #[test]
    fn respects_the_requested_window() {
        let position = ChunkPosition::new(0, 0);
        let inside = Point3::new(2, 20, 2);
        let outside = Point3::new(12, 20, 12);
        let (center, neighbors) = stone_fixture(
            position,
            &[(inside, BlockType::COAL_ORE), (outside, BlockType::COAL_ORE)],
        );
        let modifier = ObviousModifier::new(&WorldOptions::default()).unwrap();

        let mut network = center.clone();
        let mut view = ChunkView::new(&center, neighbor_refs(&neighbors), &mut network);
        modifier.modify(
            &mut view,
            Point3::new(0, 0, 0),
            Point3::new(7, 255, 7),
            &mut fastrand::Rng::with_seed(3),
        );

        assert_eq!(network.get_block(inside), BlockState::of(BlockType::STONE));
        assert_eq!(network.get_block(outside), BlockState::of(BlockType::COAL_ORE));
    }

    #[test]
    fn signature_differs_from_hide_all() {
        let options = WorldOptions::default();
        assert_ne!(
            ObviousModifier::new(&options).unwrap().signature(),
            HideAllModifier::new(&options).unwrap().signature()
        );
    }
}
