//! # Random Modifier
//!
//! Replaces every enclosed ore and common block with either the ground block or
//! a decoy. With probability `ore_density` a slot gets a decoy drawn from the
//! weighted ore and common lists (the draw may return the real block); otherwise
//! it gets the ground block. An X-ray client then sees plausible ore
//! everywhere instead of nowhere.
//!
//! The outcome depends only on the configuration and the RNG handed in, which
//! the engine seeds per chunk, so a chunk always looks the same for a given
//! seed.

use cgmath::Point3;

use super::{conceal, BlockSet, ChunkModifier};
use crate::{
    config::WorldOptions,
    engine_state::{
        obfuscation::{
            signature::{Signature, SignatureBuilder},
            view::ChunkView,
            weighted_list::WeightedList,
        },
        voxels::block::BlockState,
    },
    errors::{ObfuscationError, Result},
};

const VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct RandomModifier {
    ground: BlockState,
    resources: BlockSet,
    decoys: WeightedList<BlockState>,
    density: f64,
    seed: u64,
}

impl RandomModifier {
    /// # Errors
    /// `InvalidConfig` for a density outside [0, 1] or an air ground block;
    /// `EmptyWeightedList` / `InvalidWeight` if the decoy list can't be built.
    pub fn new(options: &WorldOptions) -> Result<Self> {
        if !options.ore_density.is_finite() || !(0.0..=1.0).contains(&options.ore_density) {
            return Err(ObfuscationError::InvalidConfig(format!(
                "ore_density must be within [0, 1], got {}",
                options.ore_density
            )));
        }
        if options.ground_block.is_air() {
            return Err(ObfuscationError::InvalidConfig(
                "ground_block must not be air".to_string(),
            ));
        }
        Ok(RandomModifier {
            ground: options.ground_block,
            resources: BlockSet::new(options.resource_set()),
            decoys: WeightedList::new(options.decoy_entries())?,
            density: options.ore_density,
            seed: options.seed,
        })
    }

    fn pick(&self, rng: &mut fastrand::Rng) -> BlockState {
        if self.density > 0.0 && rng.f64() < self.density {
            *self.decoys.get(rng)
        } else {
            self.ground
        }
    }
}

impl ChunkModifier for RandomModifier {
    fn name(&self) -> &str {
        "random"
    }

    fn modify(&self, view: &mut ChunkView<'_>, min: Point3<i32>, max: Point3<i32>, rng: &mut fastrand::Rng) {
        conceal(view, min, max, &self.resources, self.ground, |_| self.pick(rng));
    }

    fn signature(&self) -> Signature {
        let mut builder = SignatureBuilder::new()
            .append_str(self.name())
            .append_u32(VERSION)
            .append_block(self.ground)
            .append_block_set(self.resources.as_slice())
            .append_u32(self.decoys.len() as u32);
        for (block, weight) in self.decoys.iter() {
            builder = builder.append_block(*block).append_f64(weight);
        }
        builder.append_f64(self.density).append_u64(self.seed).build()
    }
}
