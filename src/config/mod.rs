//! # Configuration
//!
//! Engine configuration, deserialized from JSON. Everything a world's modifier
//! and reveal logic depends on is resolved once per world load into a
//! `WorldOptions`; the cache settings are shared by every world.
//!
//! ```json
//! {
//!   "cache": { "directory": "obfuscation_cache", "workers": 2 },
//!   "default_world": {
//!     "modifier": "hide_all",
//!     "ground_block": "STONE",
//!     "ore_blocks": ["DIAMOND_ORE", { "block": "GOLD_ORE", "weight": 2.0 }]
//!   },
//!   "worlds": {
//!     "world_nether": { "modifier": "obvious", "ground_block": "NETHERRACK", "ore_blocks": ["QUARTZ_ORE"] },
//!     "creative": { "enabled": false }
//!   }
//! }
//! ```

use std::{collections::HashMap, fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    engine_state::{
        obfuscation::modifier::ModifierKind,
        voxels::block::{block_type::BlockType, BlockState},
    },
    errors::{ObfuscationError, Result},
};

/// Largest deobfuscation radius accepted, in blocks.
pub const MAX_DEOBFUSCATION_RADIUS: u32 = 16;

/// Shape of the region revealed around a mutation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealShape {
    /// Every cell within the radius on each axis (Chebyshev distance).
    #[default]
    Cube,
    /// Cells within the radius by Euclidean distance.
    Sphere,
    /// Cells within the radius by Manhattan distance.
    Diamond,
}

/// A block in a configured block list, optionally weighted.
///
/// Written as a bare block (`"COAL_ORE"`, `16`) for weight 1, or as
/// `{ "block": "COAL_ORE", "weight": 4.0 }`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightedBlock {
    Weighted { block: BlockState, weight: f64 },
    Plain(BlockState),
}

impl WeightedBlock {
    pub fn block(&self) -> BlockState {
        match self {
            WeightedBlock::Weighted { block, .. } | WeightedBlock::Plain(block) => *block,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            WeightedBlock::Weighted { weight, .. } => *weight,
            WeightedBlock::Plain(_) => 1.0,
        }
    }
}

/// Per-world obfuscation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldOptions {
    /// When `false` clients see true blocks and no network views are built.
    pub enabled: bool,
    pub modifier: ModifierKind,
    /// Filler substituted for concealed resources.
    pub ground_block: BlockState,
    /// Obviously identifying resources (the ores themselves).
    pub ore_blocks: Vec<WeightedBlock>,
    /// Resources that are hidden by `hide_all` and used as decoys by `random`,
    /// but left alone by `obvious`.
    pub common_blocks: Vec<WeightedBlock>,
    /// Probability that a hidden slot gets a decoy instead of ground (`random` only).
    pub ore_density: f64,
    /// Seed mixed with the chunk position to drive `random`.
    pub seed: u64,
    /// Reveal radius for changes nobody caused (physics, explosions, fluids).
    pub radius_natural: u32,
    /// Reveal radius for changes caused by a player.
    pub radius_player: u32,
    pub reveal_shape: RevealShape,
}

impl Default for WorldOptions {
    fn default() -> Self {
        WorldOptions {
            enabled: true,
            modifier: ModifierKind::HideAll,
            ground_block: BlockState::of(BlockType::STONE),
            ore_blocks: [
                BlockType::DIAMOND_ORE,
                BlockType::GOLD_ORE,
                BlockType::IRON_ORE,
                BlockType::COAL_ORE,
                BlockType::LAPIS_ORE,
                BlockType::REDSTONE_ORE,
                BlockType::LIT_REDSTONE_ORE,
                BlockType::EMERALD_ORE,
            ]
            .into_iter()
            .map(|ore| WeightedBlock::Plain(BlockState::of(ore)))
            .collect(),
            common_blocks: Vec::new(),
            ore_density: 0.5,
            seed: 0,
            radius_natural: 1,
            radius_player: 2,
            reveal_shape: RevealShape::Cube,
        }
    }
}

impl WorldOptions {
    /// The ore blocks, without weights.
    pub fn ore_set(&self) -> Vec<BlockState> {
        self.ore_blocks.iter().map(WeightedBlock::block).collect()
    }

    /// Every block subject to concealment: ores and common blocks.
    pub fn resource_set(&self) -> Vec<BlockState> {
        self.ore_blocks
            .iter()
            .chain(self.common_blocks.iter())
            .map(WeightedBlock::block)
            .collect()
    }

    /// Decoy candidates for `random`, in configuration order.
    pub fn decoy_entries(&self) -> Vec<(BlockState, f64)> {
        self.ore_blocks
            .iter()
            .chain(self.common_blocks.iter())
            .map(|entry| (entry.block(), entry.weight()))
            .collect()
    }

    /// Radius for a mutation, by who caused it.
    pub fn radius_for(&self, triggered_by_player: bool) -> u32 {
        if triggered_by_player {
            self.radius_player
        } else {
            self.radius_natural
        }
    }

    /// Checks the settings for contradictions.
    pub fn validate(&self) -> Result<()> {
        if !self.ore_density.is_finite() || !(0.0..=1.0).contains(&self.ore_density) {
            return Err(ObfuscationError::InvalidConfig(format!(
                "ore_density must be within [0, 1], got {}",
                self.ore_density
            )));
        }
        if self.radius_natural > MAX_DEOBFUSCATION_RADIUS || self.radius_player > MAX_DEOBFUSCATION_RADIUS {
            return Err(ObfuscationError::InvalidConfig(format!(
                "deobfuscation radii must not exceed {}",
                MAX_DEOBFUSCATION_RADIUS
            )));
        }
        if self.ground_block.is_air() {
            return Err(ObfuscationError::InvalidConfig(
                "ground_block must not be air".to_string(),
            ));
        }
        if self.resource_set().contains(&self.ground_block) {
            return Err(ObfuscationError::InvalidConfig(format!(
                "ground_block {} is also listed as a resource",
                self.ground_block
            )));
        }
        for entry in self.ore_blocks.iter().chain(self.common_blocks.iter()) {
            if !entry.weight().is_finite() || entry.weight() <= 0.0 {
                return Err(ObfuscationError::InvalidConfig(format!(
                    "weight of {} must be finite and positive, got {}",
                    entry.block(),
                    entry.weight()
                )));
            }
        }
        let hides_blocks = matches!(
            self.modifier,
            ModifierKind::HideAll | ModifierKind::Obvious | ModifierKind::Random
        );
        if self.enabled && hides_blocks && self.ore_blocks.is_empty() {
            return Err(ObfuscationError::InvalidConfig(format!(
                "modifier {} needs at least one ore block",
                self.modifier
            )));
        }
        Ok(())
    }
}

/// Where and how cached network views are persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Background writer threads; 0 writes inline on the tick thread.
    pub workers: usize,
    /// How many region files stay open at once.
    pub open_regions: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            enabled: true,
            directory: PathBuf::from("obfuscation_cache"),
            workers: 2,
            open_regions: 64,
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheOptions,
    /// Settings for worlds without an entry in `worlds`.
    pub default_world: WorldOptions,
    pub worlds: HashMap<String, WorldOptions>,
}

impl EngineConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.enabled && self.cache.open_regions == 0 {
            return Err(ObfuscationError::InvalidConfig(
                "cache.open_regions must be at least 1".to_string(),
            ));
        }
        self.default_world.validate()?;
        for (name, options) in &self.worlds {
            options.validate().map_err(|error| {
                ObfuscationError::InvalidConfig(format!("world '{}': {}", name, error))
            })?;
        }
        Ok(())
    }

    /// The settings for a world, falling back to `default_world`.
    pub fn world_options(&self, world_name: &str) -> &WorldOptions {
        self.worlds.get(world_name).unwrap_or(&self.default_world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_example() {
        let config = EngineConfig::from_json_str(
            r#"{
                "cache": { "directory": "obfuscation_cache", "workers": 2 },
                "default_world": {
                    "modifier": "hide_all",
                    "ground_block": "STONE",
                    "ore_blocks": ["DIAMOND_ORE", { "block": "GOLD_ORE", "weight": 2.0 }]
                },
                "worlds": {
                    "world_nether": { "modifier": "obvious", "ground_block": "NETHERRACK", "ore_blocks": ["QUARTZ_ORE"] },
                    "creative": { "enabled": false }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.cache.workers, 2);
        assert_eq!(config.default_world.ore_blocks.len(), 2);
        assert_eq!(config.default_world.decoy_entries()[1], (BlockState::of(BlockType::GOLD_ORE), 2.0));
        let nether = config.world_options("world_nether");
        assert_eq!(nether.modifier, ModifierKind::Obvious);
        assert_eq!(nether.ground_block, BlockState::of(BlockType::NETHERRACK));
        assert!(!config.world_options("creative").enabled);
        assert_eq!(config.world_options("unknown"), &config.default_world);
    }

    #[test]
    fn custom_modifier_kind() {
        let options: WorldOptions =
            serde_json::from_str(r#"{ "modifier": { "custom": "checkerboard" } }"#).unwrap();
        assert_eq!(options.modifier, ModifierKind::Custom("checkerboard".to_string()));
    }

    #[test]
    fn rejects_bad_density() {
        let options = WorldOptions {
            ore_density: 1.5,
            ..WorldOptions::default()
        };
        assert!(matches!(options.validate(), Err(ObfuscationError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_ground_listed_as_resource() {
        let options = WorldOptions {
            common_blocks: vec![WeightedBlock::Plain(BlockState::of(BlockType::STONE))],
            ..WorldOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn rejects_missing_ores_for_hiding_modifier() {
        let options = WorldOptions {
            ore_blocks: Vec::new(),
            ..WorldOptions::default()
        };
        assert!(options.validate().is_err());

        let disabled = WorldOptions {
            enabled: false,
            ..options
        };
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn rejects_bad_weight_in_file() {
        let error = EngineConfig::from_json_str(
            r#"{ "worlds": { "w": { "ore_blocks": [{ "block": "COAL_ORE", "weight": 0 }] } } }"#,
        )
        .unwrap_err();
        assert!(error.to_string().contains("world 'w'"));
    }

    #[test]
    fn radius_by_cause() {
        let options = WorldOptions::default();
        assert_eq!(options.radius_for(true), 2);
        assert_eq!(options.radius_for(false), 1);
    }
}
