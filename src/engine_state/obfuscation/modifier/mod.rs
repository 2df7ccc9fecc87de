//! # Chunk Modifiers
//!
//! A chunk modifier decides which blocks of a chunk clients get to see. It runs
//! over a `ChunkView` after the network grid has been initialized to a copy of
//! the true grid, and rewrites the network grid in place.
//!
//! ## Variants
//!
//! * **Empty**: leaves the network grid equal to the true grid
//! * **HideAll**: every enclosed ore or common block becomes the ground block
//! * **Obvious**: every enclosed ore becomes the ground block; common blocks stay
//! * **Random**: every enclosed ore or common block becomes either the ground
//!   block or a decoy drawn from the weighted ore and common lists
//!
//! Blocks equal to the ground block and air are never touched, and exposed
//! blocks always stay real.
//!
//! ## Extension
//!
//! `ModifierKind::Custom(name)` resolves through a `ModifierRegistry` handed to
//! the world's `EngineState` at construction. There is no global registry.
//!
//! ## Determinism
//!
//! Modifiers hold nothing but their resolved configuration, so running one twice
//! over the same view with an RNG seeded the same way gives the same network
//! grid. `chunk_rng` produces that RNG for a chunk.

use std::{collections::HashMap, fmt, sync::Arc};

use cgmath::Point3;
use serde::{Deserialize, Serialize};

use super::{
    signature::Signature,
    view::{BlockView, ChunkView},
};
use crate::{
    config::WorldOptions,
    engine_state::voxels::{block::BlockState, chunk::ChunkPosition},
    errors::{ObfuscationError, Result},
};

pub mod empty;
pub mod hide_all;
pub mod obvious;
pub mod random;

pub use empty::EmptyModifier;
pub use hide_all::HideAllModifier;
pub use obvious::ObviousModifier;
pub use random::RandomModifier;

/// A strategy that derives a chunk's network grid from its true grid.
pub trait ChunkModifier: Send + Sync {
    /// Identifies the algorithm in logs and signatures.
    fn name(&self) -> &str;

    /// Rewrites the view's network grid over the inclusive block range
    /// `[min, max]`.
    ///
    /// # Arguments
    /// * `view` - True grid (read) and network grid (write) of one chunk
    /// * `min` - Lowest corner of the range, absolute block coordinates
    /// * `max` - Highest corner of the range, inclusive
    /// * `rng` - Source of randomness; deterministic modifiers ignore it
    fn modify(&self, view: &mut ChunkView<'_>, min: Point3<i32>, max: Point3<i32>, rng: &mut fastrand::Rng);

    /// Whether everything the modifier reads is loaded.
    fn is_ready(&self, view: &ChunkView<'_>) -> bool {
        view.neighbors_loaded()
    }

    /// Whether results are worth persisting in the region cache.
    fn require_cache(&self) -> bool {
        true
    }

    /// Digest of every input that affects `modify`'s output.
    fn signature(&self) -> Signature;
}

/// The modifier named by configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    Empty,
    #[default]
    HideAll,
    Obvious,
    Random,
    /// A modifier registered on a `ModifierRegistry` under this name.
    Custom(String),
}

impl fmt::Display for ModifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifierKind::Empty => write!(f, "empty"),
            ModifierKind::HideAll => write!(f, "hide_all"),
            ModifierKind::Obvious => write!(f, "obvious"),
            ModifierKind::Random => write!(f, "random"),
            ModifierKind::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// Builds a custom modifier from a world's options.
pub type ModifierFactory = Box<dyn Fn(&WorldOptions) -> Result<Arc<dyn ChunkModifier>> + Send + Sync>;

/// Custom modifiers by name.
#[derive(Default)]
pub struct ModifierRegistry {
    factories: HashMap<String, ModifierFactory>,
}

impl ModifierRegistry {
    pub fn new() -> Self {
        ModifierRegistry::default()
    }

    /// Registers `factory` under `name`, replacing any earlier registration.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&WorldOptions) -> Result<Arc<dyn ChunkModifier>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiates the modifier registered under `name`.
    ///
    /// # Errors
    /// `UnknownModifier` if nothing is registered under `name`, or whatever the
    /// factory returns.
    pub fn create(&self, name: &str, options: &WorldOptions) -> Result<Arc<dyn ChunkModifier>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ObfuscationError::UnknownModifier(name.to_string()))?;
        factory(options)
    }
}

/// Tagged dispatch over the built-in modifiers and registered custom ones.
#[derive(Clone)]
pub enum Modifier {
    Empty(EmptyModifier),
    HideAll(HideAllModifier),
    Obvious(ObviousModifier),
    Random(RandomModifier),
    Custom(Arc<dyn ChunkModifier>),
}

impl Modifier {
    /// Resolves the modifier a world runs. Disabled worlds always get `Empty`.
    ///
    /// # Errors
    /// Propagates configuration errors from the built-in constructors and
    /// `UnknownModifier` for unregistered custom names.
    pub fn from_options(options: &WorldOptions, registry: &ModifierRegistry) -> Result<Self> {
        if !options.enabled {
            return Ok(Modifier::Empty(EmptyModifier));
        }
        let modifier = match &options.modifier {
            ModifierKind::Empty => Modifier::Empty(EmptyModifier),
            ModifierKind::HideAll => Modifier::HideAll(HideAllModifier::new(options)?),
            ModifierKind::Obvious => Modifier::Obvious(ObviousModifier::new(options)?),
            ModifierKind::Random => Modifier::Random(RandomModifier::new(options)?),
            ModifierKind::Custom(name) => Modifier::Custom(registry.create(name, options)?),
        };
        Ok(modifier)
    }

    fn as_dyn(&self) -> &dyn ChunkModifier {
        match self {
            Modifier::Empty(modifier) => modifier,
            Modifier::HideAll(modifier) => modifier,
            Modifier::Obvious(modifier) => modifier,
            Modifier::Random(modifier) => modifier,
            Modifier::Custom(modifier) => modifier.as_ref(),
        }
    }
}

impl ChunkModifier for Modifier {
    fn name(&self) -> &str {
        self.as_dyn().name()
    }

    fn modify(&self, view: &mut ChunkView<'_>, min: Point3<i32>, max: Point3<i32>, rng: &mut fastrand::Rng) {
        self.as_dyn().modify(view, min, max, rng)
    }

    fn is_ready(&self, view: &ChunkView<'_>) -> bool {
        self.as_dyn().is_ready(view)
    }

    fn require_cache(&self) -> bool {
        self.as_dyn().require_cache()
    }

    fn signature(&self) -> Signature {
        self.as_dyn().signature()
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modifier({})", self.name())
    }
}

/// The RNG a chunk is modified with: the world seed mixed with the chunk position.
pub fn chunk_rng(seed: u64, position: ChunkPosition) -> fastrand::Rng {
    let mixed = (position.x as u32 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (position.z as u32 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    fastrand::Rng::with_seed(seed ^ mixed)
}

/// A sorted, de-duplicated block set with a logarithmic membership test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSet(Vec<BlockState>);

impl BlockSet {
    pub fn new(blocks: impl IntoIterator<Item = BlockState>) -> Self {
        let mut blocks: Vec<BlockState> = blocks.into_iter().collect();
        blocks.sort_unstable();
        blocks.dedup();
        BlockSet(blocks)
    }

    pub fn contains(&self, block: &BlockState) -> bool {
        self.0.binary_search(block).is_ok()
    }

    pub fn as_slice(&self) -> &[BlockState] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Rewrites every enclosed block of `targets` inside `[min, max]` with whatever
/// `replace` returns. Air and `ground` are skipped.
pub(crate) fn conceal<F>(
    view: &mut ChunkView<'_>,
    min: Point3<i32>,
    max: Point3<i32>,
    targets: &BlockSet,
    ground: BlockState,
    mut replace: F,
) where
    F: FnMut(BlockState) -> BlockState,
{
    for (position, block) in view.candidates(min, max) {
        if block == ground || !targets.contains(&block) || view.is_exposed(position) {
            continue;
        }
        let replacement = replace(block);
        view.set_network_block(position, replacement);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;

    struct Checkerboard;

    impl ChunkModifier for Checkerboard {
        fn name(&self) -> &str {
            "checkerboard"
        }

        fn modify(&self, view: &mut ChunkView<'_>, min: Point3<i32>, max: Point3<i32>, _rng: &mut fastrand::Rng) {
            let cells: Vec<_> = view.candidates(min, max).collect();
            for (position, _) in cells {
                if (position.x + position.z) % 2 == 0 {
                    view.set_network_block(position, BlockState::of(BlockType::GLASS));
                }
            }
        }

        fn signature(&self) -> Signature {
            super::super::signature::SignatureBuilder::new()
                .append_str(self.name())
                .build()
        }
    }

    #[test]
    fn disabled_world_gets_empty() {
        let options = WorldOptions {
            enabled: false,
            ..WorldOptions::default()
        };
        let modifier = Modifier::from_options(&options, &ModifierRegistry::new()).unwrap();
        assert_eq!(modifier.name(), "empty");
        assert!(!modifier.require_cache());
    }

    #[test]
    fn builtin_kinds_resolve() {
        let registry = ModifierRegistry::new();
        for (kind, name) in [
            (ModifierKind::HideAll, "hide_all"),
            (ModifierKind::Obvious, "obvious"),
            (ModifierKind::Random, "random"),
            (ModifierKind::Empty, "empty"),
        ] {
            let options = WorldOptions {
                modifier: kind,
                ..WorldOptions::default()
            };
            assert_eq!(Modifier::from_options(&options, &registry).unwrap().name(), name);
        }
    }

    #[test]
    fn custom_modifier_resolves_through_registry() {
        let options = WorldOptions {
            modifier: ModifierKind::Custom("checkerboard".to_string()),
            ..WorldOptions::default()
        };
        assert!(matches!(
            Modifier::from_options(&options, &ModifierRegistry::new()),
            Err(ObfuscationError::UnknownModifier(name)) if name == "checkerboard"
        ));

        let mut registry = ModifierRegistry::new();
        registry.register("checkerboard", |_options: &WorldOptions| {
            Ok(Arc::new(Checkerboard) as Arc<dyn ChunkModifier>)
        });
        let modifier = Modifier::from_options(&options, &registry).unwrap();
        assert_eq!(modifier.name(), "checkerboard");
        assert!(matches!(modifier, Modifier::Custom(_)));
    }

    #[test]
    fn chunk_rng_depends_on_seed_and_position() {
        let draw = |seed, x, z| chunk_rng(seed, ChunkPosition::new(x, z)).u64(..);
        assert_eq!(draw(7, 1, 2), draw(7, 1, 2));
        assert_ne!(draw(7, 1, 2), draw(7, 2, 1));
        assert_ne!(draw(7, 1, 2), draw(8, 1, 2));
    }

    #[test]
    fn block_set_membership() {
        let set = BlockSet::new([
            BlockState::of(BlockType::IRON_ORE),
            BlockState::of(BlockType::COAL_ORE),
            BlockState::of(BlockType::IRON_ORE),
        ]);
        assert_eq!(set.as_slice().len(), 2);
        assert!(set.contains(&BlockState::of(BlockType::COAL_ORE)));
        assert!(!set.contains(&BlockState::of(BlockType::STONE)));
    }
}
