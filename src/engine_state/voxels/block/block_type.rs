//! # Block Type Module
//!
//! Well-known block ids. The engine treats blocks as opaque `BlockState`s; this
//! enum only exists so configuration can name blocks and so the default
//! occlusion table has something readable to refer to.

use num_derive::FromPrimitive;
use phf::{phf_map, phf_set};

use super::BlockIdSize;

/// Enumerates the well-known block ids.
///
/// The discriminant is the numeric block id. `FromPrimitive` is used to go from
/// a stored id back to a named type; ids without a variant are still valid
/// block states, they just have no name.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive)]
#[repr(u16)]
pub enum BlockType {
    AIR = 0,
    STONE = 1,
    GRASS = 2,
    DIRT = 3,
    COBBLESTONE = 4,
    PLANKS = 5,
    BEDROCK = 7,
    FLOWING_WATER = 8,
    WATER = 9,
    FLOWING_LAVA = 10,
    LAVA = 11,
    SAND = 12,
    GRAVEL = 13,
    GOLD_ORE = 14,
    IRON_ORE = 15,
    COAL_ORE = 16,
    LOG = 17,
    LEAVES = 18,
    GLASS = 20,
    LAPIS_ORE = 21,
    SANDSTONE = 24,
    MOSSY_COBBLESTONE = 48,
    OBSIDIAN = 49,
    TORCH = 50,
    MOB_SPAWNER = 52,
    CHEST = 54,
    DIAMOND_ORE = 56,
    REDSTONE_ORE = 73,
    LIT_REDSTONE_ORE = 74,
    ICE = 79,
    NETHERRACK = 87,
    GLOWSTONE = 89,
    MONSTER_EGG = 97,
    STONEBRICK = 98,
    EMERALD_ORE = 129,
    QUARTZ_ORE = 153,
}

/// Name lookup used when parsing block names out of configuration.
static BLOCK_NAMES: phf::Map<&'static str, BlockType> = phf_map! {
    "AIR" => BlockType::AIR,
    "STONE" => BlockType::STONE,
    "GRASS" => BlockType::GRASS,
    "DIRT" => BlockType::DIRT,
    "COBBLESTONE" => BlockType::COBBLESTONE,
    "PLANKS" => BlockType::PLANKS,
    "BEDROCK" => BlockType::BEDROCK,
    "FLOWING_WATER" => BlockType::FLOWING_WATER,
    "WATER" => BlockType::WATER,
    "FLOWING_LAVA" => BlockType::FLOWING_LAVA,
    "LAVA" => BlockType::LAVA,
    "SAND" => BlockType::SAND,
    "GRAVEL" => BlockType::GRAVEL,
    "GOLD_ORE" => BlockType::GOLD_ORE,
    "IRON_ORE" => BlockType::IRON_ORE,
    "COAL_ORE" => BlockType::COAL_ORE,
    "LOG" => BlockType::LOG,
    "LEAVES" => BlockType::LEAVES,
    "GLASS" => BlockType::GLASS,
    "LAPIS_ORE" => BlockType::LAPIS_ORE,
    "SANDSTONE" => BlockType::SANDSTONE,
    "MOSSY_COBBLESTONE" => BlockType::MOSSY_COBBLESTONE,
    "OBSIDIAN" => BlockType::OBSIDIAN,
    "TORCH" => BlockType::TORCH,
    "MOB_SPAWNER" => BlockType::MOB_SPAWNER,
    "CHEST" => BlockType::CHEST,
    "DIAMOND_ORE" => BlockType::DIAMOND_ORE,
    "REDSTONE_ORE" => BlockType::REDSTONE_ORE,
    "LIT_REDSTONE_ORE" => BlockType::LIT_REDSTONE_ORE,
    "ICE" => BlockType::ICE,
    "NETHERRACK" => BlockType::NETHERRACK,
    "GLOWSTONE" => BlockType::GLOWSTONE,
    "MONSTER_EGG" => BlockType::MONSTER_EGG,
    "STONEBRICK" => BlockType::STONEBRICK,
    "EMERALD_ORE" => BlockType::EMERALD_ORE,
    "QUARTZ_ORE" => BlockType::QUARTZ_ORE,
};

/// Ids of blocks that fill their whole cell and cannot be seen through.
///
/// Anything not listed here (air, fluids, glass, leaves, torches, chests, and
/// every id the engine has no name for) counts as non-occluding, so a
/// neighboring resource is considered exposed.
static OCCLUDING_BLOCK_IDS: phf::Set<u16> = phf_set! {
    1u16, 2u16, 3u16, 4u16, 5u16, 7u16, 12u16, 13u16, 14u16, 15u16, 16u16, 17u16,
    21u16, 24u16, 48u16, 49u16, 56u16, 73u16, 74u16, 87u16, 89u16, 97u16, 98u16,
    129u16, 153u16,
};

impl BlockType {
    /// Converts a numeric block id to a named `BlockType`.
    ///
    /// # Returns
    /// `None` if the id has no well-known name.
    pub fn from_id(id: BlockIdSize) -> Option<Self> {
        num::FromPrimitive::from_u16(id)
    }

    /// Looks a block type up by its configuration name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        BLOCK_NAMES
            .get(name.trim().to_ascii_uppercase().as_str())
            .copied()
    }

    /// The numeric id of this block type.
    pub const fn id(self) -> BlockIdSize {
        self as BlockIdSize
    }
}

/// Whether the block id fills its cell opaquely.
pub fn is_occluding_id(id: BlockIdSize) -> bool {
    OCCLUDING_BLOCK_IDS.contains(&id)
}
