//! # Block Module
//!
//! Block identity as the engine sees it: a numeric id plus a 4-bit variant,
//! compared by value. Face directions and the named block table live in the
//! submodules.

use std::{fmt, str::FromStr};

use block_type::{is_occluding_id, BlockType};
use serde::{Deserialize, Serialize};

use crate::errors::{ObfuscationError, Result};

pub mod block_side;
pub mod block_type;

/// The underlying integer type used to represent block ids.
pub type BlockIdSize = u16;

/// Largest id a block state can carry (12 bits: 8 in the id array, 4 in the
/// extension nibble of a cache container).
pub const MAX_BLOCK_ID: BlockIdSize = 0x0FFF;
/// Largest variant value a block state can carry (one nibble).
pub const MAX_BLOCK_DATA: u8 = 0x0F;

/// A single cell of the block grid.
///
/// The engine never looks inside a block beyond its identity, whether it is a
/// full opaque cell, and whether configuration lists it as a resource.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "BlockSpec", into = "String")]
pub struct BlockState {
    pub id: BlockIdSize,
    pub data: u8,
}

impl BlockState {
    /// The empty cell.
    pub const AIR: BlockState = BlockState { id: 0, data: 0 };

    /// Creates a block state, rejecting ids or data values that do not fit the
    /// container format.
    pub fn new(id: BlockIdSize, data: u8) -> Result<Self> {
        if id > MAX_BLOCK_ID {
            return Err(ObfuscationError::InvalidBlock(format!(
                "block id {} exceeds {}",
                id, MAX_BLOCK_ID
            )));
        }
        if data > MAX_BLOCK_DATA {
            return Err(ObfuscationError::InvalidBlock(format!(
                "block data {} exceeds {}",
                data, MAX_BLOCK_DATA
            )));
        }
        Ok(BlockState { id, data })
    }

    /// The default variant of a named block type.
    pub const fn of(block_type: BlockType) -> Self {
        BlockState {
            id: block_type.id(),
            data: 0,
        }
    }

    /// Returns the named block type, if the id has one.
    pub fn block_type(&self) -> Option<BlockType> {
        BlockType::from_id(self.id)
    }

    pub fn is_air(&self) -> bool {
        self.id == BlockState::AIR.id
    }

    /// Whether this block fills its cell and hides whatever is behind it.
    pub fn is_occluding(&self) -> bool {
        is_occluding_id(self.id)
    }
}

impl From<BlockType> for BlockState {
    fn from(block_type: BlockType) -> Self {
        BlockState::of(block_type)
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block_type() {
            Some(block_type) => write!(f, "{:?}", block_type)?,
            None => write!(f, "{}", self.id)?,
        }
        if self.data != 0 {
            write!(f, ":{}", self.data)?;
        }
        Ok(())
    }
}

/// Parses `NAME`, `NAME:data`, `id` or `id:data`.
impl FromStr for BlockState {
    type Err = ObfuscationError;

    fn from_str(s: &str) -> Result<Self> {
        let (head, data) = match s.split_once(':') {
            Some((head, data)) => {
                let data = data.trim().parse::<u8>().map_err(|_| {
                    ObfuscationError::InvalidBlock(format!("bad block data in '{}'", s))
                })?;
                (head, data)
            }
            None => (s, 0),
        };

        let id = match head.trim().parse::<BlockIdSize>() {
            Ok(id) => id,
            Err(_) => BlockType::from_name(head)
                .ok_or_else(|| ObfuscationError::InvalidBlock(format!("unknown block '{}'", s)))?
                .id(),
        };

        BlockState::new(id, data)
    }
}

/// How a block may be written in configuration: a bare numeric id or a name.
#[derive(Deserialize)]
#[serde(untagged)]
enum BlockSpec {
    Id(BlockIdSize),
    Name(String),
}

impl TryFrom<BlockSpec> for BlockState {
    type Error = ObfuscationError;

    fn try_from(spec: BlockSpec) -> Result<Self> {
        match spec {
            BlockSpec::Id(id) => BlockState::new(id, 0),
            BlockSpec::Name(name) => name.parse(),
        }
    }
}

impl From<BlockState> for String {
    fn from(state: BlockState) -> Self {
        state.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_ids() {
        assert_eq!(
            "DIAMOND_ORE".parse::<BlockState>().unwrap(),
            BlockState::of(BlockType::DIAMOND_ORE)
        );
        assert_eq!(
            "stone:3".parse::<BlockState>().unwrap(),
            BlockState::new(1, 3).unwrap()
        );
        assert_eq!("300:2".parse::<BlockState>().unwrap(), BlockState::new(300, 2).unwrap());
        assert!("NOT_A_BLOCK".parse::<BlockState>().is_err());
        assert!("STONE:16".parse::<BlockState>().is_err());
        assert!("5000".parse::<BlockState>().is_err());
    }

    #[test]
    fn display_matches_parse() {
        for state in [
            BlockState::of(BlockType::GOLD_ORE),
            BlockState::new(1, 5).unwrap(),
            BlockState::new(2000, 0).unwrap(),
        ] {
            assert_eq!(state.to_string().parse::<BlockState>().unwrap(), state);
        }
    }

    #[test]
    fn deserializes_from_json_name_or_number() {
        let blocks: Vec<BlockState> = serde_json::from_str(r#"["COAL_ORE", 56, "STONE:1"]"#).unwrap();
        assert_eq!(
            blocks,
            vec![
                BlockState::of(BlockType::COAL_ORE),
                BlockState::of(BlockType::DIAMOND_ORE),
                BlockState::new(1, 1).unwrap(),
            ]
        );
        assert!(serde_json::from_str::<BlockState>("\"MYSTERY\"").is_err());
    }
}
