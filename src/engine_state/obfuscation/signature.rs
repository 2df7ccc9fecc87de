//! # Signatures
//!
//! A `Signature` is a digest of every configuration input that can change a
//! modifier's output. It is stored next to each cached network snapshot; a
//! snapshot is only reused when its signature equals the one the active
//! configuration produces.
//!
//! `SignatureBuilder` feeds typed, fixed-width little-endian appends into
//! SHA-256. Variable-length values are length-prefixed, so `("ab", "c")` and
//! `("a", "bc")` hash differently.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::{
    engine_state::voxels::block::BlockState,
    errors::{ObfuscationError, Result},
};

/// Upper bound on a signature's byte length, as stored in cache records.
pub const MAX_SIGNATURE_LENGTH: usize = 64;

/// An immutable digest. Two signatures are equal iff their bytes are equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Wraps raw bytes, e.g. when reading a cache record back.
    ///
    /// # Errors
    /// `SignatureTooLong` if `bytes` exceeds `MAX_SIGNATURE_LENGTH`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_SIGNATURE_LENGTH {
            return Err(ObfuscationError::SignatureTooLong {
                len: bytes.len(),
                max: MAX_SIGNATURE_LENGTH,
            });
        }
        Ok(Signature(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

/// Accumulates ordered appends and produces a `Signature`.
///
/// ```
/// use voxel_obfuscation::engine_state::obfuscation::signature::SignatureBuilder;
///
/// let a = SignatureBuilder::new().append_str("hide_all").append_u32(1).build();
/// let b = SignatureBuilder::new().append_str("hide_all").append_u32(1).build();
/// let c = SignatureBuilder::new().append_str("hide_all").append_u32(2).build();
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// ```
#[derive(Clone, Default)]
pub struct SignatureBuilder {
    hasher: Sha256,
}

impl SignatureBuilder {
    pub fn new() -> Self {
        SignatureBuilder {
            hasher: Sha256::new(),
        }
    }

    pub fn append_u8(mut self, value: u8) -> Self {
        self.hasher.update([value]);
        self
    }

    pub fn append_bool(self, value: bool) -> Self {
        self.append_u8(value as u8)
    }

    pub fn append_u16(mut self, value: u16) -> Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn append_i32(mut self, value: i32) -> Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn append_u32(mut self, value: u32) -> Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn append_u64(mut self, value: u64) -> Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    /// Appends the IEEE-754 bit pattern, so `0.5` and `0.50000001` differ.
    pub fn append_f64(self, value: f64) -> Self {
        self.append_u64(value.to_bits())
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn append_str(mut self, value: &str) -> Self {
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    pub fn append_block(self, block: BlockState) -> Self {
        self.append_u16(block.id).append_u8(block.data)
    }

    /// Appends a length-prefixed block list in the given order.
    pub fn append_blocks<'a, I>(self, blocks: I) -> Self
    where
        I: IntoIterator<Item = &'a BlockState>,
        I::IntoIter: ExactSizeIterator,
    {
        let blocks = blocks.into_iter();
        let mut builder = self.append_u32(blocks.len() as u32);
        for block in blocks {
            builder = builder.append_block(*block);
        }
        builder
    }

    /// Appends a block set: sorted and de-duplicated first, so configuration
    /// order does not matter.
    pub fn append_block_set<'a, I>(self, blocks: I) -> Self
    where
        I: IntoIterator<Item = &'a BlockState>,
    {
        let mut sorted: Vec<BlockState> = blocks.into_iter().copied().collect();
        sorted.sort_unstable();
        sorted.dedup();
        self.append_blocks(sorted.iter())
    }

    pub fn build(self) -> Signature {
        Signature(self.hasher.finalize().to_vec())
    }
}
