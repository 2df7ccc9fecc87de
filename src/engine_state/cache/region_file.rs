//! # Region Files
//!
//! One file holds the cached network grids of a 32x32 chunk region.
//!
//! ## File layout (little endian)
//!
//! ```text
//! magic        "OBFC"
//! version      u32
//! entry count  u32
//! entries      { x i32, z i32, len u32, zlib(record) [len] } * count
//! ```
//!
//! ## Record layout (before compression)
//!
//! ```text
//! record version   u32
//! signature        u8 length + bytes
//! timestamp        u64    (ms, when the grid was computed)
//! section mask     u16    (bit i = section i present)
//! per section:
//!   flags          u8     (bit0: extension nibbles, bit1: disguise overlay)
//!   ids            4096 B (low 8 bits of each id, YZX order)
//!   data           2048 B (one nibble per cell, low nibble first)
//!   extension      2048 B (high 4 bits of each id), if flagged
//!   overlay        2048 B (1 = disguised cell), if flagged
//! crc32            u32    (of everything above)
//! ```
//!
//! The whole file is kept in memory while it is open; writes rewrite the file
//! through a temporary sibling and a rename.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{Cursor, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use log::warn;

use super::CachedChunk;
use crate::{
    engine_state::{
        obfuscation::{network_chunk::DisguiseMask, signature::Signature},
        voxels::{
            block::BlockState,
            chunk::{Chunk, ChunkPosition, Section, SECTION_COUNT, SECTION_VOLUME},
        },
    },
    errors::{ObfuscationError, Result},
};

pub const REGION_MAGIC: &[u8; 4] = b"OBFC";
/// Version of the file container.
pub const REGION_FILE_VERSION: u32 = 1;
/// Version of the record layout.
pub const RECORD_VERSION: u32 = 1;
/// Chunks per region side.
pub const REGION_DIMENSION: i32 = 32;

const FLAG_EXTENSION: u8 = 0b01;
const FLAG_OVERLAY: u8 = 0b10;
const NIBBLE_ARRAY_LENGTH: usize = SECTION_VOLUME / 2;

/// Region coordinates of the region holding `position`.
pub fn region_of(position: ChunkPosition) -> (i32, i32) {
    (
        position.x.div_euclid(REGION_DIMENSION),
        position.z.div_euclid(REGION_DIMENSION),
    )
}

/// File name of a region, `r.<rx>.<rz>.obc`.
pub fn region_file_name(region: (i32, i32)) -> String {
    format!("r.{}.{}.obc", region.0, region.1)
}

/// One open region file.
#[derive(Debug)]
pub struct RegionFile {
    path: PathBuf,
    /// Compressed records by chunk.
    entries: BTreeMap<ChunkPosition, Vec<u8>>,
}

impl RegionFile {
    /// Opens a region file, or starts an empty one if it doesn't exist.
    ///
    /// A file with a different format version or an unreadable container is
    /// deleted and replaced by an empty region.
    ///
    /// # Errors
    /// IO errors other than a missing file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RegionFile {
                    path,
                    entries: BTreeMap::new(),
                })
            }
            Err(error) => return Err(error.into()),
        };

        let entries = match Self::parse(&bytes) {
            Ok(entries) => entries,
            Err(error) => {
                warn!("Discarding region file {}: {}", path.display(), error);
                remove_if_exists(&path)?;
                BTreeMap::new()
            }
        };
        Ok(RegionFile { path, entries })
    }

    fn parse(bytes: &[u8]) -> Result<BTreeMap<ChunkPosition, Vec<u8>>> {
        let mut cursor = Cursor::new(bytes);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic).map_err(truncated)?;
        if &magic != REGION_MAGIC {
            return Err(ObfuscationError::CorruptCache("bad region magic".to_string()));
        }
        let version = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        if version != REGION_FILE_VERSION {
            return Err(ObfuscationError::UnsupportedCacheVersion {
                found: version,
                expected: REGION_FILE_VERSION,
            });
        }

        let count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let x = cursor.read_i32::<LittleEndian>().map_err(truncated)?;
            let z = cursor.read_i32::<LittleEndian>().map_err(truncated)?;
            let len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
            let remaining = bytes.len() - cursor.position() as usize;
            if len > remaining {
                return Err(ObfuscationError::CorruptCache(format!(
                    "entry ({}, {}) claims {} bytes, {} left",
                    x, z, len, remaining
                )));
            }
            let mut record = vec![0u8; len];
            cursor.read_exact(&mut record).map_err(truncated)?;
            entries.insert(ChunkPosition::new(x, z), record);
        }
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, position: ChunkPosition) -> bool {
        self.entries.contains_key(&position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decodes the record stored for `position`.
    ///
    /// # Returns
    /// `Ok(None)` if nothing is stored; decoding errors are returned as is and
    /// leave the entry in place.
    pub fn read(&self, position: ChunkPosition) -> Result<Option<CachedChunk>> {
        match self.entries.get(&position) {
            Some(compressed) => decode_record(position, compressed).map(Some),
            None => Ok(None),
        }
    }

    /// Stores `snapshot` for its chunk and rewrites the file.
    pub fn write(&mut self, snapshot: &CachedChunk) -> Result<()> {
        let record = encode_record(snapshot)?;
        self.entries.insert(snapshot.network.position, record);
        self.save()
    }

    /// Removes the entry for `position` and rewrites (or deletes) the file.
    pub fn remove(&mut self, position: ChunkPosition) -> Result<()> {
        if self.entries.remove(&position).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if self.entries.is_empty() {
            return remove_if_exists(&self.path);
        }

        let mut bytes = Vec::new();
        bytes.write_all(REGION_MAGIC)?;
        bytes.write_u32::<LittleEndian>(REGION_FILE_VERSION)?;
        bytes.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for (position, record) in &self.entries {
            bytes.write_i32::<LittleEndian>(position.x)?;
            bytes.write_i32::<LittleEndian>(position.z)?;
            bytes.write_u32::<LittleEndian>(record.len() as u32)?;
            bytes.write_all(record)?;
        }

        let temporary = self.path.with_extension("obc.tmp");
        {
            let mut file = File::create(&temporary)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temporary, &self.path)?;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != std::io::ErrorKind::NotFound => Err(error.into()),
        _ => Ok(()),
    }
}

fn truncated(error: std::io::Error) -> ObfuscationError {
    ObfuscationError::CorruptCache(format!("truncated data: {}", error))
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

fn set_nibble(array: &mut [u8], index: usize, value: u8) {
    let byte = &mut array[index >> 1];
    if index & 1 == 0 {
        *byte = (*byte & 0xF0) | (value & 0x0F);
    } else {
        *byte = (*byte & 0x0F) | ((value & 0x0F) << 4);
    }
}

fn get_nibble(array: &[u8], index: usize) -> u8 {
    let byte = array[index >> 1];
    if index & 1 == 0 {
        byte & 0x0F
    } else {
        byte >> 4
    }
}

/// Serializes and compresses one chunk's cached grid.
pub fn encode_record(snapshot: &CachedChunk) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    body.write_u32::<LittleEndian>(RECORD_VERSION)?;
    body.write_u8(snapshot.signature.len() as u8)?;
    body.write_all(snapshot.signature.as_bytes())?;
    body.write_u64::<LittleEndian>(snapshot.timestamp)?;

    let mut mask = 0u16;
    for index in 0..SECTION_COUNT {
        if snapshot.network.section(index).is_some() {
            mask |= 1 << index;
        }
    }
    body.write_u16::<LittleEndian>(mask)?;

    for index in 0..SECTION_COUNT {
        let Some(section) = snapshot.network.section(index) else {
            continue;
        };
        let blocks = section.blocks();
        let has_extension = blocks.iter().any(|block| block.id > 0xFF);
        let has_overlay = snapshot.disguised.section_any(index);

        let mut flags = 0u8;
        if has_extension {
            flags |= FLAG_EXTENSION;
        }
        if has_overlay {
            flags |= FLAG_OVERLAY;
        }
        body.write_u8(flags)?;

        let ids: Vec<u8> = blocks.iter().map(|block| (block.id & 0xFF) as u8).collect();
        body.write_all(&ids)?;

        let mut data = vec![0u8; NIBBLE_ARRAY_LENGTH];
        for (cell, block) in blocks.iter().enumerate() {
            set_nibble(&mut data, cell, block.data);
        }
        body.write_all(&data)?;

        if has_extension {
            let mut extension = vec![0u8; NIBBLE_ARRAY_LENGTH];
            for (cell, block) in blocks.iter().enumerate() {
                set_nibble(&mut extension, cell, (block.id >> 8) as u8);
            }
            body.write_all(&extension)?;
        }

        if has_overlay {
            let mut overlay = vec![0u8; NIBBLE_ARRAY_LENGTH];
            for cell in 0..SECTION_VOLUME {
                if snapshot.disguised.get_index(index * SECTION_VOLUME + cell) {
                    set_nibble(&mut overlay, cell, 1);
                }
            }
            body.write_all(&overlay)?;
        }
    }

    let checksum = crc32(&body);
    body.write_u32::<LittleEndian>(checksum)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&body)?;
    Ok(encoder.finish()?)
}

/// Decompresses and parses one record.
///
/// # Errors
/// `UnsupportedCacheVersion` for a record written by another layout version,
/// `CorruptCache` for anything that fails to decompress, checksum or parse.
pub fn decode_record(position: ChunkPosition, compressed: &[u8]) -> Result<CachedChunk> {
    let mut body = Vec::new();
    ZlibDecoder::new(compressed)
        .read_to_end(&mut body)
        .map_err(|error| ObfuscationError::CorruptCache(format!("decompression failed: {}", error)))?;
    if body.len() < 4 {
        return Err(ObfuscationError::CorruptCache("record too short".to_string()));
    }
    let (payload, trailer) = body.split_at(body.len() - 4);
    let expected = LittleEndian::read_u32(trailer);
    if crc32(payload) != expected {
        return Err(ObfuscationError::CorruptCache("checksum mismatch".to_string()));
    }

    let mut cursor = Cursor::new(payload);
    let version = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    if version != RECORD_VERSION {
        return Err(ObfuscationError::UnsupportedCacheVersion {
            found: version,
            expected: RECORD_VERSION,
        });
    }

    let signature_length = cursor.read_u8().map_err(truncated)? as usize;
    let mut signature = vec![0u8; signature_length];
    cursor.read_exact(&mut signature).map_err(truncated)?;
    let signature = Signature::from_bytes(&signature)?;
    let timestamp = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
    let mask = cursor.read_u16::<LittleEndian>().map_err(truncated)?;

    let mut network = Chunk::empty(position);
    let mut disguised = DisguiseMask::new();
    for index in 0..SECTION_COUNT {
        if mask & (1 << index) == 0 {
            continue;
        }
        let flags = cursor.read_u8().map_err(truncated)?;
        let mut ids = vec![0u8; SECTION_VOLUME];
        cursor.read_exact(&mut ids).map_err(truncated)?;
        let mut data = vec![0u8; NIBBLE_ARRAY_LENGTH];
        cursor.read_exact(&mut data).map_err(truncated)?;
        let mut extension = vec![0u8; NIBBLE_ARRAY_LENGTH];
        if flags & FLAG_EXTENSION != 0 {
            cursor.read_exact(&mut extension).map_err(truncated)?;
        }
        if flags & FLAG_OVERLAY != 0 {
            let mut overlay = vec![0u8; NIBBLE_ARRAY_LENGTH];
            cursor.read_exact(&mut overlay).map_err(truncated)?;
            for cell in 0..SECTION_VOLUME {
                if get_nibble(&overlay, cell) != 0 {
                    disguised.set_index(index * SECTION_VOLUME + cell, true);
                }
            }
        }

        let blocks = (0..SECTION_VOLUME)
            .map(|cell| BlockState {
                id: ids[cell] as u16 | (get_nibble(&extension, cell) as u16) << 8,
                data: get_nibble(&data, cell),
            })
            .collect();
        network.set_section(index, Some(Section::from_blocks(blocks)));
    }

    if (cursor.position() as usize) != payload.len() {
        return Err(ObfuscationError::CorruptCache("trailing bytes in record".to_string()));
    }

    Ok(CachedChunk {
        signature,
        timestamp,
        network,
        disguised,
    })
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;
    use tempfile::tempdir;

    use super::*;
    use crate::engine_state::{
        obfuscation::signature::SignatureBuilder,
        voxels::block::block_type::BlockType,
    };

    fn snapshot(position: ChunkPosition) -> CachedChunk {
        let mut network = Chunk::perlin(position, 3);
        let odd = Point3::new(position.min_block().x + 1, 150, position.min_block().z + 2);
        network.set_block(odd, BlockState::new(0x0ABC, 0x7).unwrap());
        let mut disguised = DisguiseMask::new();
        disguised.set(Point3::new(position.min_block().x + 4, 10, position.min_block().z + 4), true);
        CachedChunk {
            signature: SignatureBuilder::new().append_str("hide_all").build(),
            timestamp: 1_700_000_000_000,
            network,
            disguised,
        }
    }

    #[test]
    fn record_preserves_grid_and_overlay() {
        let position = ChunkPosition::new(-3, 7);
        let original = snapshot(position);
        let decoded = decode_record(position, &encode_record(&original).unwrap()).unwrap();

        assert_eq!(decoded.signature, original.signature);
        assert_eq!(decoded.timestamp, original.timestamp);
        assert_eq!(decoded.disguised, original.disguised);
        for index in 0..SECTION_COUNT {
            assert_eq!(
                decoded.network.section(index).map(Section::blocks),
                original.network.section(index).map(Section::blocks),
                "section {}",
                index
            );
        }
    }

    #[test]
    fn corrupt_record_is_rejected() {
        let position = ChunkPosition::new(0, 0);
        let mut record = encode_record(&snapshot(position)).unwrap();
        let middle = record.len() / 2;
        record[middle] ^= 0xFF;
        assert!(matches!(
            decode_record(position, &record),
            Err(ObfuscationError::CorruptCache(_))
        ));
        assert!(matches!(
            decode_record(position, &[1, 2, 3]),
            Err(ObfuscationError::CorruptCache(_))
        ));
    }

    #[test]
    fn foreign_record_version_is_reported() {
        let position = ChunkPosition::new(0, 0);
        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(RECORD_VERSION + 1).unwrap();
        let checksum = crc32(&body);
        body.write_u32::<LittleEndian>(checksum).unwrap();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body).unwrap();
        let record = encoder.finish().unwrap();

        assert!(matches!(
            decode_record(position, &record),
            Err(ObfuscationError::UnsupportedCacheVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn file_round_trip_and_removal() {
        let directory = tempdir().unwrap();
        let path = directory.path().join(region_file_name((0, 0)));
        let a = ChunkPosition::new(1, 2);
        let b = ChunkPosition::new(3, 4);

        let mut region = RegionFile::open(&path).unwrap();
        assert!(region.is_empty());
        region.write(&snapshot(a)).unwrap();
        region.write(&snapshot(b)).unwrap();

        let reopened = RegionFile::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        let read = reopened.read(a).unwrap().unwrap();
        assert_eq!(read.network.get_block(Point3::new(17, 150, 34)), BlockState::new(0x0ABC, 7).unwrap());
        assert!(reopened.read(ChunkPosition::new(9, 9)).unwrap().is_none());

        let mut region = reopened;
        region.remove(a).unwrap();
        region.remove(b).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn foreign_file_version_is_discarded() {
        let directory = tempdir().unwrap();
        let path = directory.path().join(region_file_name((0, 0)));
        let mut bytes = Vec::new();
        bytes.write_all(REGION_MAGIC).unwrap();
        bytes.write_u32::<LittleEndian>(REGION_FILE_VERSION + 1).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        fs::write(&path, bytes).unwrap();

        let region = RegionFile::open(&path).unwrap();
        assert!(region.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn regions_group_32_chunks() {
        assert_eq!(region_of(ChunkPosition::new(31, 0)), (0, 0));
        assert_eq!(region_of(ChunkPosition::new(32, -1)), (1, -1));
        assert_eq!(region_of(ChunkPosition::new(-33, 64)), (-2, 2));
        assert_eq!(region_file_name((-2, 2)), "r.-2.2.obc");
    }
}
