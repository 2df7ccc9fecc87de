//! # Region Cache
//!
//! Persists computed network grids so a restarted server doesn't have to
//! re-obfuscate every chunk it loads. Entries are keyed by chunk position and
//! carry the signature of the configuration that produced them; a reader
//! supplies the active signature and only gets an entry back when the two
//! match.
//!
//! ## Architecture
//!
//! Chunks are grouped into 32x32 regions, one file per region (see
//! `region_file`). Open regions are kept in an LRU behind one `MtResource`
//! lock; evicting a region closes it. The cache itself is `Send + Sync` and is
//! shared with the background cache writers through an `Arc`.
//!
//! ## Failure handling
//!
//! Reads never fail from the caller's point of view: a corrupt entry or one
//! written by a different record version is deleted and reported as a miss.
//! Writes return their error so the caller can log it and retry later.

use std::{fs, num::NonZeroUsize, path::Path, path::PathBuf};

use log::{debug, warn};
use lru::LruCache;

use crate::{
    core::MtResource,
    engine_state::{
        obfuscation::{network_chunk::DisguiseMask, signature::Signature},
        voxels::chunk::{Chunk, ChunkPosition},
    },
    errors::{ObfuscationError, Result},
};

pub mod region_file;

use region_file::{region_file_name, region_of, RegionFile};

/// A network grid as stored in the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedChunk {
    /// Signature of the modifier configuration that produced `network`.
    pub signature: Signature,
    /// When `network` was computed, in milliseconds since the epoch.
    pub timestamp: u64,
    pub network: Chunk,
    pub disguised: DisguiseMask,
}

/// Region-file backed store of network grids.
pub struct RegionCache {
    directory: PathBuf,
    regions: MtResource<LruCache<(i32, i32), RegionFile>>,
}

impl RegionCache {
    /// Opens (creating if needed) a cache directory.
    ///
    /// # Arguments
    /// * `directory` - Where the region files live
    /// * `open_regions` - How many region files stay open at once (at least 1)
    pub fn open(directory: impl Into<PathBuf>, open_regions: usize) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        let capacity = NonZeroUsize::new(open_regions).ok_or_else(|| {
            ObfuscationError::InvalidConfig("cache must keep at least one region open".to_string())
        })?;
        Ok(RegionCache {
            directory,
            regions: MtResource::new(LruCache::new(capacity)),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Runs `operation` on the region holding `position`, opening it if needed.
    ///
    /// The LRU lock is held for the whole operation, so a region is never open
    /// twice and an evicted region can't be reopened from a stale file.
    fn with_region<T>(
        &self,
        position: ChunkPosition,
        operation: impl FnOnce(&mut RegionFile) -> Result<T>,
    ) -> Result<T> {
        let key = region_of(position);
        let mut regions = self.regions.get_mut();
        if !regions.contains(&key) {
            let region = RegionFile::open(self.directory.join(region_file_name(key)))?;
            regions.put(key, region);
        }
        match regions.get_mut(&key) {
            Some(region) => operation(region),
            None => Err(ObfuscationError::CorruptCache(format!(
                "region {:?} vanished from the open set",
                key
            ))),
        }
    }

    /// Looks up the grid cached for `position`.
    ///
    /// # Returns
    /// The entry if one exists and was written with `signature`; `None` on a
    /// miss, a signature mismatch, or an entry that had to be discarded.
    pub fn read(&self, position: ChunkPosition, signature: &Signature) -> Option<CachedChunk> {
        let result = self.with_region(position, |region| match region.read(position) {
            Err(error) => {
                match error {
                    ObfuscationError::UnsupportedCacheVersion { .. } => {
                        debug!("Dropping outdated cache entry ({}, {}): {}", position.x, position.z, error)
                    }
                    _ => warn!("Dropping corrupt cache entry ({}, {}): {}", position.x, position.z, error),
                }
                region.remove(position)?;
                Ok(None)
            }
            found => found,
        });

        match result {
            Ok(Some(cached)) if cached.signature == *signature => Some(cached),
            Ok(Some(cached)) => {
                debug!(
                    "Cached chunk ({}, {}) has signature {}, expected {}",
                    position.x, position.z, cached.signature, signature
                );
                None
            }
            Ok(None) => None,
            Err(error) => {
                warn!("Cache read for chunk ({}, {}) failed: {}", position.x, position.z, error);
                None
            }
        }
    }

    /// Stores a grid, replacing whatever was cached for its chunk.
    pub fn write(&self, snapshot: &CachedChunk) -> Result<()> {
        self.with_region(snapshot.network.position, |region| region.write(snapshot))
    }

    /// Drops the entry for `position`, if any.
    pub fn remove(&self, position: ChunkPosition) -> Result<()> {
        self.with_region(position, |region| region.remove(position))
    }

    /// Whether an entry exists for `position`, regardless of its signature.
    pub fn contains(&self, position: ChunkPosition) -> bool {
        self.with_region(position, |region| Ok(region.contains(position)))
            .unwrap_or(false)
    }
}
