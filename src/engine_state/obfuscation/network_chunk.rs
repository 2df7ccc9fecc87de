//! # Network Chunks
//!
//! A `NetworkChunk` owns everything the engine knows about one chunk's client
//! view: the network grid, the signature it was built with, which cells are
//! disguised, which cells changed since clients last heard about them, and
//! whether the current grid has reached the region cache.
//!
//! ## States
//!
//! ```text
//!              observe                 enabled world
//!  Unloaded ─────────────> LoadedNoView ─────────────> ObfuscationRequested
//!                                                          │   ^
//!                                         tick: installed  │   │ tick
//!                                                          v   │
//!                            mutation in radius ┌──── Obfuscated
//!                          NeedReobfuscation <──┘
//! ```
//!
//! A chunk in a disabled world stays in `LoadedNoView` and never gets a grid.
//!
//! ## Emission
//!
//! The first time a grid exists the whole chunk is pending. After that, every
//! cell whose network value changes is remembered together with the value
//! clients were last sent, and only cells whose current value still differs
//! from that are emitted.

use std::collections::HashMap;

use bitvec::vec::BitVec;
use cgmath::Point3;

use super::signature::Signature;
use crate::engine_state::voxels::{
    block::BlockState,
    chunk::{Chunk, ChunkPosition, CHUNK_DIMENSION, SECTION_COUNT, SECTION_HEIGHT, SECTION_VOLUME},
};

/// Number of cells in a chunk.
pub const CHUNK_VOLUME: usize = SECTION_VOLUME * SECTION_COUNT;

/// Lifecycle of a chunk's network view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkState {
    Unloaded,
    LoadedNoView,
    ObfuscationRequested,
    Obfuscated,
    NeedReobfuscation,
}

/// Where the current grid stands with respect to the region cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Persistence {
    /// Not written yet, or a write is still running.
    Pending,
    Persisted,
    /// The last write of this grid failed.
    Failed,
}

/// What a client needs to catch up with a chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingChanges {
    /// The complete network grid.
    FullChunk(Chunk),
    /// Individual cells with their current network value.
    Blocks(Vec<(Point3<i32>, BlockState)>),
}

/// Marks the cells whose network value differs from the true value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisguiseMask {
    bits: BitVec,
}

impl DisguiseMask {
    pub fn new() -> Self {
        DisguiseMask {
            bits: BitVec::repeat(false, CHUNK_VOLUME),
        }
    }

    /// Marks every cell where `network` differs from `true_chunk`.
    pub fn from_diff(true_chunk: &Chunk, network: &Chunk) -> Self {
        let mut mask = DisguiseMask::new();
        for (position, _, _) in differing_cells(true_chunk, network) {
            mask.set(position, true);
        }
        mask
    }

    /// Index of a cell in chunk-wide YZX order; also `section * SECTION_VOLUME + index in section`.
    pub fn cell_index(position: Point3<i32>) -> usize {
        ((position.y as usize) << 8)
            | (((position.z & 0xF) as usize) << 4)
            | (position.x & 0xF) as usize
    }

    pub fn set(&mut self, position: Point3<i32>, disguised: bool) {
        self.bits.set(Self::cell_index(position), disguised);
    }

    pub fn is_disguised(&self, position: Point3<i32>) -> bool {
        self.bits[Self::cell_index(position)]
    }

    pub fn set_index(&mut self, index: usize, disguised: bool) {
        self.bits.set(index, disguised);
    }

    pub fn get_index(&self, index: usize) -> bool {
        self.bits[index]
    }

    /// Whether any cell of the section is disguised.
    pub fn section_any(&self, section: usize) -> bool {
        self.bits[section * SECTION_VOLUME..(section + 1) * SECTION_VOLUME].any()
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }
}

impl Default for DisguiseMask {
    fn default() -> Self {
        DisguiseMask::new()
    }
}

/// Absolute position of cell `index` of section `section` of the chunk at `chunk`.
pub fn cell_position(chunk: ChunkPosition, section: usize, index: usize) -> Point3<i32> {
    let min = chunk.min_block();
    Point3::new(
        min.x + (index as i32 & (CHUNK_DIMENSION - 1)),
        section as i32 * SECTION_HEIGHT + (index >> 8) as i32,
        min.z + ((index >> 4) as i32 & (CHUNK_DIMENSION - 1)),
    )
}

/// Every cell where `before` and `after` disagree, as (position, before, after).
///
/// Both chunks must be at the same position.
pub fn differing_cells(before: &Chunk, after: &Chunk) -> Vec<(Point3<i32>, BlockState, BlockState)> {
    let mut cells = Vec::new();
    for section in 0..SECTION_COUNT {
        let (old, new) = match (before.section(section), after.section(section)) {
            (None, None) => continue,
            (Some(old), Some(new)) if old == new => continue,
            pair => pair,
        };
        for index in 0..SECTION_VOLUME {
            let old_block = old.map_or(BlockState::AIR, |s| s.get(index));
            let new_block = new.map_or(BlockState::AIR, |s| s.get(index));
            if old_block != new_block {
                cells.push((cell_position(before.position, section, index), old_block, new_block));
            }
        }
    }
    cells
}

/// The engine's record of one chunk's client view.
#[derive(Debug)]
pub struct NetworkChunk {
    position: ChunkPosition,
    state: ChunkState,
    network: Option<Chunk>,
    signature: Option<Signature>,
    disguised: DisguiseMask,
    /// Changed cells mapped to the value clients were last sent.
    sent_values: HashMap<Point3<i32>, BlockState>,
    full_chunk_sent: bool,
    /// Set once the listener heard about the current batch of pending changes.
    listener_notified: bool,
    /// Bumped on every install so a late cache-write result can tell whether it
    /// still describes the current grid.
    revision: u64,
    persistence: Persistence,
    /// When the current grid was computed, in milliseconds since the epoch.
    computed_at: u64,
}

impl NetworkChunk {
    pub fn new(position: ChunkPosition) -> Self {
        NetworkChunk {
            position,
            state: ChunkState::LoadedNoView,
            network: None,
            signature: None,
            disguised: DisguiseMask::new(),
            sent_values: HashMap::new(),
            full_chunk_sent: false,
            listener_notified: false,
            revision: 0,
            persistence: Persistence::Pending,
            computed_at: 0,
        }
    }

    pub fn position(&self) -> ChunkPosition {
        self.position
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// The current network grid, once one has been installed.
    pub fn network(&self) -> Option<&Chunk> {
        self.network.as_ref()
    }

    pub fn has_view(&self) -> bool {
        self.network.is_some()
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn disguised(&self) -> &DisguiseMask {
        &self.disguised
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn computed_at(&self) -> u64 {
        self.computed_at
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    /// Whether the current grid is known to be in the region cache.
    pub fn is_persisted(&self) -> bool {
        self.persistence == Persistence::Persisted
    }

    /// Records the outcome of a cache write for grid `revision`. Results for an
    /// older grid are ignored.
    pub fn mark_persisted(&mut self, revision: u64, persisted: bool) {
        if revision == self.revision {
            self.persistence = if persisted {
                Persistence::Persisted
            } else {
                Persistence::Failed
            };
        }
    }

    /// Requests a first obfuscation. Only a chunk without a pending request or
    /// grid moves; anything else keeps its state.
    pub fn request_obfuscation(&mut self) {
        if matches!(self.state, ChunkState::LoadedNoView | ChunkState::Unloaded) {
            self.state = ChunkState::ObfuscationRequested;
        }
    }

    /// Marks the grid stale after a mutation nearby.
    ///
    /// # Returns
    /// `true` if the chunk had a view and is now `NeedReobfuscation`.
    pub fn mark_for_reobfuscation(&mut self) -> bool {
        if self.state == ChunkState::Obfuscated {
            self.state = ChunkState::NeedReobfuscation;
            return true;
        }
        self.state == ChunkState::NeedReobfuscation
    }

    /// Start-of-tick transition: stale chunks become requests.
    pub fn begin_tick(&mut self) {
        if self.state == ChunkState::NeedReobfuscation {
            self.state = ChunkState::ObfuscationRequested;
        }
    }

    pub fn needs_obfuscation(&self) -> bool {
        self.state == ChunkState::ObfuscationRequested
    }

    /// Replaces the network grid, recording every changed cell for emission.
    ///
    /// # Arguments
    /// * `network` - The new grid
    /// * `disguised` - Cells of `network` that differ from the true grid
    /// * `signature` - Signature of the modifier that built `network`
    /// * `computed_at` - When `network` was computed
    /// * `persisted` - Whether `network` is already in the region cache
    pub fn install(
        &mut self,
        network: Chunk,
        disguised: DisguiseMask,
        signature: Signature,
        computed_at: u64,
        persisted: bool,
    ) {
        if let Some(previous) = self.network.take() {
            if self.full_chunk_sent {
                for (position, old, _) in differing_cells(&previous, &network) {
                    self.sent_values.entry(position).or_insert(old);
                }
            }
        }
        self.network = Some(network);
        self.disguised = disguised;
        self.signature = Some(signature);
        self.state = ChunkState::Obfuscated;
        self.revision += 1;
        self.computed_at = computed_at;
        self.persistence = if persisted {
            Persistence::Persisted
        } else {
            Persistence::Pending
        };
    }

    /// Puts the true block back into the network grid.
    ///
    /// # Returns
    /// `true` if the network value changed.
    pub fn reveal(&mut self, position: Point3<i32>, true_block: BlockState) -> bool {
        let Some(network) = self.network.as_mut() else {
            return false;
        };
        if !network.contains(position) {
            return false;
        }
        self.disguised.set(position, false);
        let previous = network.set_block(position, true_block);
        if previous == true_block {
            return false;
        }
        if self.full_chunk_sent {
            self.sent_values.entry(position).or_insert(previous);
        }
        true
    }

    /// The block clients see at `position`, if a grid exists.
    pub fn network_block(&self, position: Point3<i32>) -> Option<BlockState> {
        self.network.as_ref()?.try_get_block(position)
    }

    /// Whether `take_pending_changes` would return anything.
    pub fn has_pending_changes(&self) -> bool {
        let Some(network) = self.network.as_ref() else {
            return false;
        };
        if !self.full_chunk_sent {
            return true;
        }
        self.sent_values
            .iter()
            .any(|(position, sent)| network.get_block(*position) != *sent)
    }

    /// Whether the change listener should be told about this chunk now: there
    /// are pending changes and it hasn't heard about them yet.
    pub fn poll_pending_signal(&mut self) -> bool {
        if self.listener_notified || !self.has_pending_changes() {
            return false;
        }
        self.listener_notified = true;
        true
    }

    /// Drains what clients need to catch up.
    ///
    /// # Returns
    /// `FullChunk` the first time a grid exists, then the cells whose value
    /// differs from what was last sent, or `None` when clients are up to date.
    pub fn take_pending_changes(&mut self) -> Option<PendingChanges> {
        let network = self.network.as_ref()?;
        self.listener_notified = false;

        if !self.full_chunk_sent {
            self.full_chunk_sent = true;
            self.sent_values.clear();
            return Some(PendingChanges::FullChunk(network.clone()));
        }

        let mut changed: Vec<(Point3<i32>, BlockState)> = self
            .sent_values
            .drain()
            .filter_map(|(position, sent)| {
                let current = network.get_block(position);
                (current != sent).then_some((position, current))
            })
            .collect();
        if changed.is_empty() {
            return None;
        }
        changed.sort_by_key(|(position, _)| (position.y, position.z, position.x));
        Some(PendingChanges::Blocks(changed))
    }

    /// Final transition before the chunk leaves the side table.
    pub fn unload(&mut self) {
        self.state = ChunkState::Unloaded;
    }
}
