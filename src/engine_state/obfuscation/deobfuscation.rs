//! # Deobfuscation
//!
//! When the true world changes, cells around the change may have become
//! visible, and a client must never see a disguise where it could see the real
//! block. The coordinator copies true blocks into the network grids around the
//! mutation immediately, bypassing the modifier, then marks every chunk close
//! enough to have changed exposure for a full re-obfuscation on the next tick.
//!
//! The coordinator keeps no state; it works on the side table it is given.

use std::collections::HashMap;

use cgmath::Point3;

use super::network_chunk::NetworkChunk;
use crate::{
    config::{RevealShape, WorldOptions},
    engine_state::voxels::{
        chunk::{ChunkPosition, WORLD_HEIGHT},
        world::WorldStorage,
    },
};

/// The kind of change the host reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Break,
    Place,
    /// A block was interacted with without changing it (e.g. a player clicking
    /// a block). Still reveals, since the player is evidently next to it.
    Interact,
}

/// A change to the true world, reported after the host applied it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MutationEvent {
    pub position: Point3<i32>,
    pub kind: MutationKind,
    /// Whether a player caused the change (as opposed to physics, fluids or explosions).
    pub triggered_by_player: bool,
}

impl MutationEvent {
    pub fn new(position: Point3<i32>, kind: MutationKind, triggered_by_player: bool) -> Self {
        MutationEvent {
            position,
            kind,
            triggered_by_player,
        }
    }
}

/// What a mutation did to the side table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RevealReport {
    /// Cells whose network value changed.
    pub revealed: usize,
    /// Chunks moved to `NeedReobfuscation`.
    pub marked: Vec<ChunkPosition>,
}

pub struct DeobfuscationCoordinator;

impl DeobfuscationCoordinator {
    /// Reveals the cells around `event` and marks nearby chunks stale.
    ///
    /// # Arguments
    /// * `chunks` - The world's side table
    /// * `options` - Radii and reveal shape of the world
    /// * `world` - True block data, already containing the mutation
    /// * `event` - The mutation
    pub fn on_mutation(
        chunks: &mut HashMap<ChunkPosition, NetworkChunk>,
        options: &WorldOptions,
        world: &dyn WorldStorage,
        event: &MutationEvent,
    ) -> RevealReport {
        let radius = options.radius_for(event.triggered_by_player) as i32;
        let mut report = RevealReport::default();

        for cell in Self::cells_in_shape(event.position, radius, options.reveal_shape) {
            let Some(chunk) = chunks.get_mut(&ChunkPosition::from_block(cell)) else {
                continue;
            };
            if !chunk.has_view() {
                continue;
            }
            if let Some(true_block) = world.get_block(cell) {
                if chunk.reveal(cell, true_block) {
                    report.revealed += 1;
                }
            }
        }

        for position in Self::affected_chunks(event.position, radius.max(1)) {
            if let Some(chunk) = chunks.get_mut(&position) {
                if chunk.mark_for_reobfuscation() {
                    report.marked.push(position);
                }
            }
        }

        log::debug!(
            "{:?} at {:?}: revealed {} cells, {} chunks need re-obfuscation",
            event.kind,
            event.position,
            report.revealed,
            report.marked.len()
        );
        report
    }

    /// Cells within `radius` of `center` under `shape`, clipped to the world height.
    pub fn cells_in_shape(center: Point3<i32>, radius: i32, shape: RevealShape) -> Vec<Point3<i32>> {
        let radius = radius.max(0);
        let mut cells = Vec::new();
        for dy in -radius..=radius {
            let y = center.y + dy;
            if !(0..WORLD_HEIGHT).contains(&y) {
                continue;
            }
            for dz in -radius..=radius {
                for dx in -radius..=radius {
                    let inside = match shape {
                        RevealShape::Cube => true,
                        RevealShape::Sphere => dx * dx + dy * dy + dz * dz <= radius * radius,
                        RevealShape::Diamond => dx.abs() + dy.abs() + dz.abs() <= radius,
                    };
                    if inside {
                        cells.push(Point3::new(center.x + dx, y, center.z + dz));
                    }
                }
            }
        }
        cells
    }

    /// Chunks intersecting the cube of `radius` around `center`.
    pub fn affected_chunks(center: Point3<i32>, radius: i32) -> Vec<ChunkPosition> {
        let low = ChunkPosition::from_block(Point3::new(center.x - radius, 0, center.z - radius));
        let high = ChunkPosition::from_block(Point3::new(center.x + radius, 0, center.z + radius));
        let mut positions = Vec::new();
        for x in low.x..=high.x {
            for z in low.z..=high.z {
                positions.push(ChunkPosition::new(x, z));
            }
        }
        positions
    }
}
