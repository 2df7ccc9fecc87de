//! # Engine State Module
//!
//! The per-world context of the obfuscation engine.
//!
//! ## Key Components
//!
//! * `EngineState` - Everything one world needs: the side table of network
//!   chunks, the resolved modifier, the region cache and its background writer
//! * `cache` - Region-file persistence of computed network grids
//! * `obfuscation` - Modifiers, views, network chunk state and deobfuscation
//! * `task_management` - Worker threads for cache writes
//! * `voxels` - Blocks, chunks and the world storage seam
//!
//! ## Architecture
//!
//! A host creates one `EngineState` per world and drives it from a single
//! thread:
//!
//! 1. `observe_chunk` when a chunk is loaded and sent to clients
//! 2. `tick` periodically, which (re)computes every requested network grid
//! 3. `on_mutation` after a block of the true world changed
//! 4. `take_pending_changes` to drain what clients need, usually in response
//!    to the `ChangeListener` signal
//! 5. `unload_chunk` when the host drops a chunk, and `shutdown` at the end
//!
//! Nothing is process-wide: two worlds are two independent `EngineState`s.
//!
//! ## Tick Order
//!
//! Finished cache writes are applied first, then stale chunks become requests,
//! then requests are served in chunk order (cache or modifier), then queued
//! cache writes are handed to workers and finally the change listener hears
//! about chunks with fresh pending changes.

use std::{collections::HashMap, sync::Arc};

use cgmath::Point3;
use log::{debug, info};

use cache::{CachedChunk, RegionCache};
use obfuscation::{
    deobfuscation::{DeobfuscationCoordinator, MutationEvent, RevealReport},
    modifier::{chunk_rng, ChunkModifier, Modifier, ModifierRegistry},
    network_chunk::{ChunkState, DisguiseMask, NetworkChunk, PendingChanges, Persistence},
    signature::Signature,
    view::ChunkView,
};
use task_management::TaskManager;
use voxels::{
    block::BlockState,
    chunk::{Chunk, ChunkPosition},
    tasks::cache_write_task::CacheWriteTask,
    world::{current_timestamp, WorldStorage},
};

use crate::{
    config::{EngineConfig, WorldOptions},
    errors::Result,
};

pub mod cache;
pub mod obfuscation;
pub mod task_management;
pub mod voxels;

/// The side table: one record per observed chunk.
pub type NetworkChunks = HashMap<ChunkPosition, NetworkChunk>;

/// Told when a chunk has changes clients haven't seen yet.
///
/// Called once per batch: after a signal the chunk stays quiet until its
/// changes were taken with `EngineState::take_pending_changes`.
pub trait ChangeListener {
    fn pending_changes(&self, position: ChunkPosition);
}

impl<F: Fn(ChunkPosition)> ChangeListener for F {
    fn pending_changes(&self, position: ChunkPosition) {
        self(position)
    }
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Chunks whose grid was computed by the modifier.
    pub obfuscated: usize,
    /// Chunks whose grid was loaded from the region cache.
    pub cache_hits: usize,
    /// Requested chunks that have to wait (chunk or neighbors not loaded).
    pub deferred: usize,
    /// Cache write results applied.
    pub writes_completed: usize,
    /// Chunks the change listener was told about.
    pub notified: usize,
}

/// How a requested chunk was served.
enum Served {
    Computed,
    Cached,
    Deferred,
}

/// The per-world context object.
///
/// # Examples
///
/// ```
/// use voxel_obfuscation::{
///     config::EngineConfig,
///     engine_state::{
///         obfuscation::modifier::ModifierRegistry,
///         voxels::{chunk::ChunkPosition, world::World},
///         EngineState,
///     },
/// };
///
/// let mut config = EngineConfig::default();
/// config.cache.enabled = false;
///
/// let mut world = World::new(7);
/// world.add_chunks_around(ChunkPosition::new(0, 0), 1);
///
/// let mut engine = EngineState::new("overworld", &config, &ModifierRegistry::new()).unwrap();
/// engine.observe_chunk(ChunkPosition::new(0, 0));
/// let report = engine.tick(&world);
/// assert_eq!(report.obfuscated, 1);
/// assert!(engine.take_pending_changes(ChunkPosition::new(0, 0)).is_some());
/// ```
pub struct EngineState {
    world_name: String,
    options: WorldOptions,
    modifier: Modifier,
    /// Signature of `modifier`, computed once.
    signature: Signature,
    cache: Option<Arc<RegionCache>>,
    chunks: NetworkChunks,
    task_manager: TaskManager,
    listener: Option<Box<dyn ChangeListener>>,
}

impl EngineState {
    /// Creates the context for one world from the engine configuration.
    ///
    /// # Arguments
    /// * `world_name` - Selects the world's options and its cache sub-directory
    /// * `config` - The engine configuration
    /// * `registry` - Custom modifiers the configuration may name
    ///
    /// # Errors
    /// Invalid world options, an unknown custom modifier, or a cache directory
    /// that can't be created.
    pub fn new(world_name: &str, config: &EngineConfig, registry: &ModifierRegistry) -> Result<Self> {
        let options = config.world_options(world_name).clone();
        options.validate()?;
        let modifier = Modifier::from_options(&options, registry)?;

        let cache = if config.cache.enabled && options.enabled && modifier.require_cache() {
            let directory = config.cache.directory.join(world_name);
            Some(Arc::new(RegionCache::open(directory, config.cache.open_regions)?))
        } else {
            None
        };

        Ok(Self::with_parts(
            world_name,
            options,
            modifier,
            cache,
            config.cache.workers,
        ))
    }

    /// Creates the context from already resolved parts.
    ///
    /// # Arguments
    /// * `workers` - Cache writer threads; ignored (no threads) without a cache
    pub fn with_parts(
        world_name: &str,
        options: WorldOptions,
        modifier: Modifier,
        cache: Option<Arc<RegionCache>>,
        workers: usize,
    ) -> Self {
        let signature = modifier.signature();
        let workers = if cache.is_some() { workers } else { 0 };
        info!(
            "World '{}': obfuscation {}, modifier {}, signature {}, cache {}",
            world_name,
            if options.enabled { "enabled" } else { "disabled" },
            modifier.name(),
            signature,
            cache
                .as_ref()
                .map_or_else(|| "off".to_string(), |cache| cache.directory().display().to_string())
        );

        EngineState {
            world_name: world_name.to_string(),
            options,
            modifier,
            signature,
            cache,
            chunks: HashMap::new(),
            task_manager: TaskManager::new(workers),
            listener: None,
        }
    }

    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    pub fn options(&self) -> &WorldOptions {
        &self.options
    }

    pub fn modifier(&self) -> &Modifier {
        &self.modifier
    }

    /// Signature of the active modifier configuration.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn cache(&self) -> Option<&Arc<RegionCache>> {
        self.cache.as_ref()
    }

    pub fn task_manager(&self) -> &TaskManager {
        &self.task_manager
    }

    /// Registers the listener told about chunks with fresh pending changes,
    /// replacing any previous one.
    pub fn set_change_listener(&mut self, listener: impl ChangeListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Starts tracking a chunk the host loaded.
    ///
    /// Enabled worlds request an obfuscation for the next tick; disabled worlds
    /// only record the chunk. Observing a tracked chunk again changes nothing.
    ///
    /// # Returns
    /// The chunk's state after the call.
    pub fn observe_chunk(&mut self, position: ChunkPosition) -> ChunkState {
        let enabled = self.options.enabled;
        let chunk = self
            .chunks
            .entry(position)
            .or_insert_with(|| NetworkChunk::new(position));
        if enabled {
            chunk.request_obfuscation();
        }
        chunk.state()
    }

    /// State of a chunk; `Unloaded` when it isn't tracked.
    pub fn chunk_state(&self, position: ChunkPosition) -> ChunkState {
        self.chunks
            .get(&position)
            .map_or(ChunkState::Unloaded, NetworkChunk::state)
    }

    pub fn network_chunk(&self, position: ChunkPosition) -> Option<&NetworkChunk> {
        self.chunks.get(&position)
    }

    pub fn tracked_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// The block clients should see at `position`.
    ///
    /// # Returns
    /// - the network value once the chunk has a grid
    /// - the true value in a disabled world
    /// - `None` for an enabled world's chunk without a grid yet, or an unloaded chunk
    pub fn network_block(&self, world: &dyn WorldStorage, position: Point3<i32>) -> Option<BlockState> {
        if !self.options.enabled {
            return world.get_block(position);
        }
        self.chunks
            .get(&ChunkPosition::from_block(position))?
            .network_block(position)
    }

    /// Drains what clients need to catch up with a chunk.
    pub fn take_pending_changes(&mut self, position: ChunkPosition) -> Option<PendingChanges> {
        self.chunks.get_mut(&position)?.take_pending_changes()
    }

    /// Reacts to a change of the true world the host already applied.
    ///
    /// Reveals the true blocks around the change right away and marks the
    /// chunks around it for re-obfuscation on the next tick. Does nothing in a
    /// disabled world.
    pub fn on_mutation(&mut self, world: &dyn WorldStorage, event: MutationEvent) -> RevealReport {
        if !self.options.enabled {
            return RevealReport::default();
        }
        let report = DeobfuscationCoordinator::on_mutation(&mut self.chunks, &self.options, world, &event);
        self.notify_listener();
        report
    }

    /// Stops tracking a chunk. A cache write still waiting for it is run
    /// synchronously first, and a grid whose last write failed is written again.
    ///
    /// # Returns
    /// `true` if the chunk was tracked.
    pub fn unload_chunk(&mut self, position: ChunkPosition) -> bool {
        if self.task_manager.flush(position, &mut self.chunks) {
            debug!("Flushed pending cache write of ({}, {})", position.x, position.z);
        }
        self.retry_failed_write(position);
        match self.chunks.remove(&position) {
            Some(mut chunk) => {
                chunk.unload();
                true
            }
            None => false,
        }
    }

    /// Writes the grid of `position` once more if its last cache write failed,
    /// so unloading doesn't drop a grid that never reached the cache.
    fn retry_failed_write(&mut self, position: ChunkPosition) {
        let Some(cache) = &self.cache else {
            return;
        };
        let Some(chunk) = self.chunks.get(&position) else {
            return;
        };
        if chunk.persistence() != Persistence::Failed {
            return;
        }
        let Some(network) = chunk.network() else {
            return;
        };
        let snapshot = CachedChunk {
            signature: self.signature.clone(),
            timestamp: chunk.computed_at(),
            network: network.clone(),
            disguised: chunk.disguised().clone(),
        };
        let task = CacheWriteTask::new(cache.clone(), snapshot, chunk.revision());
        debug!("Retrying failed cache write of ({}, {})", position.x, position.z);
        self.task_manager.run_now(Box::new(task), &mut self.chunks);
    }

    /// Runs one pass of the driver.
    ///
    /// # Arguments
    /// * `world` - True block data; must not change during the call
    pub fn tick(&mut self, world: &dyn WorldStorage) -> TickReport {
        let mut report = TickReport {
            writes_completed: self.task_manager.process_completed_tasks(&mut self.chunks),
            ..TickReport::default()
        };

        for chunk in self.chunks.values_mut() {
            chunk.begin_tick();
        }

        let mut requested: Vec<ChunkPosition> = self
            .chunks
            .values()
            .filter(|chunk| chunk.needs_obfuscation())
            .map(NetworkChunk::position)
            .collect();
        requested.sort_unstable();

        for position in requested {
            match self.serve(world, position) {
                Served::Computed => report.obfuscated += 1,
                Served::Cached => report.cache_hits += 1,
                Served::Deferred => report.deferred += 1,
            }
        }

        self.task_manager.process_queued_tasks();
        report.notified = self.notify_listener();

        if report.obfuscated + report.cache_hits > 0 {
            debug!(
                "World '{}' tick: {} obfuscated, {} from cache, {} deferred",
                self.world_name, report.obfuscated, report.cache_hits, report.deferred
            );
        }
        report
    }

    /// Builds the network grid of one requested chunk.
    fn serve(&mut self, world: &dyn WorldStorage, position: ChunkPosition) -> Served {
        let Some(true_handle) = world.chunk(position) else {
            debug!("Chunk ({}, {}) requested but not loaded", position.x, position.z);
            return Served::Deferred;
        };
        let neighbor_handles = position.horizontal_neighbors().map(|neighbor| world.chunk(neighbor));

        let true_chunk = true_handle.get();
        let neighbor_guards = neighbor_handles
            .iter()
            .map(|handle| handle.as_ref().map(|handle| handle.get()))
            .collect::<Vec<_>>();
        let neighbors: [Option<&Chunk>; 4] = std::array::from_fn(|index| neighbor_guards[index].as_deref());

        let mut network = true_chunk.clone();
        let mut view = ChunkView::new(&true_chunk, neighbors, &mut network);
        if !self.modifier.is_ready(&view) {
            debug!(
                "Chunk ({}, {}) waits for neighbors {:?}",
                position.x,
                position.z,
                view.missing_neighbors()
            );
            return Served::Deferred;
        }

        let first_view = self.chunks.get(&position).is_some_and(|chunk| !chunk.has_view());
        if first_view && self.modifier.require_cache() {
            if let Some(cache) = &self.cache {
                let newest_source = neighbors
                    .iter()
                    .flatten()
                    .map(|chunk| chunk.last_modified)
                    .fold(true_chunk.last_modified, u64::max);
                match cache.read(position, &self.signature) {
                    // Strictly newer: a write stamped in the same millisecond as
                    // the snapshot may have landed after it.
                    Some(cached) if cached.timestamp > newest_source => {
                        if let Some(chunk) = self.chunks.get_mut(&position) {
                            chunk.install(
                                cached.network,
                                cached.disguised,
                                self.signature.clone(),
                                cached.timestamp,
                                true,
                            );
                        }
                        return Served::Cached;
                    }
                    Some(_) => debug!(
                        "Cached chunk ({}, {}) is older than its true data",
                        position.x, position.z
                    ),
                    None => {}
                }
            }
        }

        let mut rng = chunk_rng(self.options.seed, position);
        self.modifier
            .modify(&mut view, position.min_block(), position.max_block(), &mut rng);
        drop(view);

        let timestamp = current_timestamp();
        let disguised = DisguiseMask::from_diff(&true_chunk, &network);
        drop(neighbor_guards);
        drop(true_chunk);

        let Some(chunk) = self.chunks.get_mut(&position) else {
            return Served::Deferred;
        };
        let persist = self.cache.is_some() && self.modifier.require_cache();
        let snapshot = persist.then(|| CachedChunk {
            signature: self.signature.clone(),
            timestamp,
            network: network.clone(),
            disguised: disguised.clone(),
        });
        chunk.install(network, disguised, self.signature.clone(), timestamp, false);
        let revision = chunk.revision();

        if let (Some(cache), Some(snapshot)) = (&self.cache, snapshot) {
            self.task_manager
                .publish_task(Box::new(CacheWriteTask::new(cache.clone(), snapshot, revision)));
        }
        Served::Computed
    }

    /// Signals every chunk whose pending changes the listener hasn't heard of.
    ///
    /// # Returns
    /// The number of chunks signalled.
    fn notify_listener(&mut self) -> usize {
        let Some(listener) = &self.listener else {
            return 0;
        };
        let mut fresh: Vec<ChunkPosition> = self
            .chunks
            .values_mut()
            .filter_map(|chunk| chunk.poll_pending_signal().then(|| chunk.position()))
            .collect();
        fresh.sort_unstable();
        for position in &fresh {
            listener.pending_changes(*position);
        }
        fresh.len()
    }

    /// Finishes every cache write, queued or in flight. The context stays
    /// usable afterwards.
    pub fn shutdown(&mut self) {
        let pending = self.task_manager.queued_len() + self.task_manager.in_flight_len();
        self.task_manager.finish(&mut self.chunks);
        if pending > 0 {
            info!("World '{}': finished {} pending cache writes", self.world_name, pending);
        }
    }
}

impl Drop for EngineState {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::{
        config::CacheOptions,
        engine_state::{
            obfuscation::deobfuscation::MutationKind,
            voxels::{block::block_type::BlockType, world::World},
        },
    };

    fn config_without_cache() -> EngineConfig {
        EngineConfig {
            cache: CacheOptions {
                enabled: false,
                ..CacheOptions::default()
            },
            ..EngineConfig::default()
        }
    }

    fn stone_world() -> World {
        let mut world = World::new(0);
        for dx in -1..=1 {
            for dz in -1..=1 {
                world.insert_chunk(Chunk::solid(
                    ChunkPosition::new(dx, dz),
                    BlockState::of(BlockType::STONE),
                    64,
                ));
            }
        }
        world
    }

    #[test]
    fn unloaded_neighbors_defer_obfuscation() {
        let mut world = World::new(0);
        world.insert_chunk(Chunk::solid(ChunkPosition::new(0, 0), BlockState::of(BlockType::STONE), 64));

        let mut engine = EngineState::new("w", &config_without_cache(), &ModifierRegistry::new()).unwrap();
        engine.observe_chunk(ChunkPosition::new(0, 0));
        let report = engine.tick(&world);
        assert_eq!(report.deferred, 1);
        assert_eq!(engine.chunk_state(ChunkPosition::new(0, 0)), ChunkState::ObfuscationRequested);
        assert_eq!(engine.network_block(&world, Point3::new(0, 10, 0)), None);

        for position in ChunkPosition::new(0, 0).horizontal_neighbors() {
            world.insert_chunk(Chunk::solid(position, BlockState::of(BlockType::STONE), 64));
        }
        let report = engine.tick(&world);
        assert_eq!(report.obfuscated, 1);
        assert_eq!(engine.chunk_state(ChunkPosition::new(0, 0)), ChunkState::Obfuscated);
    }

    #[test]
    fn listener_hears_each_batch_once() {
        let mut world = stone_world();
        world.set_block(Point3::new(3, 30, 3), BlockState::of(BlockType::DIAMOND_ORE));

        let heard = Rc::new(RefCell::new(Vec::new()));
        let sink = heard.clone();
        let mut engine = EngineState::new("w", &config_without_cache(), &ModifierRegistry::new()).unwrap();
        engine.set_change_listener(move |position: ChunkPosition| sink.borrow_mut().push(position));

        engine.observe_chunk(ChunkPosition::new(0, 0));
        assert_eq!(engine.tick(&world).notified, 1);
        assert_eq!(engine.tick(&world).notified, 0);
        assert_eq!(*heard.borrow(), vec![ChunkPosition::new(0, 0)]);

        assert!(matches!(
            engine.take_pending_changes(ChunkPosition::new(0, 0)),
            Some(PendingChanges::FullChunk(_))
        ));

        // Mine down next to the ore: the reveal is signalled immediately.
        world.set_block(Point3::new(3, 31, 3), BlockState::AIR);
        engine.on_mutation(
            &world,
            MutationEvent::new(Point3::new(3, 31, 3), MutationKind::Break, true),
        );
        assert_eq!(heard.borrow().len(), 2);
    }

    #[test]
    fn disabled_world_serves_true_blocks() {
        let world = stone_world();
        let mut config = config_without_cache();
        config.default_world.enabled = false;

        let mut engine = EngineState::new("w", &config, &ModifierRegistry::new()).unwrap();
        assert_eq!(engine.observe_chunk(ChunkPosition::new(0, 0)), ChunkState::LoadedNoView);
        let report = engine.tick(&world);
        assert_eq!(report, TickReport::default());
        assert_eq!(
            engine.network_block(&world, Point3::new(1, 1, 1)),
            Some(BlockState::of(BlockType::STONE))
        );
        assert!(engine.take_pending_changes(ChunkPosition::new(0, 0)).is_none());
    }

    #[test]
    fn unload_forgets_the_chunk() {
        let world = stone_world();
        let mut engine = EngineState::new("w", &config_without_cache(), &ModifierRegistry::new()).unwrap();
        engine.observe_chunk(ChunkPosition::new(0, 0));
        engine.tick(&world);

        assert!(engine.unload_chunk(ChunkPosition::new(0, 0)));
        assert!(!engine.unload_chunk(ChunkPosition::new(0, 0)));
        assert_eq!(engine.chunk_state(ChunkPosition::new(0, 0)), ChunkState::Unloaded);
        assert_eq!(engine.tracked_chunks(), 0);
    }
}
