//! Entity store
//!
//! The handle callers use: identifiers, encoded entities in a spined byte
//! map, stamps, secondary indexes and latest-version selection.
//!
//! ## Layout on disk
//!
//! ```text
//! <dir>/termstore.toml          configuration
//! <dir>/.lock                   exclusive process lock
//! <dir>/identifiers/IDENTIFIERS PublicId <-> nid table
//! <dir>/entities/               spined byte map, nid -> encoded entity
//! <dir>/pattern_index/          spined int map, semantic nid -> pattern nid
//! ```
//!
//! Writes merge into whatever is stored under the nid, atomically per nid.
//! There is no cross-nid transaction.

use crate::allocator::IdentifierAllocator;
use crate::cache::LatestCache;
use crate::config::{StoreConfig, CONFIG_FILE_NAME};
use crate::index::SemanticIndex;
use crate::FxBuildHasher;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use termstore_coordinate::{Latest, StampCalculator, StampCoordinate, StampSource};
use termstore_core::{Error, Nid, PublicId, Result, Stamp, StampTime};
use termstore_entity::{Entity, EntityVersion, SemanticEntity, StampEntity};
use termstore_storage::SpinedByteArrayMap;
use tracing::{debug, info, warn};

/// Directory holding the identifier table
pub const IDENTIFIER_DIR: &str = "identifiers";
/// Directory holding entity spines
pub const ENTITY_DIR: &str = "entities";
/// Directory holding the semantic -> pattern spines
pub const PATTERN_INDEX_DIR: &str = "pattern_index";
/// Lock file guarding the store directory
pub const LOCK_FILE: &str = ".lock";

/// Handle to a terminology store
pub struct EntityStore {
    /// `None` for an ephemeral store
    data_dir: Option<PathBuf>,
    config: StoreConfig,
    identifiers: IdentifierAllocator,
    entities: SpinedByteArrayMap,
    semantics: SemanticIndex,
    /// Decoded copy of every stored stamp
    stamps: DashMap<Nid, Stamp, FxBuildHasher>,
    latest_cache: LatestCache,
    last_commit: AtomicI64,
    closed: AtomicBool,
    /// Held until the store is dropped. None for ephemeral stores.
    _lock_file: Option<File>,
}

/// Latest-version selection together with the entity it was made from
#[derive(Debug, Clone)]
pub struct LatestVersions {
    entity: Entity,
    selected: Latest<usize>,
}

impl LatestVersions {
    /// Entity the selection was made from
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Positions of the selected versions
    pub fn indices(&self) -> &Latest<usize> {
        &self.selected
    }

    /// Selected versions
    pub fn versions(&self) -> Latest<EntityVersion<'_>> {
        let all = self.entity.versions();
        self.selected.clone().map(|index| all[index])
    }
}

impl EntityStore {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open or create a store in `path`
    ///
    /// 1. Create the directory and take the process lock
    /// 2. Read or create `termstore.toml`
    /// 3. Load identifiers, entity spines and the pattern index
    /// 4. Rebuild the stamp table and the component index
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&config_path)?;
        let config = StoreConfig::from_file(&config_path)?;
        Self::open_dir(data_dir, config)
    }

    /// Open or create a store in `path` with `config`
    ///
    /// The config is written to `termstore.toml` so later opens pick it up.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        config.write_to_file(&data_dir.join(CONFIG_FILE_NAME))?;
        Self::open_dir(data_dir, config)
    }

    /// In-memory store with the default configuration
    pub fn ephemeral() -> Result<Self> {
        Self::ephemeral_with_config(StoreConfig::default())
    }

    /// In-memory store; nothing is ever written to disk
    pub fn ephemeral_with_config(config: StoreConfig) -> Result<Self> {
        Self::build(None, config, None)
    }

    fn open_dir(data_dir: PathBuf, config: StoreConfig) -> Result<Self> {
        let canonical = data_dir.canonicalize()?;
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(canonical.join(LOCK_FILE))?;
        fs2::FileExt::try_lock_exclusive(&lock_file)
            .map_err(|_| Error::StoreLocked(canonical.clone()))?;

        let store = Self::build(Some(canonical.clone()), config, Some(lock_file))?;
        let loaded = store.load_dir(&canonical);
        let (identifiers, spines, entities) = match loaded {
            Ok(counts) => counts,
            Err(e) => {
                // a half-loaded store must not flush over the files it failed to read
                store.closed.store(true, Ordering::SeqCst);
                return Err(e);
            }
        };

        info!(
            target: "termstore::store",
            path = %canonical.display(),
            identifiers,
            spines,
            entities,
            stamps = store.stamps.len(),
            "Opened store"
        );
        Ok(store)
    }

    fn build(data_dir: Option<PathBuf>, config: StoreConfig, lock: Option<File>) -> Result<Self> {
        let layout = config.spine_layout()?;
        Ok(Self {
            data_dir,
            identifiers: IdentifierAllocator::new(),
            entities: SpinedByteArrayMap::with_layout(layout),
            semantics: SemanticIndex::new(layout),
            stamps: DashMap::with_hasher(FxBuildHasher::default()),
            latest_cache: LatestCache::new(config.latest_cache_capacity),
            last_commit: AtomicI64::new(StampTime::EPOCH.as_millis()),
            closed: AtomicBool::new(false),
            config,
            _lock_file: lock,
        })
    }

    fn load_dir(&self, dir: &Path) -> Result<(usize, usize, usize)> {
        let identifiers = self.identifiers.load(&dir.join(IDENTIFIER_DIR))?;
        let spines = self.entities.load(&dir.join(ENTITY_DIR))?;
        self.semantics.load(&dir.join(PATTERN_INDEX_DIR))?;
        let entities = self.rebuild_derived_state()?;
        Ok((identifiers, spines, entities))
    }

    /// Stamps and component links are not persisted; derive them from the
    /// loaded entities
    fn rebuild_derived_state(&self) -> Result<usize> {
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let count = std::sync::atomic::AtomicUsize::new(0);
        self.entities.par_for_each(|key, bytes| {
            match Entity::from_bytes(bytes) {
                Ok(Entity::Stamp(stamp)) => self.track_stamp(&stamp),
                Ok(Entity::Semantic(semantic)) => self
                    .semantics
                    .link_component(semantic.nid(), semantic.referenced_component_nid()),
                Ok(_) => {}
                Err(e) => {
                    warn!(target: "termstore::store", nid = key, error = %e, "Undecodable entity");
                    first_error.lock().get_or_insert(e);
                }
            }
            count.fetch_add(1, Ordering::Relaxed);
        });
        match first_error.into_inner() {
            Some(e) => Err(e),
            None => Ok(count.into_inner()),
        }
    }

    /// Write everything changed since the last flush; a no-op when ephemeral
    pub fn flush(&self) -> Result<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let identifiers = self.identifiers.flush(&dir.join(IDENTIFIER_DIR))?;
        let entities = self.entities.flush(&dir.join(ENTITY_DIR))?;
        let patterns = self.semantics.flush(&dir.join(PATTERN_INDEX_DIR))?;
        info!(
            target: "termstore::store",
            path = %dir.display(),
            identifiers,
            entities,
            patterns,
            "Flushed store"
        );
        Ok(())
    }

    /// Close the store, flushing first if `flush_on_close` is set
    pub fn close(self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.config.flush_on_close {
            self.flush()?;
        }
        info!(target: "termstore::store", path = ?self.data_dir, "Closed store");
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Store directory, `None` when ephemeral
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// True for an in-memory store
    pub fn is_ephemeral(&self) -> bool {
        self.data_dir.is_none()
    }

    /// Configuration in effect
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Identifier table
    pub fn identifiers(&self) -> &IdentifierAllocator {
        &self.identifiers
    }

    /// Nid for `public_id`, allocating a durable one if it is new
    pub fn nid_for_public_id(&self, public_id: &PublicId) -> Result<Nid> {
        self.identifiers.nid_for_public_id(public_id)
    }

    /// Canonical PublicId of `nid`
    pub fn public_id_for_nid(&self, nid: Nid) -> Result<PublicId> {
        self.identifiers.public_id_for_nid(nid)
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Store `entity`, merging it into whatever is stored under its nid
    ///
    /// Returns the number of versions added. Stamps follow the stamp rule:
    /// an uncommitted stamp may be replaced, a committed one may not. The
    /// same rule freezes versions: a stored version may only be replaced
    /// while its stamp is uncommitted. Semantics are indexed before their
    /// bytes are stored, so a failed put leaves the stored record unchanged.
    ///
    /// # Errors
    ///
    /// - `Error::UnknownIdentifier` if the entity's PublicId was never
    ///   allocated, or a revised version's stamp is unknown
    /// - `Error::ChronologyMismatch` if the PublicId belongs to another nid,
    ///   or the stored record disagrees on kind or immutable fields
    /// - `Error::StampCommitted` when rewriting a committed stamp or a
    ///   version under a committed or canceled stamp
    pub fn put_entity(&self, entity: Entity) -> Result<usize> {
        let nid = entity.nid();
        self.check_identity(nid, entity.public_id())?;

        let mut appended = 0;
        let mut merged: Option<Entity> = None;
        self.entities.accumulate_and_get(nid.get(), |current| {
            let record = match current {
                None => {
                    appended = entity.versions().len();
                    entity
                }
                Some(bytes) => {
                    let mut stored = Entity::from_bytes(bytes)?;
                    for stamp in stored.revised_stamps(&entity) {
                        self.check_revisable(nid, stamp)?;
                    }
                    appended = stored.merge(entity)?;
                    stored
                }
            };
            let bytes = record.to_bytes()?;
            // last fallible step before the slot is written
            if let Entity::Semantic(semantic) = &record {
                self.semantics.record(
                    nid,
                    semantic.referenced_component_nid(),
                    semantic.pattern_nid(),
                )?;
            }
            merged = Some(record);
            Ok(bytes)
        })?;

        match &merged {
            Some(Entity::Stamp(stamp)) => {
                self.track_stamp(stamp);
                self.latest_cache.clear();
            }
            _ => self.latest_cache.invalidate(nid),
        }
        debug!(target: "termstore::store", nid = %nid, appended, "Stored entity");
        Ok(appended)
    }

    /// Store a stamp record
    pub fn put_stamp(&self, stamp: StampEntity) -> Result<()> {
        self.put_entity(Entity::Stamp(stamp)).map(|_| ())
    }

    /// Allocate and store a new uncommitted stamp
    pub fn new_stamp(&self, status: Nid, author: Nid, module: Nid, path: Nid) -> Result<Nid> {
        let public_id = PublicId::new_random();
        let nid = self.identifiers.nid_for_public_id(&public_id)?;
        self.put_stamp(StampEntity::new(
            nid,
            public_id,
            Stamp::uncommitted(status, author, module, path),
        ))?;
        Ok(nid)
    }

    /// Encoded entity under `nid`
    pub fn entity_bytes(&self, nid: Nid) -> Option<Arc<[u8]>> {
        self.entities.get(nid.get())
    }

    /// Decoded entity under `nid`, `None` if nothing is stored
    pub fn get_entity(&self, nid: Nid) -> Result<Option<Entity>> {
        self.entity_bytes(nid)
            .map(|bytes| Entity::from_bytes(&bytes))
            .transpose()
    }

    /// True if anything is stored under `nid`
    pub fn contains_entity(&self, nid: Nid) -> bool {
        self.entities.contains_key(nid.get())
    }

    /// Stamp under `nid`
    ///
    /// # Errors
    ///
    /// `Error::UnknownIdentifier` if no stamp is stored under `nid`.
    pub fn get_stamp(&self, nid: Nid) -> Result<Stamp> {
        self.stamps
            .get(&nid)
            .map(|stamp| *stamp)
            .ok_or_else(|| Error::unknown_nid(nid))
    }

    fn check_identity(&self, nid: Nid, public_id: &PublicId) -> Result<()> {
        match self.identifiers.nid_if_known(public_id)? {
            None => Err(Error::unknown_public_id(public_id)),
            Some(known) if known != nid => Err(Error::ChronologyMismatch {
                nid,
                reason: format!("public id {} belongs to nid {}", public_id, known),
            }),
            // registers any uuids not yet aliased to the nid
            Some(_) => self.identifiers.nid_for_public_id(public_id).map(|_| ()),
        }
    }

    // a version of `nid` may be replaced only while its stamp is uncommitted
    fn check_revisable(&self, nid: Nid, stamp: Nid) -> Result<()> {
        let time = self.get_stamp(stamp)?.time;
        if time.is_uncommitted() {
            return Ok(());
        }
        warn!(
            target: "termstore::store",
            nid = %nid,
            stamp = %stamp,
            "Rejected rewrite of a frozen version"
        );
        Err(Error::StampCommitted(stamp))
    }

    fn track_stamp(&self, stamp: &StampEntity) {
        self.stamps.insert(stamp.nid, stamp.stamp);
        if stamp.stamp.time.is_committed() {
            self.last_commit
                .fetch_max(stamp.stamp.time.as_millis(), Ordering::SeqCst);
        }
    }

    // ========================================================================
    // Stamp lifecycle
    // ========================================================================

    /// Commit an uncommitted stamp, returning its commit time
    ///
    /// Commit times are strictly increasing across the store, even when the
    /// wall clock is not.
    pub fn commit_stamp(&self, nid: Nid) -> Result<StampTime> {
        let time = self.next_commit_time();
        self.set_stamp_time(nid, time)?;
        info!(target: "termstore::store", stamp = %nid, time = %time, "Committed stamp");
        Ok(time)
    }

    /// Cancel an uncommitted stamp; its versions are never selected again
    pub fn cancel_stamp(&self, nid: Nid) -> Result<()> {
        self.set_stamp_time(nid, StampTime::CANCELED)?;
        info!(target: "termstore::store", stamp = %nid, "Canceled stamp");
        Ok(())
    }

    fn next_commit_time(&self) -> StampTime {
        let now = StampTime::now().as_millis();
        let mut last = self.last_commit.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self.last_commit.compare_exchange_weak(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return StampTime::from_millis(candidate),
                Err(actual) => last = actual,
            }
        }
    }

    fn set_stamp_time(&self, nid: Nid, time: StampTime) -> Result<()> {
        if !self.entities.contains_key(nid.get()) {
            return Err(Error::unknown_nid(nid));
        }
        let mut updated: Option<StampEntity> = None;
        self.entities.accumulate_and_get(nid.get(), |current| {
            let bytes = current.ok_or_else(|| Error::unknown_nid(nid))?;
            let mut stamp = match Entity::from_bytes(bytes)? {
                Entity::Stamp(stamp) => stamp,
                other => {
                    return Err(Error::ChronologyMismatch {
                        nid,
                        reason: format!("{} is not a stamp", other.kind()),
                    })
                }
            };
            if !stamp.stamp.time.is_uncommitted() {
                return Err(Error::StampCommitted(nid));
            }
            stamp.stamp.time = time;
            let bytes = Entity::Stamp(stamp.clone()).to_bytes()?;
            updated = Some(stamp);
            Ok(bytes)
        })?;

        if let Some(stamp) = &updated {
            self.track_stamp(stamp);
        }
        self.latest_cache.clear();
        Ok(())
    }

    // ========================================================================
    // Version selection
    // ========================================================================

    /// Versions of `nid` selected by `coordinate`
    ///
    /// Results are cached per `(nid, coordinate)`. A result may lag an
    /// append still in progress on another thread.
    pub fn latest(&self, nid: Nid, coordinate: &StampCoordinate) -> Result<LatestVersions> {
        let epoch = self.latest_cache.epoch();
        let entity = self.get_entity(nid)?.ok_or_else(|| Error::unknown_nid(nid))?;
        let version_count = entity.versions().len();

        let cached = self
            .latest_cache
            .get(nid, coordinate)
            .filter(|hit| hit.clone().into_vec().iter().all(|i| *i < version_count));
        let selected = match cached {
            Some(hit) => hit,
            None => {
                let calculator = StampCalculator::new(coordinate.clone(), self);
                let computed = calculator.latest_index(&entity.versions())?;
                self.latest_cache
                    .insert(epoch, nid, coordinate, computed.clone());
                computed
            }
        };
        Ok(LatestVersions { entity, selected })
    }

    /// Latest-version cache
    pub fn latest_cache(&self) -> &LatestCache {
        &self.latest_cache
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Visit every stored entity in storage order
    ///
    /// Stops at the first entity that fails to decode.
    pub fn for_each_entity(&self, mut visitor: impl FnMut(Entity)) -> Result<()> {
        for (_, bytes) in self.entities.slot_range() {
            visitor(Entity::from_bytes(&bytes)?);
        }
        Ok(())
    }

    /// Visit every stored entity from the rayon pool
    ///
    /// Entities that fail to decode are skipped; the first such error is
    /// returned once traversal finishes.
    pub fn par_for_each_entity(&self, visitor: impl Fn(Entity) + Sync + Send) -> Result<()> {
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        self.entities
            .par_for_each(|_, bytes| match Entity::from_bytes(bytes) {
                Ok(entity) => visitor(entity),
                Err(e) => {
                    first_error.lock().get_or_insert(e);
                }
            });
        match first_error.into_inner() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Visit the encoded form of every stored entity
    pub fn for_each_entity_bytes(&self, mut visitor: impl FnMut(Nid, &[u8])) {
        self.entities
            .for_each(|key, bytes| visitor(Nid::new(key), bytes));
    }

    /// Number of stored entities (walks every spine)
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ========================================================================
    // Secondary indexes
    // ========================================================================

    /// Semantics governed by `pattern`, sorted
    pub fn entity_nids_of_pattern(&self, pattern: Nid) -> Vec<Nid> {
        let mut nids = self.semantics.semantics_of_pattern(pattern);
        nids.sort_unstable();
        nids
    }

    /// Visit every semantic governed by `pattern`
    pub fn for_each_entity_of_pattern(
        &self,
        pattern: Nid,
        mut visitor: impl FnMut(Entity),
    ) -> Result<()> {
        for nid in self.entity_nids_of_pattern(pattern) {
            if let Some(entity) = self.get_entity(nid)? {
                visitor(entity);
            }
        }
        Ok(())
    }

    /// Semantics whose referenced component is `component`, sorted
    pub fn semantic_nids_for_component(&self, component: Nid) -> Vec<Nid> {
        self.semantics.semantics_for_component(component)
    }

    /// Visit every semantic referencing `component`
    pub fn for_each_semantic_for_component(
        &self,
        component: Nid,
        mut visitor: impl FnMut(SemanticEntity),
    ) -> Result<()> {
        for nid in self.semantic_nids_for_component(component) {
            if let Some(Entity::Semantic(semantic)) = self.get_entity(nid)? {
                visitor(semantic);
            }
        }
        Ok(())
    }

    /// Semantics of `pattern` referencing `component`, sorted
    pub fn semantic_nids_for_component_of_pattern(&self, component: Nid, pattern: Nid) -> Vec<Nid> {
        self.semantics
            .semantics_for_component_of_pattern(component, pattern)
    }

    /// Pattern of a stored semantic
    pub fn pattern_nid_of(&self, semantic: Nid) -> Option<Nid> {
        self.semantics.pattern_of(semantic)
    }
}

impl StampSource for EntityStore {
    fn stamp(&self, stamp_nid: Nid) -> Option<Stamp> {
        self.stamps.get(&stamp_nid).map(|stamp| *stamp)
    }
}

impl Drop for EntityStore {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) || !self.config.flush_on_close {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(
                target: "termstore::store",
                path = ?self.data_dir,
                error = %e,
                "Flush on drop failed"
            );
        }
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("data_dir", &self.data_dir)
            .field("identifiers", &self.identifiers)
            .field("stamps", &self.stamps.len())
            .field("latest_cache", &self.latest_cache)
            .finish()
    }
}
