//! Identifier allocator
//!
//! Maps PublicIds to nids and back. Resolution is atomic per identity: two
//! threads resolving the same PublicId always get the same nid.
//!
//! ## Design
//!
//! - Lookups go through two `DashMap`s (uuid -> nid, nid -> PublicId) and
//!   never take the allocation lock.
//! - Allocation and alias registration run under one `Mutex` and re-check
//!   the tables first, so a racing thread that lost sees the winner's nid.
//! - Durable nids count up from 1, ephemeral nids count down from -1. Only
//!   durable nids are persisted.
//!
//! ## File format
//!
//! ```text
//! identifiers/IDENTIFIERS
//! +--------+------------+------------------+------------------+---------+
//! | "TKID" | u32 version| i32 next durable | identifier table | u32 crc |
//! +--------+------------+------------------+------------------+---------+
//! ```

use crate::{format, FxBuildHasher};
use byteorder::{BigEndian, ReadBytesExt};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use termstore_core::{Error, Nid, PublicId, Result};
use termstore_storage::spine_file::write_atomically;
use tracing::{debug, info};
use uuid::Uuid;

/// Name of the identifier file inside the identifier directory
pub const IDENTIFIERS_FILE: &str = "IDENTIFIERS";

const MAGIC: &[u8; 4] = b"TKID";
const FORMAT_VERSION: u32 = 1;

/// Which half of the nid space a new identity is allocated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NidSpace {
    /// Positive nids, persisted with the store
    Durable,
    /// Negative nids, never persisted
    Ephemeral,
}

/// Concurrent PublicId <-> nid table
pub struct IdentifierAllocator {
    uuid_to_nid: DashMap<Uuid, Nid, FxBuildHasher>,
    nid_to_public_id: DashMap<Nid, PublicId, FxBuildHasher>,
    next_durable: AtomicI32,
    next_ephemeral: AtomicI32,
    /// Serializes allocation and alias registration
    allocation: Mutex<()>,
    dirty: AtomicBool,
}

impl IdentifierAllocator {
    /// Empty allocator
    pub fn new() -> Self {
        Self {
            uuid_to_nid: DashMap::with_hasher(FxBuildHasher::default()),
            nid_to_public_id: DashMap::with_hasher(FxBuildHasher::default()),
            next_durable: AtomicI32::new(Nid::FIRST_DURABLE.get()),
            next_ephemeral: AtomicI32::new(Nid::FIRST_EPHEMERAL.get()),
            allocation: Mutex::new(()),
            dirty: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Nid for `public_id`, allocating a durable one if it is new
    pub fn nid_for_public_id(&self, public_id: &PublicId) -> Result<Nid> {
        self.nid_for_public_id_in(public_id, NidSpace::Durable)
    }

    /// Nid for `public_id`, allocating from `space` if it is new
    ///
    /// If some of the UUIDs are known and all known ones map to one nid, the
    /// unknown UUIDs become aliases of that nid and its PublicId grows to
    /// the union.
    ///
    /// # Errors
    ///
    /// - `Error::AmbiguousIdentity` if the UUIDs map to more than one nid
    /// - `Error::InvalidData` for an empty PublicId or an exhausted space
    pub fn nid_for_public_id_in(&self, public_id: &PublicId, space: NidSpace) -> Result<Nid> {
        if public_id.is_empty() {
            return Err(Error::InvalidData(
                "cannot allocate a nid for an empty public id".to_string(),
            ));
        }

        let (known, fully_known) = self.known_nids(public_id);
        if fully_known && known.len() == 1 {
            if let Some(nid) = known.iter().next() {
                return Ok(*nid);
            }
        }
        if known.len() > 1 {
            return Err(Error::AmbiguousIdentity {
                public_id: public_id.clone(),
                nids: known.into_iter().collect(),
            });
        }

        let _guard = self.allocation.lock();
        // another thread may have registered some of these uuids meanwhile
        let (known, _) = self.known_nids(public_id);
        let mut known = known.into_iter();
        match (known.next(), known.next()) {
            (None, _) => self.allocate(public_id, space),
            (Some(nid), None) => {
                self.register_aliases(nid, public_id);
                Ok(nid)
            }
            (Some(first), Some(second)) => {
                let mut nids = vec![first, second];
                nids.extend(known);
                Err(Error::AmbiguousIdentity {
                    public_id: public_id.clone(),
                    nids,
                })
            }
        }
    }

    /// Nid for the identity made of `uuids`, allocating if new
    pub fn nid_for_uuids(&self, uuids: &[Uuid]) -> Result<Nid> {
        self.nid_for_public_id(&PublicId::from_uuids(uuids.iter().copied()))
    }

    /// Nid for `public_id` without allocating
    ///
    /// # Errors
    ///
    /// `Error::AmbiguousIdentity` if the UUIDs map to more than one nid.
    pub fn nid_if_known(&self, public_id: &PublicId) -> Result<Option<Nid>> {
        let (known, _) = self.known_nids(public_id);
        if known.len() > 1 {
            return Err(Error::AmbiguousIdentity {
                public_id: public_id.clone(),
                nids: known.into_iter().collect(),
            });
        }
        Ok(known.into_iter().next())
    }

    /// Canonical PublicId of `nid`
    ///
    /// # Errors
    ///
    /// `Error::UnknownIdentifier` if the nid was never allocated.
    pub fn public_id_for_nid(&self, nid: Nid) -> Result<PublicId> {
        self.nid_to_public_id
            .get(&nid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::unknown_nid(nid))
    }

    /// True if `nid` was allocated
    pub fn contains_nid(&self, nid: Nid) -> bool {
        self.nid_to_public_id.contains_key(&nid)
    }

    /// Append the sorted UUIDs of each nid's PublicId to `uuids`
    ///
    /// Building an identity from the identities of existing components this
    /// way is reproducible in any store that knows the same components.
    pub fn add_sorted_uuids(&self, uuids: &mut Vec<Uuid>, nids: &[Nid]) -> Result<()> {
        for nid in nids {
            let public_id = self.public_id_for_nid(*nid)?;
            uuids.extend_from_slice(public_id.uuids());
        }
        Ok(())
    }

    /// Allocated nids across both spaces
    pub fn len(&self) -> usize {
        self.nid_to_public_id.len()
    }

    /// True if nothing was allocated
    pub fn is_empty(&self) -> bool {
        self.nid_to_public_id.is_empty()
    }

    /// Highest durable nid handed out so far, if any
    pub fn max_durable_nid(&self) -> Option<Nid> {
        let next = self.next_durable.load(Ordering::Acquire);
        (next > Nid::FIRST_DURABLE.get()).then(|| Nid::new(next - 1))
    }

    /// Visit every `(nid, PublicId)` pair
    pub fn for_each(&self, mut visitor: impl FnMut(Nid, &PublicId)) {
        for entry in self.nid_to_public_id.iter() {
            visitor(*entry.key(), entry.value());
        }
    }

    fn known_nids(&self, public_id: &PublicId) -> (BTreeSet<Nid>, bool) {
        let mut nids = BTreeSet::new();
        let mut fully_known = true;
        for uuid in public_id.uuids() {
            match self.uuid_to_nid.get(uuid) {
                Some(nid) => {
                    nids.insert(*nid);
                }
                None => fully_known = false,
            }
        }
        (nids, fully_known)
    }

    // ========================================================================
    // Slow path (allocation lock held)
    // ========================================================================

    fn allocate(&self, public_id: &PublicId, space: NidSpace) -> Result<Nid> {
        let nid = match space {
            NidSpace::Durable => {
                let raw = self.next_durable.load(Ordering::Acquire);
                if raw > Nid::MAX_DURABLE.get() {
                    return Err(Error::InvalidData("durable nid space exhausted".to_string()));
                }
                self.next_durable.store(raw + 1, Ordering::Release);
                self.dirty.store(true, Ordering::Release);
                Nid::new(raw)
            }
            NidSpace::Ephemeral => {
                let raw = self.next_ephemeral.load(Ordering::Acquire);
                let next = raw
                    .checked_sub(1)
                    .ok_or_else(|| Error::InvalidData("ephemeral nid space exhausted".to_string()))?;
                self.next_ephemeral.store(next, Ordering::Release);
                Nid::new(raw)
            }
        };

        // public id first, so a reader that finds a uuid always finds its nid
        self.nid_to_public_id.insert(nid, public_id.clone());
        for uuid in public_id.uuids() {
            self.uuid_to_nid.insert(*uuid, nid);
        }
        debug!(target: "termstore::allocator", nid = %nid, public_id = %public_id, "Allocated nid");
        Ok(nid)
    }

    fn register_aliases(&self, nid: Nid, public_id: &PublicId) {
        let mut added = false;
        if let Some(mut canonical) = self.nid_to_public_id.get_mut(&nid) {
            if public_id.uuids().iter().any(|uuid| !canonical.contains(uuid)) {
                *canonical = canonical.union(public_id);
                added = true;
            }
        }
        if !added {
            return;
        }
        for uuid in public_id.uuids() {
            self.uuid_to_nid.entry(*uuid).or_insert(nid);
        }
        if !nid.is_ephemeral() {
            self.dirty.store(true, Ordering::Release);
        }
        debug!(target: "termstore::allocator", nid = %nid, aliases = %public_id, "Registered aliases");
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Load durable identifiers from `dir`; a missing file loads nothing
    ///
    /// # Errors
    ///
    /// Checksum, framing or version failures, or a nid claimed twice.
    pub fn load(&self, dir: &Path) -> Result<usize> {
        let path = dir.join(IDENTIFIERS_FILE);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let what = path.display().to_string();
        let mut reader = format::unseal(&data, &what)?;
        format::read_header(&mut reader, MAGIC, FORMAT_VERSION, &what)?;
        let next_durable = reader
            .read_i32::<BigEndian>()
            .map_err(|_| Error::UnexpectedEof(format!("{}: header", what)))?;
        let entries = format::read_identifier_table(&mut reader, &what)?;
        if !reader.is_empty() {
            return Err(Error::InvalidData(format!("{}: trailing bytes", what)));
        }

        let _guard = self.allocation.lock();
        for (nid, public_id) in &entries {
            if nid.is_ephemeral() || nid.get() >= next_durable {
                return Err(Error::InvalidData(format!(
                    "{}: nid {} outside the allocated range",
                    what, nid
                )));
            }
            for uuid in public_id.uuids() {
                if let Some(existing) = self.uuid_to_nid.insert(*uuid, *nid) {
                    if existing != *nid {
                        return Err(Error::InvalidData(format!(
                            "{}: uuid {} claimed by nids {} and {}",
                            what, uuid, existing, nid
                        )));
                    }
                }
            }
            self.nid_to_public_id.insert(*nid, public_id.clone());
        }
        self.next_durable.fetch_max(next_durable, Ordering::AcqRel);

        info!(
            target: "termstore::allocator",
            path = %what,
            identifiers = entries.len(),
            next_durable,
            "Loaded identifiers"
        );
        Ok(entries.len())
    }

    /// Write durable identifiers to `dir` if anything changed
    pub fn flush(&self, dir: &Path) -> Result<bool> {
        let _guard = self.allocation.lock();
        if !self.dirty.swap(false, Ordering::AcqRel) && dir.join(IDENTIFIERS_FILE).exists() {
            return Ok(false);
        }

        let result = self.write_file(dir);
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result.map(|_| true)
    }

    fn write_file(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let mut durable: Vec<(Nid, PublicId)> = self
            .nid_to_public_id
            .iter()
            .filter(|entry| !entry.key().is_ephemeral())
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        durable.sort_unstable_by_key(|(nid, _)| *nid);

        let mut body = Vec::new();
        format::write_header(&mut body, MAGIC, FORMAT_VERSION);
        body.extend_from_slice(&self.next_durable.load(Ordering::Acquire).to_be_bytes());
        format::write_identifier_table(&mut body, durable.iter().map(|(nid, id)| (*nid, id)))?;
        let sealed = format::seal(body);

        write_atomically(&dir.join(IDENTIFIERS_FILE), |out| out.write_all(&sealed))?;
        info!(
            target: "termstore::allocator",
            dir = %dir.display(),
            identifiers = durable.len(),
            "Flushed identifiers"
        );
        Ok(())
    }
}

impl Default for IdentifierAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdentifierAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierAllocator")
            .field("identifiers", &self.len())
            .field("next_durable", &self.next_durable.load(Ordering::Relaxed))
            .field("next_ephemeral", &self.next_ephemeral.load(Ordering::Relaxed))
            .finish()
    }
}
