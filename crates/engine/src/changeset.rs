//! Change sets: portable bundles of entities
//!
//! Nids are local to a store, so a change set carries the PublicId of every
//! nid its records mention. Loading remaps each nid through the target
//! store's identifier table before merging.
//!
//! ## File layout
//!
//! ```text
//! +--------+-------------+------------------+--------------------------------+-------+
//! | "TKCS" | u32 version | identifier table | u32 count, [u32 len][record]*  | crc32 |
//! +--------+-------------+------------------+--------------------------------+-------+
//! ```
//!
//! Records are framed entity encodings with source-store nids.

use crate::format;
use crate::store::EntityStore;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use termstore_core::{Error, Nid, PublicId, Result};
use termstore_entity::Entity;
use termstore_storage::spine_file::write_atomically;
use tracing::{info, warn};

const MAGIC: &[u8; 4] = b"TKCS";
const FORMAT_VERSION: u32 = 1;
const WHAT: &str = "change set";

/// Failed records kept in a [`LoadReport`]
pub const MAX_REPORTED_ERRORS: usize = 10;

// ============================================================================
// Writing
// ============================================================================

/// Collects entities for export
#[derive(Debug, Default)]
pub struct ChangeSetWriter {
    identifiers: BTreeMap<Nid, PublicId>,
    records: Vec<Vec<u8>>,
}

impl ChangeSetWriter {
    /// Empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `entity`, resolving every nid it mentions through `store`
    pub fn add(&mut self, entity: &Entity, store: &EntityStore) -> Result<()> {
        let mut mentioned = FxHashSet::default();
        entity.remap_nids(|nid| {
            mentioned.insert(nid);
            Ok(nid)
        })?;
        for nid in mentioned {
            if !self.identifiers.contains_key(&nid) {
                self.identifiers.insert(nid, store.public_id_for_nid(nid)?);
            }
        }
        self.records.push(entity.to_bytes()?);
        Ok(())
    }

    /// Number of records added
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing was added
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Encoded file contents
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        format::write_header(&mut out, MAGIC, FORMAT_VERSION);
        format::write_identifier_table(
            &mut out,
            self.identifiers.iter().map(|(nid, public_id)| (*nid, public_id)),
        )?;
        out.write_u32::<BigEndian>(self.records.len() as u32)?;
        for record in &self.records {
            out.write_u32::<BigEndian>(record.len() as u32)?;
            out.extend_from_slice(record);
        }
        Ok(format::seal(out))
    }

    /// Write the change set to `path`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        write_atomically(path, |w| std::io::Write::write_all(w, &bytes))?;
        info!(
            target: "termstore::loader",
            path = %path.display(),
            records = self.records.len(),
            identifiers = self.identifiers.len(),
            "Wrote change set"
        );
        Ok(())
    }
}

/// Export every entity in `store` to `path`, returning the record count
pub fn export_store(store: &EntityStore, path: &Path) -> Result<usize> {
    let mut writer = ChangeSetWriter::new();
    let mut failure = None;
    store.for_each_entity(|entity| {
        if failure.is_none() {
            if let Err(e) = writer.add(&entity, store) {
                failure = Some(e);
            }
        }
    })?;
    if let Some(e) = failure {
        return Err(e);
    }
    writer.write_to(path)?;
    Ok(writer.len())
}

// ============================================================================
// Reading
// ============================================================================

/// A parsed change set
///
/// The file checksum and framing are verified when opening. Records are
/// decoded one by one while loading, so a single bad record does not reject
/// the whole file.
#[derive(Debug, Clone)]
pub struct ChangeSetReader {
    identifiers: FxHashMap<Nid, PublicId>,
    records: Vec<Arc<[u8]>>,
}

impl ChangeSetReader {
    /// Read and verify the change set at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Parse an encoded change set
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = format::unseal(data, WHAT)?;
        format::read_header(&mut reader, MAGIC, FORMAT_VERSION, WHAT)?;
        let identifiers = format::read_identifier_table(&mut reader, WHAT)?
            .into_iter()
            .collect();

        let truncated = |_| Error::UnexpectedEof(format!("{}: record table", WHAT));
        let count = reader.read_u32::<BigEndian>().map_err(truncated)? as usize;
        if count > reader.len() / 4 {
            return Err(Error::UnexpectedEof(format!("{}: {} records", WHAT, count)));
        }
        let mut records = Vec::with_capacity(count);
        for index in 0..count {
            let len = reader.read_u32::<BigEndian>().map_err(truncated)? as usize;
            if len > reader.len() {
                return Err(Error::UnexpectedEof(format!("{}: record {}", WHAT, index)));
            }
            let (record, rest) = reader.split_at(len);
            records.push(Arc::from(record));
            reader = rest;
        }
        if !reader.is_empty() {
            return Err(Error::InvalidData(format!(
                "{}: {} trailing bytes",
                WHAT,
                reader.len()
            )));
        }
        Ok(Self { identifiers, records })
    }

    /// Encoded records in file order
    pub fn records(&self) -> &[Arc<[u8]>] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the change set holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// PublicId of a source-store nid
    pub fn public_id(&self, nid: Nid) -> Option<&PublicId> {
        self.identifiers.get(&nid)
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Outcome of a [`BulkLoader`] run
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Records attempted
    pub processed: usize,
    /// Records merged into the store
    pub loaded: usize,
    /// Records that failed to decode, remap or merge
    pub failed: usize,
    /// The first failures, by record index
    pub first_errors: Vec<(usize, Error)>,
    /// Record index to pass to [`BulkLoader::start_at`] after cancellation
    pub resume_at: Option<usize>,
}

impl LoadReport {
    /// True if every record was attempted
    pub fn is_complete(&self) -> bool {
        self.resume_at.is_none()
    }
}

/// Merges change-set records into a store
///
/// Failed records are counted and skipped. The cancel flag is checked
/// between records.
pub struct BulkLoader<'a> {
    store: &'a EntityStore,
    cancel: Option<Arc<AtomicBool>>,
    start: usize,
}

impl<'a> BulkLoader<'a> {
    /// Loader targeting `store`
    pub fn new(store: &'a EntityStore) -> Self {
        Self {
            store,
            cancel: None,
            start: 0,
        }
    }

    /// Stop early once `flag` is set
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Skip the records before `index`
    pub fn start_at(mut self, index: usize) -> Self {
        self.start = index;
        self
    }

    /// Load `change_set` into the store
    pub fn load(&self, change_set: &ChangeSetReader) -> LoadReport {
        let mut report = LoadReport::default();
        let mut remapped: FxHashMap<Nid, Nid> = FxHashMap::default();

        for (index, record) in change_set.records().iter().enumerate().skip(self.start) {
            if self.is_canceled() {
                report.resume_at = Some(index);
                info!(target: "termstore::loader", resume_at = index, "Load canceled");
                break;
            }
            report.processed += 1;
            match self.load_record(change_set, record, &mut remapped) {
                Ok(()) => report.loaded += 1,
                Err(e) => {
                    warn!(target: "termstore::loader", record = index, error = %e, "Skipping record");
                    report.failed += 1;
                    if report.first_errors.len() < MAX_REPORTED_ERRORS {
                        report.first_errors.push((index, e));
                    }
                }
            }
        }

        info!(
            target: "termstore::loader",
            processed = report.processed,
            loaded = report.loaded,
            failed = report.failed,
            "Loaded change set"
        );
        report
    }

    fn load_record(
        &self,
        change_set: &ChangeSetReader,
        record: &[u8],
        remapped: &mut FxHashMap<Nid, Nid>,
    ) -> Result<()> {
        let entity = Entity::from_bytes(record)?;
        let local = entity.remap_nids(|source| {
            if let Some(target) = remapped.get(&source) {
                return Ok(*target);
            }
            let public_id = change_set
                .public_id(source)
                .ok_or_else(|| Error::unknown_nid(source))?;
            let target = self.store.nid_for_public_id(public_id)?;
            remapped.insert(source, target);
            Ok(target)
        })?;
        self.store.put_entity(local)?;
        Ok(())
    }

    fn is_canceled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }
}
