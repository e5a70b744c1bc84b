//! Shared fixtures for the root test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;`.

#![allow(dead_code)]

use std::sync::Once;
pub use termstore::*;
use uuid::Uuid;

static INIT_TRACING: Once = Once::new();

/// Install a test-writer subscriber once per process
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// PublicId from a small integer
pub fn pid(n: u128) -> PublicId {
    PublicId::from(Uuid::from_u128(n))
}

/// Well-known concepts every fixture store carries
pub struct Terminology {
    pub store: EntityStore,
    pub active: Nid,
    pub inactive: Nid,
    pub author: Nid,
    pub core_module: Nid,
    pub extension_module: Nid,
    pub development: Nid,
    pub description_pattern: Nid,
}

impl Terminology {
    pub fn new(store: EntityStore) -> Self {
        let nid = |n| store.nid_for_public_id(&pid(n)).unwrap();
        let active = nid(0x0A01);
        let inactive = nid(0x0A02);
        let author = nid(0x0A03);
        let core_module = nid(0x0A04);
        let extension_module = nid(0x0A05);
        let development = nid(0x0A06);
        let description_pattern = nid(0x0A07);
        Self {
            store,
            active,
            inactive,
            author,
            core_module,
            extension_module,
            development,
            description_pattern,
        }
    }

    pub fn ephemeral() -> Self {
        Self::new(EntityStore::ephemeral().unwrap())
    }

    /// Nid for a fixture integer
    pub fn nid(&self, n: u128) -> Nid {
        self.store.nid_for_public_id(&pid(n)).unwrap()
    }

    /// Committed stamp; returns its nid and commit time
    pub fn commit(&self, status: Nid, module: Nid, path: Nid) -> (Nid, StampTime) {
        let stamp = self
            .store
            .new_stamp(status, self.author, module, path)
            .unwrap();
        let time = self.store.commit_stamp(stamp).unwrap();
        (stamp, time)
    }

    /// Active core-module stamp on the development path
    pub fn commit_active(&self) -> Nid {
        self.commit(self.active, self.core_module, self.development).0
    }

    /// Add one concept version under `stamp`
    pub fn put_concept(&self, n: u128, stamp: Nid) -> Nid {
        let nid = self.nid(n);
        self.store
            .put_entity(
                ConceptEntity::new(nid, pid(n), vec![ConceptVersion::new(stamp)])
                    .unwrap()
                    .into(),
            )
            .unwrap();
        nid
    }

    /// Add one description version under `stamp`
    pub fn put_description(&self, n: u128, concept: Nid, text: &str, stamp: Nid) -> Nid {
        let nid = self.nid(n);
        self.store
            .put_entity(
                SemanticEntity::new(
                    nid,
                    pid(n),
                    concept,
                    self.description_pattern,
                    vec![SemanticVersion::new(stamp, vec![FieldValue::from(text)])],
                )
                .unwrap()
                .into(),
            )
            .unwrap();
        nid
    }

    /// Text of the selected description version, if exactly one applies
    pub fn description_text(&self, nid: Nid, coordinate: &StampCoordinate) -> Option<String> {
        let latest = self.store.latest(nid, coordinate).unwrap();
        match latest.versions() {
            Latest::Single(EntityVersion::Semantic(version)) => {
                version.fields[0].as_str().map(str::to_string)
            }
            _ => None,
        }
    }
}
