//! Chronologies: an identity plus its ordered versions
//!
//! ## Invariants
//!
//! - The version list is never empty
//! - No two versions share a stamp nid
//! - Versions are only appended; merging never removes one

use crate::version::VersionRecord;
use termstore_codec::{DecoderInput, EncoderOutput};
use termstore_core::{Error, Nid, PublicId, Result};

/// Identity and version history of one component
#[derive(Debug, Clone, PartialEq)]
pub struct Chronology<V> {
    nid: Nid,
    public_id: PublicId,
    versions: Vec<V>,
}

impl<V: VersionRecord> Chronology<V> {
    /// Build a chronology, validating its invariants
    ///
    /// # Errors
    ///
    /// `Error::InvalidData` for an empty identity, an empty version list or
    /// duplicate stamp nids.
    pub fn new(nid: Nid, public_id: PublicId, versions: Vec<V>) -> Result<Self> {
        if public_id.is_empty() {
            return Err(Error::InvalidData(format!("nid {} has an empty public id", nid)));
        }
        if versions.is_empty() {
            return Err(Error::InvalidData(format!("nid {} has no versions", nid)));
        }
        for (i, version) in versions.iter().enumerate() {
            let stamp_nid = version.stamp_nid();
            if versions[..i].iter().any(|v| v.stamp_nid() == stamp_nid) {
                return Err(Error::InvalidData(format!(
                    "nid {} has two versions on stamp {}",
                    nid, stamp_nid
                )));
            }
        }
        Ok(Self {
            nid,
            public_id,
            versions,
        })
    }

    /// Component nid
    pub fn nid(&self) -> Nid {
        self.nid
    }

    /// Canonical identity
    pub fn public_id(&self) -> &PublicId {
        &self.public_id
    }

    /// Versions in append order
    pub fn versions(&self) -> &[V] {
        &self.versions
    }

    /// Version written under `stamp_nid`
    pub fn version_for_stamp(&self, stamp_nid: Nid) -> Option<&V> {
        self.versions.iter().find(|v| v.stamp_nid() == stamp_nid)
    }

    /// Stamp nids of every version
    pub fn stamp_nids(&self) -> impl Iterator<Item = Nid> + '_ {
        self.versions.iter().map(|v| v.stamp_nid())
    }

    /// Fold `incoming` into this chronology
    ///
    /// Versions on stamps not yet present are appended in `incoming`'s order.
    /// A version on a stamp already present replaces it, which is how an
    /// uncommitted edit is revised; callers holding stamp state must reject
    /// any stamp in [`Chronology::revised_stamps`] that is no longer
    /// uncommitted before merging. The identity becomes the union of both
    /// public ids. Returns the number of versions appended.
    ///
    /// # Errors
    ///
    /// `Error::ChronologyMismatch` if the nids differ or the public ids share
    /// no UUID. `self` is unchanged on error.
    pub fn merge(&mut self, incoming: Chronology<V>) -> Result<usize> {
        if incoming.nid != self.nid {
            return Err(Error::ChronologyMismatch {
                nid: self.nid,
                reason: format!("cannot merge chronology of nid {}", incoming.nid),
            });
        }
        if !self.public_id.intersects(&incoming.public_id) {
            return Err(Error::ChronologyMismatch {
                nid: self.nid,
                reason: format!(
                    "public ids {} and {} share no uuid",
                    self.public_id, incoming.public_id
                ),
            });
        }

        self.public_id = self.public_id.union(&incoming.public_id);
        let mut appended = 0;
        for version in incoming.versions {
            let stamp_nid = version.stamp_nid();
            match self.versions.iter_mut().find(|v| v.stamp_nid() == stamp_nid) {
                Some(existing) => *existing = version,
                None => {
                    self.versions.push(version);
                    appended += 1;
                }
            }
        }
        Ok(appended)
    }

    /// Stamps on which `incoming` carries a version different from the stored one
    pub fn revised_stamps(&self, incoming: &Chronology<V>) -> Vec<Nid> {
        incoming
            .versions
            .iter()
            .filter(|version| {
                self.version_for_stamp(version.stamp_nid())
                    .map_or(false, |existing| existing != *version)
            })
            .map(|version| version.stamp_nid())
            .collect()
    }

    /// Copy with every nid passed through `remap`
    pub fn remap_nids(&self, remap: &mut impl FnMut(Nid) -> Result<Nid>) -> Result<Self> {
        let versions = self
            .versions
            .iter()
            .map(|version| version.remap_nids(remap))
            .collect::<Result<Vec<_>>>()?;
        Chronology::new(remap(self.nid)?, self.public_id.clone(), versions)
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    pub(crate) fn encode_identity(&self, out: &mut EncoderOutput) {
        out.write_nid(self.nid);
        out.write_public_id(&self.public_id);
    }

    pub(crate) fn encode_versions(&self, out: &mut EncoderOutput) {
        out.write_len(self.versions.len());
        for version in &self.versions {
            version.encode(out);
        }
    }

    pub(crate) fn decode_identity(input: &mut DecoderInput<'_>) -> Result<(Nid, PublicId)> {
        Ok((input.read_nid()?, input.read_public_id()?))
    }

    pub(crate) fn decode_versions(input: &mut DecoderInput<'_>) -> Result<Vec<V>> {
        let count = input.read_len()?;
        // every version encodes at least its stamp nid
        if count > input.remaining() / 4 {
            return Err(Error::UnexpectedEof(format!("{} versions", count)));
        }
        (0..count).map(|_| V::decode(input)).collect()
    }
}
