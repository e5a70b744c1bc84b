//! Checksummed file bodies and the identifier table encoding
//!
//! Shared by the `IDENTIFIERS` file and change-set files. Big-endian
//! throughout.
//!
//! ```text
//! identifier table
//! +----------------+----------------------------------------------------+
//! | u32 count      | per entry: [i32 nid][u32 uuid count][16 bytes each]|
//! +----------------+----------------------------------------------------+
//!
//! sealed file
//! +------------------+--------------------------------+
//! | body             | u32 crc32 of body              |
//! +------------------+--------------------------------+
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use termstore_core::{Error, Nid, PublicId, Result};
use uuid::Uuid;

const UUID_LEN: usize = 16;

/// Append the crc32 of `body`
pub(crate) fn seal(mut body: Vec<u8>) -> Vec<u8> {
    let crc = crc32fast::hash(&body);
    body.extend_from_slice(&crc.to_be_bytes());
    body
}

/// Verify and strip the trailing crc32
pub(crate) fn unseal<'a>(data: &'a [u8], what: &str) -> Result<&'a [u8]> {
    if data.len() < 4 {
        return Err(Error::InvalidData(format!("{}: file too short", what)));
    }
    let (body, trailer) = data.split_at(data.len() - 4);
    let stored = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(Error::InvalidData(format!(
            "{}: checksum mismatch: stored {:08x}, computed {:08x}",
            what, stored, computed
        )));
    }
    Ok(body)
}

/// Read and check a 4-byte magic plus a u32 format version
pub(crate) fn read_header(
    reader: &mut &[u8],
    magic: &[u8; 4],
    version: u32,
    what: &str,
) -> Result<()> {
    if reader.len() < 8 || &reader[..4] != magic {
        return Err(Error::InvalidData(format!("{}: bad magic", what)));
    }
    *reader = &reader[4..];
    let found = reader.read_u32::<BigEndian>()?;
    if found != version {
        return Err(Error::UnsupportedEncodingVersion {
            what: what.to_string(),
            found: found as i32,
            min: version as i32,
            max: version as i32,
        });
    }
    Ok(())
}

/// Write `magic` and `version`
pub(crate) fn write_header(out: &mut Vec<u8>, magic: &[u8; 4], version: u32) {
    out.extend_from_slice(magic);
    out.extend_from_slice(&version.to_be_bytes());
}

/// Encode `(nid, public id)` pairs
pub(crate) fn write_identifier_table<'a>(
    out: &mut Vec<u8>,
    entries: impl ExactSizeIterator<Item = (Nid, &'a PublicId)>,
) -> Result<()> {
    out.write_u32::<BigEndian>(entries.len() as u32)?;
    for (nid, public_id) in entries {
        out.write_i32::<BigEndian>(nid.get())?;
        out.write_u32::<BigEndian>(public_id.len() as u32)?;
        for uuid in public_id.uuids() {
            out.extend_from_slice(uuid.as_bytes());
        }
    }
    Ok(())
}

/// Decode an identifier table, advancing `reader`
pub(crate) fn read_identifier_table(reader: &mut &[u8], what: &str) -> Result<Vec<(Nid, PublicId)>> {
    let truncated = |_| Error::UnexpectedEof(format!("{}: identifier table", what));
    let count = reader.read_u32::<BigEndian>().map_err(truncated)? as usize;
    // every entry takes at least 8 bytes
    if count > reader.len() / 8 {
        return Err(Error::UnexpectedEof(format!(
            "{}: {} identifiers",
            what, count
        )));
    }

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let nid = Nid::new(reader.read_i32::<BigEndian>().map_err(truncated)?);
        let uuid_count = reader.read_u32::<BigEndian>().map_err(truncated)? as usize;
        if uuid_count == 0 {
            return Err(Error::InvalidData(format!(
                "{}: nid {} has an empty public id",
                what, nid
            )));
        }
        if uuid_count > reader.len() / UUID_LEN {
            return Err(Error::UnexpectedEof(format!("{}: uuids of nid {}", what, nid)));
        }
        let (bytes, rest) = reader.split_at(uuid_count * UUID_LEN);
        *reader = rest;
        let uuids = bytes.chunks_exact(UUID_LEN).map(|chunk| {
            let mut raw = [0u8; UUID_LEN];
            raw.copy_from_slice(chunk);
            Uuid::from_bytes(raw)
        });
        entries.push((nid, PublicId::from_uuids(uuids)));
    }
    Ok(entries)
}
