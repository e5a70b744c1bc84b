//! Spine file formats
//!
//! One directory per spined map. All integers are big-endian.
//!
//! ```text
//! SPINE_COUNT            [i32 non-negative region spines][i32 negative region spines]
//! spine-<index> (int)    [i32 length][length x i32]
//! spine-<index> (bytes)  [i32 slot count]
//!                        per slot: [i32 len, -1 = empty][len bytes]
//!                        [u32 crc32 of everything before it]
//! ```
//!
//! Files are written to `<name>.tmp` and renamed into place, so a crash
//! mid-write leaves the previous version of the spine intact.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use termstore_core::{Error, Result};

/// Prefix of every spine file name
pub const SPINE_PREFIX: &str = "spine-";

/// Name of the spine count file
pub const SPINE_COUNT_FILE: &str = "SPINE_COUNT";

const TMP_SUFFIX: &str = ".tmp";

/// Path of the file holding one spine
pub fn spine_path(dir: &Path, spine_index: u32) -> PathBuf {
    dir.join(format!("{}{}", SPINE_PREFIX, spine_index))
}

/// List spine files in a directory as `(spine index, path)`, sorted by index
///
/// A file carrying the spine prefix but no parseable index is treated as
/// corruption: the directory does not hold a store we can trust.
pub fn list_spine_files(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if !name.starts_with(SPINE_PREFIX) || name.ends_with(TMP_SUFFIX) {
            continue;
        }
        let index = name[SPINE_PREFIX.len()..]
            .parse::<u32>()
            .map_err(|_| Error::corrupt_spine(entry.path(), "file name has no spine index"))?;
        files.push((index, entry.path()));
    }
    files.sort_unstable_by_key(|(index, _)| *index);
    Ok(files)
}

/// Read both region spine counts, `[0, 0]` if the file does not exist
pub fn read_spine_count(dir: &Path) -> Result<[u32; 2]> {
    let path = dir.join(SPINE_COUNT_FILE);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok([0, 0]),
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(file);
    let positive = read_count(&mut reader, &path)?;
    let negative = read_count(&mut reader, &path)?;
    Ok([positive, negative])
}

fn read_count(reader: &mut impl Read, path: &Path) -> Result<u32> {
    let count = reader
        .read_i32::<BigEndian>()
        .map_err(|e| eof_as_corrupt(e, path))?;
    u32::try_from(count).map_err(|_| Error::corrupt_spine(path, "negative spine count"))
}

/// Write both region spine counts
pub fn write_spine_count(dir: &Path, counts: [u32; 2]) -> Result<()> {
    let path = dir.join(SPINE_COUNT_FILE);
    write_atomically(&path, |out| {
        out.write_i32::<BigEndian>(counts[0] as i32)?;
        out.write_i32::<BigEndian>(counts[1] as i32)?;
        Ok(())
    })
}

/// Read an integer spine, checking its length against the expected spine size
pub fn read_int_spine(path: &Path, spine_size: u32) -> Result<Vec<i32>> {
    let mut reader = BufReader::new(File::open(path)?);
    let length = reader
        .read_i32::<BigEndian>()
        .map_err(|e| eof_as_corrupt(e, path))?;
    if length != spine_size as i32 {
        return Err(Error::corrupt_spine(
            path,
            format!("length {} does not match spine size {}", length, spine_size),
        ));
    }
    let mut values = vec![0i32; spine_size as usize];
    reader
        .read_i32_into::<BigEndian>(&mut values)
        .map_err(|e| eof_as_corrupt(e, path))?;
    ensure_at_end(&mut reader, path)?;
    Ok(values)
}

/// Write an integer spine
pub fn write_int_spine(path: &Path, values: &[i32]) -> Result<()> {
    write_atomically(path, |out| {
        out.write_i32::<BigEndian>(values.len() as i32)?;
        for value in values {
            out.write_i32::<BigEndian>(*value)?;
        }
        Ok(())
    })
}

/// Read a byte-array spine, verifying its checksum
pub fn read_byte_spine(path: &Path, spine_size: u32) -> Result<Vec<Option<Arc<[u8]>>>> {
    let data = fs::read(path)?;
    if data.len() < 8 {
        return Err(Error::corrupt_spine(path, "file too short"));
    }
    let (body, trailer) = data.split_at(data.len() - 4);
    let stored_crc = (&trailer[..]).read_u32::<BigEndian>()?;
    let computed_crc = crc32fast::hash(body);
    if stored_crc != computed_crc {
        return Err(Error::corrupt_spine(
            path,
            format!(
                "checksum mismatch: stored {:08x}, computed {:08x}",
                stored_crc, computed_crc
            ),
        ));
    }

    let mut reader = body;
    let slot_count = reader.read_i32::<BigEndian>()?;
    if slot_count != spine_size as i32 {
        return Err(Error::corrupt_spine(
            path,
            format!(
                "slot count {} does not match spine size {}",
                slot_count, spine_size
            ),
        ));
    }

    let mut slots = Vec::with_capacity(spine_size as usize);
    for _ in 0..spine_size {
        let len = reader
            .read_i32::<BigEndian>()
            .map_err(|e| eof_as_corrupt(e, path))?;
        if len < 0 {
            slots.push(None);
            continue;
        }
        let len = len as usize;
        if len > reader.len() {
            return Err(Error::corrupt_spine(path, "slot length past end of file"));
        }
        let (bytes, rest) = reader.split_at(len);
        slots.push(Some(Arc::from(bytes)));
        reader = rest;
    }
    if !reader.is_empty() {
        return Err(Error::corrupt_spine(path, "trailing bytes after last slot"));
    }
    Ok(slots)
}

/// Write a byte-array spine with its checksum
pub fn write_byte_spine(path: &Path, slots: &[Option<Arc<[u8]>>]) -> Result<()> {
    let mut body = Vec::new();
    body.write_i32::<BigEndian>(slots.len() as i32)?;
    for slot in slots {
        match slot {
            Some(bytes) => {
                body.write_i32::<BigEndian>(bytes.len() as i32)?;
                body.extend_from_slice(bytes);
            }
            None => body.write_i32::<BigEndian>(-1)?,
        }
    }
    let crc = crc32fast::hash(&body);
    write_atomically(path, |out| {
        out.write_all(&body)?;
        out.write_u32::<BigEndian>(crc)?;
        Ok(())
    })
}

/// Write `path` through a temporary file, fsync, then rename into place
pub fn write_atomically(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(TMP_SUFFIX);
    let tmp_path = PathBuf::from(tmp_name);

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    let mut out = BufWriter::new(file);
    write(&mut out)?;
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn eof_as_corrupt(e: std::io::Error, path: &Path) -> Error {
    if e.kind() == ErrorKind::UnexpectedEof {
        Error::corrupt_spine(path, "unexpected end of file")
    } else {
        Error::Io(e)
    }
}

fn ensure_at_end(reader: &mut impl Read, path: &Path) -> Result<()> {
    let mut probe = [0u8; 1];
    match reader.read(&mut probe)? {
        0 => Ok(()),
        _ => Err(Error::corrupt_spine(path, "trailing bytes after last slot")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_int_spine_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = spine_path(dir.path(), 3);
        let values = vec![1, i32::MAX, -5, 42];
        write_int_spine(&path, &values).unwrap();
        assert_eq!(read_int_spine(&path, 4).unwrap(), values);
    }

    #[test]
    fn test_int_spine_is_big_endian_length_prefixed() {
        let dir = TempDir::new().unwrap();
        let path = spine_path(dir.path(), 0);
        write_int_spine(&path, &[1, 2]).unwrap();
        let raw = fs::read(&path).unwrap();
        assert_eq!(raw, vec![0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2]);
    }

    #[test]
    fn test_int_spine_length_mismatch_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = spine_path(dir.path(), 0);
        write_int_spine(&path, &[1, 2, 3]).unwrap();
        let err = read_int_spine(&path, 4).unwrap_err();
        assert!(matches!(err, Error::CorruptSpineFile { .. }));
    }

    #[test]
    fn test_int_spine_truncated_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = spine_path(dir.path(), 0);
        write_int_spine(&path, &[1, 2, 3, 4]).unwrap();
        let raw = fs::read(&path).unwrap();
        fs::write(&path, &raw[..raw.len() - 2]).unwrap();
        let err = read_int_spine(&path, 4).unwrap_err();
        assert!(matches!(err, Error::CorruptSpineFile { .. }));
    }

    #[test]
    fn test_int_spine_trailing_bytes_are_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = spine_path(dir.path(), 0);
        write_int_spine(&path, &[1, 2]).unwrap();
        let mut raw = fs::read(&path).unwrap();
        raw.push(0);
        fs::write(&path, raw).unwrap();
        assert!(read_int_spine(&path, 2).is_err());
    }

    #[test]
    fn test_byte_spine_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = spine_path(dir.path(), 1);
        let slots: Vec<Option<Arc<[u8]>>> = vec![
            Some(Arc::from(&b"abc"[..])),
            None,
            Some(Arc::from(&b""[..])),
        ];
        write_byte_spine(&path, &slots).unwrap();
        assert_eq!(read_byte_spine(&path, 3).unwrap(), slots);
    }

    #[test]
    fn test_byte_spine_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = spine_path(dir.path(), 1);
        write_byte_spine(&path, &[Some(Arc::from(&b"abc"[..]))]).unwrap();
        let mut raw = fs::read(&path).unwrap();
        raw[8] ^= 0xFF;
        fs::write(&path, raw).unwrap();
        let err = read_byte_spine(&path, 1).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_spine_count_round_trip() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_spine_count(dir.path()).unwrap(), [0, 0]);
        write_spine_count(dir.path(), [7, 2]).unwrap();
        assert_eq!(read_spine_count(dir.path()).unwrap(), [7, 2]);
    }

    #[test]
    fn test_list_skips_tmp_and_count_files() {
        let dir = TempDir::new().unwrap();
        write_int_spine(&spine_path(dir.path(), 10), &[0]).unwrap();
        write_int_spine(&spine_path(dir.path(), 2), &[0]).unwrap();
        write_spine_count(dir.path(), [11, 0]).unwrap();
        fs::write(dir.path().join("spine-4.tmp"), b"partial").unwrap();

        let files = list_spine_files(dir.path()).unwrap();
        let indexes: Vec<u32> = files.iter().map(|(i, _)| *i).collect();
        assert_eq!(indexes, vec![2, 10]);
    }

    #[test]
    fn test_list_rejects_unparseable_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("spine-abc"), b"").unwrap();
        assert!(matches!(
            list_spine_files(dir.path()),
            Err(Error::CorruptSpineFile { .. })
        ));
    }
}
