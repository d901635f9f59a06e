//! On-disk representation of the in-memory engine's tables.
//!
//! A file is a header followed by the table's entries in iteration order:
//!
//! ```text
//! "KVGT" | format version: u8 | db type: u8 | entry count: u64 LE
//! ( key length: u32 LE | key | value length: u32 LE | value )*
//! ```

use super::table::Table;
use crate::{DbType, StatusCode};
use std::convert::TryFrom;
use std::fs::{self, OpenOptions};
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

const MAGIC: &[u8; 4] = b"KVGT";
pub(super) const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 1 + 8;

fn encode(table: &Table) -> Result<Vec<u8>, StatusCode> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.push(table.db_type() as u8);
    out.extend_from_slice(&(table.len() as u64).to_le_bytes());
    for (key, value) in table.entries() {
        for field in [key, value].iter() {
            let len = u32::try_from(field.len()).map_err(|_| StatusCode::EINVAL)?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(field);
        }
    }
    Ok(out)
}

/// Reads fields off the front of a byte slice. Running out of bytes means the
/// file is not a valid database.
struct Reader<'a> {
    rest: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], StatusCode> {
        if self.rest.len() < len {
            return Err(StatusCode::EINVAL);
        }
        let (head, rest) = self.rest.split_at(len);
        self.rest = rest;
        Ok(head)
    }

    fn take_u8(&mut self) -> Result<u8, StatusCode> {
        Ok(self.take(1)?[0])
    }

    fn take_u32(&mut self) -> Result<u32, StatusCode> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn take_u64(&mut self) -> Result<u64, StatusCode> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn take_field(&mut self) -> Result<&'a [u8], StatusCode> {
        let len = self.take_u32()? as usize;
        self.take(len)
    }
}

fn decode(bytes: &[u8]) -> Result<Table, StatusCode> {
    let mut reader = Reader { rest: bytes };
    if reader.take(MAGIC.len())? != MAGIC || reader.take_u8()? != FORMAT_VERSION {
        return Err(StatusCode::EINVAL);
    }
    let db_type = match DbType::from_raw(u32::from(reader.take_u8()?)) {
        Some(DbType::Unknown) | None => return Err(StatusCode::EINVAL),
        Some(db_type) => db_type,
    };
    let count = reader.take_u64()?;

    let mut table = Table::new(db_type);
    for _ in 0..count {
        let key = reader.take_field()?;
        let value = reader.take_field()?;
        table.put(key, value);
    }
    if !reader.rest.is_empty() {
        return Err(StatusCode::EINVAL);
    }
    table.mark_clean();
    Ok(table)
}

/// Creates a new database file holding `table`. Fails with `EEXIST` if the
/// file already exists. `mode` is subject to the process umask.
pub(super) fn create(path: &Path, mode: u32, table: &Table) -> Result<(), StatusCode> {
    let bytes = encode(table)?;
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    let mut file = options.open(path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Reads the table stored in an existing database file.
pub(super) fn load(path: &Path) -> Result<Table, StatusCode> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

/// Overwrites an existing database file with `table`, keeping the file's
/// permissions. Fails with `ENOENT` if the file has disappeared.
pub(super) fn store(path: &Path, table: &Table) -> Result<(), StatusCode> {
    let bytes = encode(table)?;
    let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stored_table_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.db");

        let mut table = Table::new(DbType::Hash);
        create(&path, 0o600, &table).unwrap();
        table.put(b"key", b"value");
        table.put(b"", b"");
        store(&path, &table).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.db_type(), DbType::Hash);
        assert!(!loaded.is_dirty());
        assert_eq!(loaded.get(b"key"), Some(&b"value"[..]));
        assert_eq!(loaded.get(b""), Some(&b""[..]));
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.db");
        let table = Table::new(DbType::Btree);
        create(&path, 0o600, &table).unwrap();
        assert_eq!(create(&path, 0o600, &table), Err(StatusCode::EEXIST));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(decode(b"").map(|_| ()), Err(StatusCode::EINVAL));
        assert_eq!(decode(b"NOPE\x01\x01").map(|_| ()), Err(StatusCode::EINVAL));

        let mut table = Table::new(DbType::Btree);
        table.put(b"k", b"v");
        let mut bytes = encode(&table).unwrap();
        bytes.pop();
        assert_eq!(decode(&bytes).map(|_| ()), Err(StatusCode::EINVAL));
    }

    #[test]
    fn store_requires_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.db");
        assert_eq!(
            store(&path, &Table::new(DbType::Btree)),
            Err(StatusCode::ENOENT)
        );
    }
}
