//! Engine-independent checks of the handle contract. Each engine's tests run
//! these against that engine.

#![cfg_attr(
    not(any(feature = "in_mem_impl", feature = "lmdb_impl")),
    allow(dead_code)
)]

pub(crate) mod counting;

use crate::{CursorMode, Database, DbType, Engine, Error, HandleKind, OpenFlags};
use std::collections::BTreeMap;
use std::path::Path;

/// Runs every check in this module that does not depend on iteration order,
/// using files inside `dir`.
///
/// # Panics
/// Panics if the engine violates the handle contract.
pub(crate) fn run_conformance<E: Engine>(engine: &E, dir: &Path, db_type: DbType) {
    basic_read_write_test(engine, &dir.join("read_write.db"), db_type);
    empty_key_test(engine, &dir.join("empty_key.db"), db_type);
    closed_database_test(engine, &dir.join("closed.db"), db_type);
    double_open_test(engine, &dir.join("double_open.db"), db_type);
    remove_and_rename_test(engine, dir, db_type);
    cursor_visits_all(engine, &dir.join("cursor.db"), db_type, false);
}

/// Opens a fresh database of the given type at `path`.
///
/// # Panics
/// Panics if the engine returns an error.
fn open_db<E: Engine>(engine: &E, path: &Path, db_type: DbType) -> Database<E> {
    let mut db = Database::create(engine).unwrap();
    db.open(path, db_type, OpenFlags::CREATE).unwrap();
    db
}

/// Writes some data, reads it back, deletes it, and checks the "not found"
/// conditions along the way.
pub(crate) fn basic_read_write_test<E: Engine>(engine: &E, path: &Path, db_type: DbType) {
    let mut db = open_db(engine, path, db_type);
    assert_eq!(db.flags(), Ok(OpenFlags::CREATE));

    db.put("key", "value").unwrap();
    db.put("empty value", b"").unwrap();
    assert_eq!(db.get("key").unwrap(), b"value");
    assert_eq!(db.get("empty value").unwrap(), b"");

    db.put("key", "replaced").unwrap();
    assert_eq!(db.get("key").unwrap(), b"replaced");

    db.delete("key").unwrap();
    assert!(db.get("key").unwrap_err().is_not_found());
    assert!(db.delete("key").unwrap_err().is_not_found());
    assert!(db.get("no_such_key").unwrap_err().is_not_found());

    db.close().unwrap();
    assert_eq!(db.put("x", "y"), Err(Error::Closed(HandleKind::Database)));
}

/// Checks that an empty key is stored, read back, listed and deleted like
/// any other key.
pub(crate) fn empty_key_test<E: Engine>(engine: &E, path: &Path, db_type: DbType) {
    let db = open_db(engine, path, db_type);
    db.put(b"", b"empty key").unwrap();
    db.put(b"\0", b"nul key").unwrap();
    assert_eq!(db.get(b"").unwrap(), b"empty key");
    assert_eq!(db.get(b"\0").unwrap(), b"nul key");

    let mut cursor = db.cursor().unwrap();
    let keys: BTreeMap<Vec<u8>, Vec<u8>> = cursor.iter_start().collect::<Result<_, _>>().unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys.get(&b""[..]).map(Vec::as_slice), Some(&b"empty key"[..]));
    cursor.close().unwrap();

    db.delete(b"").unwrap();
    assert!(db.get(b"").unwrap_err().is_not_found());
    assert_eq!(db.get(b"\0").unwrap(), b"nul key");
}

/// Checks that every operation on a closed database fails without reaching the
/// engine.
pub(crate) fn closed_database_test<E: Engine>(engine: &E, path: &Path, db_type: DbType) {
    let mut db = open_db(engine, path, db_type);
    db.close().unwrap();

    let closed = Error::Closed(HandleKind::Database);
    assert_eq!(db.close(), Err(closed.clone()));
    assert_eq!(db.rename(path, path), Err(closed.clone()));
    assert_eq!(db.remove(path), Err(closed.clone()));
    assert_eq!(db.put("k", "v"), Err(closed.clone()));
    assert_eq!(db.get("k"), Err(closed.clone()));
    assert_eq!(db.delete("k"), Err(closed.clone()));
    assert_eq!(db.flags(), Err(closed.clone()));
    assert_eq!(db.open(path, db_type, OpenFlags::CREATE), Err(closed.clone()));
    assert_eq!(db.cursor().map(|_| ()), Err(closed));
}

/// Checks that a handle can be opened only once.
pub(crate) fn double_open_test<E: Engine>(engine: &E, path: &Path, db_type: DbType) {
    let mut db = open_db(engine, path, db_type);
    assert_eq!(
        db.open(path, db_type, OpenFlags::CREATE),
        Err(Error::AlreadyOpen(HandleKind::Database))
    );
    db.close().unwrap();
}

/// Checks that remove and rename work on unopened handles, fail on opened
/// ones, and use up the handle either way.
pub(crate) fn remove_and_rename_test<E: Engine>(engine: &E, dir: &Path, db_type: DbType) {
    let old_path = dir.join("rename_me.db");
    let new_path = dir.join("renamed.db");
    open_db(engine, &old_path, db_type).close().unwrap();

    let mut db = open_db(engine, &old_path, db_type);
    assert!(db.rename(&old_path, &new_path).is_err());
    assert_eq!(db.close(), Err(Error::Closed(HandleKind::Database)));

    let mut db = Database::create(engine).unwrap();
    db.rename(&old_path, &new_path).unwrap();
    assert!(!old_path.exists());
    assert!(new_path.exists());
    assert_eq!(db.close(), Err(Error::Closed(HandleKind::Database)));

    let mut db = open_db(engine, &new_path, db_type);
    assert!(db.remove(&new_path).is_err());
    assert_eq!(db.close(), Err(Error::Closed(HandleKind::Database)));

    let mut db = Database::create(engine).unwrap();
    db.remove(&new_path).unwrap();
    assert!(!new_path.exists());

    let mut db = Database::create(engine).unwrap();
    assert!(db.remove(&new_path).is_err());
}

/// Writes a few entries and checks that a cursor driven with `Next` until "not
/// found" visits each of them exactly once, in ascending key order if `sorted`
/// is set. Also checks `First`/`Last` and the closed-cursor errors.
pub(crate) fn cursor_visits_all<E: Engine>(engine: &E, path: &Path, db_type: DbType, sorted: bool) {
    let db = open_db(engine, path, db_type);
    let mut expected = BTreeMap::new();
    for (key, value) in [("key", "value"), ("value", "key"), ("keyvalue", "test_db.db")].iter() {
        db.put(key, value).unwrap();
        expected.insert(key.as_bytes().to_vec(), value.as_bytes().to_vec());
    }

    let mut cursor = db.cursor().unwrap();
    let mut visited = Vec::new();
    loop {
        match cursor.move_to(CursorMode::Next) {
            Ok(entry) => visited.push(entry),
            Err(err) => {
                assert!(err.is_not_found(), "unexpected cursor error: {}", err);
                break;
            }
        }
    }
    cursor.close().unwrap();

    if sorted {
        let in_order: Vec<(Vec<u8>, Vec<u8>)> = expected.clone().into_iter().collect();
        assert_eq!(visited, in_order);
    }
    assert_eq!(visited.len(), expected.len());
    let visited: BTreeMap<Vec<u8>, Vec<u8>> = visited.into_iter().collect();
    assert_eq!(visited, expected);

    let closed = Error::Closed(HandleKind::Cursor);
    assert_eq!(cursor.close(), Err(closed.clone()));
    assert_eq!(cursor.move_to(CursorMode::Prev), Err(closed));

    let mut cursor = db.cursor().unwrap();
    let first = cursor.move_to(CursorMode::First).unwrap();
    let last = cursor.move_to(CursorMode::Last).unwrap();
    assert!(expected.contains_key(&first.0));
    assert!(expected.contains_key(&last.0));
    cursor.close().unwrap();
}
