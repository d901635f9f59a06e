//! This module provides the LMDB-based engine. Each named database is stored
//! as a single-file LMDB environment holding LMDB's unnamed database, so the
//! wrapper stays a thin layer over LMDB's own B-tree.
//!
//! Every database type is stored as a B-tree; the requested
//! [`DbType`][DbType] is only checked for being known when a file is created.
//! Anonymous databases are not supported. Status codes are LMDB's, with
//! [`NOT_FOUND`][NOT_FOUND] for absent keys and exhausted cursors.
//!
//! LMDB rejects empty keys, so every key is stored behind a one-byte tag.
//! The tag is the same for all keys and does not change their order.
//!
//! [DbType]: crate::DbType
//! [NOT_FOUND]: self::NOT_FOUND

use crate::{CursorMode, DbType, Engine, EnvFlags, OpenFlags, StatusCode};
use lmdb::{Cursor, Transaction};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::CStr;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::{Arc, Weak};
use tracing::debug;

/// LMDB's `MDB_NOTFOUND`.
pub const NOT_FOUND: StatusCode = StatusCode(lmdb_sys::MDB_NOTFOUND);

/// Configuration of the LMDB engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Config {
    /// Maximum size of each database file's memory map, in bytes.
    pub map_size: usize,

    /// Permissions for new database files when the caller passes a mode of 0
    /// and no environment mode applies. Subject to the process umask.
    pub default_mode: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            map_size: 10 * 1024 * 1024,
            default_mode: 0o660,
        }
    }
}

/// Handle to the LMDB engine.
#[derive(Debug, Clone, Default)]
pub struct LmdbEngine {
    config: Config,
}

impl LmdbEngine {
    /// Engine with the given configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// LMDB environments shared by the databases of one environment handle,
/// keyed by file path. LMDB does not allow a process to open the same file
/// twice, so databases in one environment reuse an already-open file.
#[derive(Debug, Default)]
struct FilePool {
    files: Mutex<HashMap<PathBuf, Weak<lmdb::Environment>>>,
}

impl FilePool {
    fn lookup(&self, path: &Path) -> Option<Arc<lmdb::Environment>> {
        self.files.lock().get(path).and_then(Weak::upgrade)
    }

    fn insert(&self, path: PathBuf, file: &Arc<lmdb::Environment>) {
        let mut files = self.files.lock();
        files.retain(|_, file| file.strong_count() > 0);
        files.insert(path, Arc::downgrade(file));
    }
}

#[derive(Debug, Clone)]
struct EnvContext {
    home: PathBuf,
    mode: u32,
    pool: Option<Arc<FilePool>>,
}

/// Native environment handle.
#[derive(Debug)]
pub struct LmdbEnv {
    context: Option<EnvContext>,
}

#[derive(Debug)]
struct OpenDb {
    file: Arc<lmdb::Environment>,
    db: lmdb::Database,
    flags: OpenFlags,
}

/// Native database handle.
#[derive(Debug)]
pub struct LmdbDb {
    env: Option<EnvContext>,
    open: Option<OpenDb>,
}

/// Native cursor handle. LMDB cursors live inside a transaction, so the
/// position is kept as a copied key and looked up again on every move.
#[derive(Debug)]
pub struct LmdbCursor {
    file: Arc<lmdb::Environment>,
    db: lmdb::Database,

    /// Stored (tagged) key of the entry the cursor is positioned at.
    position: Option<Vec<u8>>,
}

const KEY_TAG: u8 = b'k';

/// The key as stored in LMDB.
fn stored_key(key: &[u8]) -> Vec<u8> {
    let mut stored = Vec::with_capacity(key.len() + 1);
    stored.push(KEY_TAG);
    stored.extend_from_slice(key);
    stored
}

/// The caller's key for a stored key. Keys without the tag were not written
/// by this engine.
fn user_key(stored: &[u8]) -> Result<&[u8], lmdb::Error> {
    match stored.split_first() {
        Some((&KEY_TAG, key)) => Ok(key),
        _ => Err(lmdb::Error::Invalid),
    }
}

fn status(err: lmdb::Error) -> StatusCode {
    StatusCode(err.to_err_code())
}

fn resolve(env: &Option<EnvContext>, file: &Path) -> PathBuf {
    match env {
        Some(ctx) if file.is_relative() => ctx.home.join(file),
        _ => file.to_path_buf(),
    }
}

fn opened(db: &LmdbDb) -> Result<&OpenDb, StatusCode> {
    db.open.as_ref().ok_or(StatusCode::EINVAL)
}

fn writable(db: &LmdbDb) -> Result<&OpenDb, StatusCode> {
    let open = opened(db)?;
    if open.flags.contains(OpenFlags::RDONLY) {
        Err(StatusCode::EACCES)
    } else {
        Ok(open)
    }
}

/// Copies the entry returned by a cursor read out of the transaction. The key
/// is the stored one.
fn copy_entry(
    (key, value): (Option<&[u8]>, &[u8]),
) -> Result<(Vec<u8>, Vec<u8>), lmdb::Error> {
    let key = key.ok_or(lmdb::Error::Invalid)?;
    Ok((key.to_vec(), value.to_vec()))
}

/// Moves `cursor` according to `mode`, treating `position` as the stored key
/// of the entry a previous move returned. The entry at `position` may have been
/// deleted since.
fn seek(
    cursor: &lmdb::RoCursor<'_>,
    position: Option<&[u8]>,
    mode: CursorMode,
) -> Result<(Vec<u8>, Vec<u8>), lmdb::Error> {
    let op = match (mode, position) {
        (CursorMode::First, _) | (CursorMode::Next, None) => lmdb_sys::MDB_FIRST,
        (CursorMode::Last, _) | (CursorMode::Prev, None) => lmdb_sys::MDB_LAST,
        (CursorMode::Next, Some(position)) => {
            let (key, value) = cursor.get(Some(position), None, lmdb_sys::MDB_SET_RANGE)?;
            match key {
                Some(key) if key != position => return copy_entry((Some(key), value)),
                _ => lmdb_sys::MDB_NEXT,
            }
        }
        (CursorMode::Prev, Some(position)) => {
            match cursor.get(Some(position), None, lmdb_sys::MDB_SET_RANGE) {
                Ok(_) => lmdb_sys::MDB_PREV,
                // Everything is before the position.
                Err(lmdb::Error::NotFound) => lmdb_sys::MDB_LAST,
                Err(err) => return Err(err),
            }
        }
    };
    copy_entry(cursor.get(None, None, op)?)
}

impl LmdbEngine {
    /// Opens the LMDB file at `path`, creating it if allowed.
    fn open_file(
        &self,
        env: &Option<EnvContext>,
        path: &Path,
        db_type: DbType,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Arc<lmdb::Environment>, StatusCode> {
        let exists = match path.metadata() {
            Ok(_) => true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => return Err(err.into()),
        };
        if exists {
            if flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) {
                return Err(StatusCode::EEXIST);
            }
        } else {
            if !flags.contains(OpenFlags::CREATE) || flags.contains(OpenFlags::RDONLY) {
                return Err(StatusCode::ENOENT);
            }
            if db_type == DbType::Unknown {
                return Err(StatusCode::EINVAL);
            }
        }

        let env_mode = env.as_ref().map_or(0, |ctx| ctx.mode);
        let mode = [mode, env_mode, self.config.default_mode]
            .iter()
            .copied()
            .find(|&mode| mode != 0)
            .unwrap_or(self.config.default_mode);
        let mut env_flags = lmdb::EnvironmentFlags::NO_SUB_DIR | lmdb::EnvironmentFlags::NO_LOCK;
        if flags.contains(OpenFlags::RDONLY) {
            env_flags |= lmdb::EnvironmentFlags::READ_ONLY;
        }
        let file = lmdb::Environment::new()
            .set_flags(env_flags)
            .set_map_size(self.config.map_size)
            .open_with_permissions(path, mode as lmdb_sys::mode_t)
            .map_err(status)?;
        if !exists {
            debug!(path = %path.display(), mode, "created database file");
        }
        Ok(Arc::new(file))
    }

    fn open_pooled(
        &self,
        env: &Option<EnvContext>,
        pool: &FilePool,
        path: &Path,
        db_type: DbType,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Arc<lmdb::Environment>, StatusCode> {
        if let Some(file) = pool.lookup(path) {
            if flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) {
                return Err(StatusCode::EEXIST);
            }
            return Ok(file);
        }
        let file = self.open_file(env, path, db_type, flags, mode)?;
        pool.insert(path.to_path_buf(), &file);
        Ok(file)
    }
}

impl Engine for LmdbEngine {
    type Env = LmdbEnv;
    type Db = LmdbDb;
    type Cursor = LmdbCursor;

    const NOT_FOUND: StatusCode = NOT_FOUND;

    fn library_version(&self) -> String {
        // mdb_version returns a pointer to a static, NUL-terminated string.
        let version =
            unsafe { CStr::from_ptr(lmdb_sys::mdb_version(ptr::null_mut(), ptr::null_mut(), ptr::null_mut())) };
        version.to_string_lossy().into_owned()
    }

    fn strerror(&self, status: StatusCode) -> String {
        lmdb::Error::from_err_code(status.code()).to_string()
    }

    fn env_create(&self) -> Result<Self::Env, StatusCode> {
        Ok(LmdbEnv { context: None })
    }

    fn env_open(
        &self,
        env: &mut Self::Env,
        home: &Path,
        flags: EnvFlags,
        mode: u32,
    ) -> Result<(), StatusCode> {
        if env.context.is_some() {
            return Err(StatusCode::EINVAL);
        }
        if !home.metadata()?.is_dir() {
            return Err(StatusCode(libc::ENOTDIR));
        }
        env.context = Some(EnvContext {
            home: home.to_path_buf(),
            mode,
            pool: if flags.contains(EnvFlags::INIT_MPOOL) {
                Some(Arc::default())
            } else {
                None
            },
        });
        Ok(())
    }

    fn env_close(&self, _env: Self::Env) -> Result<(), StatusCode> {
        Ok(())
    }

    fn db_create(&self, env: Option<&Self::Env>) -> Result<Self::Db, StatusCode> {
        let env = match env {
            Some(env) => Some(env.context.clone().ok_or(StatusCode::EINVAL)?),
            None => None,
        };
        Ok(LmdbDb { env, open: None })
    }

    fn db_open(
        &self,
        db: &mut Self::Db,
        file: Option<&Path>,
        db_type: DbType,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<(), StatusCode> {
        if db.open.is_some() || flags.contains(OpenFlags::RDONLY | OpenFlags::TRUNCATE) {
            return Err(StatusCode::EINVAL);
        }
        let file = file.ok_or(StatusCode::EINVAL)?;
        let path = resolve(&db.env, file);
        let file = match &db.env {
            Some(ctx) => {
                let pool = ctx.pool.as_ref().ok_or(StatusCode::EINVAL)?;
                let path = crate::canonical_file_path(&path)?;
                self.open_pooled(&db.env, pool, &path, db_type, flags, mode)?
            }
            None => self.open_file(&None, &path, db_type, flags, mode)?,
        };

        let database = file.open_db(None).map_err(status)?;
        if flags.contains(OpenFlags::TRUNCATE) {
            let mut txn = file.begin_rw_txn().map_err(status)?;
            txn.clear_db(database).map_err(status)?;
            txn.commit().map_err(status)?;
        }
        db.open = Some(OpenDb {
            file,
            db: database,
            flags,
        });
        Ok(())
    }

    fn db_close(&self, db: Self::Db) -> Result<(), StatusCode> {
        if let Some(open) = &db.open {
            if !open.flags.contains(OpenFlags::RDONLY) {
                open.file.sync(true).map_err(status)?;
            }
        }
        Ok(())
    }

    fn db_open_flags(&self, db: &Self::Db) -> Result<OpenFlags, StatusCode> {
        Ok(opened(db)?.flags)
    }

    fn db_remove(&self, db: Self::Db, file: &Path) -> Result<(), StatusCode> {
        if db.open.is_some() {
            self.db_close(db)?;
            return Err(StatusCode::EINVAL);
        }
        std::fs::remove_file(resolve(&db.env, file))?;
        Ok(())
    }

    fn db_rename(&self, db: Self::Db, old: &Path, new: &Path) -> Result<(), StatusCode> {
        if db.open.is_some() {
            self.db_close(db)?;
            return Err(StatusCode::EINVAL);
        }
        std::fs::rename(resolve(&db.env, old), resolve(&db.env, new))?;
        Ok(())
    }

    fn db_put(&self, db: &Self::Db, key: &[u8], value: &[u8]) -> Result<(), StatusCode> {
        let open = writable(db)?;
        let mut txn = open.file.begin_rw_txn().map_err(status)?;
        txn.put(open.db, &stored_key(key), &value, lmdb::WriteFlags::empty())
            .map_err(status)?;
        txn.commit().map_err(status)
    }

    fn db_get(&self, db: &Self::Db, key: &[u8]) -> Result<Vec<u8>, StatusCode> {
        let open = opened(db)?;
        let txn = open.file.begin_ro_txn().map_err(status)?;
        let value = txn
            .get(open.db, &stored_key(key))
            .map(<[u8]>::to_vec)
            .map_err(status)?;
        Ok(value)
    }

    fn db_del(&self, db: &Self::Db, key: &[u8]) -> Result<(), StatusCode> {
        let open = writable(db)?;
        let mut txn = open.file.begin_rw_txn().map_err(status)?;
        txn.del(open.db, &stored_key(key), None).map_err(status)?;
        txn.commit().map_err(status)
    }

    fn cursor_create(&self, db: &Self::Db) -> Result<Self::Cursor, StatusCode> {
        let open = opened(db)?;
        Ok(LmdbCursor {
            file: Arc::clone(&open.file),
            db: open.db,
            position: None,
        })
    }

    fn cursor_get(
        &self,
        cursor: &mut Self::Cursor,
        mode: CursorMode,
    ) -> Result<(Vec<u8>, Vec<u8>), StatusCode> {
        let txn = cursor.file.begin_ro_txn().map_err(status)?;
        let (stored, value) = {
            let lmdb_cursor = txn.open_ro_cursor(cursor.db).map_err(status)?;
            seek(&lmdb_cursor, cursor.position.as_deref(), mode).map_err(status)?
        };
        let key = user_key(&stored).map_err(status)?.to_vec();
        cursor.position = Some(stored);
        Ok((key, value))
    }

    fn cursor_close(&self, _cursor: Self::Cursor) -> Result<(), StatusCode> {
        Ok(())
    }
}
