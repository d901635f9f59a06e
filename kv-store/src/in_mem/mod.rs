//! This module provides the bundled storage engine. Tables are held in memory
//! and named databases are persisted to plain files, written when the database
//! is created and whenever a changed database is closed. One of the goals of
//! this implementation is to have minimal dependencies.
//!
//! Status codes are OS error numbers, plus [`NOT_FOUND`][NOT_FOUND] for absent
//! keys and exhausted cursors.
//!
//! [NOT_FOUND]: self::NOT_FOUND

mod file;
mod table;

use self::table::Table;
use crate::{CursorMode, DbType, Engine, EnvFlags, OpenFlags, StatusCode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Status for an absent key or an exhausted cursor. Same value as Berkeley DB's
/// `DB_NOTFOUND`.
pub const NOT_FOUND: StatusCode = StatusCode(-30988);

/// Configuration of the in-memory engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Config {
    /// Permissions for new database files when the caller passes a mode of 0
    /// and no environment mode applies. Subject to the process umask.
    pub default_mode: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_mode: 0o660,
        }
    }
}

/// Handle to the in-memory engine.
#[derive(Debug, Clone, Default)]
pub struct MemEngine {
    config: Config,
}

impl MemEngine {
    /// Engine with the given configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

type SharedTable = Arc<Mutex<Table>>;

/// Tables shared by all databases of one environment, keyed by file path. The
/// pool does not keep tables alive by itself.
#[derive(Debug, Default)]
struct MemoryPool {
    tables: Mutex<HashMap<PathBuf, Weak<Mutex<Table>>>>,
}

impl MemoryPool {
    fn lookup(&self, path: &Path) -> Option<SharedTable> {
        self.tables.lock().get(path).and_then(Weak::upgrade)
    }

    fn insert(&self, path: PathBuf, table: &SharedTable) {
        let mut tables = self.tables.lock();
        tables.retain(|_, table| table.strong_count() > 0);
        tables.insert(path, Arc::downgrade(table));
    }
}

/// Context of an opened environment, copied into each database created in it.
#[derive(Debug, Clone)]
struct EnvContext {
    home: PathBuf,
    mode: u32,
    pool: Option<Arc<MemoryPool>>,
}

/// Native environment handle.
#[derive(Debug)]
pub struct MemEnv {
    /// `None` until the environment is opened.
    context: Option<EnvContext>,
}

/// State of a database after a successful open.
#[derive(Debug)]
struct OpenDb {
    table: SharedTable,

    /// Backing file; `None` for an anonymous database.
    path: Option<PathBuf>,

    flags: OpenFlags,
}

/// Native database handle.
#[derive(Debug)]
pub struct MemDb {
    env: Option<EnvContext>,
    open: Option<OpenDb>,
}

/// Native cursor handle.
#[derive(Debug)]
pub struct MemCursor {
    table: SharedTable,

    /// Slot of the entry the cursor is positioned at, if any.
    position: Option<Vec<u8>>,
}

fn resolve(env: &Option<EnvContext>, file: &Path) -> PathBuf {
    match env {
        Some(ctx) if file.is_relative() => ctx.home.join(file),
        _ => file.to_path_buf(),
    }
}

/// Fails unless a database of `requested` type may be opened on a table of
/// the given type.
fn check_type(requested: DbType, table: &Table) -> Result<(), StatusCode> {
    if requested == DbType::Unknown || requested == table.db_type() {
        Ok(())
    } else {
        Err(StatusCode::EINVAL)
    }
}

fn opened(db: &MemDb) -> Result<&OpenDb, StatusCode> {
    db.open.as_ref().ok_or(StatusCode::EINVAL)
}

fn writable(db: &MemDb) -> Result<&OpenDb, StatusCode> {
    let open = opened(db)?;
    if open.flags.contains(OpenFlags::RDONLY) {
        Err(StatusCode::EACCES)
    } else {
        Ok(open)
    }
}

impl MemEngine {
    /// Loads the table stored at `path`, or creates the file if allowed.
    fn load_or_create(
        &self,
        env: &Option<EnvContext>,
        path: &Path,
        db_type: DbType,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Table, StatusCode> {
        let exists = match path.metadata() {
            Ok(_) => true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => return Err(err.into()),
        };

        if exists {
            if flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) {
                return Err(StatusCode::EEXIST);
            }
            let mut table = file::load(path)?;
            check_type(db_type, &table)?;
            if flags.contains(OpenFlags::TRUNCATE) {
                table = Table::new(table.db_type());
                file::store(path, &table)?;
            }
            Ok(table)
        } else {
            if !flags.contains(OpenFlags::CREATE) || flags.contains(OpenFlags::RDONLY) {
                return Err(StatusCode::ENOENT);
            }
            if db_type == DbType::Unknown {
                return Err(StatusCode::EINVAL);
            }
            let env_mode = env.as_ref().map_or(0, |ctx| ctx.mode);
            let mode = [mode, env_mode, self.config.default_mode]
                .iter()
                .copied()
                .find(|&mode| mode != 0)
                .unwrap_or(self.config.default_mode);
            let table = Table::new(db_type);
            file::create(path, mode, &table)?;
            debug!(path = %path.display(), mode, "created database file");
            Ok(table)
        }
    }

    /// Opens a table through the environment's memory pool, sharing the table
    /// with other databases that have the same file open.
    fn open_pooled(
        &self,
        env: &Option<EnvContext>,
        pool: &MemoryPool,
        path: &Path,
        db_type: DbType,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<SharedTable, StatusCode> {
        if let Some(shared) = pool.lookup(path) {
            if flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) {
                return Err(StatusCode::EEXIST);
            }
            {
                let mut table = shared.lock();
                check_type(db_type, &table)?;
                if flags.contains(OpenFlags::TRUNCATE) {
                    table.clear();
                }
            }
            return Ok(shared);
        }
        let shared = Arc::new(Mutex::new(self.load_or_create(env, path, db_type, flags, mode)?));
        pool.insert(path.to_path_buf(), &shared);
        Ok(shared)
    }

    /// Writes a changed table back to its file.
    fn flush(&self, open: &OpenDb) -> Result<(), StatusCode> {
        let path = match &open.path {
            Some(path) if !open.flags.contains(OpenFlags::RDONLY) => path,
            _ => return Ok(()),
        };
        let mut table = open.table.lock();
        if table.is_dirty() {
            file::store(path, &table)?;
            table.mark_clean();
            debug!(path = %path.display(), entries = table.len(), "flushed database file");
        }
        Ok(())
    }
}

impl Engine for MemEngine {
    type Env = MemEnv;
    type Db = MemDb;
    type Cursor = MemCursor;

    const NOT_FOUND: StatusCode = NOT_FOUND;

    fn library_version(&self) -> String {
        format!("in-memory engine, file format {}", file::FORMAT_VERSION)
    }

    fn strerror(&self, status: StatusCode) -> String {
        match status.code() {
            0 => "Successful return: 0".to_string(),
            _ if status == NOT_FOUND => "DB_NOTFOUND: No matching key/data pair found".to_string(),
            code if code > 0 => io::Error::from_raw_os_error(code).to_string(),
            code => format!("Unknown error: {}", code),
        }
    }

    fn env_create(&self) -> Result<Self::Env, StatusCode> {
        Ok(MemEnv { context: None })
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
        // Databases keep their own reference to the pool.
        Ok(())
    }

    fn db_create(&self, env: Option<&Self::Env>) -> Result<Self::Db, StatusCode> {
        let env = match env {
            Some(env) => Some(env.context.clone().ok_or(StatusCode::EINVAL)?),
            None => None,
        };
        Ok(MemDb { env, open: None })
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

        let (table, path) = match file {
            None => {
                if db_type == DbType::Unknown {
                    return Err(StatusCode::EINVAL);
                }
                (Arc::new(Mutex::new(Table::new(db_type))), None)
            }
            Some(file) => {
                let path = resolve(&db.env, file);
                let table = match &db.env {
                    Some(ctx) => {
                        let pool = ctx.pool.as_ref().ok_or(StatusCode::EINVAL)?;
                        let path = crate::canonical_file_path(&path)?;
                        self.open_pooled(&db.env, pool, &path, db_type, flags, mode)?
                    }
                    None => Arc::new(Mutex::new(
                        self.load_or_create(&None, &path, db_type, flags, mode)?,
                    )),
                };
                (table, Some(path))
            }
        };
        db.open = Some(OpenDb { table, path, flags });
        Ok(())
    }

    fn db_close(&self, db: Self::Db) -> Result<(), StatusCode> {
        match &db.open {
            Some(open) => self.flush(open),
            None => Ok(()),
        }
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
        writable(db)?.table.lock().put(key, value);
        Ok(())
    }

    fn db_get(&self, db: &Self::Db, key: &[u8]) -> Result<Vec<u8>, StatusCode> {
        opened(db)?
            .table
            .lock()
            .get(key)
            .map(<[u8]>::to_vec)
            .ok_or(NOT_FOUND)
    }

    fn db_del(&self, db: &Self::Db, key: &[u8]) -> Result<(), StatusCode> {
        if writable(db)?.table.lock().remove(key) {
            Ok(())
        } else {
            Err(NOT_FOUND)
        }
    }

    fn cursor_create(&self, db: &Self::Db) -> Result<Self::Cursor, StatusCode> {
        Ok(MemCursor {
            table: Arc::clone(&opened(db)?.table),
            position: None,
        })
    }

    fn cursor_get(
        &self,
        cursor: &mut Self::Cursor,
        mode: CursorMode,
    ) -> Result<(Vec<u8>, Vec<u8>), StatusCode> {
        let entry = cursor
            .table
            .lock()
            .seek(cursor.position.as_deref(), mode)
            .ok_or(NOT_FOUND)?;
        cursor.position = Some(entry.slot);
        Ok((entry.key, entry.value))
    }

    fn cursor_close(&self, _cursor: Self::Cursor) -> Result<(), StatusCode> {
        Ok(())
    }
}
