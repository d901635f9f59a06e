//! Database handles.

use crate::cursor::Cursor;
use crate::env::{Environment, EnvironmentId};
use crate::error::{HandleKind, Result, TranslateStatus};
use crate::handle::{HandleGuard, HandleState};
use crate::{DbType, Engine, OpenFlags};
use std::path::Path;
use tracing::{debug, warn};

/// Handle to one named storage unit of the engine.
///
/// # Lifecycle
/// A database starts out unopened. [`open`][open] may be called at most once
/// per handle; a failed attempt still counts, so retrying requires a new
/// handle. [`close`][close], [`remove`][remove] and [`rename`][rename] all end
/// the life of the handle, whether or not the engine call succeeds; after
/// that, every operation fails with
/// [`Error::Closed`][Closed]`(`[`HandleKind::Database`][Database]`)` without
/// calling the engine.
///
/// Point operations on a handle that has not been opened are passed to the
/// engine, which rejects them.
///
/// A handle that is dropped while still live is closed, and any error from
/// that is logged.
///
/// [open]: self::Database::open
/// [close]: self::Database::close
/// [remove]: self::Database::remove
/// [rename]: self::Database::rename
/// [Closed]: crate::Error::Closed
/// [Database]: crate::HandleKind::Database
#[derive(Debug)]
pub struct Database<E: Engine> {
    engine: E,
    environment: Option<EnvironmentId>,
    guard: HandleGuard<E::Db>,
}

impl<E: Engine> Database<E> {
    /// Allocates a standalone database handle.
    pub fn create(engine: &E) -> Result<Self> {
        let native = engine.db_create(None).translate(engine)?;
        Ok(Self {
            engine: engine.clone(),
            environment: None,
            guard: HandleGuard::unopened(HandleKind::Database, native),
        })
    }

    /// Allocates a database handle inside an environment. Relative file names
    /// given to the handle are then resolved by the engine within the
    /// environment, and the database shares the environment's context.
    ///
    /// The handle only remembers the environment's id; the environment may be
    /// closed independently.
    pub fn create_in(env: &Environment<E>) -> Result<Self> {
        let (engine, native_env) = env.native()?;
        let native = engine.db_create(Some(native_env)).translate(engine)?;
        Ok(Self {
            engine: engine.clone(),
            environment: Some(env.id()),
            guard: HandleGuard::unopened(HandleKind::Database, native),
        })
    }

    /// Opens the database stored in `file`, creating new files with the
    /// engine's default permissions. An empty path requests an anonymous,
    /// in-memory database if the engine supports one.
    pub fn open(&mut self, file: impl AsRef<Path>, db_type: DbType, flags: OpenFlags) -> Result<()> {
        self.open_with_mode(file, db_type, flags, 0)
    }

    /// Like [`open`][open], with explicit permission bits for a newly created
    /// file. A `mode` of 0 requests the engine default (owner read/write,
    /// group read, after a typical umask). The process umask applies.
    ///
    /// [open]: self::Database::open
    pub fn open_with_mode(
        &mut self,
        file: impl AsRef<Path>,
        db_type: DbType,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<()> {
        let file = file.as_ref();
        let native = self.guard.begin_open()?;
        debug!(file = %file.display(), ?db_type, ?flags, mode, "opening database");
        let file = if file.as_os_str().is_empty() {
            None
        } else {
            Some(file)
        };
        self.engine
            .db_open(native, file, db_type, flags, mode)
            .translate(&self.engine)?;
        Ok(())
    }

    /// Closes the database, flushing it to its file.
    pub fn close(&mut self) -> Result<()> {
        let native = self.guard.release()?;
        debug!("closing database");
        self.engine.db_close(native).translate(&self.engine)?;
        Ok(())
    }

    /// The flags the database was opened with.
    pub fn flags(&self) -> Result<OpenFlags> {
        let native = self.guard.check_live()?;
        Ok(self.engine.db_open_flags(native).translate(&self.engine)?)
    }

    /// Deletes the database file `file`. The engine only allows this on a
    /// handle that was never opened; the handle is used up either way.
    pub fn remove(&mut self, file: impl AsRef<Path>) -> Result<()> {
        let file = file.as_ref();
        let native = self.guard.release()?;
        debug!(file = %file.display(), "removing database");
        self.engine.db_remove(native, file).translate(&self.engine)?;
        Ok(())
    }

    /// Renames the database file `old` to `new`. The engine only allows this
    /// on a handle that was never opened; the handle is used up either way.
    pub fn rename(&mut self, old: impl AsRef<Path>, new: impl AsRef<Path>) -> Result<()> {
        let (old, new) = (old.as_ref(), new.as_ref());
        let native = self.guard.release()?;
        debug!(old = %old.display(), new = %new.display(), "renaming database");
        self.engine
            .db_rename(native, old, new)
            .translate(&self.engine)?;
        Ok(())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let native = self.guard.check_live()?;
        self.engine
            .db_put(native, key.as_ref(), value.as_ref())
            .translate(&self.engine)?;
        Ok(())
    }

    /// Returns the value stored under `key`. An absent key is reported as the
    /// engine's "not found" error; see [`Error::is_not_found`][is_not_found].
    ///
    /// [is_not_found]: crate::Error::is_not_found
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        let native = self.guard.check_live()?;
        Ok(self
            .engine
            .db_get(native, key.as_ref())
            .translate(&self.engine)?)
    }

    /// Deletes the entry for `key`. Deleting an absent key is reported as the
    /// engine's "not found" error.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let native = self.guard.check_live()?;
        self.engine
            .db_del(native, key.as_ref())
            .translate(&self.engine)?;
        Ok(())
    }

    /// Creates an unpositioned cursor over the database.
    ///
    /// The cursor borrows the database, so the database cannot be closed,
    /// removed or renamed while the cursor exists:
    ///
    /// ```compile_fail
    /// # use kvgate::in_mem::MemEngine;
    /// # use kvgate::{Database, DbType, OpenFlags};
    /// let mut db = Database::create(&MemEngine::default()).unwrap();
    /// db.open("", DbType::Btree, OpenFlags::CREATE).unwrap();
    /// let cursor = db.cursor().unwrap();
    /// db.close().unwrap();
    /// drop(cursor);
    /// ```
    pub fn cursor(&self) -> Result<Cursor<'_, E>> {
        let native = self.guard.check_live()?;
        let native_cursor = self
            .engine
            .cursor_create(native)
            .translate(&self.engine)?;
        debug!("created cursor");
        Ok(Cursor::new(&self.engine, native_cursor))
    }

    /// Id of the environment the handle was created in, if any.
    pub fn environment_id(&self) -> Option<EnvironmentId> {
        self.environment
    }

    /// Where the handle is in its lifecycle.
    pub fn state(&self) -> HandleState {
        self.guard.state()
    }
}

impl<E: Engine> Drop for Database<E> {
    fn drop(&mut self) {
        if let Some(native) = self.guard.take() {
            if let Err(err) = self.engine.db_close(native).translate(&self.engine) {
                warn!(kind = %self.guard.kind(), %err, "failed to release dropped handle");
            }
        }
    }
}
