//! This crate provides a handle-management layer in front of an embedded
//! key-value storage engine in the style of [Berkeley DB][bdb].
//!
//! The storage engine itself is an external collaborator, reached through the
//! narrow synchronous call interface described by the [`Engine`][Engine]
//! trait. On top of it, this crate governs three resource handles:
//!
//! - [`Environment`][Environment]: a shared engine context that several
//!   databases may be created in.
//! - [`Database`][Database]: one named storage unit, with point operations.
//! - [`Cursor`][Cursor]: an iteration position inside one database.
//!
//! Every handle enforces the same lifecycle (a handle is opened at most once,
//! and is unusable after it is closed, removed or renamed), and every engine
//! status code is translated into the structured [`Error`][Error] type before
//! it reaches the caller.
//!
//! Two engine implementations are provided. One is an in-memory engine whose
//! named databases are persisted to plain files, and the other is a wrapper
//! around LMDB. They are selected through Cargo features; the in-memory engine
//! is enabled by default.
//!
//! ```
//! # #[cfg(feature = "in_mem_impl")]
//! # fn main() -> Result<(), kvgate::Error> {
//! use kvgate::in_mem::MemEngine;
//! use kvgate::{Database, DbType, OpenFlags};
//!
//! let engine = MemEngine::default();
//! let mut db = Database::create(&engine)?;
//! db.open("", DbType::Btree, OpenFlags::CREATE)?;
//! db.put("key", "value")?;
//! assert_eq!(db.get("key")?, b"value");
//! db.close()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "in_mem_impl"))]
//! # fn main() {}
//! ```
//!
//! [bdb]: https://www.oracle.com/database/technologies/related/berkeleydb.html
//! [Engine]: self::Engine
//! [Environment]: self::Environment
//! [Database]: self::Database
//! [Cursor]: self::Cursor
//! [Error]: self::Error

use std::fmt::Debug;
use std::path::Path;
#[cfg(any(feature = "in_mem_impl", feature = "lmdb_impl"))]
use std::path::PathBuf;

pub mod cursor;
pub mod db;
pub mod env;
pub mod error;
mod handle;
#[cfg(feature = "in_mem_impl")]
pub mod in_mem;
pub mod iter;
#[cfg(feature = "lmdb_impl")]
pub mod lmdb;

pub use crate::cursor::Cursor;
pub use crate::db::Database;
pub use crate::env::{Environment, EnvironmentId};
pub use crate::error::{translate, EngineError, Error, HandleKind, Result, StatusCode};
pub use crate::handle::HandleState;

/// Storage method of a database. The discriminants are passed through to the
/// engine verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum DbType {
    /// Sorted, balanced tree.
    Btree = 1,

    /// Extended linear hashing.
    Hash = 2,

    /// Record-number keyed storage.
    Recno = 3,

    /// Fixed-length record queue.
    Queue = 4,

    /// Use whatever type an existing database file was created with.
    Unknown = 5,
}

impl DbType {
    /// Converts a raw discriminant back into a database type.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(DbType::Btree),
            2 => Some(DbType::Hash),
            3 => Some(DbType::Recno),
            4 => Some(DbType::Queue),
            5 => Some(DbType::Unknown),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// Options for opening a database.
    pub struct OpenFlags: u32 {
        /// Create the database file if it does not exist.
        const CREATE = 0x0000_0001;

        /// Together with `CREATE`, fail if the database file already exists.
        const EXCL = 0x0000_0004;

        /// Open the database for reading only.
        const RDONLY = 0x0000_0400;

        /// Discard the existing contents of the database file.
        const TRUNCATE = 0x0004_0000;
    }
}

bitflags::bitflags! {
    /// Options for opening an environment.
    pub struct EnvFlags: u32 {
        /// Create the shared regions of the environment if they do not exist.
        const CREATE = 0x0000_0001;

        /// Initialize the shared memory pool used by databases created in the
        /// environment.
        const INIT_MPOOL = 0x0000_0400;
    }
}

/// Direction in which [`Cursor::move_to`][move_to] repositions a cursor. The
/// discriminants are passed through to the engine verbatim.
///
/// [move_to]: crate::Cursor::move_to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum CursorMode {
    /// Move to the first entry.
    First = 7,

    /// Move to the last entry.
    Last = 15,

    /// Move to the entry after the current one. An unpositioned cursor moves
    /// to the first entry.
    Next = 16,

    /// Move to the entry before the current one. An unpositioned cursor moves
    /// to the last entry.
    Prev = 23,
}

/// The call interface of the storage engine that the handles in this crate
/// sit in front of.
///
/// Every call returns a [`StatusCode`][StatusCode] on failure; the handles
/// translate it into an [`EngineError`][EngineError] using
/// [`strerror`][strerror]. The native handle types are opaque to this crate.
/// Calls that end the life of a native handle take it by value, so a handle
/// can never be released twice.
///
/// Engines are cheap to clone; a clone refers to the same engine instance.
///
/// [StatusCode]: crate::StatusCode
/// [EngineError]: crate::EngineError
/// [strerror]: self::Engine::strerror
pub trait Engine: Clone {
    /// Native environment handle.
    type Env: Debug;

    /// Native database handle.
    type Db: Debug;

    /// Native cursor handle.
    type Cursor: Debug;

    /// Status reported for an absent key or an exhausted cursor.
    const NOT_FOUND: StatusCode;

    /// Human-readable version of the engine library.
    fn library_version(&self) -> String;

    /// Human-readable description of a status code.
    fn strerror(&self, status: StatusCode) -> String;

    /// Allocates an environment handle.
    fn env_create(&self) -> Result<Self::Env, StatusCode>;

    /// Initializes the shared context of an environment rooted at `home`.
    fn env_open(
        &self,
        env: &mut Self::Env,
        home: &Path,
        flags: EnvFlags,
        mode: u32,
    ) -> Result<(), StatusCode>;

    /// Releases an environment handle.
    fn env_close(&self, env: Self::Env) -> Result<(), StatusCode>;

    /// Allocates a database handle, optionally inside an environment.
    fn db_create(&self, env: Option<&Self::Env>) -> Result<Self::Db, StatusCode>;

    /// Opens the database stored in `file`. `None` requests an anonymous
    /// database, if the engine supports one. A `mode` of 0 requests the
    /// engine's default permissions for newly created files.
    fn db_open(
        &self,
        db: &mut Self::Db,
        file: Option<&Path>,
        db_type: DbType,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<(), StatusCode>;

    /// Releases a database handle, flushing it if it was opened.
    fn db_close(&self, db: Self::Db) -> Result<(), StatusCode>;

    /// Flags the database was opened with.
    fn db_open_flags(&self, db: &Self::Db) -> Result<OpenFlags, StatusCode>;

    /// Deletes the database file `file`, consuming the handle.
    fn db_remove(&self, db: Self::Db, file: &Path) -> Result<(), StatusCode>;

    /// Renames the database file `old` to `new`, consuming the handle.
    fn db_rename(&self, db: Self::Db, old: &Path, new: &Path) -> Result<(), StatusCode>;

    /// Stores a key-value pair, replacing any previous value for the key.
    fn db_put(&self, db: &Self::Db, key: &[u8], value: &[u8]) -> Result<(), StatusCode>;

    /// Returns a copy of the value stored for `key`.
    fn db_get(&self, db: &Self::Db, key: &[u8]) -> Result<Vec<u8>, StatusCode>;

    /// Deletes the entry for `key`.
    fn db_del(&self, db: &Self::Db, key: &[u8]) -> Result<(), StatusCode>;

    /// Creates an unpositioned cursor over an opened database.
    fn cursor_create(&self, db: &Self::Db) -> Result<Self::Cursor, StatusCode>;

    /// Repositions a cursor and returns copies of the entry at the new
    /// position.
    fn cursor_get(
        &self,
        cursor: &mut Self::Cursor,
        mode: CursorMode,
    ) -> Result<(Vec<u8>, Vec<u8>), StatusCode>;

    /// Releases a cursor handle.
    fn cursor_close(&self, cursor: Self::Cursor) -> Result<(), StatusCode>;
}

/// Canonical form of a database file path, used to recognize one file opened
/// under different names. Works for files that do not exist yet as long as
/// their directory does.
#[cfg(any(feature = "in_mem_impl", feature = "lmdb_impl"))]
pub(crate) fn canonical_file_path(path: &Path) -> std::io::Result<PathBuf> {
    if path.exists() {
        return path.canonicalize();
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            Ok(parent.canonicalize()?.join(name))
        }
        _ => path.canonicalize(),
    }
}

/// Version of the engine library together with the version of this crate.
pub fn version<E: Engine>(engine: &E) -> String {
    format!(
        "{} (kvgate v{})",
        engine.library_version(),
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
pub(crate) mod test_util;
