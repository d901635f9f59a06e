//! Error taxonomy of the handle layer, and translation of engine status codes
//! into it.

use crate::Engine;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for handle operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Raw status code returned by an engine call. Zero means success; any other
/// value names a specific engine condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StatusCode(pub i32);

impl StatusCode {
    /// Status of a successful call.
    pub const SUCCESS: StatusCode = StatusCode(0);

    /// Invalid argument, or a call that is invalid in the handle's current
    /// engine-level state.
    pub const EINVAL: StatusCode = StatusCode(libc::EINVAL);

    /// File or directory does not exist.
    pub const ENOENT: StatusCode = StatusCode(libc::ENOENT);

    /// File already exists.
    pub const EEXIST: StatusCode = StatusCode(libc::EEXIST);

    /// Write attempted on a read-only database.
    pub const EACCES: StatusCode = StatusCode(libc::EACCES);

    /// Generic I/O failure.
    pub const EIO: StatusCode = StatusCode(libc::EIO);

    /// The raw code.
    pub fn code(self) -> i32 {
        self.0
    }

    /// Whether the code denotes success.
    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Status equivalent of an I/O error: its OS error number, or `EIO` when
    /// the error did not come from the OS.
    pub fn from_io(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => StatusCode(code),
            None => match err.kind() {
                io::ErrorKind::NotFound => StatusCode::ENOENT,
                io::ErrorKind::AlreadyExists => StatusCode::EEXIST,
                io::ErrorKind::PermissionDenied => StatusCode::EACCES,
                io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => StatusCode::EINVAL,
                _ => StatusCode::EIO,
            },
        }
    }
}

impl From<io::Error> for StatusCode {
    fn from(src: io::Error) -> Self {
        StatusCode::from_io(&src)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Failure reported by the engine: the raw code together with the engine's
/// own description of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("{code}: {message}")]
pub struct EngineError {
    code: i32,
    message: String,
    not_found: bool,
}

impl EngineError {
    /// Builds the error for `status` as described by `engine`.
    pub fn from_status<E: Engine>(engine: &E, status: StatusCode) -> Self {
        Self {
            code: status.code(),
            message: engine.strerror(status),
            not_found: status == E::NOT_FOUND,
        }
    }

    /// The raw engine status code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The engine's description of the status code.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this is the engine's "not found" condition: an absent key, or a
    /// cursor that moved past either end of the database.
    pub fn is_not_found(&self) -> bool {
        self.not_found
    }
}

/// The kind of resource a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandleKind {
    Database,
    Environment,
    Cursor,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandleKind::Database => "database",
            HandleKind::Environment => "environment",
            HandleKind::Cursor => "cursor",
        })
    }
}

/// Error returned by handle operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum Error {
    /// The handle was already closed, removed or renamed. No engine call was
    /// made.
    #[error("{0} handle is closed")]
    Closed(HandleKind),

    /// `open` was called on a handle that has already recorded an open
    /// attempt. No engine call was made.
    #[error("{0} handle has already been opened")]
    AlreadyOpen(HandleKind),

    /// The engine reported a failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl Error {
    /// Whether this is the engine's "not found" condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Engine(err) => err.is_not_found(),
            _ => false,
        }
    }

    /// The engine failure, if this is one.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Error::Engine(err) => Some(err),
            _ => None,
        }
    }
}

/// Maps an engine status code to success or to a structured engine error.
pub fn translate<E: Engine>(engine: &E, status: StatusCode) -> Result<(), EngineError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(EngineError::from_status(engine, status))
    }
}

/// Translation of the status carried by an engine call's result.
pub(crate) trait TranslateStatus<T> {
    fn translate<E: Engine>(self, engine: &E) -> Result<T, EngineError>;
}

impl<T> TranslateStatus<T> for Result<T, StatusCode> {
    fn translate<E: Engine>(self, engine: &E) -> Result<T, EngineError> {
        self.map_err(|status| EngineError::from_status(engine, status))
    }
}
