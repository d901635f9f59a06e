//! Cursor handles for sequential access to a database.

use crate::error::{HandleKind, Result, TranslateStatus};
use crate::handle::HandleGuard;
use crate::iter::CursorIter;
use crate::{CursorMode, Engine};
use tracing::{debug, warn};

/// Iteration position inside one database, created by
/// [`Database::cursor`][cursor].
///
/// A cursor borrows the database it was created from, so it can never outlive
/// the database's native handle. Once [`close`][close] has been called, every
/// operation fails with [`Error::Closed`][Closed]`(`[`HandleKind::Cursor`][kind]`)`.
///
/// The order in which entries are visited is defined by the engine and the
/// database type, e.g. ascending key order for a B-tree.
///
/// [cursor]: crate::Database::cursor
/// [close]: self::Cursor::close
/// [Closed]: crate::Error::Closed
/// [kind]: crate::HandleKind::Cursor
#[derive(Debug)]
pub struct Cursor<'db, E: Engine> {
    engine: &'db E,
    guard: HandleGuard<E::Cursor>,
}

impl<'db, E: Engine> Cursor<'db, E> {
    pub(crate) fn new(engine: &'db E, native: E::Cursor) -> Self {
        Self {
            engine,
            guard: HandleGuard::opened(HandleKind::Cursor, native),
        }
    }

    /// Repositions the cursor and returns the key-value pair at the new
    /// position.
    ///
    /// Moving past either end of the database returns the engine's "not
    /// found" error (see [`Error::is_not_found`][is_not_found]), which is the
    /// normal way for a scan to end.
    ///
    /// [is_not_found]: crate::Error::is_not_found
    pub fn move_to(&mut self, mode: CursorMode) -> Result<(Vec<u8>, Vec<u8>)> {
        let native = self.guard.check_live_mut()?;
        Ok(self.engine.cursor_get(native, mode).translate(self.engine)?)
    }

    /// Closes the cursor.
    pub fn close(&mut self) -> Result<()> {
        let native = self.guard.release()?;
        debug!("closing cursor");
        self.engine.cursor_close(native).translate(self.engine)?;
        Ok(())
    }

    /// Whether [`close`][close] has been called.
    ///
    /// [close]: self::Cursor::close
    pub fn is_closed(&self) -> bool {
        self.guard.check_live().is_err()
    }

    /// Iterator over the entries from the first one onwards, regardless of
    /// the cursor's current position.
    pub fn iter_start(&mut self) -> CursorIter<'_, 'db, E> {
        CursorIter::iter_start(self)
    }

    /// Iterator over the entries after the cursor's current position. An
    /// unpositioned cursor starts from the first entry.
    pub fn iter(&mut self) -> CursorIter<'_, 'db, E> {
        CursorIter::iter(self)
    }
}

impl<'db, E: Engine> Drop for Cursor<'db, E> {
    fn drop(&mut self) {
        if let Some(native) = self.guard.take() {
            if let Err(err) = self.engine.cursor_close(native).translate(self.engine) {
                warn!(kind = %self.guard.kind(), %err, "failed to release dropped handle");
            }
        }
    }
}
