//! This module provides an iterator type that wraps a [`Cursor`][Cursor],
//! turning the "move until not found" scan protocol into a plain Rust
//! iterator.
//!
//! [Cursor]: crate::Cursor

use crate::{Cursor, CursorMode, Engine, Result};
use std::iter::FusedIterator;

/// State held by the iterator in addition to the cursor's own position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum IterState {
    /// In this state, the iterator's next operation should be to move the
    /// cursor to the first entry in the database.
    MoveToFirst,

    /// In this state, the iterator's next operation should be to move the
    /// cursor to the next entry in the database.
    MoveToNext,

    /// In this state, the iterator has terminated and should not produce any
    /// more items. This can be due to normal termination or an error.
    Finished,
}

/// Iterator type that wraps a database cursor.
///
/// Each item is a copied key-value pair. The iteration ends when the cursor
/// reports the engine's "not found" condition; any other error is yielded
/// once, after which the iterator is finished.
///
/// # Parameters
/// - `'cursor`: Lifetime for the wrapped cursor reference.
/// - `'db`: Lifetime of the database the cursor belongs to.
/// - `E`: Engine type.
#[derive(Debug)]
pub struct CursorIter<'cursor, 'db, E: Engine> {
    /// The wrapped cursor.
    cursor: &'cursor mut Cursor<'db, E>,

    /// Extra state information for the iterator.
    state: IterState,
}

impl<'cursor, 'db, E: Engine> CursorIter<'cursor, 'db, E> {
    /// Wraps the specified cursor in an iterator that starts iteration after
    /// the cursor's current position. If the cursor is unpositioned, iteration
    /// will start with the first entry in the database.
    pub fn iter(cursor: &'cursor mut Cursor<'db, E>) -> Self {
        Self {
            cursor,
            state: IterState::MoveToNext,
        }
    }

    /// Similar to [`iter`][iter], except iteration starts at the first entry
    /// in the database regardless of the cursor's current position.
    ///
    /// [iter]: self::CursorIter::iter
    pub fn iter_start(cursor: &'cursor mut Cursor<'db, E>) -> Self {
        Self {
            cursor,
            state: IterState::MoveToFirst,
        }
    }
}

impl<'cursor, 'db, E: Engine> Iterator for CursorIter<'cursor, 'db, E> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mode = match self.state {
            IterState::MoveToFirst => CursorMode::First,
            IterState::MoveToNext => CursorMode::Next,
            IterState::Finished => return None,
        };
        match self.cursor.move_to(mode) {
            Ok(entry) => {
                self.state = IterState::MoveToNext;
                Some(Ok(entry))
            }
            Err(err) if err.is_not_found() => {
                self.state = IterState::Finished;
                None
            }
            Err(err) => {
                self.state = IterState::Finished;
                Some(Err(err))
            }
        }
    }
}

impl<'cursor, 'db, E: Engine> FusedIterator for CursorIter<'cursor, 'db, E> {}
