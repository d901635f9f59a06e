//! The lifecycle state machine shared by every handle type.

use crate::error::{Error, HandleKind};

/// Lifecycle state of a handle, as seen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandleState {
    /// Created, but no open attempt has been recorded.
    Unopened,

    /// An open attempt has been recorded. This does not imply that the attempt
    /// succeeded.
    Opened,

    /// Closed, removed or renamed. The native handle has been released.
    Closed,
}

/// Owner of one native engine handle. Every handle operation checks the guard
/// before calling the engine.
///
/// The native handle is held in an [`Option`][Option] that is cleared exactly
/// once, by [`release`][release]; after that, every check fails with
/// [`Error::Closed`][Closed] for the guard's handle kind.
///
/// [Option]: std::option::Option
/// [release]: self::HandleGuard::release
/// [Closed]: crate::Error::Closed
#[derive(Debug)]
pub(crate) struct HandleGuard<H> {
    kind: HandleKind,
    native: Option<H>,
    open_recorded: bool,
}

impl<H> HandleGuard<H> {
    /// Guard for a freshly created handle that still has to be opened.
    pub(crate) fn unopened(kind: HandleKind, native: H) -> Self {
        Self {
            kind,
            native: Some(native),
            open_recorded: false,
        }
    }

    /// Guard for a handle that is usable as soon as it is created.
    pub(crate) fn opened(kind: HandleKind, native: H) -> Self {
        Self {
            kind,
            native: Some(native),
            open_recorded: true,
        }
    }

    pub(crate) fn kind(&self) -> HandleKind {
        self.kind
    }

    pub(crate) fn state(&self) -> HandleState {
        match (&self.native, self.open_recorded) {
            (None, _) => HandleState::Closed,
            (Some(_), false) => HandleState::Unopened,
            (Some(_), true) => HandleState::Opened,
        }
    }

    /// The native handle, unless the handle is terminal.
    pub(crate) fn check_live(&self) -> Result<&H, Error> {
        self.native.as_ref().ok_or(Error::Closed(self.kind))
    }

    /// Mutable access to the native handle, unless the handle is terminal.
    pub(crate) fn check_live_mut(&mut self) -> Result<&mut H, Error> {
        let kind = self.kind;
        self.native.as_mut().ok_or(Error::Closed(kind))
    }

    /// Records an open attempt and hands out the native handle to open. Fails
    /// if the handle is terminal or an attempt was recorded before. The attempt
    /// stays recorded even if the engine then fails to open the handle.
    pub(crate) fn begin_open(&mut self) -> Result<&mut H, Error> {
        let kind = self.kind;
        if self.native.is_none() {
            return Err(Error::Closed(kind));
        }
        if self.open_recorded {
            return Err(Error::AlreadyOpen(kind));
        }
        self.open_recorded = true;
        self.native.as_mut().ok_or(Error::Closed(kind))
    }

    /// Moves the guard to its terminal state and hands out the native handle
    /// for release. Fails if the handle is already terminal.
    pub(crate) fn release(&mut self) -> Result<H, Error> {
        self.native.take().ok_or(Error::Closed(self.kind))
    }

    /// Like [`release`][release], but for use in `Drop`, where a terminal
    /// handle is not an error.
    ///
    /// [release]: self::HandleGuard::release
    pub(crate) fn take(&mut self) -> Option<H> {
        self.native.take()
    }
}
