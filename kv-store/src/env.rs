//! Environment handles: shared engine contexts that databases can be created
//! in.

use crate::error::{HandleKind, Result, TranslateStatus};
use crate::handle::{HandleGuard, HandleState};
use crate::{Engine, EnvFlags};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static NEXT_ENVIRONMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an [`Environment`][Environment]. Databases
/// created in an environment remember its id, without keeping the environment
/// alive.
///
/// [Environment]: self::Environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnvironmentId(u64);

/// Handle to a shared engine context.
///
/// An environment is created, opened once and closed once. Databases are
/// attached to it with [`Database::create_in`][create_in]; the environment
/// does not track them, and closing it does not close them.
///
/// [create_in]: crate::Database::create_in
#[derive(Debug)]
pub struct Environment<E: Engine> {
    engine: E,
    id: EnvironmentId,
    guard: HandleGuard<E::Env>,
}

impl<E: Engine> Environment<E> {
    /// Allocates an unopened environment handle.
    pub fn create(engine: &E) -> Result<Self> {
        let native = engine.env_create().translate(engine)?;
        Ok(Self {
            engine: engine.clone(),
            id: EnvironmentId(NEXT_ENVIRONMENT_ID.fetch_add(1, Ordering::Relaxed)),
            guard: HandleGuard::unopened(HandleKind::Environment, native),
        })
    }

    /// Initializes the environment's shared context, rooted at the directory
    /// `home`. `mode` sets the permissions of files the engine creates for the
    /// environment; 0 requests the engine default.
    ///
    /// An environment can be opened at most once, even if the attempt fails.
    pub fn open(&mut self, home: impl AsRef<Path>, flags: EnvFlags, mode: u32) -> Result<()> {
        let home = home.as_ref();
        let native = self.guard.begin_open()?;
        debug!(home = %home.display(), ?flags, mode, "opening environment");
        self.engine
            .env_open(native, home, flags, mode)
            .translate(&self.engine)?;
        Ok(())
    }

    /// Closes the environment. The handle is unusable afterwards, even if the
    /// engine reports an error.
    pub fn close(&mut self) -> Result<()> {
        let native = self.guard.release()?;
        debug!(id = self.id.0, "closing environment");
        self.engine.env_close(native).translate(&self.engine)?;
        Ok(())
    }

    /// The id databases created in this environment record.
    pub fn id(&self) -> EnvironmentId {
        self.id
    }

    /// Where the handle is in its lifecycle.
    pub fn state(&self) -> HandleState {
        self.guard.state()
    }

    /// Engine and native handle for creating a database in this environment.
    pub(crate) fn native(&self) -> Result<(&E, &E::Env)> {
        Ok((&self.engine, self.guard.check_live()?))
    }
}

impl<E: Engine> Drop for Environment<E> {
    fn drop(&mut self) {
        if let Some(native) = self.guard.take() {
            if let Err(err) = self.engine.env_close(native).translate(&self.engine) {
                warn!(kind = %self.guard.kind(), %err, "failed to release dropped handle");
            }
        }
    }
}
