//! An engine that stores nothing and counts the calls made to it, for
//! checking which handle operations reach the engine.

use crate::{CursorMode, DbType, Engine, EnvFlags, OpenFlags, StatusCode};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Clones share one call counter.
#[derive(Debug, Clone, Default)]
pub(crate) struct CountingEngine {
    calls: Arc<AtomicUsize>,
}

impl CountingEngine {
    /// Number of engine calls made so far through any clone.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Engine for CountingEngine {
    type Env = ();
    type Db = ();
    type Cursor = ();

    const NOT_FOUND: StatusCode = StatusCode(-1);

    fn library_version(&self) -> String {
        self.record();
        "counting".to_string()
    }

    fn strerror(&self, status: StatusCode) -> String {
        self.record();
        format!("status {}", status)
    }

    fn env_create(&self) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }

    fn env_open(&self, _env: &mut (), _home: &Path, _flags: EnvFlags, _mode: u32) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }

    fn env_close(&self, _env: ()) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }

    fn db_create(&self, _env: Option<&()>) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }

    fn db_open(
        &self,
        _db: &mut (),
        _file: Option<&Path>,
        _db_type: DbType,
        _flags: OpenFlags,
        _mode: u32,
    ) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }

    fn db_close(&self, _db: ()) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }

    fn db_open_flags(&self, _db: &()) -> Result<OpenFlags, StatusCode> {
        self.record();
        Ok(OpenFlags::empty())
    }

    fn db_remove(&self, _db: (), _file: &Path) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }

    fn db_rename(&self, _db: (), _old: &Path, _new: &Path) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }

    fn db_put(&self, _db: &(), _key: &[u8], _value: &[u8]) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }

    fn db_get(&self, _db: &(), _key: &[u8]) -> Result<Vec<u8>, StatusCode> {
        self.record();
        Ok(Vec::new())
    }

    fn db_del(&self, _db: &(), _key: &[u8]) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }

    fn cursor_create(&self, _db: &()) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }

    fn cursor_get(&self, _cursor: &mut (), _mode: CursorMode) -> Result<(Vec<u8>, Vec<u8>), StatusCode> {
        self.record();
        Ok((Vec::new(), Vec::new()))
    }

    fn cursor_close(&self, _cursor: ()) -> Result<(), StatusCode> {
        self.record();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, Environment, Error, HandleKind};

    fn opened_db(engine: &CountingEngine) -> Database<CountingEngine> {
        let mut db = Database::create(engine).unwrap();
        db.open("db", DbType::Btree, OpenFlags::CREATE).unwrap();
        db
    }

    /// Runs every database operation and checks that each one is rejected as
    /// closed without an engine call.
    fn assert_database_closed(engine: &CountingEngine, db: &mut Database<CountingEngine>) {
        let before = engine.calls();
        let closed = Error::Closed(HandleKind::Database);
        assert_eq!(db.open("db", DbType::Btree, OpenFlags::CREATE), Err(closed.clone()));
        assert_eq!(
            db.open_with_mode("db", DbType::Hash, OpenFlags::CREATE, 0o600),
            Err(closed.clone())
        );
        assert_eq!(db.close(), Err(closed.clone()));
        assert_eq!(db.flags(), Err(closed.clone()));
        assert_eq!(db.remove("db"), Err(closed.clone()));
        assert_eq!(db.rename("db", "other"), Err(closed.clone()));
        assert_eq!(db.put("k", "v"), Err(closed.clone()));
        assert_eq!(db.get("k"), Err(closed.clone()));
        assert_eq!(db.delete("k"), Err(closed.clone()));
        assert_eq!(db.cursor().map(|_| ()), Err(closed));
        assert_eq!(engine.calls(), before);
    }

    #[test]
    fn closed_database_makes_no_engine_calls() {
        let engine = CountingEngine::default();
        let mut db = opened_db(&engine);
        db.close().unwrap();
        assert_database_closed(&engine, &mut db);
        drop(db);
        assert_eq!(engine.calls(), 3);
    }

    #[test]
    fn removed_database_makes_no_engine_calls() {
        let engine = CountingEngine::default();
        let mut db = Database::create(&engine).unwrap();
        db.remove("db").unwrap();
        assert_database_closed(&engine, &mut db);

        let mut db = opened_db(&engine);
        db.remove("db").unwrap();
        assert_database_closed(&engine, &mut db);
    }

    #[test]
    fn renamed_database_makes_no_engine_calls() {
        let engine = CountingEngine::default();
        let mut db = Database::create(&engine).unwrap();
        db.rename("db", "other").unwrap();
        assert_database_closed(&engine, &mut db);

        let mut db = opened_db(&engine);
        db.rename("db", "other").unwrap();
        assert_database_closed(&engine, &mut db);
    }

    #[test]
    fn second_open_makes_no_engine_call() {
        let engine = CountingEngine::default();
        let mut db = opened_db(&engine);
        let before = engine.calls();
        assert_eq!(
            db.open("db", DbType::Btree, OpenFlags::CREATE),
            Err(Error::AlreadyOpen(HandleKind::Database))
        );
        assert_eq!(engine.calls(), before);

        let mut env = Environment::create(&engine).unwrap();
        env.open("home", EnvFlags::CREATE, 0).unwrap();
        let before = engine.calls();
        assert_eq!(
            env.open("home", EnvFlags::CREATE, 0),
            Err(Error::AlreadyOpen(HandleKind::Environment))
        );
        assert_eq!(engine.calls(), before);
    }

    #[test]
    fn closed_environment_makes_no_engine_calls() {
        let engine = CountingEngine::default();
        let mut env = Environment::create(&engine).unwrap();
        env.open("home", EnvFlags::CREATE | EnvFlags::INIT_MPOOL, 0)
            .unwrap();
        env.close().unwrap();

        let before = engine.calls();
        let closed = Error::Closed(HandleKind::Environment);
        assert_eq!(env.open("home", EnvFlags::CREATE, 0), Err(closed.clone()));
        assert_eq!(env.close(), Err(closed.clone()));
        assert_eq!(Database::create_in(&env).map(|_| ()), Err(closed));
        drop(env);
        assert_eq!(engine.calls(), before);
    }

    #[test]
    fn closed_cursor_makes_no_engine_calls() {
        let engine = CountingEngine::default();
        let db = opened_db(&engine);
        let mut cursor = db.cursor().unwrap();
        cursor.close().unwrap();

        let before = engine.calls();
        let closed = Error::Closed(HandleKind::Cursor);
        for mode in [CursorMode::First, CursorMode::Last, CursorMode::Next, CursorMode::Prev].iter() {
            assert_eq!(cursor.move_to(*mode), Err(closed.clone()));
        }
        assert_eq!(cursor.close(), Err(closed.clone()));
        assert_eq!(cursor.iter_start().next(), Some(Err(closed.clone())));
        assert_eq!(cursor.iter().next(), Some(Err(closed)));
        drop(cursor);
        assert_eq!(engine.calls(), before);
    }
}
