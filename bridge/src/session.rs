///
/// Database session lifecycle.
///
/// A `Session` owns at most one open connection to the engine. Opening
/// acquires the connection token, `handle` hands it out for invocations
/// that touch storage, and `close` releases it exactly once. Every
/// operation on a closed session is `NotOpen`. Dropping an unclosed
/// session closes the connection as a backstop.
///
/// A process that follows the one-connection model holds a single
/// session for its lifetime; nothing here is ambient global state, so
/// tests can run isolated sessions side by side.
///

use std::sync::Arc;

use tracing::debug;

use crate::engine::{DbHandle, EngineApi};
use crate::error::BridgeError;

pub struct Session {
    engine: Arc<dyn EngineApi>,
    db: Option<DbHandle>,
}

impl Session {
    /// Opens the connection. `EngineUnavailable` if the engine cannot
    /// provide one.
    pub fn open(engine: Arc<dyn EngineApi>) -> Result<Self, BridgeError> {
        let db = engine.open_db()?;
        debug!(db = db.raw(), "session opened");
        Ok(Self {
            engine,
            db: Some(db),
        })
    }

    pub fn engine(&self) -> &Arc<dyn EngineApi> {
        &self.engine
    }

    /// The current connection token.
    pub fn handle(&self) -> Result<DbHandle, BridgeError> {
        self.db.ok_or(BridgeError::NotOpen)
    }

    pub fn is_open(&self) -> bool {
        self.db.is_some()
    }

    /// Releases the connection. A second close is `NotOpen`.
    pub fn close(&mut self) -> Result<(), BridgeError> {
        let db = self.db.take().ok_or(BridgeError::NotOpen)?;
        debug!(db = db.raw(), "session closed");
        self.engine.close_db(db)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(db) = self.db.take() {
            debug!(db = db.raw(), "session closed on drop");
            let _ = self.engine.close_db(db);
        }
    }
}
