//! StateStore — redb-backed checkpoint persistence.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing). Every mutation runs in a single write transaction, so the
//! check and the write of a compare-and-set are atomic.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Result of [`StateStore::start_new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new execution was written.
    Started(Checkpoint),
    /// A running instance already holds the id; nothing was written.
    AlreadyRunning(Checkpoint),
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    ///
    /// redb holds an exclusive lock on the file, so a second process
    /// cannot open the same store while this one is alive.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(CHECKPOINTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get the checkpoint for an instance id.
    pub fn get_checkpoint(&self, instance_id: &str) -> StateResult<Option<Checkpoint>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CHECKPOINTS).map_err(map_err!(Table))?;
        match table.get(instance_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let cp: Checkpoint =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(cp))
            }
            None => Ok(None),
        }
    }

    /// Status of an instance id; `NotFound` when no checkpoint exists.
    pub fn status(&self, instance_id: &str) -> StateResult<InstanceStatus> {
        Ok(self
            .get_checkpoint(instance_id)?
            .map(|cp| cp.status)
            .unwrap_or(InstanceStatus::NotFound))
    }

    /// List all checkpoints.
    pub fn list_checkpoints(&self) -> StateResult<Vec<Checkpoint>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CHECKPOINTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let cp: Checkpoint =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(cp);
        }
        Ok(results)
    }

    /// Insert or overwrite a checkpoint unconditionally.
    pub fn put_checkpoint(&self, cp: &Checkpoint) -> StateResult<()> {
        let value = serde_json::to_vec(cp).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CHECKPOINTS).map_err(map_err!(Table))?;
            table
                .insert(cp.table_key(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(instance_id = %cp.instance_id, "checkpoint stored");
        Ok(())
    }

    /// Start a new execution under `instance_id` unless one is running.
    ///
    /// A `Completed` instance is replaced by a fresh first execution.
    pub fn start_new(
        &self,
        orchestrator_name: &str,
        instance_id: &str,
        now_ms: u64,
    ) -> StateResult<StartOutcome> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome = {
            let mut table = txn.open_table(CHECKPOINTS).map_err(map_err!(Table))?;
            let existing: Option<Checkpoint> = match table.get(instance_id).map_err(map_err!(Read))? {
                Some(guard) => Some(
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                ),
                None => None,
            };
            match existing {
                Some(cp) if cp.is_running() => StartOutcome::AlreadyRunning(cp),
                _ => {
                    let cp = Checkpoint::new(orchestrator_name, instance_id, now_ms);
                    let value = serde_json::to_vec(&cp).map_err(map_err!(Serialize))?;
                    table
                        .insert(instance_id, value.as_slice())
                        .map_err(map_err!(Write))?;
                    StartOutcome::Started(cp)
                }
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%instance_id, started = matches!(outcome, StartOutcome::Started(_)), "start_new");
        Ok(outcome)
    }

    /// Move a running execution to `phase`.
    ///
    /// Fails with `Conflict` if the stored execution is not `expected_execution`.
    pub fn transition(
        &self,
        instance_id: &str,
        expected_execution: u64,
        phase: Phase,
        now_ms: u64,
    ) -> StateResult<Checkpoint> {
        self.update_running(instance_id, Some(expected_execution), |cp| {
            cp.phase = phase;
            cp.updated_at_ms = now_ms;
        })
    }

    /// Replace a running execution with a fresh one (`execution + 1`,
    /// phase `Started`). Nothing but the identity carries over.
    pub fn continue_as_new(
        &self,
        instance_id: &str,
        expected_execution: u64,
        now_ms: u64,
    ) -> StateResult<Checkpoint> {
        self.update_running(instance_id, Some(expected_execution), |cp| {
            cp.execution += 1;
            cp.phase = Phase::Started;
            cp.updated_at_ms = now_ms;
        })
    }

    /// Mark an instance `Completed`. Returns true if it was running.
    pub fn terminate(&self, instance_id: &str, now_ms: u64) -> StateResult<bool> {
        let result = self.update_running(instance_id, None, |cp| {
            cp.status = InstanceStatus::Completed;
            cp.updated_at_ms = now_ms;
        });
        match result {
            Ok(_) => {
                debug!(%instance_id, "instance terminated");
                Ok(true)
            }
            Err(StateError::NotFound(_) | StateError::NotRunning(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read-check-write a running checkpoint in one write transaction.
    ///
    /// With `expected_execution` set, a differing stored execution is a
    /// `Conflict`.
    fn update_running<F>(
        &self,
        instance_id: &str,
        expected_execution: Option<u64>,
        apply: F,
    ) -> StateResult<Checkpoint>
    where
        F: FnOnce(&mut Checkpoint),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated = {
            let mut table = txn.open_table(CHECKPOINTS).map_err(map_err!(Table))?;
            let mut cp: Checkpoint = match table.get(instance_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(instance_id.to_string())),
            };
            if !cp.is_running() {
                return Err(StateError::NotRunning(instance_id.to_string()));
            }
            if let Some(expected) = expected_execution
                && cp.execution != expected
            {
                return Err(StateError::Conflict {
                    instance_id: instance_id.to_string(),
                    expected,
                    found: cp.execution,
                });
            }
            apply(&mut cp);
            let value = serde_json::to_vec(&cp).map_err(map_err!(Serialize))?;
            table
                .insert(instance_id, value.as_slice())
                .map_err(map_err!(Write))?;
            cp
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(updated)
    }
}
