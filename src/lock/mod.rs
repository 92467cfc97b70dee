//! Process-local reader/writer exclusion over the connector and its schema.
//!
//! The connector and the schema snapshot are updated together, so both sit
//! behind the same [`ConnectorLock`]. Handles are owned guards: release happens
//! exactly once, when the handle is dropped, on every exit path.
//!
//! This is not a distributed lock. Other nodes are not excluded.

pub mod deferred;

pub use deferred::{DeferredReleaseLock, PendingStep, PendingSteps, ReleaseSignal};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::connector::Connector;
use crate::schema::Schema;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {0:?} waiting for the connector lock")]
    Timeout(Duration),
}

struct Guarded {
    connector: Arc<dyn Connector>,
    schema: Arc<Schema>,
}

/// Shared handle to the lock. Cloning is cheap; all clones guard the same state.
#[derive(Clone)]
pub struct ConnectorLock {
    inner: Arc<RwLock<Guarded>>,
}

impl ConnectorLock {
    pub fn new(connector: Arc<dyn Connector>, schema: Schema) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Guarded {
                connector,
                schema: Arc::new(schema),
            })),
        }
    }

    /// Wait for exclusive access.
    pub async fn write(&self) -> WriteHandle {
        WriteHandle {
            guard: Arc::clone(&self.inner).write_owned().await,
        }
    }

    /// Wait for shared access. Excludes writers, admits other readers.
    pub async fn read(&self) -> ReadHandle {
        ReadHandle {
            guard: Arc::clone(&self.inner).read_owned().await,
        }
    }

    /// Like [`read`](Self::read) but gives up after `timeout`.
    pub async fn read_timeout(&self, timeout: Duration) -> Result<ReadHandle, LockError> {
        tokio::time::timeout(timeout, self.read())
            .await
            .map_err(|_| LockError::Timeout(timeout))
    }

    /// Exclusive access if nobody holds the lock right now.
    pub fn try_write(&self) -> Option<WriteHandle> {
        Arc::clone(&self.inner)
            .try_write_owned()
            .ok()
            .map(|guard| WriteHandle { guard })
    }

    /// Shared access if no writer holds the lock right now.
    pub fn try_read(&self) -> Option<ReadHandle> {
        Arc::clone(&self.inner)
            .try_read_owned()
            .ok()
            .map(|guard| ReadHandle { guard })
    }
}

/// Read access to what the lock guards. Implemented by both handle kinds so
/// that functions can demand "some lock is held" in their signature.
pub trait SchemaView {
    fn connector(&self) -> &Arc<dyn Connector>;
    fn schema(&self) -> &Arc<Schema>;
}

/// Exclusive access. Dropping it releases the lock.
pub struct WriteHandle {
    guard: OwnedRwLockWriteGuard<Guarded>,
}

impl WriteHandle {
    /// Publish a new schema snapshot. Every acquirer after this handle is
    /// dropped observes it.
    pub fn replace_schema(&mut self, schema: Arc<Schema>) {
        self.guard.schema = schema;
    }
}

impl SchemaView for WriteHandle {
    fn connector(&self) -> &Arc<dyn Connector> {
        &self.guard.connector
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.guard.schema
    }
}

/// Shared access. Dropping it releases the lock.
pub struct ReadHandle {
    guard: OwnedRwLockReadGuard<Guarded>,
}

impl SchemaView for ReadHandle {
    fn connector(&self) -> &Arc<dyn Connector> {
        &self.guard.connector
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.guard.schema
    }
}
