//! Write-lock release deferred until outstanding asynchronous steps finish.
//!
//! A batch in deferred mode answers before its writes land. The write lock it
//! acquired must outlive the response until every write it authorized has
//! completed, otherwise another writer could interleave with them. The lock is
//! released by whichever comes last: the end of the synchronous portion, or the
//! completion of the last pending step.
//!
//! Steps are values ([`PendingStep`]). Dropping one completes it, so each
//! decrement pairs with exactly one increment.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::{SchemaView, WriteHandle};
use crate::connector::Connector;
use crate::error::BatchError;
use crate::schema::Schema;

struct State {
    handle: Option<WriteHandle>,
    pending: usize,
    sync_finished: bool,
}

struct Shared {
    state: Mutex<State>,
    released: watch::Sender<bool>,
}

impl Shared {
    // State is a counter plus an Option; a panic elsewhere cannot tear it.
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(self: &Arc<Self>, connector: &Arc<dyn Connector>) -> Result<PendingStep, BatchError> {
        let mut state = self.state();
        if state.handle.is_none() {
            return Err(BatchError::LockReleased);
        }
        state.pending += 1;
        tracing::trace!(pending = state.pending, "pending step registered");
        Ok(PendingStep {
            shared: Arc::clone(self),
            connector: Arc::clone(connector),
        })
    }

    fn finish_synchronous_portion(&self) {
        let handle = {
            let mut state = self.state();
            if state.sync_finished {
                return;
            }
            state.sync_finished = true;
            if state.pending == 0 {
                state.handle.take()
            } else {
                tracing::debug!(pending = state.pending, "deferring write lock release");
                None
            }
        };
        self.release(handle);
    }

    fn complete_step(&self) {
        let handle = {
            let mut state = self.state();
            debug_assert!(state.pending > 0, "step completed without registration");
            state.pending = state.pending.saturating_sub(1);
            if state.pending == 0 && state.sync_finished {
                state.handle.take()
            } else {
                None
            }
        };
        self.release(handle);
    }

    fn release(&self, handle: Option<WriteHandle>) {
        if let Some(handle) = handle {
            drop(handle);
            self.released.send_replace(true);
            tracing::debug!("connector write lock released");
        }
    }
}

/// A held write lock whose release waits for registered pending steps.
///
/// Dropping it ends the synchronous portion.
pub struct DeferredReleaseLock {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    schema: Arc<Schema>,
}

impl DeferredReleaseLock {
    pub fn new(handle: WriteHandle) -> Self {
        let connector = Arc::clone(handle.connector());
        let schema = Arc::clone(handle.schema());
        let (released, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    handle: Some(handle),
                    pending: 0,
                    sync_finished: false,
                }),
                released,
            }),
            connector,
            schema,
        }
    }

    /// The guarded connector, or `None` once the write lock is released.
    /// Writes after the synchronous portion go through a [`PendingStep`].
    pub fn connector(&self) -> Option<Arc<dyn Connector>> {
        let state = self.shared.state();
        state.handle.as_ref().map(|_| Arc::clone(&self.connector))
    }

    /// Schema snapshot taken when the write lock was acquired.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Count one more asynchronous unit of work. Call this before spawning it.
    pub fn register_pending_step(&self) -> Result<PendingStep, BatchError> {
        self.shared.register(&self.connector)
    }

    /// A cloneable registrar for tasks that cannot borrow the lock.
    pub fn registrar(&self) -> PendingSteps {
        PendingSteps {
            shared: Arc::clone(&self.shared),
            connector: Arc::clone(&self.connector),
        }
    }

    /// Mark the synchronous work done. Releases now if no steps are pending,
    /// otherwise on the last [`PendingStep`] completion. Idempotent.
    pub fn finish_synchronous_portion(&self) {
        self.shared.finish_synchronous_portion();
    }

    pub fn pending_steps(&self) -> usize {
        self.shared.state().pending
    }

    pub fn is_released(&self) -> bool {
        *self.shared.released.borrow()
    }

    /// A signal that resolves once the write lock is released. Detached from
    /// `self`, so it can be awaited after the lock value is dropped.
    pub fn release_signal(&self) -> ReleaseSignal {
        ReleaseSignal {
            rx: self.shared.released.subscribe(),
        }
    }

    pub async fn released(&self) {
        self.release_signal().released().await;
    }
}

impl Drop for DeferredReleaseLock {
    fn drop(&mut self) {
        self.shared.finish_synchronous_portion();
    }
}

/// Registers pending steps on behalf of a [`DeferredReleaseLock`].
#[derive(Clone)]
pub struct PendingSteps {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
}

impl PendingSteps {
    pub fn register(&self) -> Result<PendingStep, BatchError> {
        self.shared.register(&self.connector)
    }
}

/// One outstanding asynchronous unit of work. Completing (or dropping) it
/// decrements the pending-step counter.
pub struct PendingStep {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
}

impl PendingStep {
    /// The guarded connector. The write lock stays held while this step lives.
    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn complete(self) {}
}

impl Drop for PendingStep {
    fn drop(&mut self) {
        self.shared.complete_step();
    }
}

/// Resolves once the deferred lock has released its write handle.
pub struct ReleaseSignal {
    rx: watch::Receiver<bool>,
}

impl ReleaseSignal {
    pub async fn released(mut self) {
        // A closed channel means the shared state, handle included, is gone.
        let _ = self.rx.wait_for(|released| *released).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::SqliteConnector;
    use crate::lock::ConnectorLock;

    fn lock() -> ConnectorLock {
        let connector = Arc::new(SqliteConnector::open_in_memory().unwrap());
        ConnectorLock::new(connector, Schema::default())
    }

    #[tokio::test]
    async fn releases_immediately_without_pending_steps() {
        let lock = lock();
        let deferred = DeferredReleaseLock::new(lock.write().await);
        assert!(lock.try_write().is_none());

        deferred.finish_synchronous_portion();

        assert!(deferred.is_released());
        assert!(lock.try_write().is_some());
    }

    #[tokio::test]
    async fn last_step_releases_after_synchronous_portion() {
        let lock = lock();
        let deferred = DeferredReleaseLock::new(lock.write().await);
        let first = deferred.register_pending_step().unwrap();
        let second = deferred.register_pending_step().unwrap();
        assert_eq!(deferred.pending_steps(), 2);

        deferred.finish_synchronous_portion();
        assert!(!deferred.is_released());
        assert!(lock.try_read().is_none());

        first.complete();
        assert_eq!(deferred.pending_steps(), 1);
        assert!(lock.try_read().is_none());

        drop(second);
        assert_eq!(deferred.pending_steps(), 0);
        assert!(deferred.is_released());
        assert!(lock.try_write().is_some());
    }

    #[tokio::test]
    async fn steps_finishing_first_leave_release_to_synchronous_portion() {
        let lock = lock();
        let deferred = DeferredReleaseLock::new(lock.write().await);
        deferred.register_pending_step().unwrap().complete();

        assert!(!deferred.is_released());
        assert!(lock.try_write().is_none());

        deferred.finish_synchronous_portion();
        deferred.finish_synchronous_portion();
        assert!(deferred.is_released());
    }

    #[tokio::test]
    async fn registering_after_release_fails() {
        let lock = lock();
        let deferred = DeferredReleaseLock::new(lock.write().await);
        let steps = deferred.registrar();
        deferred.finish_synchronous_portion();

        assert!(matches!(steps.register(), Err(BatchError::LockReleased)));
        assert!(matches!(
            deferred.register_pending_step(),
            Err(BatchError::LockReleased)
        ));
    }

    #[tokio::test]
    async fn connector_is_withheld_after_release() {
        let lock = lock();
        let deferred = DeferredReleaseLock::new(lock.write().await);
        let step = deferred.register_pending_step().unwrap();
        assert!(deferred.connector().is_some());

        deferred.finish_synchronous_portion();
        assert!(deferred.connector().is_some());

        step.complete();
        assert!(deferred.connector().is_none());
    }

    #[tokio::test]
    async fn dropping_the_lock_ends_synchronous_portion() {
        let lock = lock();
        let deferred = DeferredReleaseLock::new(lock.write().await);
        let step = deferred.register_pending_step().unwrap();
        let signal = deferred.release_signal();
        drop(deferred);

        assert!(lock.try_write().is_none());
        let waiter = tokio::spawn(signal.released());
        step.complete();
        waiter.await.unwrap();
        assert!(lock.try_write().is_some());
    }
}
