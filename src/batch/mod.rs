//! Concurrent batch ingestion.
//!
//! Every item of a batch is its own task. Tasks are admitted through a
//! semaphore so a large batch cannot flood the runtime, report their result
//! over a channel tagged with the item's index, and are reassembled into
//! request order once all of them have finished.
//!
//! In deferred mode an item answers PENDING as soon as it has validated, and
//! its write continues after the response as a pending step of the batch's
//! [`DeferredReleaseLock`]. The write lock stays held until the last such
//! write completes. Deferred writes are bounded by their own limiter, which
//! `submit` never waits on.

pub mod fields;
pub mod result;

pub use fields::ResponseFields;
pub use result::{
    BatchItemResult, ErrorItem, ItemResult, ItemStatus, ObjectResponse, ResultHandle,
};

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::auth::Principal;
use crate::connector::{Connector, KeyRef, StoredObject};
use crate::error::BatchError;
use crate::lock::{DeferredReleaseLock, PendingSteps};
use crate::network::{Network, Peer};
use crate::schema::{ObjectKind, Schema};
use crate::validation::{validate_object, ValidationContext, ValidationError};

/// One create-object request inside a batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchItem {
    #[serde(rename = "@context", default)]
    pub context: String,
    #[serde(rename = "@class", default)]
    pub class: String,
    #[serde(default)]
    pub schema: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub kind: ObjectKind,
    pub items: Vec<BatchItem>,
    pub fields: Option<Vec<String>>,
    /// Answer before writes land; each write becomes a pending step.
    pub deferred: bool,
}

pub struct BatchCoordinator {
    limiter: Arc<Semaphore>,
    writes: Arc<Semaphore>,
    network: Arc<dyn Network>,
    host: String,
}

/// Per-batch state shared by every item task.
struct ItemEnv {
    kind: ObjectKind,
    schema: Arc<Schema>,
    connector: Arc<dyn Connector>,
    peers: Vec<Peer>,
    host: String,
    key: KeyRef,
    fields: ResponseFields,
    deferred: bool,
    steps: PendingSteps,
    writes: Arc<Semaphore>,
}

impl BatchCoordinator {
    /// `max_concurrency` bounds how many item tasks run at once, and
    /// separately how many deferred writes run at once. Zero is treated as one.
    pub fn new(max_concurrency: usize, network: Arc<dyn Network>, host: impl Into<String>) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            limiter: Arc::new(Semaphore::new(max_concurrency)),
            writes: Arc::new(Semaphore::new(max_concurrency)),
            network,
            host: host.into(),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Free slots for deferred writes.
    pub fn available_write_slots(&self) -> usize {
        self.writes.available_permits()
    }

    /// Process `request` under `lock`, returning one result per item in
    /// request order. Only an empty batch or an already released lock fails
    /// the batch as a whole; every item-level problem is reported in that
    /// item's result.
    ///
    /// The caller owns the synchronous portion of `lock` and must finish it
    /// (or drop the lock) after this returns.
    pub async fn submit(
        &self,
        lock: &DeferredReleaseLock,
        request: BatchRequest,
        principal: &Principal,
    ) -> Result<Vec<BatchItemResult>, BatchError> {
        if request.items.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        let connector = lock.connector().ok_or(BatchError::LockReleased)?;
        let started = Instant::now();
        let len = request.items.len();
        tracing::info!(
            kind = %request.kind,
            batch_len = len,
            deferred = request.deferred,
            "processing batch"
        );

        let peers = self.network.list_peers().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "peer list unavailable, validating without peers");
            Vec::new()
        });

        let env = Arc::new(ItemEnv {
            kind: request.kind,
            schema: Arc::clone(lock.schema()),
            connector,
            peers,
            host: self.host.clone(),
            key: KeyRef::new(principal.key_id, self.host.clone()),
            fields: ResponseFields::resolve(request.kind, request.fields.as_deref()),
            deferred: request.deferred,
            steps: lock.registrar(),
            writes: Arc::clone(&self.writes),
        });

        let contexts: Vec<String> = request.items.iter().map(|i| i.context.clone()).collect();
        let (tx, mut rx) = mpsc::channel::<BatchItemResult>(len);
        let mut tasks = JoinSet::new();

        for (index, item) in request.items.into_iter().enumerate() {
            let Ok(permit) = Arc::clone(&self.limiter).acquire_owned().await else {
                tracing::error!(index, "batch limiter closed, failing remaining items");
                break;
            };
            let env = Arc::clone(&env);
            let tx = tx.clone();
            tasks.spawn(async move {
                let result = process_item(env, index, item, permit).await;
                // Capacity equals the batch length, so this never waits.
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "batch item task failed");
            }
        }

        let mut slots: Vec<Option<BatchItemResult>> = (0..len).map(|_| None).collect();
        while let Some(result) = rx.recv().await {
            let index = result.index;
            slots[index] = Some(result);
        }

        let results: Vec<BatchItemResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| BatchItemResult {
                    index,
                    object: ObjectResponse {
                        context: contexts[index].clone(),
                        ..Default::default()
                    },
                    result: ResultHandle::settled(ItemResult::failed(
                        "item was not processed",
                    )),
                })
            })
            .collect();

        tracing::debug!(
            kind = %env.kind,
            batch_len = len,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch processed"
        );
        Ok(results)
    }
}

impl ItemEnv {
    fn validate(&self, object: &StoredObject) -> Result<(), ValidationError> {
        let ctx = ValidationContext {
            schema: &self.schema,
            connector: self.connector.as_ref(),
            peers: &self.peers,
            local_host: &self.host,
        };
        validate_object(
            &ctx,
            self.kind,
            &object.class,
            &object.context,
            &object.properties,
        )
    }
}

async fn process_item(
    env: Arc<ItemEnv>,
    index: usize,
    item: BatchItem,
    permit: OwnedSemaphorePermit,
) -> BatchItemResult {
    let object = StoredObject {
        id: Uuid::now_v7(),
        kind: env.kind,
        context: item.context,
        class: item.class,
        properties: item.schema,
        key: env.key.clone(),
        creation_time_unix: chrono::Utc::now().timestamp_millis(),
        last_update_time_unix: 0,
    };
    let response = env.fields.project(&object);
    let done = |result: ItemResult| BatchItemResult {
        index,
        object: response.clone(),
        result: ResultHandle::settled(result),
    };

    let validated = {
        let env = Arc::clone(&env);
        let object = object.clone();
        tokio::task::spawn_blocking(move || env.validate(&object)).await
    };
    match validated {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(index, class = %object.class, error = %e, "item failed validation");
            return done(ItemResult::failed(e.to_string()));
        }
        Err(e) => {
            tracing::error!(index, error = %e, "validation task failed");
            return done(ItemResult::failed("validation did not complete"));
        }
    }

    if !env.deferred {
        let connector = Arc::clone(&env.connector);
        let written = tokio::task::spawn_blocking(move || connector.add_object(&object)).await;
        drop(permit);
        return done(write_outcome(index, written));
    }

    // Register before spawning so the lock cannot be released underneath the write.
    let step = match env.steps.register() {
        Ok(step) => step,
        Err(e) => return done(ItemResult::failed(e.to_string())),
    };
    let (tx, handle) = ResultHandle::pending();
    // The write waits on its own limiter, not on the item slot.
    drop(permit);
    let writes = Arc::clone(&env.writes);
    tokio::spawn(async move {
        let Ok(slot) = writes.acquire_owned().await else {
            tx.send_replace(ItemResult::failed("deferred write limiter closed"));
            return;
        };
        let written = tokio::task::spawn_blocking(move || {
            let outcome = step.connector().add_object(&object);
            (outcome, step)
        })
        .await;
        drop(slot);
        match written {
            Ok((outcome, step)) => {
                tx.send_replace(write_outcome(index, Ok(outcome)));
                step.complete();
            }
            Err(e) => {
                // The step was dropped while unwinding.
                tx.send_replace(write_outcome(index, Err(e)));
            }
        }
    });

    BatchItemResult {
        index,
        object: response,
        result: handle,
    }
}

fn write_outcome(
    index: usize,
    written: Result<Result<(), crate::error::ConnectorError>, tokio::task::JoinError>,
) -> ItemResult {
    match written {
        Ok(Ok(())) => ItemResult::success(),
        Ok(Err(e)) => {
            tracing::warn!(index, error = %e, "object write failed");
            ItemResult::failed(e.to_string())
        }
        Err(e) => {
            tracing::error!(index, error = %e, "object write task failed");
            ItemResult::failed("write did not complete")
        }
    }
}
