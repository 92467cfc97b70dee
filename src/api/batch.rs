use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use super::{authenticate, AppError};
use crate::batch::{BatchItem, BatchItemResult, BatchRequest};
use crate::lock::DeferredReleaseLock;
use crate::schema::ObjectKind;
use crate::server::AppContext;

#[derive(Deserialize)]
pub struct ThingsBatch {
    #[serde(default)]
    things: Vec<BatchItem>,
    fields: Option<Vec<String>>,
    #[serde(rename = "async", default)]
    deferred: bool,
}

#[derive(Deserialize)]
pub struct ActionsBatch {
    #[serde(default)]
    actions: Vec<BatchItem>,
    fields: Option<Vec<String>>,
    #[serde(rename = "async", default)]
    deferred: bool,
}

pub async fn create_things(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<ThingsBatch>,
) -> Result<Json<Vec<BatchItemResult>>, AppError> {
    let request = BatchRequest {
        kind: ObjectKind::Thing,
        items: body.things,
        fields: body.fields,
        deferred: body.deferred,
    };
    run_batch(ctx, &headers, request).await
}

pub async fn create_actions(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<ActionsBatch>,
) -> Result<Json<Vec<BatchItemResult>>, AppError> {
    let request = BatchRequest {
        kind: ObjectKind::Action,
        items: body.actions,
        fields: body.fields,
        deferred: body.deferred,
    };
    run_batch(ctx, &headers, request).await
}

async fn run_batch(
    ctx: Arc<AppContext>,
    headers: &HeaderMap,
    request: BatchRequest,
) -> Result<Json<Vec<BatchItemResult>>, AppError> {
    let principal = authenticate(&ctx, headers)?;
    principal.require_write()?;

    // Detached from the request future: a client that goes away must not
    // cancel a batch halfway through.
    let results = tokio::spawn(async move {
        let lock = DeferredReleaseLock::new(ctx.lock.write().await);
        let results = ctx.coordinator.submit(&lock, request, &principal).await;
        lock.finish_synchronous_portion();
        results
    })
    .await??;

    Ok(Json(results))
}
