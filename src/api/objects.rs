use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use super::{authenticate, AppError};
use crate::batch::{ObjectResponse, ResponseFields};
use crate::lock::SchemaView;
use crate::schema::ObjectKind;
use crate::server::AppContext;

pub async fn get_thing(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ObjectResponse>, AppError> {
    get_object(ctx, &headers, ObjectKind::Thing, id).await
}

pub async fn get_action(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ObjectResponse>, AppError> {
    get_object(ctx, &headers, ObjectKind::Action, id).await
}

async fn get_object(
    ctx: Arc<AppContext>,
    headers: &HeaderMap,
    kind: ObjectKind,
    id: Uuid,
) -> Result<Json<ObjectResponse>, AppError> {
    authenticate(&ctx, headers)?;

    // Waits behind any batch still holding the write lock, deferred writes included.
    let handle = ctx.lock.read().await;
    let object = tokio::task::spawn_blocking(move || handle.connector().get_object(kind, id))
        .await??
        .ok_or_else(|| AppError::not_found(format!("{kind} {id} not found")))?;

    Ok(Json(ResponseFields::all(kind).project(&object)))
}
