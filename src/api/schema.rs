use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use super::{authenticate, AppError};
use crate::catalog::QueryCatalog;
use crate::network::NetworkMode;
use crate::schema::{Class, ObjectKind, Schema, SemanticSchema};
use crate::server::AppContext;

pub async fn dump(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Schema>, AppError> {
    authenticate(&ctx, &headers)?;
    let handle = ctx.lock.read().await;
    Ok(Json(Schema::clone(&ctx.schema_manager.current(&handle))))
}

pub async fn add_thing_class(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(class): Json<Class>,
) -> Result<Json<Class>, AppError> {
    add_class(ctx, &headers, ObjectKind::Thing, class).await
}

pub async fn add_action_class(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(class): Json<Class>,
) -> Result<Json<Class>, AppError> {
    add_class(ctx, &headers, ObjectKind::Action, class).await
}

async fn add_class(
    ctx: Arc<AppContext>,
    headers: &HeaderMap,
    kind: ObjectKind,
    class: Class,
) -> Result<Json<Class>, AppError> {
    let principal = authenticate(&ctx, headers)?;
    principal.require_write()?;

    let mut handle = ctx.lock.write().await;
    ctx.schema_manager
        .add_class(&mut handle, kind, class.clone())?;
    tracing::info!(kind = %kind, class = %class.class, "class added");
    Ok(Json(class))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    hostname: String,
    network: NetworkMode,
    actions_schema: SemanticSchema,
    things_schema: SemanticSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog: Option<QueryCatalog>,
}

pub async fn meta(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Meta>, AppError> {
    authenticate(&ctx, &headers)?;
    let schema = {
        let handle = ctx.lock.read().await;
        ctx.schema_manager.current(&handle)
    };
    Ok(Json(Meta {
        hostname: ctx.config.server.hostname.clone(),
        network: ctx.network.mode(),
        actions_schema: schema.actions.clone(),
        things_schema: schema.things.clone(),
        catalog: ctx.catalog.current().map(|c| QueryCatalog::clone(&c)),
    }))
}
