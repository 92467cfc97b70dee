//! Peer-facing routes. These are called by the genesis server and other
//! nodes, not by API key holders.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use super::AppError;
use crate::network::{Peer, PublishedSchema};
use crate::server::AppContext;

pub async fn update_peers(
    State(ctx): State<Arc<AppContext>>,
    Json(peers): Json<Vec<Peer>>,
) -> Result<StatusCode, AppError> {
    ctx.network.update_peers(peers).map_err(|e| {
        tracing::warn!(error = %e, "peer update rejected");
        AppError::internal(e.to_string())
    })?;
    Ok(StatusCode::OK)
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn schema(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<PublishedSchema>, AppError> {
    Ok(Json(ctx.network.local_schema().await?))
}
