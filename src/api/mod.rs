//! HTTP routes.
//!
//! Handlers are thin: authenticate, take the appropriate side of the
//! connector lock, delegate to the component, render JSON. Errors render as
//! `{"error": [{"message": "..."}]}`.

mod batch;
mod objects;
mod p2p;
mod schema;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;

use crate::auth::{self, AuthError, Principal};
use crate::error::{BatchError, ConnectorError, NetworkError};
use crate::schema::SchemaError;
use crate::server::AppContext;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/v1/batching/things", post(batch::create_things))
        .route("/v1/batching/actions", post(batch::create_actions))
        .route("/v1/things/{id}", get(objects::get_thing))
        .route("/v1/actions/{id}", get(objects::get_action))
        .route("/v1/schema", get(schema::dump))
        .route("/v1/schema/things", post(schema::add_thing_class))
        .route("/v1/schema/actions", post(schema::add_action_class))
        .route("/v1/meta", get(schema::meta))
        .route("/v1/p2p/genesis", put(p2p::update_peers))
        .route("/v1/p2p/health", get(p2p::health))
        .route("/v1/p2p/schema", get(p2p::schema))
        .layer(middleware::from_fn(log_request))
        .with_state(ctx)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();
    let response = next.run(request).await;
    tracing::debug!(
        %method,
        %uri,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

fn authenticate(ctx: &AppContext, headers: &HeaderMap) -> Result<Principal, AppError> {
    Ok(auth::authenticate(headers, &ctx.config.auth)?)
}

#[derive(Serialize)]
struct ErrorBody {
    error: Vec<ErrorMessage>,
}

#[derive(Serialize)]
struct ErrorMessage {
    message: String,
}

/// An error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: vec![ErrorMessage {
                message: self.message,
            }],
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        let status = if e.is_forbidden() {
            StatusCode::FORBIDDEN
        } else {
            StatusCode::UNAUTHORIZED
        };
        Self::new(status, e.to_string())
    }
}

impl From<BatchError> for AppError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::EmptyBatch => Self::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            BatchError::LockReleased => Self::internal(e.to_string()),
        }
    }
}

impl From<SchemaError> for AppError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::Io(_) | SchemaError::Decode(_) => Self::internal(e.to_string()),
            _ => Self::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        }
    }
}

impl From<ConnectorError> for AppError {
    fn from(e: ConnectorError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<NetworkError> for AppError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::Unavailable(_) => Self::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            _ => Self::internal(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::internal(format!("request task failed: {e}"))
    }
}
