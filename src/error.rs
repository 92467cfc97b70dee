//! Error types shared across components.
//!
//! Component-local errors live next to their component ([`crate::schema::SchemaError`],
//! [`crate::validation::ValidationError`], [`crate::auth::AuthError`],
//! [`crate::lock::LockError`]). The ones here cross module boundaries.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::schema::SchemaError;

/// Failures of a batch as a whole. Item-level failures never show up here.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The batch contained no items. Callers map this to 422.
    #[error("batch must contain at least one item")]
    EmptyBatch,

    /// A pending step was requested after the write lock had been released.
    #[error("connector write lock was already released")]
    LockReleased,
}

/// Persistence failures raised by a [`crate::connector::Connector`].
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode object: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("object {0} already exists")]
    Duplicate(Uuid),

    #[error("connector unavailable: {0}")]
    Unavailable(String),
}

/// Peer-list and peer-update failures.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("no network configured")]
    NotConfigured,

    #[error("could not bootstrap network via {genesis}: {reason}")]
    Bootstrap { genesis: String, reason: String },

    #[error("peer update rejected: {0}")]
    Rejected(String),

    #[error("peer list unavailable: {0}")]
    Unavailable(String),

    #[error("no schema getter registered")]
    NoSchemaGetter,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Unrecoverable conditions at process start. Each maps to an exit code.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("contextionary {0} file not specified")]
    ContextionaryNotSpecified(&'static str),

    #[error("contextionary file not found: {}", .0.display())]
    ContextionaryMissing(PathBuf),

    #[error("local schema manager is not configured")]
    LocalSchemaNotConfigured,

    #[error("could not connect to network: {0}")]
    Network(#[source] NetworkError),

    #[error("could not open connector: {0:#}")]
    Connector(anyhow::Error),

    #[error("could not initialize local schema state: {0}")]
    SchemaState(#[source] SchemaError),

    #[error("could not initialize the database: {0:#}")]
    DatabaseInit(anyhow::Error),
}

impl StartupError {
    /// Process exit status: 1 when the database tables could not be
    /// initialized, 78 (`EX_CONFIG`) for everything earlier.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DatabaseInit(_) => 1,
            _ => 78,
        }
    }
}
