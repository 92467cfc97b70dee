//! Networked semantic-object store with concurrent batch ingestion.
//!
//! Strata stores typed objects ("things" and "actions") described by a
//! two-partition schema. All writes go through a single data connector guarded
//! by a process-local reader/writer lock; batches of create requests fan out as
//! independent tasks under one write lock and come back in submission order.
//!
//! | Kind | Partition | Id field |
//! |------|-----------|----------|
//! | **Thing** | `things` | `thingId` |
//! | **Action** | `actions` | `actionId` |
//!
//! # Architecture
//!
//! - **Storage**: SQLite connector behind [`lock::ConnectorLock`]
//! - **Ingestion**: [`batch::BatchCoordinator`] with deferred ("async") writes that keep
//!   the write lock alive through [`lock::DeferredReleaseLock`]
//! - **Schema**: [`schema::manager::SchemaManager`] with ordered observers run under the write lock
//! - **Network**: solo or P2P peer registry selected once at startup
//! - **Transport**: JSON over HTTP (axum)
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, migrations, and health checks
//! - [`connector`]: The data connector trait and its SQLite implementation
//! - [`lock`]: Connector lock and deferred release
//! - [`batch`]: Batch coordinator, response field selection, per-item results
//! - [`schema`]: Schema types and the schema manager
//! - [`network`]: Peer registry (solo and P2P)
//! - [`validation`]: Per-object validation against the schema snapshot
//! - [`auth`]: Key/token header authentication
//! - [`catalog`]: Peer-aware query catalog derived from the schema
//! - [`api`]: HTTP routes

pub mod api;
pub mod auth;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod connector;
pub mod db;
pub mod error;
pub mod lock;
pub mod network;
pub mod schema;
pub mod server;
pub mod validation;
