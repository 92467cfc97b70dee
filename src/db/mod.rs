pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Summary printed by `strata doctor`.
#[derive(Debug)]
pub struct HealthReport {
    pub schema_version: u32,
    pub thing_count: u64,
    pub action_count: u64,
    pub log_count: u64,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

/// Open (or create) the object database at the given path, with schema
/// initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = connect(path.as_ref())?;
    initialize(&conn)?;
    tracing::info!(path = %path.as_ref().display(), "database initialized");
    Ok(conn)
}

/// Open (or create) the database file and set connection pragmas, without
/// touching its tables.
pub fn connect(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL lets readers proceed while a batch is writing
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    Ok(conn)
}

/// Create the base tables and run pending migrations.
pub fn initialize(conn: &Connection) -> Result<()> {
    schema::init_schema(conn).context("failed to initialize schema")?;
    migrations::run_migrations(conn).context("failed to run migrations")?;
    Ok(())
}

/// Open an in-memory database with schema and migrations applied.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    initialize(&conn)?;
    Ok(conn)
}

/// Run `PRAGMA integrity_check` and collect row counts.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn)?;

    let count = |kind: &str| -> rusqlite::Result<u64> {
        conn.query_row(
            "SELECT COUNT(*) FROM objects WHERE kind = ?1",
            [kind],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
    };
    let thing_count = count("thing")?;
    let action_count = count("action")?;
    let log_count: i64 = conn.query_row("SELECT COUNT(*) FROM object_log", [], |row| row.get(0))?;

    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;

    Ok(HealthReport {
        schema_version,
        thing_count,
        action_count,
        log_count: log_count as u64,
        integrity_ok: integrity_details == "ok",
        integrity_details,
    })
}
