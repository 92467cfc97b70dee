//! Owner of the schema snapshot lifecycle.
//!
//! The manager never holds the snapshot itself: the current schema lives in the
//! [`ConnectorLock`](crate::lock::ConnectorLock) next to the connector, and
//! every method that reads or replaces it takes a lock handle. Observers run
//! synchronously, in registration order, while the caller's write handle is
//! still held.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::{Class, ObjectKind, Schema, SchemaError};
use crate::lock::{SchemaView, WriteHandle};

const STATE_FILE: &str = "schema.json";

/// Reacts to a newly published schema. Must not try to take the connector
/// lock: the caller already holds it for writing.
pub trait SchemaObserver: Send + Sync {
    fn schema_updated(&self, schema: &Schema);
}

impl<F> SchemaObserver for F
where
    F: Fn(&Schema) + Send + Sync,
{
    fn schema_updated(&self, schema: &Schema) {
        self(schema)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// No schema loaded from disk and none published yet.
    Uninitialized,
    /// A persisted schema was loaded at startup.
    Loaded,
    /// At least one update or trigger has run.
    Updated,
}

pub struct SchemaManager {
    state_file: Option<PathBuf>,
    observers: RwLock<Vec<Arc<dyn SchemaObserver>>>,
    state: Mutex<ManagerState>,
}

impl SchemaManager {
    /// Open the manager backed by `state_dir`, returning the persisted schema
    /// (empty if there is none yet). The directory is created if missing.
    pub fn open(state_dir: impl AsRef<Path>) -> Result<(Self, Schema), SchemaError> {
        let state_dir = state_dir.as_ref();
        fs::create_dir_all(state_dir)?;
        let state_file = state_dir.join(STATE_FILE);

        let (schema, state) = if state_file.exists() {
            let bytes = fs::read(&state_file)?;
            let schema: Schema = serde_json::from_slice(&bytes)?;
            schema.validate()?;
            tracing::info!(
                path = %state_file.display(),
                classes = schema.classes().count(),
                "loaded schema state"
            );
            (schema, ManagerState::Loaded)
        } else {
            tracing::info!(path = %state_file.display(), "no schema state yet, starting empty");
            (Schema::default(), ManagerState::Uninitialized)
        };

        Ok((Self::with_state(Some(state_file), state), schema))
    }

    /// A manager that keeps nothing on disk.
    pub fn in_memory() -> Self {
        Self::with_state(None, ManagerState::Uninitialized)
    }

    fn with_state(state_file: Option<PathBuf>, state: ManagerState) -> Self {
        Self {
            state_file,
            observers: RwLock::new(Vec::new()),
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> ManagerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The snapshot visible to the holder of `handle`.
    pub fn current(&self, handle: &impl SchemaView) -> Arc<Schema> {
        Arc::clone(handle.schema())
    }

    /// Validate, persist and publish `schema`, then notify observers.
    pub fn update(
        &self,
        handle: &mut WriteHandle,
        schema: Schema,
    ) -> Result<Arc<Schema>, SchemaError> {
        schema.validate()?;
        if let Some(path) = &self.state_file {
            persist(path, &schema)?;
        }

        let schema = Arc::new(schema);
        handle.replace_schema(Arc::clone(&schema));
        tracing::info!(hash = %schema.hash(), "schema updated");

        self.trigger_update_callbacks(handle);
        Ok(schema)
    }

    /// Append `class` to the `kind` partition of the current schema.
    pub fn add_class(
        &self,
        handle: &mut WriteHandle,
        kind: ObjectKind,
        class: Class,
    ) -> Result<Arc<Schema>, SchemaError> {
        let mut next = Schema::clone(handle.schema());
        next.partition_mut(kind).classes.push(class);
        self.update(handle, next)
    }

    pub fn register_update_callback(&self, observer: Arc<dyn SchemaObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Run every observer against the current snapshot without changing it.
    pub fn trigger_update_callbacks(&self, handle: &WriteHandle) {
        let schema = handle.schema();
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tracing::debug!(observers = observers.len(), "running schema update callbacks");
        for observer in observers {
            observer.schema_updated(schema);
        }
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ManagerState::Updated;
    }
}

fn persist(path: &Path, schema: &Schema) -> Result<(), SchemaError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(schema)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
