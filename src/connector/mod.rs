//! The data connector: the sole handle to persisted objects.
//!
//! Connectors are synchronous. Callers on the async runtime wrap calls in
//! `tokio::task::spawn_blocking`. A connector is only ever reached through
//! [`crate::lock::ConnectorLock`]; it is not meant to be mutated concurrently
//! outside that discipline.

pub mod sqlite;

pub use sqlite::SqliteConnector;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConnectorError;
use crate::schema::ObjectKind;

/// Reference to the API key that created an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRef {
    #[serde(rename = "$cref")]
    pub cref: Uuid,
    #[serde(rename = "locationUrl")]
    pub location_url: String,
    #[serde(rename = "type")]
    pub ref_type: String,
}

impl KeyRef {
    pub fn new(key_id: Uuid, location_url: impl Into<String>) -> Self {
        Self {
            cref: key_id,
            location_url: location_url.into(),
            ref_type: "Key".to_string(),
        }
    }
}

/// A persisted thing or action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: Uuid,
    pub kind: ObjectKind,
    pub context: String,
    pub class: String,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub key: KeyRef,
    /// Milliseconds since the Unix epoch.
    pub creation_time_unix: i64,
    pub last_update_time_unix: i64,
}

pub trait Connector: Send + Sync {
    /// Persist a new object. Fails with [`ConnectorError::Duplicate`] if the id is taken.
    fn add_object(&self, object: &StoredObject) -> Result<(), ConnectorError>;

    fn get_object(
        &self,
        kind: ObjectKind,
        id: Uuid,
    ) -> Result<Option<StoredObject>, ConnectorError>;

    fn object_exists(&self, kind: ObjectKind, id: Uuid) -> Result<bool, ConnectorError> {
        Ok(self.get_object(kind, id)?.is_some())
    }

    fn count_objects(&self, kind: ObjectKind) -> Result<u64, ConnectorError>;
}
