//! SQLite-backed [`Connector`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use super::{Connector, KeyRef, StoredObject};
use crate::db;
use crate::error::ConnectorError;
use crate::schema::ObjectKind;

pub struct SqliteConnector {
    conn: Mutex<Connection>,
}

impl SqliteConnector {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_connection(db::open_database(path)?))
    }

    /// In-memory store, used by tests and `doctor` dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(db::open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ConnectorError> {
        self.conn
            .lock()
            .map_err(|e| ConnectorError::Unavailable(format!("db lock poisoned: {e}")))
    }
}

impl Connector for SqliteConnector {
    fn add_object(&self, object: &StoredObject) -> Result<(), ConnectorError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM objects WHERE id = ?1",
            params![object.id.to_string()],
            |row| row.get(0),
        )?;
        if exists {
            return Err(ConnectorError::Duplicate(object.id));
        }

        let properties = serde_json::to_string(&object.properties)?;
        tx.execute(
            "INSERT INTO objects (id, kind, class, context, properties, key_id, key_location, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                object.id.to_string(),
                object.kind.as_str(),
                object.class,
                object.context,
                properties,
                object.key.cref.to_string(),
                object.key.location_url,
                object.creation_time_unix,
                object.last_update_time_unix,
            ],
        )?;

        write_audit_log(&tx, "create", object)?;
        tx.commit()?;

        tracing::debug!(id = %object.id, kind = %object.kind, class = %object.class, "object stored");
        Ok(())
    }

    fn get_object(
        &self,
        kind: ObjectKind,
        id: Uuid,
    ) -> Result<Option<StoredObject>, ConnectorError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT class, context, properties, key_id, key_location, created_at, updated_at \
                 FROM objects WHERE id = ?1 AND kind = ?2",
                params![id.to_string(), kind.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((class, context, properties, key_id, key_location, created, updated)) = row else {
            return Ok(None);
        };

        let key_id = Uuid::parse_str(&key_id).map_err(|e| {
            ConnectorError::Unavailable(format!("corrupt key reference on {id}: {e}"))
        })?;

        Ok(Some(StoredObject {
            id,
            kind,
            context,
            class,
            properties: serde_json::from_str(&properties)?,
            key: KeyRef::new(key_id, key_location),
            creation_time_unix: created,
            last_update_time_unix: updated,
        }))
    }

    fn object_exists(&self, kind: ObjectKind, id: Uuid) -> Result<bool, ConnectorError> {
        let conn = self.conn()?;
        let exists = conn.query_row(
            "SELECT COUNT(*) > 0 FROM objects WHERE id = ?1 AND kind = ?2",
            params![id.to_string(), kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn count_objects(&self, kind: ObjectKind) -> Result<u64, ConnectorError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM objects WHERE kind = ?1",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn write_audit_log(
    tx: &Transaction,
    operation: &str,
    object: &StoredObject,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO object_log (operation, object_id, kind, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            operation,
            object.id.to_string(),
            object.kind.as_str(),
            chrono::Utc::now().timestamp_millis(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(kind: ObjectKind, class: &str) -> StoredObject {
        let mut properties = serde_json::Map::new();
        properties.insert("name".into(), serde_json::json!("Amsterdam"));
        StoredObject {
            id: Uuid::now_v7(),
            kind,
            context: "http://example.org".into(),
            class: class.into(),
            properties,
            key: KeyRef::new(Uuid::now_v7(), "localhost"),
            creation_time_unix: 1_700_000_000_000,
            last_update_time_unix: 0,
        }
    }

    #[test]
    fn add_then_get_returns_same_object() {
        let connector = SqliteConnector::open_in_memory().unwrap();
        let city = object(ObjectKind::Thing, "City");
        connector.add_object(&city).unwrap();

        let loaded = connector.get_object(ObjectKind::Thing, city.id).unwrap();
        assert_eq!(loaded, Some(city.clone()));
        // Kind is part of the lookup
        assert!(connector.get_object(ObjectKind::Action, city.id).unwrap().is_none());
        assert!(connector.object_exists(ObjectKind::Thing, city.id).unwrap());
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let connector = SqliteConnector::open_in_memory().unwrap();
        let city = object(ObjectKind::Thing, "City");
        connector.add_object(&city).unwrap();
        assert!(matches!(
            connector.add_object(&city),
            Err(ConnectorError::Duplicate(id)) if id == city.id
        ));
    }

    #[test]
    fn counts_by_kind_and_writes_audit_log() {
        let connector = SqliteConnector::open_in_memory().unwrap();
        connector.add_object(&object(ObjectKind::Thing, "City")).unwrap();
        connector.add_object(&object(ObjectKind::Thing, "City")).unwrap();
        connector.add_object(&object(ObjectKind::Action, "Visit")).unwrap();

        assert_eq!(connector.count_objects(ObjectKind::Thing).unwrap(), 2);
        assert_eq!(connector.count_objects(ObjectKind::Action).unwrap(), 1);

        let conn = connector.conn().unwrap();
        let report = db::check_database_health(&conn).unwrap();
        assert_eq!(report.log_count, 3);
        assert!(report.integrity_ok);
    }
}
