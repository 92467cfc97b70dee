#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use strata::auth::Principal;
use strata::batch::{BatchItem, BatchRequest};
use strata::connector::{Connector, SqliteConnector, StoredObject};
use strata::error::{ConnectorError, NetworkError};
use strata::lock::ConnectorLock;
use strata::network::{
    Network, NetworkMode, Peer, PeerUpdateCallback, PublishedSchema, SchemaGetter, SoloNetwork,
};
use strata::schema::{Class, ObjectKind, Property, Schema};

/// Fresh in-memory SQLite connector with schema and migrations applied.
pub fn test_connector() -> Arc<SqliteConnector> {
    Arc::new(SqliteConnector::open_in_memory().unwrap())
}

fn prop(name: &str, types: &[&str]) -> Property {
    Property {
        name: name.into(),
        data_type: types.iter().map(|t| t.to_string()).collect(),
        description: String::new(),
    }
}

pub fn class(name: &str, properties: Vec<Property>) -> Class {
    Class {
        class: name.into(),
        description: String::new(),
        properties,
    }
}

/// Things: City (name, population, inCountry -> Country), Country (name).
/// Actions: Visit (note, at, city -> City).
pub fn sample_schema() -> Schema {
    let mut schema = Schema::default();
    schema.things.context = "http://example.org/things".into();
    schema.actions.context = "http://example.org/actions".into();
    schema.things.classes.push(class(
        "City",
        vec![
            prop("name", &["string"]),
            prop("population", &["int"]),
            prop("inCountry", &["Country"]),
        ],
    ));
    schema
        .things
        .classes
        .push(class("Country", vec![prop("name", &["string"])]));
    schema.actions.classes.push(class(
        "Visit",
        vec![
            prop("note", &["text"]),
            prop("at", &["date"]),
            prop("city", &["City"]),
        ],
    ));
    schema
}

pub fn lock_over(connector: Arc<dyn Connector>) -> ConnectorLock {
    ConnectorLock::new(connector, sample_schema())
}

pub fn writer() -> Principal {
    Principal {
        key_id: Uuid::now_v7(),
        write: true,
    }
}

pub fn solo() -> Arc<dyn Network> {
    Arc::new(SoloNetwork::new())
}

/// A City item. `population` doubles as the write delay in milliseconds for
/// [`SlowConnector`].
pub fn city(name: &str, population: i64) -> BatchItem {
    BatchItem {
        context: "http://example.org".into(),
        class: "City".into(),
        schema: json!({"name": name, "population": population})
            .as_object()
            .cloned()
            .unwrap(),
    }
}

pub fn request(kind: ObjectKind, items: Vec<BatchItem>, deferred: bool) -> BatchRequest {
    BatchRequest {
        kind,
        items,
        fields: None,
        deferred,
    }
}

/// Sleeps `population` milliseconds per write and records peak concurrency.
pub struct SlowConnector {
    inner: SqliteConnector,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl SlowConnector {
    pub fn new() -> Self {
        Self {
            inner: SqliteConnector::open_in_memory().unwrap(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Connector for SlowConnector {
    fn add_object(&self, object: &StoredObject) -> Result<(), ConnectorError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = object
            .properties
            .get("population")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        std::thread::sleep(Duration::from_millis(delay));
        let result = self.inner.add_object(object);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn get_object(
        &self,
        kind: ObjectKind,
        id: Uuid,
    ) -> Result<Option<StoredObject>, ConnectorError> {
        self.inner.get_object(kind, id)
    }

    fn count_objects(&self, kind: ObjectKind) -> Result<u64, ConnectorError> {
        self.inner.count_objects(kind)
    }
}

/// Writes block until [`GatedConnector::open`] is called. Objects named
/// "reject" fail.
pub struct GatedConnector {
    inner: SqliteConnector,
    gate: Mutex<bool>,
    opened: Condvar,
}

impl GatedConnector {
    pub fn new() -> Self {
        Self {
            inner: SqliteConnector::open_in_memory().unwrap(),
            gate: Mutex::new(false),
            opened: Condvar::new(),
        }
    }

    pub fn open(&self) {
        *self.gate.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

impl Connector for GatedConnector {
    fn add_object(&self, object: &StoredObject) -> Result<(), ConnectorError> {
        let mut open = self.gate.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        drop(open);
        if object.properties.get("name").and_then(|v| v.as_str()) == Some("reject") {
            return Err(ConnectorError::Unavailable("disk full".into()));
        }
        self.inner.add_object(object)
    }

    fn get_object(
        &self,
        kind: ObjectKind,
        id: Uuid,
    ) -> Result<Option<StoredObject>, ConnectorError> {
        self.inner.get_object(kind, id)
    }

    fn count_objects(&self, kind: ObjectKind) -> Result<u64, ConnectorError> {
        self.inner.count_objects(kind)
    }
}

/// A network whose peer list can be switched into a failing state.
pub struct StubNetwork {
    peers: Mutex<Vec<Peer>>,
    failing: AtomicBool,
}

impl StubNetwork {
    pub fn new(peers: Vec<Peer>) -> Self {
        Self {
            peers: Mutex::new(peers),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Network for StubNetwork {
    fn mode(&self) -> NetworkMode {
        NetworkMode::P2p
    }

    fn list_peers(&self) -> Result<Vec<Peer>, NetworkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NetworkError::Unavailable("genesis unreachable".into()));
        }
        Ok(self.peers.lock().unwrap().clone())
    }

    fn update_peers(&self, peers: Vec<Peer>) -> Result<(), NetworkError> {
        *self.peers.lock().unwrap() = peers;
        Ok(())
    }

    fn register_update_peers_callback(&self, _callback: PeerUpdateCallback) {}

    fn register_schema_getter(&self, _getter: Arc<dyn SchemaGetter>) {}

    async fn local_schema(&self) -> Result<PublishedSchema, NetworkError> {
        Err(NetworkError::NoSchemaGetter)
    }
}

pub fn peer(name: &str) -> Peer {
    Peer {
        id: Uuid::now_v7(),
        name: name.into(),
        uri: format!("http://{name}:8080"),
        schema_hash: String::new(),
    }
}
