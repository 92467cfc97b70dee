//! Peer-aware query catalog.
//!
//! The catalog is derived state: an index of every queryable class, local and
//! per peer, rebuilt from a schema snapshot and a complete peer list whenever
//! either changes. A rebuild that cannot see the full peer list is skipped and
//! the previously published catalog stays in place.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use thiserror::Error;

use crate::network::{Network, Peer};
use crate::schema::manager::SchemaObserver;
use crate::schema::{DataType, ObjectKind, Schema};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("peer name '{0}' is not unique")]
    DuplicatePeer(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogClass {
    pub kind: ObjectKind,
    pub class: String,
    pub properties: Vec<String>,
    /// Classes reachable through cross-reference properties.
    pub references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPeer {
    pub name: String,
    pub uri: String,
    pub schema_hash: String,
    /// Whether the peer last reported the same schema hash as this node.
    pub in_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCatalog {
    pub schema_hash: String,
    pub classes: Vec<CatalogClass>,
    pub peers: Vec<CatalogPeer>,
    pub built_at: i64,
}

impl QueryCatalog {
    pub fn build(schema: &Schema, peers: &[Peer]) -> Result<Self, CatalogError> {
        let schema_hash = schema.hash();

        let classes = schema
            .classes()
            .map(|(kind, class)| {
                let mut references: Vec<String> = class
                    .properties
                    .iter()
                    .flat_map(|p| p.data_type.iter())
                    .filter(|t| !DataType::parse(t).is_primitive())
                    .cloned()
                    .collect();
                references.sort();
                references.dedup();
                CatalogClass {
                    kind,
                    class: class.class.clone(),
                    properties: class.properties.iter().map(|p| p.name.clone()).collect(),
                    references,
                }
            })
            .collect();

        let mut names = HashSet::new();
        let mut catalog_peers = Vec::with_capacity(peers.len());
        for peer in peers {
            if !names.insert(peer.name.as_str()) {
                return Err(CatalogError::DuplicatePeer(peer.name.clone()));
            }
            catalog_peers.push(CatalogPeer {
                name: peer.name.clone(),
                uri: peer.uri.clone(),
                schema_hash: peer.schema_hash.clone(),
                in_sync: peer.schema_hash == schema_hash,
            });
        }

        Ok(Self {
            schema_hash,
            classes,
            peers: catalog_peers,
            built_at: chrono::Utc::now().timestamp_millis(),
        })
    }
}

/// Rebuilds and publishes the catalog on every schema update callback.
pub struct CatalogPublisher {
    network: Arc<dyn Network>,
    current: RwLock<Option<Arc<QueryCatalog>>>,
}

impl CatalogPublisher {
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self {
            network,
            current: RwLock::new(None),
        }
    }

    /// The last successfully built catalog, if any.
    pub fn current(&self) -> Option<Arc<QueryCatalog>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn rebuild(&self, schema: &Schema) {
        let peers = match self.network.list_peers() {
            Ok(peers) => peers,
            Err(e) => {
                tracing::error!(error = %e, "could not list peers, keeping previous query catalog");
                return;
            }
        };

        match QueryCatalog::build(schema, &peers) {
            Ok(catalog) => {
                tracing::info!(
                    classes = catalog.classes.len(),
                    peers = catalog.peers.len(),
                    "query catalog rebuilt"
                );
                *self.current.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::new(catalog));
            }
            Err(e) => {
                tracing::error!(error = %e, "could not rebuild query catalog, keeping previous");
            }
        }
    }
}

impl SchemaObserver for CatalogPublisher {
    fn schema_updated(&self, schema: &Schema) {
        self.rebuild(schema);
    }
}
