//! Peer membership.
//!
//! A node either runs solo ([`SoloNetwork`]) or is part of a peer-to-peer
//! network bootstrapped through a genesis server ([`P2pNetwork`]). The choice
//! is made once at startup. Peer lists are replaced wholesale, never merged.

pub mod p2p;
pub mod solo;

pub use p2p::P2pNetwork;
pub use solo::SoloNetwork;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NetworkError;
use crate::schema::Schema;

/// A remote node known to this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub id: Uuid,
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub schema_hash: String,
}

pub type PeerUpdateCallback = Box<dyn Fn(&[Peer]) + Send + Sync>;

/// Supplies this node's schema to peers asking for it.
#[async_trait]
pub trait SchemaGetter: Send + Sync {
    async fn schema(&self) -> Result<Schema, NetworkError>;
}

/// The schema this node publishes, with its hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedSchema {
    pub hash: String,
    pub schema: Schema,
}

impl From<Schema> for PublishedSchema {
    fn from(schema: Schema) -> Self {
        Self {
            hash: schema.hash(),
            schema,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    Solo,
    P2p,
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Solo => f.write_str("solo"),
            Self::P2p => f.write_str("p2p"),
        }
    }
}

#[async_trait]
pub trait Network: Send + Sync {
    fn mode(&self) -> NetworkMode;

    /// The most recently applied peer list.
    fn list_peers(&self) -> Result<Vec<Peer>, NetworkError>;

    /// Replace the peer list. On error the previous list stays in place.
    fn update_peers(&self, peers: Vec<Peer>) -> Result<(), NetworkError>;

    /// Invoked after every successful [`update_peers`](Self::update_peers).
    fn register_update_peers_callback(&self, callback: PeerUpdateCallback);

    fn register_schema_getter(&self, getter: Arc<dyn SchemaGetter>);

    /// This node's schema, fetched through the registered getter.
    async fn local_schema(&self) -> Result<PublishedSchema, NetworkError>;
}
