//! Peer-to-peer network bootstrapped through a genesis server.
//!
//! The genesis server owns membership. This node registers once at startup,
//! pings to stay registered, and receives the full peer list whenever it
//! changes (`PUT /v1/p2p/genesis`).

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{Network, NetworkMode, Peer, PeerUpdateCallback, PublishedSchema, SchemaGetter};
use crate::error::NetworkError;

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    uri: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    peer: RegisteredPeer,
}

#[derive(Deserialize)]
struct RegisteredPeer {
    id: Uuid,
}

pub struct P2pNetwork {
    client: reqwest::Client,
    genesis_url: String,
    peer_id: Uuid,
    peer_name: String,
    peers: RwLock<Vec<Peer>>,
    callbacks: RwLock<Vec<PeerUpdateCallback>>,
    getter: RwLock<Option<Arc<dyn SchemaGetter>>>,
}

impl P2pNetwork {
    /// Register this node with the genesis server and return the network.
    /// Any failure here is fatal to startup.
    pub async fn bootstrap(
        genesis_url: &str,
        public_url: &str,
        peer_name: &str,
    ) -> Result<Self, NetworkError> {
        let genesis_url = genesis_url.trim_end_matches('/').to_string();
        let bootstrap_err = |reason: String| NetworkError::Bootstrap {
            genesis: genesis_url.clone(),
            reason,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| bootstrap_err(e.to_string()))?;

        let response = client
            .post(format!("{genesis_url}/peers/register"))
            .json(&RegisterRequest {
                name: peer_name,
                uri: public_url,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| bootstrap_err(e.to_string()))?;
        let registered: RegisterResponse = response
            .json()
            .await
            .map_err(|e| bootstrap_err(format!("unexpected register response: {e}")))?;

        tracing::info!(
            genesis = %genesis_url,
            peer_id = %registered.peer.id,
            peer_name,
            "registered with genesis server"
        );
        Ok(Self::with_identity(
            client,
            genesis_url,
            registered.peer.id,
            peer_name,
        ))
    }

    /// A network with an already-known identity. No registration happens.
    pub fn with_identity(
        client: reqwest::Client,
        genesis_url: impl Into<String>,
        peer_id: Uuid,
        peer_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            genesis_url: genesis_url.into(),
            peer_id,
            peer_name: peer_name.into(),
            peers: RwLock::new(Vec::new()),
            callbacks: RwLock::new(Vec::new()),
            getter: RwLock::new(None),
        }
    }

    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    /// Ping the genesis server every `interval` until the network is dropped.
    /// Failures are logged; the genesis server decides when a node is gone.
    pub fn spawn_keepalive(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let network: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(network) = network.upgrade() else {
                    break;
                };
                if let Err(e) = network.ping().await {
                    tracing::warn!(error = %e, "genesis ping failed");
                }
            }
        })
    }

    async fn ping(&self) -> Result<(), NetworkError> {
        self.client
            .post(format!("{}/peers/{}/ping", self.genesis_url, self.peer_id))
            .send()
            .await?
            .error_for_status()?;
        tracing::trace!(peer_id = %self.peer_id, "genesis ping ok");
        Ok(())
    }
}

fn validate_peers(peers: &[Peer]) -> Result<(), NetworkError> {
    let mut ids = HashSet::new();
    for peer in peers {
        if peer.name.trim().is_empty() {
            return Err(NetworkError::Rejected(format!("peer {} has no name", peer.id)));
        }
        if !ids.insert(peer.id) {
            return Err(NetworkError::Rejected(format!("duplicate peer id {}", peer.id)));
        }
        reqwest::Url::parse(&peer.uri).map_err(|e| {
            NetworkError::Rejected(format!("peer '{}' has invalid uri '{}': {e}", peer.name, peer.uri))
        })?;
    }
    Ok(())
}

#[async_trait]
impl Network for P2pNetwork {
    fn mode(&self) -> NetworkMode {
        NetworkMode::P2p
    }

    fn list_peers(&self) -> Result<Vec<Peer>, NetworkError> {
        self.peers
            .read()
            .map(|peers| peers.clone())
            .map_err(|_| NetworkError::Unavailable("peer list lock poisoned".into()))
    }

    fn update_peers(&self, peers: Vec<Peer>) -> Result<(), NetworkError> {
        validate_peers(&peers)?;
        {
            let mut current = self
                .peers
                .write()
                .map_err(|_| NetworkError::Unavailable("peer list lock poisoned".into()))?;
            *current = peers.clone();
        }
        tracing::info!(peers = peers.len(), "peer list replaced");

        // Callbacks must not register further callbacks.
        let callbacks = self.callbacks.read().unwrap_or_else(PoisonError::into_inner);
        for callback in callbacks.iter() {
            callback(&peers);
        }
        Ok(())
    }

    fn register_update_peers_callback(&self, callback: PeerUpdateCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    fn register_schema_getter(&self, getter: Arc<dyn SchemaGetter>) {
        *self.getter.write().unwrap_or_else(PoisonError::into_inner) = Some(getter);
    }

    async fn local_schema(&self) -> Result<PublishedSchema, NetworkError> {
        let getter = self
            .getter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(NetworkError::NoSchemaGetter)?;
        Ok(getter.schema().await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str, uri: &str) -> Peer {
        Peer {
            id: Uuid::now_v7(),
            name: name.into(),
            uri: uri.into(),
            schema_hash: String::new(),
        }
    }

    #[test]
    fn validate_rejects_duplicates_and_bad_uris() {
        let a = peer("a", "http://a:8080");
        let mut dup = peer("b", "http://b:8080");
        dup.id = a.id;
        assert!(matches!(
            validate_peers(&[a.clone(), dup]),
            Err(NetworkError::Rejected(_))
        ));
        assert!(validate_peers(&[peer("c", "not a url")]).is_err());
        assert!(validate_peers(&[peer(" ", "http://c")]).is_err());
        assert!(validate_peers(&[a, peer("b", "http://b:8080")]).is_ok());
    }
}
