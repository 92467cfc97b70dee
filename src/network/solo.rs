//! The network used when none is configured.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use super::{Network, NetworkMode, Peer, PeerUpdateCallback, PublishedSchema, SchemaGetter};
use crate::error::NetworkError;

/// A node with no peers. Peer updates are refused; the schema getter still
/// works so `/v1/p2p/schema` answers consistently.
#[derive(Default)]
pub struct SoloNetwork {
    getter: RwLock<Option<Arc<dyn SchemaGetter>>>,
}

impl SoloNetwork {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Network for SoloNetwork {
    fn mode(&self) -> NetworkMode {
        NetworkMode::Solo
    }

    fn list_peers(&self) -> Result<Vec<Peer>, NetworkError> {
        Ok(Vec::new())
    }

    fn update_peers(&self, _peers: Vec<Peer>) -> Result<(), NetworkError> {
        Err(NetworkError::NotConfigured)
    }

    // Peers never change, so there is nothing to call back.
    fn register_update_peers_callback(&self, _callback: PeerUpdateCallback) {}

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
