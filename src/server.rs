//! Server context assembly and the HTTP entry point.
//!
//! [`build_context`] runs the startup sequence and yields the [`AppContext`]
//! every request handler shares. [`serve`] binds the router, stops on ctrl-c
//! and then waits for deferred writes to drain before returning.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::api;
use crate::batch::BatchCoordinator;
use crate::catalog::CatalogPublisher;
use crate::config::StrataConfig;
use crate::connector::{Connector, SqliteConnector};
use crate::db;
use crate::error::{NetworkError, StartupError};
use crate::lock::{ConnectorLock, SchemaView};
use crate::network::{Network, P2pNetwork, Peer, SchemaGetter, SoloNetwork};
use crate::schema::manager::SchemaManager;
use crate::schema::Schema;

/// Everything request handlers need, built once at startup.
pub struct AppContext {
    pub config: StrataConfig,
    pub lock: ConnectorLock,
    pub schema_manager: Arc<SchemaManager>,
    pub network: Arc<dyn Network>,
    pub coordinator: BatchCoordinator,
    pub catalog: Arc<CatalogPublisher>,
}

/// Hands peers this node's schema under a bounded read lock.
struct LockedSchemaGetter {
    lock: ConnectorLock,
    timeout: Duration,
}

#[async_trait]
impl SchemaGetter for LockedSchemaGetter {
    async fn schema(&self) -> Result<Schema, NetworkError> {
        let handle = self
            .lock
            .read_timeout(self.timeout)
            .await
            .map_err(|e| NetworkError::Unavailable(e.to_string()))?;
        Ok(Schema::clone(handle.schema()))
    }
}

/// Run the startup checks and wire the components together.
pub async fn build_context(config: StrataConfig) -> Result<AppContext, StartupError> {
    check_contextionary(&config)?;

    let schema_dir = config
        .resolved_schema_dir()
        .ok_or(StartupError::LocalSchemaNotConfigured)?;

    let network: Arc<dyn Network> = match &config.network {
        None => {
            tracing::info!("no network configured, running solo");
            Arc::new(SoloNetwork::new())
        }
        Some(net) => {
            let p2p = P2pNetwork::bootstrap(&net.genesis_url, &net.public_url, &net.peer_name)
                .await
                .map_err(StartupError::Network)?;
            let p2p = Arc::new(p2p);
            p2p.spawn_keepalive(Duration::from_secs(net.ping_interval_secs.max(1)));
            p2p
        }
    };

    let db_path = config.resolved_db_path();
    let conn = db::connect(&db_path).map_err(StartupError::Connector)?;

    let (manager, schema) = SchemaManager::open(&schema_dir).map_err(StartupError::SchemaState)?;

    db::initialize(&conn).map_err(StartupError::DatabaseInit)?;
    let connector = SqliteConnector::from_connection(conn);
    tracing::info!(db = %db_path.display(), "connector ready");

    Ok(assemble(config, Arc::new(connector), manager, schema, network).await)
}

fn check_contextionary(config: &StrataConfig) -> Result<(), StartupError> {
    let files = [
        ("knn", config.contextionary.knn_file.as_deref()),
        ("idx", config.contextionary.idx_file.as_deref()),
    ];
    for (which, file) in files {
        let path = file
            .map(crate::config::expand_tilde)
            .ok_or(StartupError::ContextionaryNotSpecified(which))?;
        if !path.exists() {
            return Err(StartupError::ContextionaryMissing(path));
        }
    }
    Ok(())
}

/// Wire already-opened components into an [`AppContext`]: register the
/// catalog observer, publish the initial catalog, rebuild it on peer changes
/// and expose the schema to peers.
pub async fn assemble(
    config: StrataConfig,
    connector: Arc<dyn Connector>,
    manager: SchemaManager,
    schema: Schema,
    network: Arc<dyn Network>,
) -> AppContext {
    let lock = ConnectorLock::new(connector, schema);
    let manager = Arc::new(manager);

    let catalog = Arc::new(CatalogPublisher::new(Arc::clone(&network)));
    manager.register_update_callback(catalog.clone());
    {
        let handle = lock.write().await;
        manager.trigger_update_callbacks(&handle);
    }

    let (peer_lock, peer_manager) = (lock.clone(), Arc::clone(&manager));
    network.register_update_peers_callback(Box::new(move |peers: &[Peer]| {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("peer update outside the runtime, schema callbacks not run");
            return;
        };
        let lock = peer_lock.clone();
        let manager = Arc::clone(&peer_manager);
        let count = peers.len();
        runtime.spawn(async move {
            let handle = lock.write().await;
            manager.trigger_update_callbacks(&handle);
            tracing::debug!(peers = count, "schema callbacks run after peer update");
        });
    }));

    network.register_schema_getter(Arc::new(LockedSchemaGetter {
        lock: lock.clone(),
        timeout: Duration::from_millis(config.lock.schema_getter_timeout_ms),
    }));

    let coordinator = BatchCoordinator::new(
        config.batch.max_concurrency,
        Arc::clone(&network),
        config.server.hostname.clone(),
    );

    AppContext {
        config,
        lock,
        schema_manager: manager,
        network,
        coordinator,
        catalog,
    }
}

/// Start the HTTP server and block until ctrl-c and a full drain.
pub async fn serve(config: StrataConfig) -> Result<()> {
    let ctx = Arc::new(build_context(config).await?);
    let bind_addr = ctx.config.bind_addr();

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, mode = %ctx.network.mode(), "strata listening");

    axum::serve(listener, api::router(Arc::clone(&ctx)))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    // Deferred writes hold the write lock until they finish.
    tracing::info!("waiting for deferred writes to drain");
    drop(ctx.lock.write().await);
    tracing::info!("shut down");

    Ok(())
}
