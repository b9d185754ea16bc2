//! The Volt master server.
//!
//! This crate assembles the coordination layer of a Volt deployment:
//!
//! - **Placement & records**: derived and modeled in [`volt_core`].
//! - **Volume client** ([`volume`]): HEAD/GET/PUT/DELETE against the
//!   volume HTTP servers over a shared connection pool.
//! - **Replication engine** (on [`Master`]): concurrent fan-out for
//!   writes and hard deletes.
//! - **HTTP surface**: the object-store verbs plus list queries,
//!   multiplexed on the URL path.
//! - **Rebalance** ([`rebalance`]): moving keys onto canonical volumes.
//!
//! The crate is used by the `volt_cli` binary, but can be embedded: build a
//! [`MasterConfig`], pick an index backend, and call [`Master::serve`] (or
//! mount [`Master::router`] yourself).

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use volt_core::index::IndexApi;
use volt_core::lock::KeyLocks;
use volt_core::placement::key2volume;
use volt_core::record::Record;

pub mod config;
pub mod rebalance;
mod replication;
mod router;
pub mod volume;

pub use config::MasterConfig;

use crate::volume::VolumeClient;

/// The master: authoritative metadata plus coordination of every mutation
/// against the volume fleet.
pub struct Master {
    pub(crate) config: MasterConfig,
    pub(crate) index: Arc<dyn IndexApi>,
    pub(crate) locks: KeyLocks,
    pub(crate) volumes: VolumeClient,
}

impl Master {
    pub fn new(config: MasterConfig, index: Arc<dyn IndexApi>) -> anyhow::Result<Arc<Self>> {
        config.validate()?;
        let volumes = VolumeClient::new(config.voltimeout());
        Ok(Arc::new(Self {
            config,
            index,
            locks: KeyLocks::new(),
            volumes,
        }))
    }

    /// The HTTP surface as an axum router. Keys are arbitrary URL paths and
    /// two of the verbs are nonstandard, so the whole surface is a single
    /// fallback dispatcher rather than per-route handlers.
    pub fn router(self: &Arc<Self>) -> axum::Router {
        axum::Router::new()
            .fallback(router::dispatch)
            .with_state(self.clone())
    }

    /// Serves the HTTP surface until ctrl-c or SIGTERM.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        info!("volt master listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    /// The record for a key, or the hard-deleted default when the index has
    /// no entry.
    pub(crate) async fn record(&self, key: &[u8]) -> anyhow::Result<Record> {
        Ok(self
            .index
            .get(key)
            .await?
            .unwrap_or_else(Record::hard_deleted))
    }

    /// Canonical placement for a key under the current configuration.
    pub(crate) fn placement(&self, key: &[u8]) -> Vec<String> {
        key2volume(
            key,
            &self.config.volumes,
            self.config.replicas,
            self.config.subvolumes,
        )
    }
}

/// Opens the configured redb index and serves the master on the configured
/// listen address. This is the entry point the `volt` binary uses.
pub async fn run_master(config: MasterConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.index_path)?;
    let index = Arc::new(volt_index_redb::RedbIndex::open(&config.index_path)?);
    let listener = TcpListener::bind(&config.listen).await?;
    let master = Master::new(config, index)?;
    master.serve(listener).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
