// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mirrorline serve` command implementation.
//!
//! Wires SQLite storage, the in-process cache and the Telegram transport
//! into a [`Relay`], then runs its job worker and recovery sweeper next to
//! the HTTP gateway and the control-panel callback listeners until a
//! shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use mirrorline_cache::MemoryCache;
use mirrorline_config::model::MirrorlineConfig;
use mirrorline_core::{
    CacheStore, ConversationEngine, CredentialProvider, DirectoryService, MirrorError,
    PluginAdapter, StorageAdapter, TransportClient,
};
use mirrorline_relay::{LoggingEngine, MemoryDirectory, Relay, RelayDeps};
use mirrorline_storage::SqliteStorage;

#[cfg(feature = "telegram")]
use mirrorline_telegram::{ConfigCredentials, TelegramTransport};

#[cfg(not(feature = "telegram"))]
compile_error!("mirrorline requires the 'telegram' feature for the transport");

use crate::shutdown;

/// How long background tasks get to finish after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// The adapters behind a relay, kept so commands can reach them directly.
pub(crate) struct Runtime {
    pub relay: Relay,
    pub storage: Arc<SqliteStorage>,
    pub transport: Arc<TelegramTransport>,
    pub credentials: Arc<ConfigCredentials>,
    pub directory: Arc<MemoryDirectory>,
}

impl Runtime {
    pub async fn build(config: &MirrorlineConfig) -> Result<Self, MirrorError> {
        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;

        let cache = Arc::new(MemoryCache::new());
        let directory = Arc::new(MemoryDirectory::new());

        let credentials = Arc::new(ConfigCredentials::from_config(&config.telegram)?);
        let transport = Arc::new(TelegramTransport::new(
            &config.telegram,
            Arc::clone(&credentials) as Arc<dyn CredentialProvider>,
        )?);

        let relay = Relay::new(
            config.relay.clone(),
            RelayDeps {
                storage: Arc::clone(&storage) as Arc<dyn StorageAdapter>,
                cache: cache as Arc<dyn CacheStore>,
                transport: Arc::clone(&transport) as Arc<dyn TransportClient>,
                directory: Arc::clone(&directory) as Arc<dyn DirectoryService>,
                engine: Arc::new(LoggingEngine) as Arc<dyn ConversationEngine>,
            },
        );

        Ok(Self {
            relay,
            storage,
            transport,
            credentials,
            directory,
        })
    }

    pub async fn close(&self) {
        if let Err(e) = self.transport.shutdown().await {
            warn!(error = %e, "transport shutdown failed");
        }
        if let Err(e) = self.storage.close().await {
            warn!(error = %e, "storage close failed");
        }
    }
}

/// Runs the `mirrorline serve` command.
pub async fn run_serve(config: MirrorlineConfig) -> Result<(), MirrorError> {
    info!(name = %config.agent.name, "starting mirrorline serve");

    #[cfg(feature = "prometheus")]
    let prometheus = if config.prometheus.enabled {
        match mirrorline_prometheus::PrometheusAdapter::new() {
            Ok(adapter) => Some(adapter),
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        None
    };

    let runtime = Runtime::build(&config).await?;
    let cancel = shutdown::install_signal_handler();

    let mut handles = runtime.relay.spawn(cancel.clone());
    info!(
        workers = config.relay.workers,
        sweep_interval_secs = config.relay.sweep_interval_secs,
        "relay started"
    );

    if config.telegram.poll_callbacks {
        let bots: Vec<_> = runtime.credentials.bots().collect();
        handles.extend(
            mirrorline_telegram::spawn_callback_listeners(
                &runtime.transport,
                bots,
                Arc::clone(&runtime.relay.control),
                cancel.clone(),
            )
            .await,
        );
    }

    #[cfg(feature = "gateway")]
    if config.gateway.enabled {
        use mirrorline_gateway::{AuthConfig, GatewayState, HealthState, ServerConfig};

        #[cfg(feature = "prometheus")]
        let prometheus_render = prometheus.as_ref().map(|adapter| {
            let handle = adapter.handle().clone();
            Arc::new(move || handle.render()) as Arc<dyn Fn() -> String + Send + Sync>
        });
        #[cfg(not(feature = "prometheus"))]
        let prometheus_render = None;

        let state = GatewayState {
            pipeline: Arc::clone(&runtime.relay.pipeline),
            control: Arc::clone(&runtime.relay.control),
            directory: Some(Arc::clone(&runtime.directory)),
            auth: AuthConfig {
                bearer_token: config.gateway.bearer_token.clone(),
            },
            health: HealthState {
                start_time: std::time::Instant::now(),
                prometheus_render,
            },
        };
        let server_config = ServerConfig {
            host: config.gateway.host.clone(),
            port: config.gateway.port,
        };
        let gateway_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) =
                mirrorline_gateway::start_server(&server_config, state, gateway_cancel.clone())
                    .await
            {
                error!(error = %e, "gateway failed, shutting down");
                gateway_cancel.cancel();
            }
        }));
    }

    cancel.cancelled().await;
    info!("shutdown requested, waiting for background tasks");

    if tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(handles))
        .await
        .is_err()
    {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "background tasks did not stop in time"
        );
    }

    runtime.close().await;
    info!("mirrorline stopped");
    Ok(())
}
