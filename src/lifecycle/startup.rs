//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build connectors, senders, reader, store and receiver in dependency order
//! - Start the receiver's listeners
//! - Bind the public and admin listeners and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)
//! - Shutdown order: stop HTTP, stop receiver, close sender handles

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin;
use crate::config::validation::{join_errors, validate_config, ValidationError};
use crate::config::GatewayConfig;
use crate::endpoint::Connector;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::messaging::{MessageReceiver, MessageSender, MessageStore};
use crate::observability::metrics;
use crate::storage::{BlobReader, BlobWriter};
use crate::transport::memory::{MemoryRegistry, NamespaceSettings};

/// Error raised while bringing the gateway up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Every long-lived component, wired together.
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<MemoryRegistry>,
    sender: MessageSender,
    writer: BlobWriter,
    reader: BlobReader,
    store: MessageStore,
    receiver: MessageReceiver,
}

impl Gateway {
    /// Build every component with a fresh in-memory registry and start consuming.
    pub fn start(config: GatewayConfig) -> Result<Self, StartupError> {
        let registry = Arc::new(MemoryRegistry::new(NamespaceSettings {
            lock_duration: config.broker.lock_duration(),
            max_delivery_count: config.messaging.max_delivery_count,
        }));
        Self::start_with_registry(config, registry)
    }

    /// Like [`Gateway::start`], sharing `memory://` namespaces with the caller.
    pub fn start_with_registry(
        config: GatewayConfig,
        registry: Arc<MemoryRegistry>,
    ) -> Result<Self, StartupError> {
        validate_config(&config).map_err(StartupError::Validation)?;

        let connector = Connector::new(registry.clone());
        let timeout = config.timeouts.operation();
        let store = MessageStore::new();

        let gateway = Self {
            sender: MessageSender::new(&config.messaging, &connector, timeout),
            writer: BlobWriter::new(&config.storage, &connector, timeout),
            reader: BlobReader::new(&config.storage, &connector, timeout),
            receiver: MessageReceiver::new(&config.messaging, &connector, Arc::new(store.clone()), timeout),
            store,
            registry,
            config,
        };
        gateway.receiver.start();

        tracing::info!(
            messaging_primary = %gateway.config.messaging.primary,
            messaging_secondary = gateway.config.messaging.secondary().unwrap_or("none"),
            storage_primary = %gateway.config.storage.primary,
            storage_secondary = gateway.config.storage.secondary().unwrap_or("none"),
            "Gateway started"
        );
        Ok(gateway)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MemoryRegistry> {
        &self.registry
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn writer(&self) -> &BlobWriter {
        &self.writer
    }

    pub fn reader(&self) -> &BlobReader {
        &self.reader
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn receiver(&self) -> &MessageReceiver {
        &self.receiver
    }

    /// Stop consuming and close every endpoint handle.
    pub async fn shutdown(&self) {
        self.receiver.stop().await;
        self.sender.close().await;
        self.writer.close().await;
        self.reader.close().await;
        tracing::info!("Gateway stopped");
    }
}

/// Run the gateway until SIGINT/SIGTERM.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());
    run_until(config, shutdown).await
}

/// Run the gateway until `shutdown` is triggered.
pub async fn run_until(config: GatewayConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let listener = bind(&config.listener.bind_address).await?;
    let admin_listener = if config.admin.enabled {
        Some(bind(&config.admin.bind_address).await?)
    } else {
        None
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = Arc::new(Gateway::start(config)?);

    let admin_task = admin_listener.map(|listener| {
        let router = admin::setup_admin_router(gateway.clone());
        let mut signal = shutdown.subscribe();
        tokio::spawn(async move {
            tracing::info!(address = ?listener.local_addr().ok(), "Admin API listening");
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.recv().await })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin server failed");
            }
        })
    });

    let served = HttpServer::new(gateway.clone())
        .run(listener, shutdown.subscribe())
        .await;

    shutdown.trigger();
    if let Some(task) = admin_task {
        let _ = task.await;
    }
    gateway.shutdown().await;

    served.map_err(StartupError::Serve)
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address).await.map_err(|source| StartupError::Bind {
        address: address.to_string(),
        source,
    })
}
