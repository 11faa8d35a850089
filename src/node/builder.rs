//! A builder pattern implementation for constructing an [`EngineNode`]
//! instance.
//!
//! The [`NodeBuilder`] provides a fluent interface to configure and assemble
//! the components of the engine: the dataset tooling, the retention queue and
//! its consumer, and the auxiliary servers.
//!
//! ## Key Design Points
//! - **Default Components**: Initializes with production-ready defaults (zfs
//!   command line tooling, gRPC transport).
//! - **Customization**: Allows overriding the dataset engine via `engine()`,
//!   which is how tests substitute an in-memory double.
//! - **Lifecycle Management**:
//!   - `build()`: Assembles the [`EngineNode`] and wires the retention FIFO.
//!   - `start_metrics_server()`/`start_rpc_server()`: Launches auxiliary services.
//!   - `ready()`: Finalizes construction and returns the initialized node.
//!
//! ## Example
//! ```ignore
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let node = NodeBuilder::new(None, shutdown_rx)
//!     .engine(custom_engine)  // Optional override
//!     .build()
//!     .start_metrics_server(shutdown_tx.subscribe())
//!     .start_rpc_server().await
//!     .ready()
//!     .unwrap();
//! ```
//!
//! ## Notes
//! - **Thread Safety**: The node is wrapped in `Arc` for shared ownership.
//! - **Resource Cleanup**: Uses `watch::Receiver` for cooperative shutdown signaling.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::config::Settings;
use crate::grpc;
use crate::metrics;
use crate::DatasetEngine;
use crate::EngineNode;
use crate::Result;
use crate::RetentionConsumer;
use crate::RetentionQueue;
use crate::SystemError;
use crate::ZfsCli;

/// Builder pattern implementation for constructing an engine node with
/// configurable components. Provides a fluent interface to set up settings,
/// the dataset engine, and the auxiliary services.
pub struct NodeBuilder {
    pub(super) settings: Settings,
    pub(super) engine: Option<Arc<dyn DatasetEngine>>,
    pub(super) shutdown_signal: watch::Receiver<()>,

    pub(super) node: Option<Arc<EngineNode>>,
}

impl NodeBuilder {
    /// Creates a new NodeBuilder with settings loaded from file
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a node-specific configuration file
    /// * `shutdown_signal` - Watch channel for graceful shutdown signaling
    ///
    /// # Panics
    /// Will panic if configuration loading fails (consider returning Result
    /// instead)
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        if let Some(p) = config_path {
            info!("loading settings with override from: {}", p);
        }
        let settings = Settings::load(config_path).expect("Load settings successfully");
        Self::init(settings, shutdown_signal)
    }

    /// Constructs NodeBuilder from in-memory settings
    ///
    /// # Arguments
    /// * `settings` - Pre-built settings
    /// * `shutdown_signal` - Graceful shutdown notification channel
    ///
    /// # Usage
    /// ```ignore
    /// let builder = NodeBuilder::from_settings(my_settings, shutdown_rx);
    /// ```
    pub fn from_settings(
        settings: Settings,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self::init(settings, shutdown_signal)
    }

    /// Core initialization logic shared by all construction paths
    pub fn init(
        settings: Settings,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            settings,
            engine: None,
            shutdown_signal,
            node: None,
        }
    }

    /// Sets a custom dataset engine implementation
    pub fn engine(
        mut self,
        engine: Arc<dyn DatasetEngine>,
    ) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Replaces the entire settings tree
    pub fn settings(
        mut self,
        settings: Settings,
    ) -> Self {
        self.settings = settings;
        self
    }

    /// Finalizes the builder and constructs the engine node instance.
    ///
    /// Initializes default implementations for any unconfigured components:
    /// - Shells out to the zfs binary unless an engine override was given
    /// - Wires the retention queue to its single consumer
    ///
    /// # Panics
    /// Panics if the settings fail validation
    pub fn build(mut self) -> Self {
        self.settings
            .validate()
            .expect("Settings validation succeed");

        let engine = self
            .engine
            .take()
            .unwrap_or_else(|| Arc::new(ZfsCli::new(self.settings.engine.clone())));

        let (queue, deletion_rx) = RetentionQueue::new(self.settings.retention.queue_capacity);
        let consumer = RetentionConsumer::new(
            engine.clone(),
            queue.clone(),
            deletion_rx,
            self.settings.retention.clone(),
        );

        let node = EngineNode {
            engine,
            queue,
            retention_consumer: Mutex::new(Some(consumer)),
            ready: AtomicBool::new(false),
            shutdown_signal: self.shutdown_signal.clone(),
            settings: Arc::new(self.settings.clone()),
        };

        self.node = Some(Arc::new(node));
        self
    }

    /// Starts the metrics server for monitoring node operations.
    ///
    /// Launches a Prometheus endpoint on the configured port.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        if !self.settings.monitoring.prometheus_enabled {
            debug!("prometheus exporter disabled, skipping metrics server");
            return self;
        }
        println!("start metrics server!");
        let port = self.settings.monitoring.prometheus_port;
        tokio::spawn(async move {
            metrics::start_server(port, shutdown_signal).await;
        });
        self
    }

    /// Starts the gRPC server for replication traffic.
    ///
    /// # Panics
    /// Panics if node hasn't been built
    pub async fn start_rpc_server(self) -> Self {
        if !self.settings.node.enable_rpc {
            debug!("replication RPC surface disabled by settings");
            return self;
        }

        debug!("1. --- start RPC server --- ");
        if let Some(ref node) = self.node {
            let node_clone = node.clone();
            let shutdown = self.shutdown_signal.clone();
            let listen_address = self.settings.node.listen_address;
            let settings = self.settings.clone();
            tokio::spawn(async move {
                if let Err(e) = grpc::start_rpc_server(node_clone, listen_address, settings, shutdown).await {
                    eprintln!("RPC server stops. {:?}", e);
                    error!("RPC server stops. {:?}", e);
                }
            });
            self
        } else {
            panic!("failed to start RPC server");
        }
    }

    /// Returns the built node instance after successful construction.
    ///
    /// # Errors
    /// Returns a node start failure if build hasn't completed
    pub fn ready(self) -> Result<Arc<EngineNode>> {
        self.node
            .ok_or_else(|| SystemError::NodeStartFailed("check node ready failed".to_string()).into())
    }
}
