//! The Ultros root object.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ultros_runtime::Ultros;
//!
//! let ultros = Ultros::builder()
//!     .config_dir("./config")
//!     .data_dir("./data")
//!     .build()?;
//! ultros.register_network_type::<IrcNetwork>();
//! ultros.run()?;
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! build:     config ─▶ logging ─▶ storage ─▶ events ─▶ networks ─▶ plugins
//! setup:     networks.setup ─▶ pending plugins ─▶ UltrosStartedEvent
//! shutdown:  UltrosShutdownEvent ─▶ networks ─▶ plugins ─▶ events ─▶ storage
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ultros_core::{ConfigurableNetwork, EventManager, OwnerId, TransportContext};
use ultros_storage::StorageManager;

use crate::config::{ConfigLoader, UltrosConfig};
use crate::error::RuntimeResult;
use crate::events::{UltrosShutdownEvent, UltrosStartedEvent};
use crate::logging;
use crate::network::NetworkManager;
use crate::plugin::{Plugin, PluginManager};
use crate::transport::create_default_transport_context;

/// Default config directory, relative to the working directory.
pub const DEFAULT_CONFIG_DIR: &str = "./config";
/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// The root object: owns every manager and drives the lifecycle.
pub struct Ultros {
    config: UltrosConfig,
    owner: OwnerId,
    storage: Arc<StorageManager>,
    events: Arc<EventManager>,
    networks: Arc<NetworkManager>,
    plugins: Arc<PluginManager>,
    pending_plugins: Mutex<Vec<Arc<dyn Plugin>>>,
    shutdown: CancellationToken,
    set_up: AtomicBool,
    shut_down: AtomicBool,
}

impl Ultros {
    pub fn builder() -> UltrosBuilder {
        UltrosBuilder::new()
    }

    pub fn config(&self) -> &UltrosConfig {
        &self.config
    }

    /// Owner id of handlers the runtime itself registers.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn networks(&self) -> &Arc<NetworkManager> {
        &self.networks
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    /// See [`NetworkManager::register_network_type`].
    pub fn register_network_type<D: ConfigurableNetwork>(&self) -> bool {
        self.networks.register_network_type::<D>()
    }

    /// Queues a plugin to be loaded during [`setup`](Self::setup), after the
    /// networks have started.
    pub fn add_plugin(&self, plugin: impl Plugin) {
        self.pending_plugins.lock().push(Arc::new(plugin));
    }

    /// A handle that stops [`run`](Self::run) or [`run_until`](Self::run_until)
    /// from anywhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Starts networks, loads queued plugins and fires [`UltrosStartedEvent`].
    ///
    /// Failures of individual networks and plugins are logged and skipped.
    /// Calling it again does nothing.
    pub async fn setup(&self) -> RuntimeResult<()> {
        if self.set_up.swap(true, Ordering::AcqRel) {
            debug!("Already set up");
            return Ok(());
        }

        info!("Setting up Ultros");
        self.networks.setup(&self.config.networks).await;

        let pending: Vec<_> = self.pending_plugins.lock().drain(..).collect();
        for plugin in pending {
            let name = plugin.name().to_owned();
            if let Err(err) = self.plugins.load_arc(plugin).await {
                error!(plugin = %name, error = %err, "Failed to load plugin");
            }
        }

        let started = UltrosStartedEvent {
            networks: self.networks.networks(),
            plugins: self.plugins.loaded(),
            ..Default::default()
        };
        self.events.fire_event(started).await?;

        info!("Ultros is up");
        Ok(())
    }

    /// Runs setup, waits for `until` or a shutdown request, then shuts down.
    pub async fn run_until<F>(&self, until: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let result = self.setup().await;
        if result.is_ok() {
            tokio::select! {
                () = until => debug!("Run future completed"),
                () = self.shutdown.cancelled() => debug!("Shutdown requested"),
            }
        }
        self.shutdown().await;
        result
    }

    /// Runs until SIGINT, SIGTERM, Ctrl-Break or a [`ShutdownHandle`] fires.
    ///
    /// Blocks the calling thread on a current-thread tokio runtime, so every
    /// handler runs on this thread.
    pub fn run(&self) -> RuntimeResult<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        info!("Ultros is running. Press Ctrl+C to stop.");
        runtime.block_on(self.run_until(wait_for_signal()))
    }

    /// Tears everything down in order: networks, plugins, events, storage.
    ///
    /// Fires [`UltrosShutdownEvent`] first; a failing handler is logged and
    /// does not stop the shutdown. Calling it again does nothing.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down Ultros");
        self.shutdown.cancel();

        if let Err(err) = self.events.fire_event(UltrosShutdownEvent::default()).await {
            warn!(error = %err, "Shutdown event handler failed");
        }

        self.networks.shutdown().await;
        self.plugins.shutdown().await;
        self.events.shutdown();
        self.storage.shutdown();

        info!("Ultros shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

/// Requests shutdown of a running [`Ultros`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(CancellationToken);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Completes once shutdown has been requested.
    pub async fn wait(&self) {
        self.0.cancelled().await;
    }
}

/// Waits for shutdown signals (Ctrl+C, SIGTERM, Ctrl-Break).
///
/// If no signal handler can be installed this never completes, leaving
/// shutdown to a [`ShutdownHandle`].
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => Some(sigterm),
            Err(err) => {
                warn!(error = %err, "Failed to register SIGTERM handler");
                None
            }
        };
        let terminate = async {
            match sigterm.as_mut() {
                Some(sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            () = ctrl_c() => info!("Received Ctrl+C, shutting down"),
            () = terminate => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(windows)]
    {
        let ctrl_break = async {
            match signal::windows::ctrl_break() {
                Ok(mut ctrl_break) => {
                    ctrl_break.recv().await;
                }
                Err(err) => {
                    warn!(error = %err, "Failed to register Ctrl-Break handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            () = ctrl_c() => info!("Received Ctrl+C, shutting down"),
            () = ctrl_break => info!("Received Ctrl-Break, shutting down"),
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

// =============================================================================
// UltrosBuilder
// =============================================================================

/// Builder for [`Ultros`].
///
/// `ultros.toml` is searched for in the config directory unless a config is
/// given with [`config`](Self::config).
pub struct UltrosBuilder {
    config_dir: PathBuf,
    data_dir: PathBuf,
    loader: Option<ConfigLoader>,
    config: Option<UltrosConfig>,
    init_logging: bool,
    transports: Option<TransportContext>,
}

impl Default for UltrosBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UltrosBuilder {
    pub fn new() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            loader: None,
            config: None,
            init_logging: true,
            transports: None,
        }
    }

    pub fn config_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_dir = path.as_ref().to_path_buf();
        self
    }

    /// Uses this loader instead of searching the config directory.
    pub fn loader(mut self, loader: ConfigLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Uses this configuration as-is; nothing is loaded.
    pub fn config(mut self, config: UltrosConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Replaces the feature-selected transport dialers.
    pub fn transports(mut self, transports: TransportContext) -> Self {
        self.transports = Some(transports);
        self
    }

    pub fn build(self) -> RuntimeResult<Ultros> {
        let config = match self.config {
            Some(config) => config,
            None => self
                .loader
                .unwrap_or_else(|| ConfigLoader::new().search_path(&self.config_dir))
                .load()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let storage = Arc::new(StorageManager::new(&self.config_dir, &self.data_dir));
        let events = Arc::new(EventManager::new());
        let networks = Arc::new(NetworkManager::new(
            Arc::clone(&events),
            Arc::clone(&storage),
            self.transports.unwrap_or_else(create_default_transport_context),
        ));
        let plugins = Arc::new(PluginManager::new(
            Arc::clone(&events),
            Arc::clone(&storage),
            Arc::clone(&networks),
        ));

        info!(
            config_dir = %self.config_dir.display(),
            data_dir = %self.data_dir.display(),
            networks = config.networks.len(),
            "Ultros initialized"
        );

        Ok(Ultros {
            config,
            owner: OwnerId::new(),
            storage,
            events,
            networks,
            plugins,
            pending_plugins: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            set_up: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }
}
