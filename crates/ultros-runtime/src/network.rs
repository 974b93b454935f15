//! The network manager: network types and running networks.
//!
//! ```text
//! ultros.toml            networks/libera.toml         NetworkManager
//! [[networks]]    ──▶    type = "irc"          ──▶    factories["irc"](config)
//! name = "libera"        host = "..."                       │
//!                                                           ▼
//!                                              driver.setup(&network)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use ultros_core::{
    ConfigurableNetwork, EventManager, Network, NetworkContext, NetworkDriver, NetworkError,
    NetworkResult, OwnerId, TransportContext,
};
use ultros_storage::{DefaultsPath, StorageManager};

use crate::config::NetworkEntry;
use crate::error::{RuntimeError, RuntimeResult};

/// Builds a driver from a network's config document.
type NetworkFactory =
    Box<dyn Fn(Value, &NetworkContext) -> NetworkResult<Arc<dyn NetworkDriver>> + Send + Sync>;

struct RunningNetwork {
    network: Arc<Network>,
    driver: Arc<dyn NetworkDriver>,
}

/// Registry of network types and running networks.
pub struct NetworkManager {
    owner: OwnerId,
    events: Arc<EventManager>,
    storage: Arc<StorageManager>,
    transports: TransportContext,
    factories: RwLock<HashMap<&'static str, NetworkFactory>>,
    networks: RwLock<HashMap<String, RunningNetwork>>,
}

impl NetworkManager {
    pub fn new(
        events: Arc<EventManager>,
        storage: Arc<StorageManager>,
        transports: TransportContext,
    ) -> Self {
        Self {
            owner: OwnerId::new(),
            events,
            storage,
            transports,
            factories: RwLock::new(HashMap::new()),
            networks: RwLock::new(HashMap::new()),
        }
    }

    /// Owner of the network config files this manager loads.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn transports(&self) -> &TransportContext {
        &self.transports
    }

    // =========================================================================
    // Network types
    // =========================================================================

    /// Registers network type `D` under [`D::KIND`](ConfigurableNetwork::KIND).
    ///
    /// Returns `false` if the kind is already registered.
    pub fn register_network_type<D: ConfigurableNetwork>(&self) -> bool {
        let mut factories = self.factories.write();
        if factories.contains_key(D::KIND) {
            warn!(kind = D::KIND, "Network type already registered");
            return false;
        }

        let factory: NetworkFactory = Box::new(|config, context| {
            let config: D::Config = serde_json::from_value(config)
                .map_err(|e| NetworkError::config(format!("{}: {e}", context.name)))?;
            let driver: Arc<dyn NetworkDriver> = Arc::new(D::from_config(config, context)?);
            Ok(driver)
        });
        factories.insert(D::KIND, factory);

        debug!(kind = D::KIND, "Registered network type");
        true
    }

    /// Registered network type names, sorted.
    pub fn network_types(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.factories.read().keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts every enabled network in `entries`.
    ///
    /// A network that fails to load or set up is logged and skipped; the
    /// rest still start. Returns how many started.
    pub async fn setup(&self, entries: &[NetworkEntry]) -> usize {
        let mut started = 0;
        for entry in entries {
            if !entry.enabled {
                debug!(network = %entry.name, "Network disabled, skipping");
                continue;
            }
            match self.load_network(entry).await {
                Ok(_) => started += 1,
                Err(err) => {
                    error!(network = %entry.name, error = %err, "Failed to start network");
                }
            }
        }

        info!(started, configured = entries.len(), "Networks set up");
        started
    }

    /// Loads a network's config file and starts it with the driver its
    /// `type` key selects.
    pub async fn load_network(&self, entry: &NetworkEntry) -> RuntimeResult<Arc<Network>> {
        if self.networks.read().contains_key(&entry.name) {
            return Err(RuntimeError::DuplicateNetwork(entry.name.clone()));
        }

        let file = self.storage.get_config(
            &entry.config_path(),
            Some(self.owner),
            None,
            DefaultsPath::Auto,
        )?;
        let config = file.snapshot();

        let kind = config
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RuntimeError::MissingNetworkType {
                network: entry.name.clone(),
            })?
            .to_owned();

        let context = self.context(&entry.name);
        let driver = {
            let factories = self.factories.read();
            let factory = factories
                .get(kind.as_str())
                .ok_or_else(|| RuntimeError::UnknownNetworkType {
                    network: entry.name.clone(),
                    kind: kind.clone(),
                })?;
            factory(Value::Object(config), &context)?
        };

        self.start_network(&entry.name, driver).await
    }

    /// Creates network `name` and runs `driver.setup` on it.
    ///
    /// If setup fails the half-built network is shut down and the error
    /// returned.
    pub async fn start_network(
        &self,
        name: &str,
        driver: Arc<dyn NetworkDriver>,
    ) -> RuntimeResult<Arc<Network>> {
        if self.networks.read().contains_key(name) {
            return Err(RuntimeError::DuplicateNetwork(name.to_owned()));
        }

        let network = self.context(name).create_network(driver.kind());
        if let Err(err) = driver.setup(&network).await {
            network.shutdown().await;
            self.events.remove_handlers_for_owner(network.owner());
            return Err(err.into());
        }

        let inserted = {
            let mut networks = self.networks.write();
            let vacant = !networks.contains_key(name);
            if vacant {
                let running = RunningNetwork {
                    network: Arc::clone(&network),
                    driver,
                };
                networks.insert(name.to_owned(), running);
            }
            vacant
        };
        if !inserted {
            // Lost a race with another start of the same name.
            network.shutdown().await;
            return Err(RuntimeError::DuplicateNetwork(name.to_owned()));
        }

        info!(network = name, kind = network.kind(), "Network started");
        Ok(network)
    }

    /// Shuts one network down and forgets it.
    pub async fn stop_network(&self, name: &str) -> RuntimeResult<()> {
        let running = self
            .networks
            .write()
            .remove(name)
            .ok_or_else(|| RuntimeError::NetworkNotFound(name.to_owned()))?;
        self.teardown(name, running).await;
        Ok(())
    }

    /// Shuts down every network.
    pub async fn shutdown(&self) {
        let networks: Vec<_> = self.networks.write().drain().collect();
        for (name, running) in networks {
            self.teardown(&name, running).await;
        }
        self.storage.unload_for_owner(self.owner);
        info!("Network manager shut down");
    }

    async fn teardown(&self, name: &str, running: RunningNetwork) {
        if let Err(err) = running.driver.shutdown(&running.network).await {
            warn!(network = name, error = %err, "Network shutdown failed");
        }
        let removed = self.events.remove_handlers_for_owner(running.network.owner());
        debug!(network = name, removed, "Network stopped");
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn network(&self, name: &str) -> Option<Arc<Network>> {
        self.networks
            .read()
            .get(name)
            .map(|running| Arc::clone(&running.network))
    }

    /// Names of running networks, sorted.
    pub fn networks(&self) -> Vec<String> {
        let mut names: Vec<_> = self.networks.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    fn context(&self, name: &str) -> NetworkContext {
        NetworkContext::new(name, Arc::clone(&self.events), self.transports.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use async_trait::async_trait;
    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;

    #[derive(Deserialize)]
    struct DummyConfig {
        #[serde(default)]
        fail: bool,
    }

    struct DummyNetwork {
        fail: bool,
    }

    #[async_trait]
    impl NetworkDriver for DummyNetwork {
        fn kind(&self) -> &'static str {
            "dummy"
        }

        async fn setup(&self, _network: &Arc<Network>) -> NetworkResult<()> {
            if self.fail {
                return Err(NetworkError::config("told to fail"));
            }
            Ok(())
        }
    }

    impl ConfigurableNetwork for DummyNetwork {
        const KIND: &'static str = "dummy";
        type Config = DummyConfig;

        fn from_config(config: DummyConfig, _context: &NetworkContext) -> NetworkResult<Self> {
            Ok(Self { fail: config.fail })
        }
    }

    fn manager() -> (TempDir, NetworkManager) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(StorageManager::new(dir.path(), dir.path().join("data")));
        let manager = NetworkManager::new(
            Arc::new(EventManager::new()),
            storage,
            TransportContext::new(),
        );
        (dir, manager)
    }

    fn write(dir: &TempDir, path: &str, text: &str) {
        let full = dir.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, text).unwrap();
    }

    #[tokio::test]
    async fn test_setup_skips_broken_networks() {
        let (dir, manager) = manager();
        assert!(manager.register_network_type::<DummyNetwork>());
        assert!(!manager.register_network_type::<DummyNetwork>());

        write(&dir, "networks/good.toml", "type = \"dummy\"\n");
        write(&dir, "networks/defaulted.toml.default", "type = \"dummy\"\n");
        write(&dir, "networks/failing.toml", "type = \"dummy\"\nfail = true\n");
        write(&dir, "networks/unknown.toml", "type = \"carrier-pigeon\"\n");
        write(&dir, "networks/untyped.toml", "host = \"example.org\"\n");

        let mut disabled = NetworkEntry::new("good-but-off");
        disabled.enabled = false;
        let entries = vec![
            NetworkEntry::new("good"),
            NetworkEntry::new("defaulted"),
            NetworkEntry::new("failing"),
            NetworkEntry::new("unknown"),
            NetworkEntry::new("untyped"),
            NetworkEntry::new("missing"),
            disabled,
        ];

        assert_eq!(manager.setup(&entries).await, 2);
        assert_eq!(manager.networks(), vec!["defaulted", "good"]);
        assert_eq!(manager.network("good").unwrap().kind(), "dummy");
        assert!(manager.network("failing").is_none());

        manager.shutdown().await;
        assert!(manager.networks().is_empty());
    }

    #[tokio::test]
    async fn test_load_network_errors() {
        let (dir, manager) = manager();
        manager.register_network_type::<DummyNetwork>();
        write(&dir, "networks/a.toml", "type = \"dummy\"\n");
        write(&dir, "networks/b.toml", "type = \"nope\"\n");
        write(&dir, "networks/c.toml", "port = 1\n");

        manager.load_network(&NetworkEntry::new("a")).await.unwrap();
        assert!(matches!(
            manager.load_network(&NetworkEntry::new("a")).await,
            Err(RuntimeError::DuplicateNetwork(_))
        ));
        assert!(matches!(
            manager.load_network(&NetworkEntry::new("b")).await,
            Err(RuntimeError::UnknownNetworkType { kind, .. }) if kind == "nope"
        ));
        assert!(matches!(
            manager.load_network(&NetworkEntry::new("c")).await,
            Err(RuntimeError::MissingNetworkType { .. })
        ));

        manager.stop_network("a").await.unwrap();
        assert!(manager.stop_network("a").await.is_err());
    }
}
