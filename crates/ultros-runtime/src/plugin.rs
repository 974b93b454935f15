//! Plugins and the plugin manager.
//!
//! A plugin registers handlers and loads storage files through its
//! [`PluginContext`], which tags everything with the plugin's [`OwnerId`].
//! Unloading the plugin removes all of it in one go.
//!
//! ```rust,ignore
//! struct Greeter;
//!
//! #[async_trait]
//! impl Plugin for Greeter {
//!     fn name(&self) -> &str { "greeter" }
//!
//!     async fn setup(&self, ctx: &PluginContext) -> Result<(), BoxError> {
//!         ctx.add_handler("irc.message", Callback::sync(|event, _| { ... }), HandlerOptions::new());
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use ultros_core::{
    BoxError, Callback, Event, EventManager, EventResult, HandlerOptions, Identifier, OwnerId,
};
use ultros_storage::{DefaultsPath, StorageFile, StorageManager, StorageResult};

use crate::error::{RuntimeError, RuntimeResult};
use crate::network::NetworkManager;

/// A unit of bot behaviour loaded at runtime.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Unique name the plugin is loaded under.
    fn name(&self) -> &str;

    /// Registers handlers and loads state. An error aborts the load and
    /// everything registered so far is removed.
    async fn setup(&self, context: &PluginContext) -> Result<(), BoxError>;

    /// Called before the plugin's handlers and files are removed.
    async fn shutdown(&self, _context: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }
}

/// What a plugin sees of the runtime.
#[derive(Clone)]
pub struct PluginContext {
    name: String,
    owner: OwnerId,
    events: Arc<EventManager>,
    storage: Arc<StorageManager>,
    networks: Arc<NetworkManager>,
}

impl PluginContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    pub fn networks(&self) -> &Arc<NetworkManager> {
        &self.networks
    }

    /// Registers a handler owned by this plugin.
    pub fn add_handler(
        &self,
        identifier: impl Into<Identifier>,
        callback: Callback,
        options: HandlerOptions,
    ) {
        self.events
            .add_handler(self.owner, identifier, callback, options);
    }

    pub async fn fire_event<E: Event>(&self, event: E) -> EventResult<E> {
        self.events.fire_event(event).await
    }

    /// Loads a config file owned by this plugin.
    pub fn get_config(&self, path: &str, defaults: DefaultsPath) -> StorageResult<Arc<StorageFile>> {
        self.storage.get_config(path, Some(self.owner), None, defaults)
    }

    /// Loads a data file owned by this plugin.
    pub fn get_data(&self, path: &str) -> StorageResult<Arc<StorageFile>> {
        self.storage.get_data(path, Some(self.owner), None)
    }
}

struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    context: PluginContext,
}

/// Loads and unloads plugins.
pub struct PluginManager {
    events: Arc<EventManager>,
    storage: Arc<StorageManager>,
    networks: Arc<NetworkManager>,
    plugins: RwLock<Vec<LoadedPlugin>>,
}

impl PluginManager {
    pub fn new(
        events: Arc<EventManager>,
        storage: Arc<StorageManager>,
        networks: Arc<NetworkManager>,
    ) -> Self {
        Self {
            events,
            storage,
            networks,
            plugins: RwLock::new(Vec::new()),
        }
    }

    /// Loads `plugin`, returning the owner id its registrations carry.
    pub async fn load(&self, plugin: impl Plugin) -> RuntimeResult<OwnerId> {
        self.load_arc(Arc::new(plugin)).await
    }

    pub async fn load_arc(&self, plugin: Arc<dyn Plugin>) -> RuntimeResult<OwnerId> {
        let name = plugin.name().to_owned();
        if self.is_loaded(&name) {
            return Err(RuntimeError::DuplicatePlugin(name));
        }

        let context = PluginContext {
            name: name.clone(),
            owner: OwnerId::new(),
            events: Arc::clone(&self.events),
            storage: Arc::clone(&self.storage),
            networks: Arc::clone(&self.networks),
        };

        if let Err(source) = plugin.setup(&context).await {
            self.release(&context);
            return Err(RuntimeError::Plugin { plugin: name, source });
        }

        let owner = context.owner;
        let duplicate = {
            let mut plugins = self.plugins.write();
            let duplicate = plugins.iter().any(|p| p.context.name == name);
            if !duplicate {
                plugins.push(LoadedPlugin {
                    plugin: Arc::clone(&plugin),
                    context: context.clone(),
                });
            }
            duplicate
        };
        if duplicate {
            self.release(&context);
            return Err(RuntimeError::DuplicatePlugin(name));
        }

        info!(plugin = %name, %owner, "Plugin loaded");
        Ok(owner)
    }

    /// Shuts a plugin down and removes its handlers and storage files.
    ///
    /// The handlers and files are removed even if the plugin's own shutdown
    /// fails; that error is returned afterwards.
    pub async fn unload(&self, name: &str) -> RuntimeResult<()> {
        let loaded = {
            let mut plugins = self.plugins.write();
            let index = plugins
                .iter()
                .position(|p| p.context.name == name)
                .ok_or_else(|| RuntimeError::PluginNotFound(name.to_owned()))?;
            plugins.remove(index)
        };

        let result = loaded.plugin.shutdown(&loaded.context).await;
        self.release(&loaded.context);
        info!(plugin = name, "Plugin unloaded");

        result.map_err(|source| RuntimeError::Plugin {
            plugin: name.to_owned(),
            source,
        })
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.plugins.read().iter().any(|p| p.context.name == name)
    }

    /// Names of loaded plugins, in load order.
    pub fn loaded(&self) -> Vec<String> {
        self.plugins
            .read()
            .iter()
            .map(|p| p.context.name.clone())
            .collect()
    }

    /// Unloads every plugin, most recently loaded first.
    pub async fn shutdown(&self) {
        for name in self.loaded().into_iter().rev() {
            if let Err(err) = self.unload(&name).await {
                warn!(plugin = %name, error = %err, "Plugin shutdown failed");
            }
        }
        info!("Plugin manager shut down");
    }

    fn release(&self, context: &PluginContext) {
        let handlers = self.events.remove_handlers_for_owner(context.owner);
        let files = self.storage.unload_for_owner(context.owner);
        debug!(plugin = %context.name, handlers, files, "Released plugin resources");
    }
}
