//! Networks: the owning registry of servers and connectors.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::backref::BackRef;
use super::connector::{Connector, ConnectorState};
use super::protocol::Protocol;
use super::server::{Server, downcast_server};
use super::transport::{Endpoint, TransportContext};
use crate::error::{NetworkError, NetworkResult, TransportError};
use crate::foundation::OwnerId;
use crate::framework::EventManager;

/// A named network: owns its servers and connectors and tracks which
/// connectors belong to which server.
///
/// A connector is associated with at most one server. Association entries
/// outlive a disconnect, so a connector recreated under the same name rejoins
/// its server; they are dropped by [`destroy_server`](Self::destroy_server)
/// and [`destroy_connector`](Self::destroy_connector).
pub struct Network {
    name: String,
    kind: &'static str,
    owner: OwnerId,
    events: Arc<EventManager>,
    transports: TransportContext,
    servers: RwLock<HashMap<String, Arc<dyn Server>>>,
    connectors: RwLock<HashMap<String, Arc<Connector>>>,
    /// Server name → connector names.
    associations: RwLock<HashMap<String, Vec<String>>>,
}

impl Network {
    pub fn new(
        name: impl Into<String>,
        kind: &'static str,
        events: Arc<EventManager>,
        transports: TransportContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            owner: OwnerId::new(),
            events,
            transports,
            servers: RwLock::new(HashMap::new()),
            connectors: RwLock::new(HashMap::new()),
            associations: RwLock::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Network type, e.g. `"irc"`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Owner id for handlers registered on behalf of this network.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn transports(&self) -> &TransportContext {
        &self.transports
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Builds a server with a back-reference to this network and registers it.
    pub fn create_server<S, F>(self: &Arc<Self>, build: F) -> NetworkResult<Arc<S>>
    where
        S: Server,
        F: FnOnce(BackRef<Network>) -> S,
    {
        let server = Arc::new(build(BackRef::new(self, "network")));
        let name = server.name().to_owned();

        let mut servers = self.servers.write();
        if servers.contains_key(&name) {
            return Err(NetworkError::DuplicateServer(name));
        }
        servers.insert(name.clone(), Arc::clone(&server) as Arc<dyn Server>);

        debug!(network = %self.name, server = %name, "Server created");
        Ok(server)
    }

    /// Creates a connector and, if `server` is given, associates it.
    pub fn create_connector(
        self: &Arc<Self>,
        name: impl Into<String>,
        endpoint: Endpoint,
        protocol: Arc<dyn Protocol>,
        server: Option<&str>,
    ) -> NetworkResult<Arc<Connector>> {
        let name = name.into();
        if let Some(server) = server.filter(|server| !self.has_server(server)) {
            return Err(NetworkError::ServerNotFound(server.to_owned()));
        }

        let connector = Arc::new(Connector::new(
            name.clone(),
            endpoint,
            BackRef::new(self, "network"),
            protocol,
        ));
        {
            let mut connectors = self.connectors.write();
            if connectors.contains_key(&name) {
                return Err(NetworkError::DuplicateConnector(name));
            }
            connectors.insert(name.clone(), Arc::clone(&connector));
        }
        debug!(network = %self.name, connector = %name, endpoint = %connector.endpoint(), "Connector created");

        if let Some(server) = server {
            self.associate(server, &name)?;
        }
        Ok(connector)
    }

    /// Associates a connector with a server, replacing any previous association.
    pub fn associate(&self, server: &str, connector: &str) -> NetworkResult<()> {
        let server_ref = self
            .get_server(server)
            .ok_or_else(|| NetworkError::ServerNotFound(server.to_owned()))?;
        let connector_ref = self
            .get_connector(connector)
            .ok_or_else(|| NetworkError::ConnectorNotFound(connector.to_owned()))?;

        {
            let mut associations = self.associations.write();
            for names in associations.values_mut() {
                names.retain(|name| name != connector);
            }
            associations.retain(|_, names| !names.is_empty());
            associations
                .entry(server.to_owned())
                .or_default()
                .push(connector.to_owned());
        }
        connector_ref.set_server(Some(BackRef::new(&server_ref, "server")));

        debug!(network = %self.name, server, connector, "Connector associated");
        Ok(())
    }

    /// Drops a connector's association. Returns whether one existed.
    pub fn dissociate(&self, connector: &str) -> bool {
        let mut found = false;
        {
            let mut associations = self.associations.write();
            for names in associations.values_mut() {
                let before = names.len();
                names.retain(|name| name != connector);
                found |= names.len() != before;
            }
            associations.retain(|_, names| !names.is_empty());
        }
        if let Some(connector) = self.get_connector(connector) {
            connector.set_server(None);
        }
        found
    }

    pub fn has_server(&self, name: &str) -> bool {
        self.servers.read().contains_key(name)
    }

    pub fn get_server(&self, name: &str) -> Option<Arc<dyn Server>> {
        self.servers.read().get(name).cloned()
    }

    /// [`get_server`](Self::get_server) downcast to the concrete type.
    pub fn get_server_as<S: Server>(&self, name: &str) -> Option<Arc<S>> {
        self.get_server(name).and_then(downcast_server)
    }

    pub fn get_connector(&self, name: &str) -> Option<Arc<Connector>> {
        self.connectors.read().get(name).cloned()
    }

    /// The server `connector` is associated with, if that server still exists.
    pub fn get_server_for_connector(&self, connector: &Connector) -> Option<Arc<dyn Server>> {
        let server = self
            .associations
            .read()
            .iter()
            .find(|(_, names)| names.iter().any(|name| name == connector.name()))
            .map(|(server, _)| server.clone())?;
        self.get_server(&server)
    }

    /// Registered connectors associated with `server`.
    pub fn connectors_for_server(&self, server: &str) -> Vec<Arc<Connector>> {
        let names = self
            .associations
            .read()
            .get(server)
            .cloned()
            .unwrap_or_default();
        names
            .iter()
            .filter_map(|name| self.get_connector(name))
            .collect()
    }

    pub fn servers(&self) -> Vec<Arc<dyn Server>> {
        self.servers.read().values().cloned().collect()
    }

    pub fn connectors(&self) -> Vec<Arc<Connector>> {
        self.connectors.read().values().cloned().collect()
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Tells the connector's server that its transport is up.
    ///
    /// A failing or panicking server is logged and does not affect the
    /// connector.
    pub async fn notify_connected(&self, connector: &Arc<Connector>) {
        let Some(server) = self.get_server_for_connector(connector) else {
            debug!(network = %self.name, connector = %connector.name(), "No server to notify");
            return;
        };

        let outcome = AssertUnwindSafe(server.connector_connected(connector))
            .catch_unwind()
            .await;
        self.log_notification("connector_connected", server.name(), connector, outcome);
    }

    /// Tells the connector's server that its transport closed.
    pub async fn notify_disconnected(
        &self,
        connector: &Arc<Connector>,
        error: Option<&TransportError>,
    ) {
        let Some(server) = self.get_server_for_connector(connector) else {
            debug!(network = %self.name, connector = %connector.name(), "No server to notify");
            return;
        };

        let outcome = AssertUnwindSafe(server.connector_disconnected(connector, error))
            .catch_unwind()
            .await;
        self.log_notification("connector_disconnected", server.name(), connector, outcome);
    }

    fn log_notification(
        &self,
        callback: &'static str,
        server: &str,
        connector: &Connector,
        outcome: std::thread::Result<NetworkResult<()>>,
    ) {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                network = %self.name,
                server,
                connector = %connector.name(),
                error = %err,
                "Server failed in {callback}"
            ),
            Err(_) => error!(
                network = %self.name,
                server,
                connector = %connector.name(),
                "Server panicked in {callback}"
            ),
        }
    }

    /// Removes a finished connector from the registry, unless the name has
    /// already been reused by another connector.
    pub(crate) fn forget_connector(&self, connector: &Arc<Connector>) {
        let mut connectors = self.connectors.write();
        if connectors
            .get(connector.name())
            .is_some_and(|registered| Arc::ptr_eq(registered, connector))
        {
            connectors.remove(connector.name());
            debug!(network = %self.name, connector = %connector.name(), "Connector removed");
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Disconnects every connector of `name`, then removes the server and its
    /// association entry.
    pub async fn destroy_server(&self, name: &str) -> NetworkResult<()> {
        if !self.has_server(name) {
            return Err(NetworkError::ServerNotFound(name.to_owned()));
        }

        for connector in self.connectors_for_server(name) {
            disconnect_quietly(&connector).await;
        }

        self.servers.write().remove(name);
        let connectors = self.associations.write().remove(name).unwrap_or_default();
        for connector in connectors {
            if let Some(connector) = self.get_connector(&connector) {
                connector.set_server(None);
            }
        }

        info!(network = %self.name, server = name, "Server destroyed");
        Ok(())
    }

    /// Disconnects a connector (tolerating failure) and removes it from the
    /// registry; with `remove_association`, also from its server.
    pub async fn destroy_connector(&self, name: &str, remove_association: bool) -> NetworkResult<()> {
        let connector = self
            .get_connector(name)
            .ok_or_else(|| NetworkError::ConnectorNotFound(name.to_owned()))?;

        disconnect_quietly(&connector).await;
        if remove_association {
            self.dissociate(name);
        }
        self.forget_connector(&connector);

        info!(network = %self.name, connector = name, "Connector destroyed");
        Ok(())
    }

    /// Destroys every server, then any connector left over.
    pub async fn shutdown(&self) {
        let servers: Vec<String> = self.servers.read().keys().cloned().collect();
        for server in servers {
            if let Err(err) = self.destroy_server(&server).await {
                warn!(network = %self.name, server = %server, error = %err, "Failed to destroy server");
            }
        }

        let connectors: Vec<String> = self.connectors.read().keys().cloned().collect();
        for connector in connectors {
            if let Err(err) = self.destroy_connector(&connector, true).await {
                warn!(network = %self.name, connector = %connector, error = %err, "Failed to destroy connector");
            }
        }

        info!(network = %self.name, "Network shut down");
    }
}

async fn disconnect_quietly(connector: &Connector) {
    match connector.state() {
        ConnectorState::Connected | ConnectorState::Disconnecting => {
            if let Err(err) = connector.do_disconnect().await {
                warn!(connector = %connector.name(), error = %err, "Disconnect failed");
            }
        }
        state => debug!(connector = %connector.name(), %state, "Nothing to disconnect"),
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("servers", &self.servers.read().keys().collect::<Vec<_>>())
            .field("connectors", &self.connectors.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
