//! Network types.
//!
//! A network type (IRC, ...) is a [`NetworkDriver`]: it populates a freshly
//! created [`Network`] with servers and connectors in `setup` and tears them
//! down in `shutdown`. Types that can be built from a configuration file
//! also implement [`ConfigurableNetwork`]; the runtime deserializes the
//! per-network file into `Config` and calls `from_config`.
//!
//! ```rust,ignore
//! #[async_trait]
//! impl NetworkDriver for IrcNetwork {
//!     fn kind(&self) -> &'static str { "irc" }
//!
//!     async fn setup(&self, network: &Arc<Network>) -> NetworkResult<()> {
//!         let server = network.create_server(|net| IrcServer::new(net, self.config.clone()))?;
//!         let connector = network.create_connector(
//!             "main",
//!             Endpoint::tcp(&self.config.host, self.config.port),
//!             Arc::new(IrcProtocol::new()),
//!             Some(server.name()),
//!         )?;
//!         connector.do_connect().await
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::network::Network;
use super::transport::TransportContext;
use crate::error::NetworkResult;
use crate::framework::EventManager;

/// Behaviour of one network type.
#[async_trait]
pub trait NetworkDriver: Send + Sync + 'static {
    /// Network type name, e.g. `"irc"`.
    fn kind(&self) -> &'static str;

    /// Creates servers and connectors on `network` and starts connecting.
    async fn setup(&self, network: &Arc<Network>) -> NetworkResult<()>;

    /// Tears the network down. The default destroys every server and connector.
    async fn shutdown(&self, network: &Arc<Network>) -> NetworkResult<()> {
        network.shutdown().await;
        Ok(())
    }
}

/// A network type that can be created from its configuration file.
pub trait ConfigurableNetwork: NetworkDriver + Sized {
    /// Value of the `type` key that selects this network type.
    const KIND: &'static str;

    /// The per-network configuration.
    type Config: DeserializeOwned + Send;

    /// Creates the driver from its configuration.
    fn from_config(config: Self::Config, context: &NetworkContext) -> NetworkResult<Self>;
}

/// What a network is created with.
#[derive(Clone)]
pub struct NetworkContext {
    /// Name the network is configured under.
    pub name: String,
    pub events: Arc<EventManager>,
    pub transports: TransportContext,
}

impl NetworkContext {
    pub fn new(
        name: impl Into<String>,
        events: Arc<EventManager>,
        transports: TransportContext,
    ) -> Self {
        Self {
            name: name.into(),
            events,
            transports,
        }
    }

    /// Creates the (empty) network of type `kind` described by this context.
    pub fn create_network(&self, kind: &'static str) -> Arc<Network> {
        Network::new(
            self.name.clone(),
            kind,
            Arc::clone(&self.events),
            self.transports.clone(),
        )
    }
}
