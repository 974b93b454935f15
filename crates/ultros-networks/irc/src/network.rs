//! The `irc` network type.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use ultros_core::{
    ConfigurableNetwork, Network, NetworkContext, NetworkDriver, NetworkError, NetworkResult,
    Server, TransportKind,
};

use crate::config::IrcConfig;
use crate::protocol::IrcProtocol;
use crate::server::IrcServer;

/// Connects one [`IrcServer`] session to the configured host.
#[derive(Debug, Clone)]
pub struct IrcNetwork {
    config: IrcConfig,
}

impl IrcNetwork {
    pub fn new(config: IrcConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IrcConfig {
        &self.config
    }
}

#[async_trait]
impl NetworkDriver for IrcNetwork {
    fn kind(&self) -> &'static str {
        crate::IRC_KIND
    }

    async fn setup(&self, network: &Arc<Network>) -> NetworkResult<()> {
        let config = self.config.clone();
        let server = network
            .create_server(|backref| IrcServer::new(config.host.clone(), backref, config))?;
        let connector = network.create_connector(
            self.config.host.clone(),
            self.config.endpoint(),
            Arc::new(IrcProtocol::new()),
            Some(server.name()),
        )?;

        info!(
            network = %network.name(),
            endpoint = %connector.endpoint(),
            nickname = %self.config.nickname,
            "Starting IRC network"
        );
        connector.do_connect().await
    }
}

impl ConfigurableNetwork for IrcNetwork {
    const KIND: &'static str = crate::IRC_KIND;
    type Config = IrcConfig;

    fn from_config(config: IrcConfig, context: &NetworkContext) -> NetworkResult<Self> {
        config.validate()?;

        let transport = config.endpoint().kind();
        if !context.transports.supports(transport) {
            return Err(NetworkError::config(format!(
                "network '{}' needs the {} transport, which is not available",
                context.name,
                transport.as_str()
            )));
        }
        if transport == TransportKind::Tls && config.accept_invalid_certs {
            warn!(network = %context.name, "TLS certificate verification is disabled");
        }
        Ok(Self::new(config))
    }
}
