use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use super::connector::Connector;
use crate::error::{NetworkResult, TransportError};

/// A protocol-level session bound to a connector, e.g. one IRC session.
///
/// The network calls these notifications for every server associated with
/// the connector. Errors and panics are logged by the network and never
/// reach the connector.
#[async_trait]
pub trait Server: Send + Sync + 'static {
    /// Unique name within the network.
    fn name(&self) -> &str;

    /// The connector's transport is up.
    async fn connector_connected(&self, connector: &Arc<Connector>) -> NetworkResult<()>;

    /// The connector's transport closed. `error` is `None` for a clean close.
    async fn connector_disconnected(
        &self,
        connector: &Arc<Connector>,
        error: Option<&TransportError>,
    ) -> NetworkResult<()>;

    /// Upcast for [`downcast_server`]; implement as `{ self }`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Recovers the concrete server type from a registry entry.
pub fn downcast_server<S: Server>(server: Arc<dyn Server>) -> Option<Arc<S>> {
    server.into_any().downcast::<S>().ok()
}
