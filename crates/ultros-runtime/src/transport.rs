//! The transport context handed to every network.

use tracing::debug;
use ultros_core::{TransportContext, TransportKind};

/// Creates a [`TransportContext`] with every dialer the enabled features provide.
///
/// TCP and subprocess dialers are always registered; TLS needs `tls` and
/// WebSocket needs `ws-client`.
#[allow(unused_mut)]
pub fn create_default_transport_context() -> TransportContext {
    let mut ctx = TransportContext::new()
        .with(TransportKind::Tcp, ultros_transport::dial_tcp)
        .with(TransportKind::Process, ultros_transport::dial_process);

    #[cfg(feature = "tls")]
    {
        ctx = ctx.with(TransportKind::Tls, ultros_transport::dial_tls);
    }

    #[cfg(feature = "ws-client")]
    {
        ctx = ctx.with(TransportKind::WebSocket, ultros_transport::dial_websocket);
    }

    debug!(available = ?ctx.available(), "Transport context created");
    ctx
}
