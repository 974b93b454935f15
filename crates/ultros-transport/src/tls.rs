//! TLS over TCP.

use futures::future::BoxFuture;
use tokio_native_tls::{TlsConnector, native_tls};
use tracing::{debug, warn};

use ultros_core::{BoxedStream, Endpoint, TransportError, TransportResult};

use crate::{tcp, wrong_endpoint};

/// Dials an [`Endpoint::Tls`], verifying the certificate against `host`
/// unless `accept_invalid_certs` is set.
pub fn dial_tls(endpoint: Endpoint) -> BoxFuture<'static, TransportResult<BoxedStream>> {
    Box::pin(async move {
        let Endpoint::Tls {
            host,
            port,
            accept_invalid_certs,
        } = endpoint
        else {
            return Err(wrong_endpoint("tls", &endpoint));
        };

        if accept_invalid_certs {
            warn!(host = %host, port, "Certificate verification disabled");
        }

        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| TransportError::ConnectionFailed {
                address: format!("{host}:{port}"),
                reason: format!("TLS setup failed: {e}"),
            })?;

        let tcp = tcp::connect(&host, port).await?;
        let stream = TlsConnector::from(connector)
            .connect(&host, tcp)
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                address: format!("{host}:{port}"),
                reason: format!("TLS handshake failed: {e}"),
            })?;

        debug!(host = %host, port, "TLS connected");
        Ok(Box::new(stream) as BoxedStream)
    })
}
