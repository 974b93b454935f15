//! Plain TCP.

use futures::future::BoxFuture;
use tokio::net::TcpStream;
use tracing::debug;

use ultros_core::{BoxedStream, Endpoint, TransportError, TransportResult};

use crate::wrong_endpoint;

/// Dials an [`Endpoint::Tcp`].
pub fn dial_tcp(endpoint: Endpoint) -> BoxFuture<'static, TransportResult<BoxedStream>> {
    Box::pin(async move {
        let Endpoint::Tcp { host, port } = endpoint else {
            return Err(wrong_endpoint("tcp", &endpoint));
        };

        let stream = connect(&host, port).await?;
        Ok(Box::new(stream) as BoxedStream)
    })
}

pub(crate) async fn connect(host: &str, port: u16) -> TransportResult<TcpStream> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| TransportError::ConnectionFailed {
            address: format!("{host}:{port}"),
            reason: e.to_string(),
        })?;
    // Line protocols send many small writes.
    stream.set_nodelay(true)?;

    debug!(host, port, "TCP connected");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_dial_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (dialed, accepted) =
            tokio::join!(dial_tcp(Endpoint::tcp("127.0.0.1", port)), listener.accept());
        let mut stream = dialed.ok().unwrap();
        let (mut peer, _) = accepted.unwrap();

        stream.write_all(b"PING\r\n").await.unwrap();
        let mut buf = [0u8; 6];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING\r\n");
    }

    #[tokio::test]
    async fn test_dial_tcp_rejects_other_endpoints() {
        let err = dial_tcp(Endpoint::websocket("ws://localhost"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_names_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = dial_tcp(Endpoint::tcp("127.0.0.1", port)).await.err().unwrap();
        assert!(
            matches!(err, TransportError::ConnectionFailed { ref address, .. } if *address == format!("127.0.0.1:{port}"))
        );
    }
}
