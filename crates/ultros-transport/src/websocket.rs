//! WebSocket client presented as a line stream.
//!
//! ```text
//! connector ◀──duplex──▶ pump task ◀──frames──▶ server
//!             "line\r\n"             Text("line")
//! ```
//!
//! Each incoming text frame becomes one CRLF-terminated line; binary frames
//! are passed through untouched. Each complete outgoing line is sent as one
//! text frame.

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use ultros_core::{BoxedStream, Endpoint, LineBuffer, TransportError, TransportResult};

use crate::wrong_endpoint;

const DUPLEX_CAPACITY: usize = 64 * 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to an [`Endpoint::WebSocket`].
pub fn dial_websocket(endpoint: Endpoint) -> BoxFuture<'static, TransportResult<BoxedStream>> {
    Box::pin(async move {
        let Endpoint::WebSocket { url } = endpoint else {
            return Err(wrong_endpoint("websocket", &endpoint));
        };

        info!(url = %url, "Connecting to WebSocket server");
        let (ws_stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    address: url.clone(),
                    reason: format!("WebSocket connection failed: {e}"),
                })?;

        let (local, remote) = tokio::io::duplex(DUPLEX_CAPACITY);
        tokio::spawn(pump(url, ws_stream, remote));
        Ok(Box::new(local) as BoxedStream)
    })
}

async fn pump(url: String, ws_stream: WsStream, remote: DuplexStream) {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (mut reader, mut writer) = tokio::io::split(remote);
    let mut lines = LineBuffer::new();
    let mut buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    trace!(url = %url, len = text.len(), "Received text frame");
                    let mut data = text.as_bytes().to_vec();
                    if !data.ends_with(b"\r\n") {
                        data.extend_from_slice(b"\r\n");
                    }
                    if writer.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if writer.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    trace!(url = %url, "Received ping, sending pong");
                    let _ = ws_tx.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    info!(url = %url, "Server closed connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!(url = %url, error = %e, "WebSocket error");
                    break;
                }
            },

            read = reader.read(&mut buf) => match read {
                Ok(0) | Err(_) => {
                    debug!(url = %url, "Connector closed, closing WebSocket");
                    let _ = ws_tx.close().await;
                    break;
                }
                Ok(n) => {
                    lines.extend(&buf[..n]);
                    while let Some(line) = lines.next_line() {
                        let text = String::from_utf8_lossy(&line).into_owned();
                        if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                            warn!(url = %url, error = %e, "Failed to send message");
                        }
                    }
                }
            },
        }
    }

    let _ = writer.shutdown().await;
}
