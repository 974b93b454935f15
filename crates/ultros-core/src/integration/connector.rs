//! Connectors: one transport connection and its lifecycle.
//!
//! ```text
//!            do_connect           dial ok           do_disconnect / EOF / error
//! Created ─────────────▶ Connecting ─────▶ Connected ───────────────────────▶ Disconnecting ──▶ Disconnected
//!    ▲                        │
//!    └──── dial failed ───────┘
//! ```
//!
//! A connected connector owns an I/O task. The task writes queued outgoing
//! bytes, feeds incoming bytes to the [`Protocol`] and, once the transport
//! closes, notifies the protocol and the network and drops the connector
//! from the network's registry.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use super::backref::BackRef;
use super::network::Network;
use super::protocol::Protocol;
use super::server::Server;
use super::transport::{BoxedStream, Endpoint, TransportHandle};
use crate::error::{NetworkError, NetworkResult, TransportError};

const OUTGOING_QUEUE: usize = 256;
const READ_CHUNK: usize = 4096;

/// Lifecycle state of a [`Connector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorState {
    Created,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
        })
    }
}

/// A transport-level connection owned by a [`Network`].
///
/// Created through [`Network::create_connector`].
pub struct Connector {
    name: String,
    endpoint: Endpoint,
    network: BackRef<Network>,
    server: RwLock<Option<BackRef<dyn Server>>>,
    protocol: Arc<dyn Protocol>,
    state: watch::Sender<ConnectorState>,
    handle: Mutex<Option<TransportHandle>>,
}

impl Connector {
    pub(crate) fn new(
        name: String,
        endpoint: Endpoint,
        network: BackRef<Network>,
        protocol: Arc<dyn Protocol>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectorState::Created);
        Self {
            name,
            endpoint,
            network,
            server: RwLock::new(None),
            protocol,
            state,
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.protocol
    }

    /// The owning network.
    pub fn network(&self) -> NetworkResult<Arc<Network>> {
        self.network.get()
    }

    /// The associated server, if one is set and still alive.
    pub fn server(&self) -> NetworkResult<Arc<dyn Server>> {
        self.server
            .read()
            .as_ref()
            .ok_or(NetworkError::Gone { what: "server" })?
            .get()
    }

    pub(crate) fn set_server(&self, server: Option<BackRef<dyn Server>>) {
        *self.server.write() = server;
    }

    pub fn state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectorState::Connected
    }

    /// Waits until the connector reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectorState) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so this only ends once `target` is seen.
        let _ = rx.wait_for(|state| *state == target).await;
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Dials the endpoint and starts the I/O task.
    ///
    /// On success the protocol's `connection_made` has run and every
    /// associated server has been notified. A failed dial returns the
    /// connector to `Created`, so the caller may retry. If a server closes
    /// the connection while it is notified, the result is
    /// [`NetworkError::InvalidState`].
    ///
    /// A transport failure during the notifications is reported to servers
    /// only after all of them have been told about the connection.
    pub async fn do_connect(self: &Arc<Self>) -> NetworkResult<()> {
        let network = self.network.get()?;
        self.transition(ConnectorState::Created, ConnectorState::Connecting, "created")?;

        info!(connector = %self.name, endpoint = %self.endpoint, "Connecting");
        let stream = match network.transports().dial(self.endpoint.clone()).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(connector = %self.name, endpoint = %self.endpoint, %error, "Connection failed");
                self.state.send_replace(ConnectorState::Created);
                return Err(error.into());
            }
        };

        let (message_tx, message_rx) = mpsc::channel(OUTGOING_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.handle.lock() = Some(TransportHandle::new(message_tx, shutdown_tx));
        self.state.send_replace(ConnectorState::Connected);
        info!(connector = %self.name, protocol = self.protocol.name(), "Connected");

        let (started_tx, started_rx) = oneshot::channel();
        tokio::spawn(Arc::clone(self).run_io(stream, message_rx, shutdown_rx, started_rx));

        if let Err(error) = self.protocol.connection_made(self).await {
            warn!(connector = %self.name, %error, "Protocol failed to handle connection");
        }
        network.notify_connected(self).await;

        // A server may have closed the connection while being notified.
        let state = self.state();
        let _ = started_tx.send(());
        if state != ConnectorState::Connected {
            return Err(NetworkError::InvalidState {
                connector: self.name.clone(),
                expected: "connected",
                actual: state,
            });
        }
        Ok(())
    }

    /// Closes the transport and waits until the connector is `Disconnected`.
    ///
    /// Queued writes are flushed first. Disconnecting an already disconnected
    /// connector succeeds. Must not be awaited from inside
    /// [`Protocol::data_received`], which runs on the task being stopped.
    pub async fn do_disconnect(&self) -> NetworkResult<()> {
        match self.state() {
            ConnectorState::Disconnected => return Ok(()),
            ConnectorState::Disconnecting => {}
            ConnectorState::Connected => {
                info!(connector = %self.name, "Disconnecting");
                if let Some(handle) = self.handle.lock().as_ref() {
                    handle.close();
                }
            }
            actual @ (ConnectorState::Created | ConnectorState::Connecting) => {
                return Err(NetworkError::InvalidState {
                    connector: self.name.clone(),
                    expected: "connected",
                    actual,
                });
            }
        }

        self.wait_for_state(ConnectorState::Disconnected).await;
        Ok(())
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Sends `line` followed by CRLF.
    pub async fn write_line(&self, line: &str) -> NetworkResult<()> {
        trace!(connector = %self.name, "-> {line}");
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        self.write_raw(data).await
    }

    /// Sends bytes as-is.
    pub async fn write_raw(&self, data: impl Into<Vec<u8>>) -> NetworkResult<()> {
        let handle = self.handle.lock().clone();
        let handle = handle.ok_or_else(|| NetworkError::InvalidState {
            connector: self.name.clone(),
            expected: "connected",
            actual: self.state(),
        })?;
        handle.send(data.into()).await?;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn transition(
        &self,
        from: ConnectorState,
        to: ConnectorState,
        expected: &'static str,
    ) -> NetworkResult<()> {
        let mut actual = from;
        self.state.send_if_modified(|state| {
            actual = *state;
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });

        if actual == from {
            Ok(())
        } else {
            Err(NetworkError::InvalidState {
                connector: self.name.clone(),
                expected,
                actual,
            })
        }
    }

    async fn run_io(
        self: Arc<Self>,
        stream: BoxedStream,
        mut message_rx: mpsc::Receiver<Vec<u8>>,
        mut shutdown_rx: watch::Receiver<bool>,
        mut started_rx: oneshot::Receiver<()>,
    ) {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut buf = vec![0u8; READ_CHUNK];
        // Reading waits until `do_connect` has notified everyone.
        let mut reading = false;

        let error = loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    while let Ok(data) = message_rx.try_recv() {
                        if writer.write_all(&data).await.is_err() {
                            break;
                        }
                    }
                    let _ = writer.shutdown().await;
                    debug!(connector = %self.name, "Transport closed locally");
                    break None;
                }

                outgoing = message_rx.recv() => match outgoing {
                    Some(data) => {
                        if let Err(error) = writer.write_all(&data).await {
                            break Some(TransportError::from(error));
                        }
                    }
                    None => break None,
                },

                _ = &mut started_rx, if !reading => {
                    reading = true;
                }

                read = reader.read(&mut buf), if reading => match read {
                    Ok(0) => {
                        debug!(connector = %self.name, "Transport closed by peer");
                        break None;
                    }
                    Ok(n) => {
                        if let Err(error) = self.protocol.data_received(&self, &buf[..n]).await {
                            warn!(connector = %self.name, %error, "Protocol failed to handle data");
                        }
                        // Let other connectors run between chunks.
                        tokio::task::yield_now().await;
                    }
                    Err(error) => break Some(TransportError::from(error)),
                },
            }
        };

        if error.is_some() && !reading {
            // Writers see a closed queue while `do_connect` finishes.
            drop(message_rx);
            tokio::select! {
                _ = &mut started_rx => {}
                _ = shutdown_rx.changed() => {}
            }
        }
        self.finish(error).await;
    }

    async fn finish(self: &Arc<Self>, error: Option<TransportError>) {
        self.state.send_replace(ConnectorState::Disconnecting);
        self.handle.lock().take();

        match &error {
            Some(error) => warn!(connector = %self.name, %error, "Connection lost"),
            None => info!(connector = %self.name, "Disconnected"),
        }

        self.protocol.connection_lost(self, error.as_ref()).await;

        match self.network.get() {
            Ok(network) => {
                network.notify_disconnected(self, error.as_ref()).await;
                network.forget_connector(self);
            }
            Err(_) => debug!(connector = %self.name, "Network gone before disconnect"),
        }

        self.state.send_replace(ConnectorState::Disconnected);
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("protocol", &self.protocol.name())
            .field("state", &self.state())
            .finish()
    }
}
