//! Transport abstractions.
//!
//! Core never opens sockets itself. Each [`TransportKind`] maps to a plain
//! function pointer ([`DialFn`]) that turns an [`Endpoint`] into a byte
//! stream; the runtime fills a [`TransportContext`] with the dialers its
//! enabled features provide (see `ultros-transport`).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::{TransportError, TransportResult};

// =============================================================================
// Streams
// =============================================================================

/// A bidirectional byte stream a connector can drive.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased stream returned by dialers.
pub type BoxedStream = Box<dyn AsyncStream>;

// =============================================================================
// Endpoints
// =============================================================================

/// Supported transport kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Plain TCP.
    Tcp,
    /// TCP wrapped in TLS.
    Tls,
    /// A child process spoken to over stdin/stdout.
    Process,
    /// WebSocket client; text frames are presented as CRLF-terminated lines.
    WebSocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tls => "tls",
            Self::Process => "process",
            Self::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a connector connects to.
///
/// ```toml
/// [endpoint]
/// kind = "tls"
/// host = "irc.libera.chat"
/// port = 6697
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Endpoint {
    Tcp {
        host: String,
        port: u16,
    },
    Tls {
        host: String,
        port: u16,
        /// Skip certificate verification. Only for testing.
        #[serde(default)]
        accept_invalid_certs: bool,
    },
    Process {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    WebSocket {
        url: String,
    },
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn tls(host: impl Into<String>, port: u16) -> Self {
        Self::Tls {
            host: host.into(),
            port,
            accept_invalid_certs: false,
        }
    }

    pub fn process<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Process {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn websocket(url: impl Into<String>) -> Self {
        Self::WebSocket { url: url.into() }
    }

    /// The transport kind that can dial this endpoint.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Tcp { .. } => TransportKind::Tcp,
            Self::Tls { .. } => TransportKind::Tls,
            Self::Process { .. } => TransportKind::Process,
            Self::WebSocket { .. } => TransportKind::WebSocket,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Tls { host, port, .. } => write!(f, "tls://{host}:{port}"),
            Self::Process { program, args } if args.is_empty() => write!(f, "process:{program}"),
            Self::Process { program, args } => write!(f, "process:{program} {}", args.join(" ")),
            Self::WebSocket { url } => f.write_str(url),
        }
    }
}

// =============================================================================
// Transport Context
// =============================================================================

/// Dials an endpoint. Plain function pointer; all state travels in the endpoint.
pub type DialFn = fn(Endpoint) -> BoxFuture<'static, TransportResult<BoxedStream>>;

/// Dialers available to networks, keyed by transport kind.
#[derive(Debug, Clone, Default)]
pub struct TransportContext {
    dialers: HashMap<TransportKind, DialFn>,
}

impl TransportContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: TransportKind, dial: DialFn) -> Self {
        self.register(kind, dial);
        self
    }

    /// Registers `dial` for `kind`, replacing any previous dialer.
    pub fn register(&mut self, kind: TransportKind, dial: DialFn) {
        self.dialers.insert(kind, dial);
    }

    pub fn supports(&self, kind: TransportKind) -> bool {
        self.dialers.contains_key(&kind)
    }

    /// Registered kinds, in a stable order.
    pub fn available(&self) -> Vec<TransportKind> {
        let mut kinds: Vec<_> = self.dialers.keys().copied().collect();
        kinds.sort_by_key(TransportKind::as_str);
        kinds
    }

    /// Dials `endpoint` with the dialer registered for its kind.
    pub async fn dial(&self, endpoint: Endpoint) -> TransportResult<BoxedStream> {
        let kind = endpoint.kind();
        let dial = self
            .dialers
            .get(&kind)
            .ok_or(TransportError::NotAvailable {
                transport: kind.as_str(),
            })?;

        debug!(transport = %kind, endpoint = %endpoint, "Dialing");
        dial(endpoint).await
    }
}

// =============================================================================
// Transport Handle
// =============================================================================

/// Write side of a live connection.
///
/// Cloning is cheap; all clones feed the same connection.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    message_tx: mpsc::Sender<Vec<u8>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl TransportHandle {
    pub fn new(message_tx: mpsc::Sender<Vec<u8>>, shutdown_tx: watch::Sender<bool>) -> Self {
        Self {
            message_tx,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Queues bytes for writing.
    pub async fn send(&self, data: Vec<u8>) -> TransportResult<()> {
        self.message_tx
            .send(data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Asks the connection to flush queued writes and close.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown_tx.borrow() || self.message_tx.is_closed()
    }
}
