//! The connector-side IRC protocol driver.
//!
//! Bytes are split into CRLF lines on the connector's I/O task and parsed
//! there. Parsed lines go through an unbounded channel to a dispatcher task,
//! one per connection, which hands them in order to the connector's
//! [`IrcServer`]. The reader never waits on a handler, so a handler may
//! write or even disconnect without stalling the connection.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};
use ultros_core::{
    Connector, LineBuffer, NetworkError, NetworkResult, Protocol, TransportError, downcast_server,
};

use crate::error::IrcError;
use crate::line::IrcLine;
use crate::server::IrcServer;

/// Longest accepted line: 512 bytes of message plus 8191 bytes of tags.
pub const MAX_LINE_LENGTH: usize = 512 + 8191;

/// IRC framing for one connector.
pub struct IrcProtocol {
    buffer: Mutex<LineBuffer>,
    dispatcher: Mutex<Option<mpsc::UnboundedSender<IrcLine>>>,
}

impl IrcProtocol {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(LineBuffer::with_max_line(MAX_LINE_LENGTH)),
            dispatcher: Mutex::new(None),
        }
    }
}

impl Default for IrcProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Protocol for IrcProtocol {
    fn name(&self) -> &'static str {
        crate::IRC_KIND
    }

    async fn connection_made(&self, connector: &Arc<Connector>) -> NetworkResult<()> {
        self.buffer.lock().clear();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(Arc::downgrade(connector), rx));
        *self.dispatcher.lock() = Some(tx);
        Ok(())
    }

    async fn data_received(&self, connector: &Arc<Connector>, data: &[u8]) -> NetworkResult<()> {
        let (lines, discarded): (Vec<Vec<u8>>, usize) = {
            let mut buffer = self.buffer.lock();
            buffer.extend(data);
            let lines = buffer.by_ref().collect();
            (lines, buffer.take_discarded())
        };
        if discarded > 0 {
            warn!(
                connector = %connector.name(),
                discarded,
                limit = MAX_LINE_LENGTH,
                "Dropped overlong line"
            );
        }

        let dispatcher = self
            .dispatcher
            .lock()
            .clone()
            .ok_or_else(|| NetworkError::protocol("data received before the connection was made"))?;

        for raw in lines {
            let Some(line) = decode(connector.name(), &raw) else {
                continue;
            };
            if dispatcher.send(line).is_err() {
                warn!(connector = %connector.name(), "Line dispatcher has stopped");
                break;
            }
        }
        Ok(())
    }

    async fn connection_lost(&self, connector: &Arc<Connector>, _error: Option<&TransportError>) {
        // Dropping the sender lets the dispatcher drain what is queued and exit.
        self.dispatcher.lock().take();

        let pending = {
            let mut buffer = self.buffer.lock();
            let pending = buffer.pending();
            buffer.clear();
            pending
        };
        if pending > 0 {
            debug!(connector = %connector.name(), pending, "Discarded partial line");
        }
    }
}

/// Decodes and parses one raw line. Bad lines are logged and dropped.
fn decode(connector: &str, raw: &[u8]) -> Option<IrcLine> {
    let Ok(text) = std::str::from_utf8(raw) else {
        warn!(connector, error = %IrcError::InvalidUtf8, "Skipping line");
        return None;
    };
    trace!(connector, "<- {text}");
    if text.trim().is_empty() {
        return None;
    }

    match IrcLine::parse(text) {
        Ok(line) => Some(line),
        Err(error) => {
            warn!(connector, %error, "Skipping unparsable line");
            None
        }
    }
}

async fn dispatch(connector: Weak<Connector>, mut lines: mpsc::UnboundedReceiver<IrcLine>) {
    while let Some(line) = lines.recv().await {
        let Some(connector) = connector.upgrade() else {
            break;
        };

        let server = match connector.server() {
            Ok(server) => server,
            Err(error) => {
                debug!(connector = %connector.name(), command = %line.command, %error, "No server for line");
                continue;
            }
        };
        let Some(server) = downcast_server::<IrcServer>(server) else {
            debug!(connector = %connector.name(), "Associated server is not an IRC server");
            continue;
        };

        let command = line.command.clone();
        let outcome = AssertUnwindSafe(server.handle_line(&connector, line))
            .catch_unwind()
            .await;
        if outcome.is_err() {
            error!(connector = %connector.name(), %command, "IRC handler panicked");
        }
    }
    trace!("IRC dispatcher stopped");
}
