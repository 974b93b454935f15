//! Per-connector protocol drivers.

use std::sync::Arc;

use async_trait::async_trait;

use super::connector::Connector;
use crate::error::{NetworkResult, TransportError};

/// Turns a connector's byte stream into protocol frames.
///
/// One instance belongs to one connector. Callbacks run on the connector's
/// I/O task, so `data_received` should hand frames off rather than process
/// them inline: the connector does not read again until it returns.
#[async_trait]
pub trait Protocol: Send + Sync + 'static {
    /// Short protocol name used in logs, e.g. `"irc"`.
    fn name(&self) -> &'static str;

    /// Called once the transport is up, before servers are notified.
    async fn connection_made(&self, _connector: &Arc<Connector>) -> NetworkResult<()> {
        Ok(())
    }

    /// Called with every chunk read from the transport.
    ///
    /// Errors are logged by the connector; the connection stays open.
    async fn data_received(&self, connector: &Arc<Connector>, data: &[u8]) -> NetworkResult<()>;

    /// Called after the transport closed, before servers are notified.
    /// `error` is `None` for a clean close.
    async fn connection_lost(&self, _connector: &Arc<Connector>, _error: Option<&TransportError>) {}
}

/// Longest line a [`LineBuffer`] accepts unless told otherwise.
pub const DEFAULT_MAX_LINE: usize = 64 * 1024;

/// Accumulates bytes and yields complete CRLF-terminated lines.
///
/// Each byte is scanned for a terminator once. A line longer than the
/// buffer's limit is dropped up to and including its terminator, and the
/// dropped byte count is reported by [`take_discarded`](Self::take_discarded).
#[derive(Debug)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    /// Bytes of `buffer` known to hold no CRLF.
    scanned: usize,
    max_line: usize,
    /// Set while the rest of an overlong line is being skipped.
    discarding: bool,
    discarded: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer that drops lines longer than `max_line` bytes, CRLF excluded.
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line,
            discarding: false,
            discarded: 0,
        }
    }

    pub fn max_line(&self) -> usize {
        self.max_line
    }

    /// Appends received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Removes and returns the next complete line, without its CRLF.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let Some(end) = self.find_terminator() else {
                self.enforce_limit();
                return None;
            };

            if self.discarding || end > self.max_line {
                self.buffer.drain(..end + 2);
                self.scanned = 0;
                self.discarding = false;
                self.discarded += end + 2;
                continue;
            }

            let mut line: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.scanned = 0;
            line.truncate(end);
            return Some(line);
        }
    }

    /// Returns and resets the number of bytes dropped as overlong lines.
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }

    /// Bytes still waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.discarding = false;
    }

    fn find_terminator(&mut self) -> Option<usize> {
        // A CR at the end of the scanned part may pair with the next LF.
        let from = self.scanned.saturating_sub(1);
        let found = self.buffer[from..]
            .windows(2)
            .position(|pair| pair == b"\r\n")
            .map(|offset| from + offset);
        if found.is_none() {
            self.scanned = self.buffer.len();
        }
        found
    }

    fn enforce_limit(&mut self) {
        let held_cr = usize::from(self.buffer.last() == Some(&b'\r'));
        let content = self.buffer.len() - held_cr;
        if !self.discarding && content <= self.max_line {
            return;
        }

        self.buffer.drain(..content);
        self.scanned = self.buffer.len();
        self.discarding = true;
        self.discarded += content;
    }
}

impl Iterator for LineBuffer {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"PING :a\r\nPRIVMSG #c");
        assert_eq!(buffer.next_line().as_deref(), Some(&b"PING :a"[..]));
        assert_eq!(buffer.next_line(), None);

        buffer.extend(b"h :hi\r");
        assert_eq!(buffer.next_line(), None);
        buffer.extend(b"\n\r\nrest");

        let lines: Vec<_> = buffer.by_ref().collect();
        assert_eq!(lines, vec![b"PRIVMSG #ch :hi".to_vec(), Vec::new()]);
        assert_eq!(buffer.pending(), 4);
    }

    #[test]
    fn test_bare_newline_is_not_a_terminator() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"a\nb\r\n");
        assert_eq!(buffer.next_line().as_deref(), Some(&b"a\nb"[..]));
    }

    #[test]
    fn test_overlong_line_is_dropped_through_its_terminator() {
        let mut buffer = LineBuffer::with_max_line(8);
        buffer.extend(b"0123456789");
        assert_eq!(buffer.next_line(), None);
        assert_eq!(buffer.pending(), 0);

        buffer.extend(b"abc\r");
        assert_eq!(buffer.next_line(), None);
        assert_eq!(buffer.pending(), 1);
        buffer.extend(b"\nPING :x\r\n");

        assert_eq!(buffer.next_line().as_deref(), Some(&b"PING :x"[..]));
        assert_eq!(buffer.take_discarded(), 15);
        assert_eq!(buffer.take_discarded(), 0);
    }

    #[test]
    fn test_complete_overlong_line_is_dropped() {
        let mut buffer = LineBuffer::with_max_line(4);
        buffer.extend(b"12345\r\nabcd\r\n");
        assert_eq!(buffer.next_line().as_deref(), Some(&b"abcd"[..]));
        assert_eq!(buffer.take_discarded(), 7);
    }

    #[test]
    fn test_unterminated_stream_stays_bounded() {
        let mut buffer = LineBuffer::with_max_line(512 + 8191);
        let chunk = [b'A'; 4096];
        for _ in 0..2048 {
            buffer.extend(&chunk);
            assert_eq!(buffer.next_line(), None);
            assert!(buffer.pending() <= buffer.max_line());
        }

        buffer.extend(b"\r\nPONG :ok\r\n");
        assert_eq!(buffer.next_line().as_deref(), Some(&b"PONG :ok"[..]));
        assert_eq!(buffer.take_discarded(), 2048 * 4096 + 2);
    }

    #[test]
    fn test_terminator_split_after_scan() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"abc\r");
        assert_eq!(buffer.next_line(), None);
        buffer.extend(b"\n");
        assert_eq!(buffer.next_line().as_deref(), Some(&b"abc"[..]));
        assert_eq!(buffer.pending(), 0);
    }
}
