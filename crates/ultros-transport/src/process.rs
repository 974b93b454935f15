//! Child processes spoken to over stdin/stdout.

use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use ultros_core::{BoxedStream, Endpoint, TransportError, TransportResult};

use crate::wrong_endpoint;

/// Spawns an [`Endpoint::Process`] and connects to its stdio.
///
/// Reading yields the child's stdout, writing feeds its stdin. The child is
/// killed when the stream is dropped; stderr is inherited.
pub fn dial_process(endpoint: Endpoint) -> BoxFuture<'static, TransportResult<BoxedStream>> {
    Box::pin(async move {
        let Endpoint::Process { program, args } = endpoint else {
            return Err(wrong_endpoint("process", &endpoint));
        };

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::ConnectionFailed {
                address: program.clone(),
                reason: e.to_string(),
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(TransportError::ConnectionFailed {
                address: program,
                reason: "child stdio was not captured".into(),
            });
        };

        debug!(program = %program, pid = ?child.id(), "Process spawned");
        Ok(Box::new(ProcessStream {
            _child: child,
            stdin,
            stdout,
        }) as BoxedStream)
    })
}

struct ProcessStream {
    /// Held so the child is killed with the stream.
    _child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl AsyncRead for ProcessStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for ProcessStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stdin).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdin).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdin).poll_shutdown(cx)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_process_echoes_through_cat() {
        let mut stream = dial_process(Endpoint::process("cat", Vec::<String>::new()))
            .await
            .ok()
            .unwrap();

        stream.write_all(b"hello\r\n").await.unwrap();
        let mut buf = [0u8; 7];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\r\n");

        // Closing stdin ends `cat`, which closes stdout.
        stream.shutdown().await.unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_connect() {
        let err = dial_process(Endpoint::process("/nonexistent/ultros-test", ["x"]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::ConnectionFailed { .. }));
    }
}
