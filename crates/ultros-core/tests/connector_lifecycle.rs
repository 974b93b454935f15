use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use ultros_core::{
    BackRef, BoxedStream, Connector, ConnectorState, Endpoint, EventManager, LineBuffer, Network,
    NetworkError, NetworkResult, Protocol, Server, TransportContext, TransportError,
    TransportKind, TransportResult,
};

fn dial_tcp(endpoint: Endpoint) -> BoxFuture<'static, TransportResult<BoxedStream>> {
    Box::pin(async move {
        let Endpoint::Tcp { host, port } = endpoint else {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        };
        let stream = TcpStream::connect((host.as_str(), port)).await?;
        Ok(Box::new(stream) as BoxedStream)
    })
}

fn test_network() -> Arc<Network> {
    Network::new(
        "test",
        "test",
        Arc::new(EventManager::new()),
        TransportContext::new().with(TransportKind::Tcp, dial_tcp),
    )
}

#[derive(Default)]
struct LineProtocol {
    buffer: Mutex<LineBuffer>,
    lines: Mutex<Vec<String>>,
    made: AtomicUsize,
    lost: AtomicUsize,
}

#[async_trait]
impl Protocol for LineProtocol {
    fn name(&self) -> &'static str {
        "lines"
    }

    async fn connection_made(&self, _connector: &Arc<Connector>) -> NetworkResult<()> {
        self.made.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn data_received(&self, _connector: &Arc<Connector>, data: &[u8]) -> NetworkResult<()> {
        let mut buffer = self.buffer.lock();
        buffer.extend(data);
        for line in buffer.by_ref() {
            self.lines.lock().push(String::from_utf8_lossy(&line).into_owned());
        }
        Ok(())
    }

    async fn connection_lost(&self, _connector: &Arc<Connector>, _error: Option<&TransportError>) {
        self.lost.fetch_add(1, Ordering::SeqCst);
    }
}

struct RecordingServer {
    name: String,
    network: BackRef<Network>,
    connected: AtomicUsize,
    disconnects: Mutex<Vec<Option<String>>>,
    panic_on_connect: bool,
}

impl RecordingServer {
    fn new(network: BackRef<Network>, panic_on_connect: bool) -> Self {
        Self {
            name: "srv".into(),
            network,
            connected: AtomicUsize::new(0),
            disconnects: Mutex::new(Vec::new()),
            panic_on_connect,
        }
    }
}

#[async_trait]
impl Server for RecordingServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connector_connected(&self, connector: &Arc<Connector>) -> NetworkResult<()> {
        if self.panic_on_connect {
            panic!("misbehaving server");
        }
        assert!(self.network.get()?.get_connector(connector.name()).is_some());
        self.connected.fetch_add(1, Ordering::SeqCst);
        connector.write_line("HELLO").await
    }

    async fn connector_disconnected(
        &self,
        _connector: &Arc<Connector>,
        error: Option<&TransportError>,
    ) -> NetworkResult<()> {
        self.disconnects.lock().push(error.map(ToString::to_string));
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

async fn read_line(peer: &mut TcpStream) -> String {
    let mut collected = Vec::new();
    let mut byte = [0u8; 1];
    while !collected.ends_with(b"\r\n") {
        peer.read_exact(&mut byte).await.unwrap();
        collected.push(byte[0]);
    }
    collected.truncate(collected.len() - 2);
    String::from_utf8(collected).unwrap()
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

async fn wait_disconnected(connector: &Connector) {
    tokio::time::timeout(
        Duration::from_secs(5),
        connector.wait_for_state(ConnectorState::Disconnected),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_connect_disconnect_cycle_empties_registry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let network = test_network();
    let server = network
        .create_server(|net| RecordingServer::new(net, false))
        .unwrap();
    let protocol = Arc::new(LineProtocol::default());
    let connector = network
        .create_connector(
            "main",
            Endpoint::tcp("127.0.0.1", port),
            protocol.clone(),
            Some("srv"),
        )
        .unwrap();
    assert_eq!(connector.state(), ConnectorState::Created);

    let (connected, accepted) = tokio::join!(connector.do_connect(), listener.accept());
    connected.unwrap();
    let (mut peer, _) = accepted.unwrap();

    assert!(connector.is_connected());
    assert_eq!(protocol.made.load(Ordering::SeqCst), 1);
    assert_eq!(server.connected.load(Ordering::SeqCst), 1);
    assert_eq!(read_line(&mut peer).await, "HELLO");

    peer.write_all(b"one\r\ntw").await.unwrap();
    peer.write_all(b"o\r\n").await.unwrap();
    eventually(|| protocol.lines.lock().len() == 2).await;
    assert_eq!(*protocol.lines.lock(), vec!["one", "two"]);

    connector.write_line("BYE").await.unwrap();
    connector.do_disconnect().await.unwrap();
    assert_eq!(read_line(&mut peer).await, "BYE");

    assert_eq!(connector.state(), ConnectorState::Disconnected);
    assert!(network.connectors().is_empty());
    assert_eq!(*server.disconnects.lock(), vec![None]);
    assert_eq!(protocol.lost.load(Ordering::SeqCst), 1);

    // Disconnecting twice is a no-op.
    connector.do_disconnect().await.unwrap();
    assert_eq!(server.disconnects.lock().len(), 1);
}

#[tokio::test]
async fn test_remote_close_notifies_server_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let network = test_network();
    let server = network
        .create_server(|net| RecordingServer::new(net, false))
        .unwrap();
    let connector = network
        .create_connector(
            "main",
            Endpoint::tcp("127.0.0.1", port),
            Arc::new(LineProtocol::default()),
            Some("srv"),
        )
        .unwrap();

    let (connected, accepted) = tokio::join!(connector.do_connect(), listener.accept());
    connected.unwrap();
    let (mut peer, _) = accepted.unwrap();
    // Unread data would turn the close into a reset.
    assert_eq!(read_line(&mut peer).await, "HELLO");
    drop(peer);

    wait_disconnected(&connector).await;

    assert_eq!(*server.disconnects.lock(), vec![None]);
    assert!(network.get_connector("main").is_none());
    // The association survives, so a new connector of the same name rejoins.
    let again = network
        .create_connector(
            "main",
            Endpoint::tcp("127.0.0.1", port),
            Arc::new(LineProtocol::default()),
            None,
        )
        .unwrap();
    assert!(network.get_server_for_connector(&again).is_some());
}

#[allow(deprecated)]
fn reset(peer: TcpStream) {
    peer.set_linger(Some(Duration::ZERO)).unwrap();
    drop(peer);
}

#[tokio::test]
async fn test_remote_reset_reports_the_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let network = test_network();
    let server = network
        .create_server(|net| RecordingServer::new(net, false))
        .unwrap();
    let protocol = Arc::new(LineProtocol::default());
    let connector = network
        .create_connector(
            "main",
            Endpoint::tcp("127.0.0.1", port),
            protocol.clone(),
            Some("srv"),
        )
        .unwrap();

    let (connected, accepted) = tokio::join!(connector.do_connect(), listener.accept());
    connected.unwrap();
    let (mut peer, _) = accepted.unwrap();
    assert_eq!(read_line(&mut peer).await, "HELLO");
    reset(peer);

    wait_disconnected(&connector).await;

    let disconnects = server.disconnects.lock().clone();
    assert_eq!(disconnects.len(), 1);
    assert!(disconnects[0].is_some());
    assert_eq!(protocol.lost.load(Ordering::SeqCst), 1);
    assert!(network.connectors().is_empty());
}

/// A transport whose peer is already gone: every write fails.
fn dial_broken(_endpoint: Endpoint) -> BoxFuture<'static, TransportResult<BoxedStream>> {
    Box::pin(async move {
        let (stream, peer) = tokio::io::duplex(64);
        drop(peer);
        Ok(Box::new(stream) as BoxedStream)
    })
}

/// Records lifecycle callbacks in order. Optionally closes the connector
/// from inside `connector_connected`.
struct SequenceServer {
    log: Mutex<Vec<String>>,
    close_on_connect: bool,
}

impl SequenceServer {
    fn new(close_on_connect: bool) -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            close_on_connect,
        }
    }
}

#[async_trait]
impl Server for SequenceServer {
    fn name(&self) -> &str {
        "seq"
    }

    async fn connector_connected(&self, connector: &Arc<Connector>) -> NetworkResult<()> {
        self.log.lock().push("connecting".into());
        if self.close_on_connect {
            connector.do_disconnect().await?;
        } else {
            connector.write_line("HELLO").await?;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.log.lock().push("connected".into());
        Ok(())
    }

    async fn connector_disconnected(
        &self,
        _connector: &Arc<Connector>,
        error: Option<&TransportError>,
    ) -> NetworkResult<()> {
        let entry = match error {
            Some(_) => "disconnected with error",
            None => "disconnected",
        };
        self.log.lock().push(entry.into());
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[tokio::test]
async fn test_write_failure_during_connect_is_reported_after_connect() {
    let network = Network::new(
        "test",
        "test",
        Arc::new(EventManager::new()),
        TransportContext::new().with(TransportKind::Process, dial_broken),
    );
    let server = network.create_server(|_| SequenceServer::new(false)).unwrap();
    let connector = network
        .create_connector(
            "main",
            Endpoint::process("broken", Vec::<String>::new()),
            Arc::new(LineProtocol::default()),
            Some("seq"),
        )
        .unwrap();

    connector.do_connect().await.unwrap();
    wait_disconnected(&connector).await;

    assert_eq!(
        *server.log.lock(),
        vec!["connecting", "connected", "disconnected with error"]
    );
}

#[tokio::test]
async fn test_server_closing_during_connect_fails_do_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let network = test_network();
    let server = network.create_server(|_| SequenceServer::new(true)).unwrap();
    let connector = network
        .create_connector(
            "main",
            Endpoint::tcp("127.0.0.1", port),
            Arc::new(LineProtocol::default()),
            Some("seq"),
        )
        .unwrap();

    let (connected, accepted) = tokio::join!(connector.do_connect(), listener.accept());
    let _peer = accepted.unwrap();
    assert!(matches!(
        connected,
        Err(NetworkError::InvalidState {
            actual: ConnectorState::Disconnected,
            ..
        })
    ));
    assert_eq!(
        *server.log.lock(),
        vec!["connecting", "disconnected", "connected"]
    );
}

#[tokio::test]
async fn test_failed_dial_returns_to_created() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let network = test_network();
    let connector = network
        .create_connector(
            "main",
            Endpoint::tcp("127.0.0.1", port),
            Arc::new(LineProtocol::default()),
            None,
        )
        .unwrap();

    let err = connector.do_connect().await.unwrap_err();
    assert!(matches!(err, NetworkError::Transport(_)));
    assert_eq!(connector.state(), ConnectorState::Created);

    let unsupported = network
        .create_connector(
            "tls",
            Endpoint::tls("127.0.0.1", port),
            Arc::new(LineProtocol::default()),
            None,
        )
        .unwrap();
    let err = unsupported.do_connect().await.unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Transport(TransportError::NotAvailable { transport: "tls" })
    ));

    let err = connector.do_disconnect().await.unwrap_err();
    assert!(matches!(
        err,
        NetworkError::InvalidState {
            actual: ConnectorState::Created,
            ..
        }
    ));
}

#[tokio::test]
async fn test_panicking_server_does_not_break_connector() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let network = test_network();
    network
        .create_server(|net| RecordingServer::new(net, true))
        .unwrap();
    let connector = network
        .create_connector(
            "main",
            Endpoint::tcp("127.0.0.1", port),
            Arc::new(LineProtocol::default()),
            Some("srv"),
        )
        .unwrap();

    let (connected, accepted) = tokio::join!(connector.do_connect(), listener.accept());
    connected.unwrap();
    let _peer = accepted.unwrap();

    assert!(connector.is_connected());
    connector.write_line("STILL HERE").await.unwrap();
    connector.do_disconnect().await.unwrap();
}

#[tokio::test]
async fn test_destroy_server_disconnects_its_connectors() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let network = test_network();
    let server = network
        .create_server(|net| RecordingServer::new(net, false))
        .unwrap();
    let connector = network
        .create_connector(
            "main",
            Endpoint::tcp("127.0.0.1", port),
            Arc::new(LineProtocol::default()),
            Some("srv"),
        )
        .unwrap();
    let idle = network
        .create_connector(
            "idle",
            Endpoint::tcp("127.0.0.1", port),
            Arc::new(LineProtocol::default()),
            Some("srv"),
        )
        .unwrap();
    assert_eq!(network.connectors_for_server("srv").len(), 2);

    let (connected, accepted) = tokio::join!(connector.do_connect(), listener.accept());
    connected.unwrap();
    let _peer = accepted.unwrap();

    network.destroy_server("srv").await.unwrap();

    assert!(!network.has_server("srv"));
    assert_eq!(connector.state(), ConnectorState::Disconnected);
    assert_eq!(server.disconnects.lock().len(), 1);
    assert!(network.get_server_for_connector(&idle).is_none());
    assert!(matches!(idle.server(), Err(NetworkError::Gone { what: "server" })));

    network.destroy_connector("idle", true).await.unwrap();
    assert!(network.connectors().is_empty());
}

#[tokio::test]
async fn test_registry_rejects_duplicates_and_unknown_names() {
    let network = test_network();
    network
        .create_server(|net| RecordingServer::new(net, false))
        .unwrap();

    let err = network
        .create_server(|net| RecordingServer::new(net, false))
        .err()
        .unwrap();
    assert!(matches!(err, NetworkError::DuplicateServer(ref name) if name == "srv"));

    let protocol = Arc::new(LineProtocol::default());
    let err = network
        .create_connector("a", Endpoint::tcp("localhost", 1), protocol.clone(), Some("nope"))
        .unwrap_err();
    assert!(matches!(err, NetworkError::ServerNotFound(_)));

    network
        .create_connector("a", Endpoint::tcp("localhost", 1), protocol.clone(), None)
        .unwrap();
    let err = network
        .create_connector("a", Endpoint::tcp("localhost", 1), protocol, None)
        .unwrap_err();
    assert!(matches!(err, NetworkError::DuplicateConnector(_)));

    assert!(network.get_server_as::<RecordingServer>("srv").is_some());
    assert!(matches!(
        network.destroy_server("nope").await,
        Err(NetworkError::ServerNotFound(_))
    ));
}

#[tokio::test]
async fn test_backrefs_report_gone_after_network_drop() {
    let network = test_network();
    let connector = network
        .create_connector(
            "main",
            Endpoint::tcp("localhost", 1),
            Arc::new(LineProtocol::default()),
            None,
        )
        .unwrap();

    drop(network);
    assert!(matches!(
        connector.network(),
        Err(NetworkError::Gone { what: "network" })
    ));
    assert!(matches!(
        connector.do_connect().await,
        Err(NetworkError::Gone { .. })
    ));
}
