//! The IRC session.
//!
//! An [`IrcServer`] registers with the remote server when its connector comes
//! up and reacts to the lines the [`IrcProtocol`](crate::IrcProtocol)
//! dispatcher hands it. Commands are looked up in a table built once in
//! [`IrcServer::new`]; commands without an entry go to the `UNHANDLED`
//! handler.
//!
//! Every line fires an [`IrcLineEvent`] before its handler runs.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};
use ultros_core::{
    BackRef, Connector, Event, Network, NetworkError, NetworkResult, Server, TransportError,
};

use crate::config::IrcConfig;
use crate::events::{IrcEvent, IrcLineEvent, IrcMessageEvent, IrcReadyEvent, MessageKind};
use crate::line::IrcLine;

type LineHandler = for<'a> fn(
    &'a IrcServer,
    &'a Arc<Connector>,
    &'a IrcLine,
) -> BoxFuture<'a, NetworkResult<()>>;

/// Table key of the fallback handler.
pub const UNHANDLED: &str = "UNHANDLED";

/// Numerics that are only logged.
const INFO_NUMERICS: &[&str] = &[
    "002", "003", "250", "251", "252", "253", "254", "255", "265", "266", "372", "375", "376",
];

/// ISUPPORT values: `KEY=a,b` is `[Some(a), Some(b)]`, a bare `KEY` is `[None]`.
pub type IsupportValues = Vec<Option<String>>;

#[derive(Debug, Default)]
struct Session {
    nickname: String,
    ready: bool,
    capabilities: Vec<String>,
    server_name: Option<String>,
    server_version: Option<String>,
    isupport: HashMap<String, IsupportValues>,
}

/// One IRC session on a network.
pub struct IrcServer {
    name: String,
    network: BackRef<Network>,
    config: IrcConfig,
    connector: RwLock<Option<BackRef<Connector>>>,
    session: Mutex<Session>,
    handlers: HashMap<&'static str, LineHandler>,
}

impl IrcServer {
    pub fn new(name: impl Into<String>, network: BackRef<Network>, config: IrcConfig) -> Self {
        let session = Session {
            nickname: config.nickname.clone(),
            ..Session::default()
        };
        Self {
            name: name.into(),
            network,
            config,
            connector: RwLock::new(None),
            session: Mutex::new(session),
            handlers: Self::dispatch_table(),
        }
    }

    fn dispatch_table() -> HashMap<&'static str, LineHandler> {
        let mut table: HashMap<&'static str, LineHandler> = HashMap::new();
        table.insert("PING", Self::on_ping);
        table.insert("CAP", Self::on_cap);
        table.insert("001", Self::on_welcome);
        table.insert("004", Self::on_my_info);
        table.insert("005", Self::on_isupport);
        table.insert("433", Self::on_nickname_in_use);
        table.insert("PRIVMSG", Self::on_message);
        table.insert("NOTICE", Self::on_message);
        table.insert("ERROR", Self::on_error);
        for numeric in INFO_NUMERICS {
            table.insert(*numeric, Self::on_info);
        }
        table.insert(UNHANDLED, Self::on_unhandled);
        table
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn config(&self) -> &IrcConfig {
        &self.config
    }

    /// Our current nick. Before registration this is the nick being tried.
    pub fn nickname(&self) -> String {
        self.session.lock().nickname.clone()
    }

    /// Whether the server has accepted registration on the current connection.
    pub fn is_ready(&self) -> bool {
        self.session.lock().ready
    }

    /// Capabilities the server advertised in `CAP LS`.
    pub fn capabilities(&self) -> Vec<String> {
        self.session.lock().capabilities.clone()
    }

    /// Server name from `004`.
    pub fn server_name(&self) -> Option<String> {
        self.session.lock().server_name.clone()
    }

    /// Server software version from `004`.
    pub fn server_version(&self) -> Option<String> {
        self.session.lock().server_version.clone()
    }

    /// An ISUPPORT token from `005`, e.g. `CHANTYPES`.
    pub fn isupport(&self, key: &str) -> Option<IsupportValues> {
        self.session.lock().isupport.get(key).cloned()
    }

    /// The connector this session last registered on.
    pub fn connector(&self) -> NetworkResult<Arc<Connector>> {
        self.connector
            .read()
            .as_ref()
            .ok_or(NetworkError::Gone { what: "connector" })?
            .get()
    }

    // =========================================================================
    // Sending
    // =========================================================================

    pub async fn send_line(&self, line: IrcLine) -> NetworkResult<()> {
        let connector = self.connector()?;
        self.send(&connector, line).await
    }

    pub async fn send_join(&self, channel: &str) -> NetworkResult<()> {
        self.send_line(IrcLine::new("JOIN").param(channel)).await
    }

    pub async fn send_part(&self, channel: &str, reason: Option<&str>) -> NetworkResult<()> {
        let mut line = IrcLine::new("PART").param(channel);
        if let Some(reason) = reason {
            line = line.trailing(reason);
        }
        self.send_line(line).await
    }

    pub async fn send_privmsg(&self, target: &str, text: &str) -> NetworkResult<()> {
        self.send_line(IrcLine::new("PRIVMSG").param(target).trailing(text))
            .await
    }

    pub async fn send_notice(&self, target: &str, text: &str) -> NetworkResult<()> {
        self.send_line(IrcLine::new("NOTICE").param(target).trailing(text))
            .await
    }

    pub async fn send_quit(&self, message: &str) -> NetworkResult<()> {
        self.send_line(IrcLine::new("QUIT").trailing(message)).await
    }

    async fn send(&self, connector: &Connector, line: IrcLine) -> NetworkResult<()> {
        connector.write_line(&line.to_wire()?).await
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Fires [`IrcLineEvent`] and runs the command's handler. Failures are
    /// logged.
    pub async fn handle_line(&self, connector: &Arc<Connector>, line: IrcLine) {
        if let Err(error) = self.fire_line_event(&line).await {
            warn!(server = %self.name, command = %line.command, %error, "Line event failed");
        }

        let handler = self
            .handlers
            .get(line.command.as_str())
            .copied()
            .unwrap_or(Self::on_unhandled as LineHandler);
        if let Err(error) = handler(self, connector, &line).await {
            warn!(server = %self.name, command = %line.command, %error, "IRC handler failed");
        }
    }

    async fn fire_line_event(&self, line: &IrcLine) -> NetworkResult<()> {
        self.fire(IrcLineEvent {
            base: self.event_base()?,
            line: line.clone(),
        })
        .await?;
        Ok(())
    }

    async fn fire_ready_event(&self, nickname: String) -> NetworkResult<()> {
        self.fire(IrcReadyEvent {
            base: self.event_base()?,
            nickname,
        })
        .await?;
        Ok(())
    }

    fn event_base(&self) -> NetworkResult<IrcEvent> {
        Ok(IrcEvent::new(self.network.get()?.name(), &self.name))
    }

    async fn fire<E: Event>(&self, event: E) -> NetworkResult<E> {
        let network = self.network.get()?;
        Ok(network.events().fire_event(event).await?)
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    fn on_ping<'a>(
        &'a self,
        connector: &'a Arc<Connector>,
        line: &'a IrcLine,
    ) -> BoxFuture<'a, NetworkResult<()>> {
        async move {
            let token = line.last_param().unwrap_or_default();
            self.send(connector, IrcLine::new("PONG").trailing(token)).await
        }
        .boxed()
    }

    fn on_cap<'a>(
        &'a self,
        connector: &'a Arc<Connector>,
        line: &'a IrcLine,
    ) -> BoxFuture<'a, NetworkResult<()>> {
        async move {
            line.require_params(2)?;
            let subcommand = line.params[1].to_ascii_uppercase();
            if subcommand != "LS" {
                debug!(server = %self.name, %subcommand, params = ?line.params, "CAP reply");
                return Ok(());
            }

            // `CAP * LS * :caps` continues, `CAP * LS :caps` is the last line.
            let (more, caps) = match (line.param_at(2), line.param_at(3)) {
                (Some("*"), Some(caps)) => (true, caps),
                (Some("*"), None) => (true, ""),
                (Some(caps), _) => (false, caps),
                (None, _) => (false, ""),
            };
            {
                let mut session = self.session.lock();
                session
                    .capabilities
                    .extend(caps.split(' ').filter(|cap| !cap.is_empty()).map(str::to_owned));
                if !more {
                    debug!(server = %self.name, capabilities = ?session.capabilities, "Capabilities listed");
                }
            }

            if more {
                return Ok(());
            }
            self.send(connector, IrcLine::new("CAP").param("END")).await
        }
        .boxed()
    }

    fn on_welcome<'a>(
        &'a self,
        _connector: &'a Arc<Connector>,
        line: &'a IrcLine,
    ) -> BoxFuture<'a, NetworkResult<()>> {
        async move {
            line.require_params(1)?;
            let nickname = line.params[0].clone();
            {
                let mut session = self.session.lock();
                session.ready = true;
                session.nickname = nickname.clone();
            }
            info!(
                server = %self.name,
                %nickname,
                welcome = line.last_param().unwrap_or_default(),
                "Registered"
            );

            // Channels are joined even when a ready handler fails.
            if let Err(error) = self.fire_ready_event(nickname).await {
                warn!(server = %self.name, %error, "Ready event failed");
            }

            for channel in &self.config.channels {
                self.send_join(channel).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn on_my_info<'a>(
        &'a self,
        _connector: &'a Arc<Connector>,
        line: &'a IrcLine,
    ) -> BoxFuture<'a, NetworkResult<()>> {
        async move {
            line.require_params(3)?;
            let mut session = self.session.lock();
            session.server_name = Some(line.params[1].clone());
            session.server_version = Some(line.params[2].clone());
            debug!(server = %self.name, host = %line.params[1], version = %line.params[2], "Server info");
            Ok(())
        }
        .boxed()
    }

    fn on_isupport<'a>(
        &'a self,
        _connector: &'a Arc<Connector>,
        line: &'a IrcLine,
    ) -> BoxFuture<'a, NetworkResult<()>> {
        async move {
            // First param is our nick, last is the "are supported" text.
            let tokens: &[String] = match line.params.len() {
                len if len >= 2 => &line.params[1..len - 1],
                _ => &[],
            };
            apply_isupport(&mut self.session.lock().isupport, tokens);
            trace!(server = %self.name, ?tokens, "ISUPPORT");
            Ok(())
        }
        .boxed()
    }

    fn on_nickname_in_use<'a>(
        &'a self,
        connector: &'a Arc<Connector>,
        _line: &'a IrcLine,
    ) -> BoxFuture<'a, NetworkResult<()>> {
        async move {
            let retry = {
                let mut session = self.session.lock();
                if session.ready {
                    None
                } else {
                    session.nickname.push('_');
                    Some(session.nickname.clone())
                }
            };

            let Some(nickname) = retry else {
                warn!(server = %self.name, "Nickname change refused: already in use");
                return Ok(());
            };
            warn!(server = %self.name, %nickname, "Nickname in use, retrying");
            self.send(connector, IrcLine::new("NICK").param(nickname)).await
        }
        .boxed()
    }

    fn on_info<'a>(
        &'a self,
        _connector: &'a Arc<Connector>,
        line: &'a IrcLine,
    ) -> BoxFuture<'a, NetworkResult<()>> {
        async move {
            let text = line.params.get(1..).unwrap_or_default().join(" ");
            info!(server = %self.name, numeric = %line.command, "{text}");
            Ok(())
        }
        .boxed()
    }

    fn on_message<'a>(
        &'a self,
        _connector: &'a Arc<Connector>,
        line: &'a IrcLine,
    ) -> BoxFuture<'a, NetworkResult<()>> {
        async move {
            line.require_params(2)?;
            let kind = if line.command == "NOTICE" {
                MessageKind::Notice
            } else {
                MessageKind::Privmsg
            };
            let event = IrcMessageEvent {
                base: self.event_base()?,
                kind,
                source: line.prefix.clone(),
                target: line.params[0].clone(),
                text: line.params[1].clone(),
            };
            debug!(
                server = %self.name,
                ?kind,
                source = ?event.source,
                target = %event.target,
                "{}",
                event.text
            );
            self.fire(event).await?;
            Ok(())
        }
        .boxed()
    }

    fn on_error<'a>(
        &'a self,
        _connector: &'a Arc<Connector>,
        line: &'a IrcLine,
    ) -> BoxFuture<'a, NetworkResult<()>> {
        async move {
            warn!(
                server = %self.name,
                message = line.last_param().unwrap_or_default(),
                "Server sent ERROR"
            );
            Ok(())
        }
        .boxed()
    }

    fn on_unhandled<'a>(
        &'a self,
        _connector: &'a Arc<Connector>,
        line: &'a IrcLine,
    ) -> BoxFuture<'a, NetworkResult<()>> {
        async move {
            debug!(server = %self.name, "Unhandled: {line}");
            Ok(())
        }
        .boxed()
    }
}

#[async_trait]
impl Server for IrcServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connector_connected(&self, connector: &Arc<Connector>) -> NetworkResult<()> {
        *self.connector.write() = Some(BackRef::new(connector, "connector"));
        *self.session.lock() = Session {
            nickname: self.config.nickname.clone(),
            ..Session::default()
        };
        info!(server = %self.name, connector = %connector.name(), nickname = %self.config.nickname, "Registering");

        self.send(connector, IrcLine::new("CAP").param("LS").param("302"))
            .await?;
        if let Some(password) = &self.config.password {
            self.send(connector, IrcLine::new("PASS").param(password))
                .await?;
        }
        self.send(connector, IrcLine::new("NICK").param(&self.config.nickname))
            .await?;
        self.send(
            connector,
            IrcLine::new("USER")
                .param(&self.config.username)
                .param("0")
                .param("*")
                .trailing(&self.config.realname),
        )
        .await
    }

    async fn connector_disconnected(
        &self,
        connector: &Arc<Connector>,
        error: Option<&TransportError>,
    ) -> NetworkResult<()> {
        self.session.lock().ready = false;
        match error {
            Some(error) => warn!(server = %self.name, connector = %connector.name(), %error, "Connection lost"),
            None => info!(server = %self.name, connector = %connector.name(), "Disconnected"),
        }
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Applies `005` tokens: `-KEY` removes, `KEY=a,b` and bare `KEY` set.
fn apply_isupport(isupport: &mut HashMap<String, IsupportValues>, tokens: &[String]) {
    for token in tokens {
        if let Some(key) = token.strip_prefix('-') {
            isupport.remove(key);
            continue;
        }
        let (key, values) = match token.split_once('=') {
            Some((key, value)) => (key, value.split(',').map(|v| Some(v.to_owned())).collect()),
            None => (token.as_str(), vec![None]),
        };
        isupport.insert(key.to_owned(), values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|t| (*t).to_owned()).collect()
    }

    #[test]
    fn test_apply_isupport() {
        let mut isupport = HashMap::new();
        apply_isupport(
            &mut isupport,
            &tokens(&["CHANTYPES=#&", "PREFIX=(ov)@+", "TARGMAX=PRIVMSG:4,NOTICE:4", "EXCEPTS", "SAFELIST"]),
        );
        assert_eq!(isupport["CHANTYPES"], vec![Some("#&".to_owned())]);
        assert_eq!(
            isupport["TARGMAX"],
            vec![Some("PRIVMSG:4".to_owned()), Some("NOTICE:4".to_owned())]
        );
        assert_eq!(isupport["EXCEPTS"], vec![None]);

        apply_isupport(&mut isupport, &tokens(&["-SAFELIST", "CHANTYPES=#"]));
        assert!(!isupport.contains_key("SAFELIST"));
        assert_eq!(isupport["CHANTYPES"], vec![Some("#".to_owned())]);
    }

    #[test]
    fn test_dispatch_table_covers_informational_numerics() {
        let table = IrcServer::dispatch_table();
        for key in ["PING", "CAP", "001", "004", "005", "433", "PRIVMSG", "NOTICE", "ERROR", UNHANDLED] {
            assert!(table.contains_key(key), "missing handler for {key}");
        }
        for numeric in INFO_NUMERICS {
            assert!(table.contains_key(numeric));
        }
        assert!(!table.contains_key("JOIN"));
    }
}
