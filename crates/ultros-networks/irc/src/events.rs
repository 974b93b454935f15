//! Events raised by IRC sessions.
//!
//! ```text
//! ProtocolEvent ("protocol")
//! └── IrcEvent ("irc")
//!     ├── IrcLineEvent ("irc.line")        every received line
//!     ├── IrcReadyEvent ("irc.ready")      registration finished (001)
//!     └── IrcMessageEvent ("irc.message")  PRIVMSG and NOTICE
//! ```

use ultros_core::{Event, ProtocolEvent};

use crate::line::IrcLine;

/// Base of every IRC event.
#[derive(Debug, Clone, Event)]
#[event(identifier = "irc")]
pub struct IrcEvent {
    #[event(parent)]
    pub base: ProtocolEvent,
    /// Name of the [`IrcServer`](crate::IrcServer) the event came from.
    pub server: String,
}

impl IrcEvent {
    pub fn new(network: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            base: ProtocolEvent::new(network, crate::IRC_KIND),
            server: server.into(),
        }
    }
}

/// Fired for every line before the server handles it.
#[derive(Debug, Clone, Event)]
#[event(identifier = "irc.line")]
pub struct IrcLineEvent {
    #[event(parent)]
    pub base: IrcEvent,
    pub line: IrcLine,
}

/// Fired when the server accepts registration.
#[derive(Debug, Clone, Event)]
#[event(identifier = "irc.ready")]
pub struct IrcReadyEvent {
    #[event(parent)]
    pub base: IrcEvent,
    /// The nick the server registered us under.
    pub nickname: String,
}

/// Whether a message was a `PRIVMSG` or a `NOTICE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Privmsg,
    Notice,
}

/// A `PRIVMSG` or `NOTICE` addressed to us or to a channel we are in.
#[derive(Debug, Clone, Event)]
#[event(identifier = "irc.message")]
pub struct IrcMessageEvent {
    #[event(parent)]
    pub base: IrcEvent,
    pub kind: MessageKind,
    /// Prefix of the sender, if the server sent one.
    pub source: Option<String>,
    /// Channel or nick the message was sent to.
    pub target: String,
    pub text: String,
}

impl IrcMessageEvent {
    /// Nick of the sender, taken from the prefix.
    pub fn sender_nick(&self) -> Option<&str> {
        let source = self.source.as_deref()?;
        source.split(['!', '@']).next().filter(|nick| !nick.is_empty())
    }

    /// Whether the target looks like a channel rather than a nick.
    pub fn is_channel(&self) -> bool {
        self.target.starts_with(['#', '&', '+', '!'])
    }
}
