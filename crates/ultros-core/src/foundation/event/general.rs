//! General-purpose events every other event descends from.

use crate::Event;
use crate::foundation::OwnerId;

/// Root of the event hierarchy.
///
/// Subscribing to `"event"` receives every event fired on a manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Event)]
#[event(identifier = "event")]
pub struct BaseEvent {
    /// Set by handlers to stop delivery to handlers that don't accept
    /// cancelled events.
    #[event(cancelled)]
    pub cancelled: bool,
}

/// An event raised by a plugin.
#[derive(Debug, Clone, Event)]
#[event(identifier = "plugin")]
pub struct PluginEvent {
    #[event(parent)]
    pub base: BaseEvent,
    /// Owner id of the plugin that raised the event.
    pub plugin: OwnerId,
    /// Name the plugin was loaded under.
    pub plugin_name: String,
}

impl PluginEvent {
    pub fn new(plugin: OwnerId, plugin_name: impl Into<String>) -> Self {
        Self {
            base: BaseEvent::default(),
            plugin,
            plugin_name: plugin_name.into(),
        }
    }
}

/// An event raised by a network protocol.
#[derive(Debug, Clone, Event)]
#[event(identifier = "protocol")]
pub struct ProtocolEvent {
    #[event(parent)]
    pub base: BaseEvent,
    /// Name of the network the event came from.
    pub network: String,
    /// Network type, e.g. `"irc"`.
    pub protocol: &'static str,
}

impl ProtocolEvent {
    pub fn new(network: impl Into<String>, protocol: &'static str) -> Self {
        Self {
            base: BaseEvent::default(),
            network: network.into(),
            protocol,
        }
    }
}
