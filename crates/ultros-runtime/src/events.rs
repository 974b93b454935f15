//! Lifecycle events fired by [`Ultros`](crate::Ultros).

use ultros_core::{BaseEvent, Event};

/// Fired once setup has started every network and loaded every plugin.
#[derive(Debug, Clone, Default, Event)]
#[event(identifier = "ultros.started")]
pub struct UltrosStartedEvent {
    #[event(parent)]
    pub base: BaseEvent,
    /// Names of the networks that started.
    pub networks: Vec<String>,
    /// Names of the loaded plugins.
    pub plugins: Vec<String>,
}

/// Fired at the start of shutdown, before anything is torn down.
#[derive(Debug, Clone, Default, Event)]
#[event(identifier = "ultros.shutdown")]
pub struct UltrosShutdownEvent {
    #[event(parent)]
    pub base: BaseEvent,
}
