//! Connection State Machine
//! Folds the raw transport states into the three notifications callers care about:
//! - Connected, Reconnected: `on_connected`
//! - Suspended, Lost: `on_reconnecting`
//! - anything else closes the transport, listeners only hear about it through the `Closing`
//!   protocol event that the close emits.
//! Notifications are handled synchronously on the transport thread that delivers them.

use super::listener_registry::{LifecycleNotification, ListenerRegistry};
use super::transport::{ConnectionState, ProtocolEvent, TransportClient, TransportObserver};
use std::sync::{Mutex, Weak};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Disconnected,
    Connected,
    Reconnecting,
    /// Terminal
    Closed,
}

#[derive(Debug)]
pub struct ConnectionStateMachine<C> {
    id: String,
    listeners: ListenerRegistry,
    state: Mutex<LifecycleState>,
    /// Weak as the client owns its observers, this one included.
    client: Weak<C>,
}

impl<C: TransportClient> ConnectionStateMachine<C> {
    pub fn new(id: &str, listeners: ListenerRegistry, client: Weak<C>) -> Self {
        Self {
            id: id.to_string(),
            listeners,
            state: Mutex::new(LifecycleState::Disconnected),
            client,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Moves to `next` unless already closed. Returns whether the transition happened.
    fn transition(&self, next: LifecycleState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *state == LifecycleState::Closed {
            return false;
        }
        debug!("Connection {}: {:?} -> {:?}", self.id, *state, next);
        *state = next;
        true
    }

    fn close_client(&self) {
        match self.client.upgrade() {
            Some(client) => client.close(),
            None => debug!("Connection {}: client already dropped", self.id),
        }
    }
}

impl<C: TransportClient> TransportObserver for ConnectionStateMachine<C> {
    fn state_changed(&self, state: ConnectionState) {
        // The lock is released before the listeners run.
        let notification = match state {
            ConnectionState::Connected | ConnectionState::Reconnected => {
                self.transition(LifecycleState::Connected).then(|| LifecycleNotification::Connected)
            },
            ConnectionState::Suspended | ConnectionState::Lost => self
                .transition(LifecycleState::Reconnecting)
                .then(|| LifecycleNotification::Reconnecting),
            ConnectionState::ReadOnly | ConnectionState::Closed => {
                if self.transition(LifecycleState::Closed) {
                    warn!("Connection {}: transport reported {:?}, closing it", self.id, state);
                    self.close_client();
                }
                None
            },
        };
        match notification {
            Some(notification) => {
                info!("Connection {}: {:?}", self.id, state);
                self.listeners.notify(notification, &self.id);
            },
            None => debug!("Connection {}: {:?} without notification", self.id, state),
        }
    }

    fn protocol_event(&self, event: &ProtocolEvent) {
        match event {
            ProtocolEvent::Closing => {
                info!("Connection {}: closing", self.id);
                self.listeners.notify(LifecycleNotification::Close, &self.id);
            },
            ProtocolEvent::Watched { event_type, path } => {
                debug!("Connection {}: watched event {} on {:?}", self.id, event_type, path);
            },
        }
    }
}
