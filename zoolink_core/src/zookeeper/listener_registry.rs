//! Caller supplied observers of a connection lifecycle.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, trace};

pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Callbacks run on the transport notification thread and should return quickly.
pub trait ConnectionListener: Send + Sync {
    fn on_connected(&self, id: &str) -> ListenerResult;
    fn on_reconnecting(&self, id: &str) -> ListenerResult;
    fn on_close(&self, id: &str) -> ListenerResult;
}

/// The three notifications a listener can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleNotification {
    Connected,
    Reconnecting,
    Close,
}

impl fmt::Display for LifecycleNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "on_connected"),
            Self::Reconnecting => write!(f, "on_reconnecting"),
            Self::Close => write!(f, "on_close"),
        }
    }
}

/// Listeners in registration order. The list is frozen once handed to the connection factory.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Vec<Arc<dyn ConnectionListener>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry").field("listeners", &self.listeners.len()).finish()
    }
}

impl From<Vec<Arc<dyn ConnectionListener>>> for ListenerRegistry {
    fn from(listeners: Vec<Arc<dyn ConnectionListener>>) -> Self {
        Self { listeners }
    }
}

impl ListenerRegistry {
    pub fn register(&mut self, listener: Arc<dyn ConnectionListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// `notify` invokes every listener in order. Errors and panics are logged and swallowed, a
    /// failing listener never stops the ones registered after it.
    pub fn notify(&self, notification: LifecycleNotification, id: &str) {
        for (position, listener) in self.listeners.iter().enumerate() {
            trace!("{} listener #{} for connection {}", notification, position, id);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match notification {
                LifecycleNotification::Connected => listener.on_connected(id),
                LifecycleNotification::Reconnecting => listener.on_reconnecting(id),
                LifecycleNotification::Close => listener.on_close(id),
            }));
            match outcome {
                Ok(Ok(())) => {},
                Ok(Err(err)) => {
                    error!("Listener #{} failed {} for connection {}: {}", position, notification, id, err)
                },
                Err(payload) => error!(
                    "Listener #{} panicked in {} for connection {}: {}",
                    position,
                    notification,
                    id,
                    panic_message(payload.as_ref())
                ),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
