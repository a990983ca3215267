//! An in-memory transport whose notifications are driven by the tests.

use super::transport::{
    ConnectionState, ProtocolEvent, TransportBuilder, TransportClient, TransportConfig,
    TransportError, TransportObserver,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the mock answers `block_until_connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handshake {
    /// Publishes `Connected` to the observers and reports success.
    Connects,
    /// Reports a timeout.
    NeverConnects,
    /// Never returns, the caller deadline has to kick in.
    Hangs,
    /// Fails with a transport error.
    Fails,
}

/// What happened to a mock, still readable after the factory dropped the client.
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    started: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    effective_closes: AtomicUsize,
    waits: Mutex<Vec<Duration>>,
}

impl Tracker {
    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn effective_closes(&self) -> usize {
        self.effective_closes.load(Ordering::SeqCst)
    }

    pub(crate) fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

pub(crate) struct MockTransport {
    pub tracker: Arc<Tracker>,
    handshake: Handshake,
    observers: Mutex<Vec<Arc<dyn TransportObserver>>>,
}

impl MockTransport {
    pub(crate) fn new(handshake: Handshake) -> Self {
        Self { tracker: Arc::new(Tracker::default()), handshake, observers: Mutex::new(vec![]) }
    }

    pub(crate) fn connecting() -> Self {
        Self::new(Handshake::Connects)
    }

    fn observers(&self) -> Vec<Arc<dyn TransportObserver>> {
        self.observers.lock().unwrap().clone()
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    pub(crate) fn emit_state(&self, state: ConnectionState) {
        for observer in self.observers() {
            observer.state_changed(state);
        }
    }

    pub(crate) fn emit_event(&self, event: &ProtocolEvent) {
        for observer in self.observers() {
            observer.protocol_event(event);
        }
    }

    pub(crate) fn effective_closes(&self) -> usize {
        self.tracker.effective_closes()
    }
}

#[async_trait]
impl TransportClient for MockTransport {
    fn subscribe(&self, observer: Arc<dyn TransportObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    fn start(&self) -> Result<(), TransportError> {
        if self.tracker.started.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyStarted);
        }
        Ok(())
    }

    async fn block_until_connected(&self, max_wait: Duration) -> Result<bool, TransportError> {
        self.tracker.waits.lock().unwrap().push(max_wait);
        match self.handshake {
            Handshake::Connects => {
                self.emit_state(ConnectionState::Connected);
                Ok(true)
            },
            Handshake::NeverConnects => Ok(false),
            Handshake::Hangs => std::future::pending().await,
            Handshake::Fails => Err(TransportError::Interrupted(String::from("connection reset"))),
        }
    }

    fn close(&self) {
        self.tracker.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.tracker.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.tracker.effective_closes.fetch_add(1, Ordering::SeqCst);
        self.emit_event(&ProtocolEvent::Closing);
    }

    fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }
}

/// Hands out `MockTransport`s and remembers what it built.
pub(crate) struct MockTransportBuilder {
    handshake: Handshake,
    builds: Mutex<Vec<(TransportConfig, Arc<Tracker>)>>,
}

impl MockTransportBuilder {
    pub(crate) fn new(handshake: Handshake) -> Self {
        Self { handshake, builds: Mutex::new(vec![]) }
    }

    pub(crate) fn configs(&self) -> Vec<TransportConfig> {
        self.builds.lock().unwrap().iter().map(|(config, _)| config.clone()).collect()
    }

    pub(crate) fn trackers(&self) -> Vec<Arc<Tracker>> {
        self.builds.lock().unwrap().iter().map(|(_, tracker)| tracker.clone()).collect()
    }
}

impl TransportBuilder for MockTransportBuilder {
    type Client = MockTransport;

    fn build(&self, config: TransportConfig) -> Result<MockTransport, TransportError> {
        let client = MockTransport::new(self.handshake);
        self.builds.lock().unwrap().push((config, client.tracker.clone()));
        Ok(client)
    }
}
