//! Shared harness: a softphone over the loopback transport, driven by hand

#![allow(dead_code)]

use softphone_core::application::Softphone;
use softphone_core::config::Config;
use softphone_core::domain::events::{CoreEvent, EventEnvelope};
use softphone_core::domain::session::Session;
use softphone_core::domain::shared::value_objects::{LineNumber, SessionId, TransportHandle};
use softphone_core::domain::transport::TransportEvent;
use softphone_core::infrastructure::transport::LoopbackTransport;
use softphone_core::interface::events::EventBus;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.connectivity.enabled = false;
    config.timers.ice_ready_timeout_ms = 500;
    config.timers.reconnect_delay_secs = 1;
    config
}

pub fn line(n: u8) -> LineNumber {
    LineNumber::new(n).unwrap()
}

pub struct Harness {
    pub softphone: Softphone,
    pub transport: Arc<LoopbackTransport>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    events: broadcast::Receiver<EventEnvelope>,
}

impl Harness {
    /// Started and registered
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let mut harness = Self::unstarted(config);
        harness.softphone.start().await;
        harness.pump().await;
        harness
    }

    pub fn unstarted(config: Config) -> Self {
        let (transport, transport_events) = LoopbackTransport::new();
        let transport = Arc::new(transport);
        let bus = Arc::new(EventBus::new(1024));
        let events = bus.subscribe();
        let softphone = Softphone::new(transport.clone(), config, bus);
        Self {
            softphone,
            transport,
            transport_events,
            events,
        }
    }

    /// Feed every queued transport callback into the softphone
    pub async fn pump(&mut self) {
        while let Ok(event) = self.transport_events.try_recv() {
            self.softphone.handle_transport_event(event).await;
        }
    }

    /// Core events published since the last call
    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.events.try_recv() {
            events.push(envelope.event);
        }
        events
    }

    pub fn session(&self, id: SessionId) -> Session {
        self.softphone
            .switchboard()
            .find_recent(&id)
            .cloned()
            .unwrap_or_else(|| panic!("session {} not found", id))
    }

    pub fn handle(&self, id: SessionId) -> TransportHandle {
        self.session(id).handle().cloned().unwrap()
    }

    /// Dial and have the far end answer
    pub async fn connected_call(&mut self, target: &str) -> SessionId {
        let id = self.softphone.dial(target).await.unwrap();
        let handle = self.handle(id);
        self.transport.remote_progress(&handle);
        self.transport.remote_answer(&handle);
        self.pump().await;
        id
    }

    /// Offer an inbound call and let it ring
    pub async fn ringing_call(&mut self, number: &str) -> SessionId {
        let handle = self.transport.remote_offer(number, None);
        self.pump().await;
        self.softphone.switchboard().find_by_handle(&handle).unwrap()
    }
}
