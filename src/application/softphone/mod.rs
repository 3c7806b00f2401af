//! Softphone context
//!
//! Owns every piece of mutable softphone state: the switchboard, BLF
//! subscriptions, transfer ledger and connection supervisor. All inputs
//! (transport callbacks, user actions, timers) are applied here one at a
//! time by the runtime, and the events each one produces are published in
//! order before the next input is taken.

mod calls;
mod presence;
mod resilience;
mod transfer;

use crate::config::Config;
use crate::domain::connection::{ConnectionState, ResilienceSupervisor, SupervisorPolicy};
use crate::domain::events::{CoreEvent, Outbox};
use crate::domain::line::Line;
use crate::domain::presence::{BlfSubscription, PresenceManager};
use crate::domain::session::{Direction, EndReason, Session, SessionEvent, SessionState};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{LineNumber, RemoteParty, SessionId, TransportHandle};
use crate::domain::switchboard::Switchboard;
use crate::domain::transfer::{TransferLedger, TransferRecord};
use crate::domain::transport::{
    CallFailure, RejectReason, TransportCapability, TransportError, TransportEvent,
    TransportSessionState,
};
use crate::interface::events::EventBus;
use crate::interface::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Point-in-time view for observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftphoneSnapshot {
    pub lines: Vec<Line>,
    pub selected_line: LineNumber,
    pub sessions: Vec<Session>,
    pub subscriptions: Vec<BlfSubscription>,
    pub transfers: Vec<TransferRecord>,
    pub connection: ConnectionState,
}

pub struct Softphone {
    transport: Arc<dyn TransportCapability>,
    config: Config,
    switchboard: Switchboard,
    presence: PresenceManager,
    transfers: TransferLedger,
    supervisor: ResilienceSupervisor,
    events: Arc<EventBus>,
    outbox: Outbox,
    reconnect_after: Option<Duration>,
}

impl Softphone {
    pub fn new(transport: Arc<dyn TransportCapability>, config: Config, events: Arc<EventBus>) -> Self {
        let supervisor = ResilienceSupervisor::new(SupervisorPolicy::from(&config.timers));
        Self {
            transport,
            switchboard: Switchboard::new(config.lines.history_limit),
            presence: PresenceManager::new(),
            transfers: TransferLedger::new(),
            supervisor,
            events,
            outbox: Outbox::default(),
            reconnect_after: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn switchboard(&self) -> &Switchboard {
        &self.switchboard
    }

    pub fn presence(&self) -> &PresenceManager {
        &self.presence
    }

    pub fn transfers(&self) -> &TransferLedger {
        &self.transfers
    }

    pub fn connection(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn snapshot(&self) -> SoftphoneSnapshot {
        SoftphoneSnapshot {
            lines: self.switchboard.lines().to_vec(),
            selected_line: self.switchboard.selected_line(),
            sessions: self.switchboard.sessions().cloned().collect(),
            subscriptions: self.presence.iter().cloned().collect(),
            transfers: self.transfers.history().to_vec(),
            connection: self.supervisor.state(),
        }
    }

    /// Reconnection delay requested by the last input, if any
    pub fn take_reconnect_request(&mut self) -> Option<Duration> {
        self.reconnect_after.take()
    }

    /// Apply one transport callback
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::TransportConnected => {
                let directive = self.supervisor.on_transport_connected();
                self.drive(directive).await;
            }
            TransportEvent::TransportDisconnected { error } => {
                let directive = self.supervisor.on_transport_disconnected(&error);
                self.drive(directive).await;
            }
            TransportEvent::RegistrationStateChanged { state } => {
                let directive = self.supervisor.on_registration_state_changed(state);
                self.drive(directive).await;
            }
            TransportEvent::SessionStateChanged { handle, state } => {
                self.on_session_state(&handle, state).await;
            }
            TransportEvent::InboundOffer { handle, remote } => {
                self.on_inbound_offer(handle, remote).await;
            }
            TransportEvent::DtmfReceived { handle, tone } => {
                match self.switchboard.find_by_handle(&handle) {
                    Some(session_id) => {
                        self.outbox.record(CoreEvent::DtmfReceived { session_id, tone })
                    }
                    None => debug!("DTMF for unknown handle {}", handle.as_str()),
                }
            }
            TransportEvent::PresenceNotify {
                subscription,
                dialog_state,
                remote_target,
            } => self.on_presence_notify(&subscription, &dialog_state, remote_target),
            TransportEvent::PresenceRejected {
                subscription,
                reason,
            } => self.on_presence_rejected(&subscription, &reason),
            TransportEvent::KeepAliveTimeout => {
                self.on_keep_alive_miss().await;
            }
            TransportEvent::Activity => self.supervisor.on_keep_alive_success(),
        }
        self.flush();
    }

    async fn on_session_state(&mut self, handle: &TransportHandle, state: TransportSessionState) {
        let Some(id) = self.switchboard.find_by_handle(handle) else {
            debug!("Stale session event for {}: {:?}", handle.as_str(), state);
            return;
        };

        let event = match state {
            TransportSessionState::Progress => SessionEvent::Alert,
            TransportSessionState::Established => SessionEvent::Answer,
            TransportSessionState::Terminated => SessionEvent::End(EndReason::RemoteHangup),
            TransportSessionState::Failed(failure) => SessionEvent::Fail(failure),
        };

        match self.switchboard.transition(id, event) {
            Ok(to) if to.is_terminal() => self.session_ended(id).await,
            Ok(_) => {}
            // Retransmitted provisional responses, re-INVITEs and late events
            Err(e) => debug!("Ignoring transport update for session {}: {}", id, e),
        }
    }

    async fn on_inbound_offer(&mut self, handle: TransportHandle, remote: RemoteParty) {
        metrics::record_call_received();
        match self.switchboard.create_session(Direction::Incoming, remote.clone()) {
            Ok(id) => {
                if let Err(e) = self.switchboard.bind_handle(id, handle) {
                    warn!("Failed to bind inbound offer to session {}: {}", id, e);
                }
                info!("Incoming call from {} ringing as session {}", remote.label(), id);
            }
            Err(DomainError::AllLinesBusy) => {
                info!("All lines busy, rejecting call from {}", remote.label());
                metrics::record_call_rejected_busy();
                if let Err(e) = self
                    .transport
                    .reject_inbound_offer(&handle, RejectReason::Busy)
                    .await
                {
                    warn!("Failed to reject inbound offer {}: {}", handle.as_str(), e);
                }
                self.outbox.record(CoreEvent::InboundRejected {
                    remote,
                    reason: RejectReason::Busy,
                });
            }
            Err(e) => warn!("Inbound offer from {} dropped: {}", remote.label(), e),
        }
    }

    /// Run dependents of a session that just reached a terminal state, then
    /// move it to history
    async fn session_ended(&mut self, id: SessionId) {
        let Some(session) = self.switchboard.get(&id).cloned() else {
            return;
        };

        if session.state() == SessionState::Failed {
            let reason = match session.end_reason() {
                Some(EndReason::Failed(failure)) => failure_label(failure),
                _ => "unknown",
            };
            metrics::record_call_failed(reason);
        }

        self.on_transfer_leg_ended(&session).await;
        self.switchboard.retire(id);
        debug!("Session {} retired", id);
    }

    /// Session addressed by a user action: explicit, or the selected line's
    fn target(&self, session: Option<SessionId>) -> Result<Session> {
        let found = match session {
            Some(id) => self.switchboard.get(&id),
            None => self.switchboard.selected_session(),
        };
        match found {
            Some(session) if session.is_terminal() => Err(DomainError::AlreadyTerminal(session.id())),
            Some(session) => Ok(session.clone()),
            None => Err(DomainError::NotFound(match session {
                Some(id) => format!("session {}", id),
                None => format!("session on line {}", self.switchboard.selected_line()),
            })),
        }
    }

    fn handle_of(session: &Session) -> Result<TransportHandle> {
        session.handle().cloned().ok_or_else(|| {
            DomainError::InvalidOperation(format!("Session {} has no transport leg", session.id()))
        })
    }

    /// Publish everything recorded since the last flush
    fn flush(&mut self) {
        let mut pending = self.switchboard.take_events();
        pending.extend(self.transfers.take_events());
        pending.extend(self.presence.take_events());
        pending.extend(self.supervisor.take_events());
        pending.extend(self.outbox.take_events());
        self.events.publish_all(pending);

        metrics::update_active_sessions(self.switchboard.session_count());
        metrics::update_monitored_extensions(self.presence.len());
    }
}

/// Failure classification for a transport error on a session request
pub(crate) fn call_failure(error: &TransportError) -> CallFailure {
    match error {
        TransportError::Rejected { code: 486, .. } | TransportError::Rejected { code: 600, .. } => {
            CallFailure::Busy
        }
        TransportError::Rejected { code, .. } => CallFailure::Rejected(*code),
        TransportError::Timeout => CallFailure::Timeout,
        TransportError::Disconnected => CallFailure::TransportLost,
        TransportError::UnknownHandle(_) | TransportError::Other(_) => {
            CallFailure::MediaFailure(error.to_string())
        }
    }
}

fn failure_label(failure: &CallFailure) -> &'static str {
    match failure {
        CallFailure::Rejected(_) => "rejected",
        CallFailure::Busy => "busy",
        CallFailure::NoAnswer => "no_answer",
        CallFailure::Timeout => "timeout",
        CallFailure::MediaFailure(_) => "media",
        CallFailure::TransportLost => "transport_lost",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::RegistrationState;
    use crate::domain::transport::MockTransportCapability;

    fn softphone(transport: MockTransportCapability) -> Softphone {
        let mut config = Config::default();
        config.connectivity.enabled = false;
        Softphone::new(Arc::new(transport), config, Arc::new(EventBus::default()))
    }

    fn offer(n: u8) -> TransportEvent {
        TransportEvent::InboundOffer {
            handle: TransportHandle::new(format!("h{}", n)),
            remote: RemoteParty::new(format!("10{}", n), None),
        }
    }

    #[tokio::test]
    async fn test_refused_registration_schedules_retry() {
        let mut transport = MockTransportCapability::new();
        transport.expect_connect().times(1).returning(|| Ok(()));
        transport
            .expect_register()
            .times(1)
            .returning(|_| Err(TransportError::rejected(403, "Forbidden")));

        let mut softphone = softphone(transport);
        softphone.start().await;

        assert_eq!(
            softphone.connection().registration,
            RegistrationState::Unregistered
        );
        assert_eq!(
            softphone.take_reconnect_request(),
            Some(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn test_fourth_offer_rejected_busy() {
        let mut transport = MockTransportCapability::new();
        transport
            .expect_reject_inbound_offer()
            .withf(|handle, reason| handle.as_str() == "h4" && *reason == RejectReason::Busy)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut softphone = softphone(transport);
        let mut events = softphone.events().subscribe();
        for n in 1..=4 {
            softphone.handle_transport_event(offer(n)).await;
        }

        assert_eq!(softphone.switchboard().session_count(), 3);
        let mut rejected = 0;
        while let Ok(envelope) = events.try_recv() {
            if let CoreEvent::InboundRejected { remote, reason } = envelope.event {
                assert_eq!(remote.number(), "104");
                assert_eq!(reason, RejectReason::Busy);
                rejected += 1;
            }
        }
        assert_eq!(rejected, 1);
    }

    #[tokio::test]
    async fn test_failed_terminate_still_ends_session() {
        let mut transport = MockTransportCapability::new();
        transport
            .expect_reject_inbound_offer()
            .times(1)
            .returning(|_, _| Err(TransportError::Disconnected));

        let mut softphone = softphone(transport);
        softphone.handle_transport_event(offer(1)).await;
        let id = softphone.switchboard().session_ids()[0];

        assert!(softphone.reject(Some(id)).await.is_ok());
        assert_eq!(softphone.switchboard().session_count(), 0);
        assert_eq!(softphone.switchboard().free_lines(), 3);
    }

    #[test]
    fn test_call_failure_mapping() {
        assert_eq!(call_failure(&TransportError::rejected(486, "Busy Here")), CallFailure::Busy);
        assert_eq!(
            call_failure(&TransportError::rejected(404, "Not Found")),
            CallFailure::Rejected(404)
        );
        assert_eq!(call_failure(&TransportError::Timeout), CallFailure::Timeout);
        assert_eq!(
            call_failure(&TransportError::Disconnected),
            CallFailure::TransportLost
        );
    }
}
