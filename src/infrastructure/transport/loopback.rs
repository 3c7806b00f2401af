//! In-memory transport
//!
//! Stands in for the signaling/media engine. Requests are recorded and
//! answered locally; the far end is driven through the `remote_*` helpers,
//! which push [`TransportEvent`]s onto the channel returned by
//! [`LoopbackTransport::new`]. Failure knobs let callers script rejections,
//! timeouts and dropped connections.

use crate::config::AccountConfig;
use crate::domain::connection::RegistrationState;
use crate::domain::shared::value_objects::{
    DtmfTone, RemoteParty, SubscriptionHandle, TransportHandle,
};
use crate::domain::transport::{
    CallFailure, OutboundOptions, RejectReason, TransportCapability, TransportError,
    TransportEvent, TransportSessionState,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

/// A request the core made, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect,
    Register(String),
    Deregister,
    CreateOutbound(String),
    Accept(TransportHandle),
    Reject(TransportHandle, RejectReason),
    Terminate(TransportHandle),
    Hold(TransportHandle),
    Unhold(TransportHandle),
    Mute(TransportHandle),
    Unmute(TransportHandle),
    Dtmf(TransportHandle, DtmfTone),
    BlindRefer(TransportHandle, String),
    AttendedRefer(TransportHandle, TransportHandle),
    Subscribe(String),
    Unsubscribe(SubscriptionHandle),
    KeepAlive,
}

#[derive(Default)]
struct Knobs {
    fail_connects: u32,
    fail_registrations: u32,
    keep_alive_timeouts: u32,
    stall_media: bool,
    auto_answer: bool,
    reject_outbound: Option<u16>,
    reject_hold: bool,
    reject_mute: bool,
    reject_blind_refer: Option<u16>,
    reject_attended_refer: Option<u16>,
    rejected_extensions: HashSet<String>,
}

#[derive(Default)]
struct LoopbackState {
    connected: bool,
    next_id: u64,
    sessions: HashMap<TransportHandle, String>,
    subscriptions: HashMap<SubscriptionHandle, String>,
    calls: Vec<TransportCall>,
    knobs: Knobs,
}

impl LoopbackState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl LoopbackTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Self {
            state: Mutex::new(LoopbackState::default()),
            events,
        };
        (transport, rx)
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!("Loopback event dropped, no receiver");
        }
    }

    fn record(&self, call: TransportCall) -> MutexGuard<'_, LoopbackState> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }

    fn ensure_connected(state: &LoopbackState) -> Result<(), TransportError> {
        if state.connected {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }

    fn ensure_session(state: &LoopbackState, handle: &TransportHandle) -> Result<(), TransportError> {
        Self::ensure_connected(state)?;
        if state.sessions.contains_key(handle) {
            Ok(())
        } else {
            Err(TransportError::UnknownHandle(handle.as_str().to_string()))
        }
    }

    // Knobs

    /// Fail the next `count` connect attempts
    pub fn fail_next_connects(&self, count: u32) {
        self.state().knobs.fail_connects = count;
    }

    /// Reject the next `count` registrations with 403
    pub fn fail_next_registrations(&self, count: u32) {
        self.state().knobs.fail_registrations = count;
    }

    /// Leave the next `count` keep-alives unanswered
    pub fn time_out_keep_alives(&self, count: u32) {
        self.state().knobs.keep_alive_timeouts = count;
    }

    /// Never report media readiness for new outbound sessions
    pub fn stall_media(&self, stall: bool) {
        self.state().knobs.stall_media = stall;
    }

    /// Outbound sessions ring and get answered immediately
    pub fn auto_answer(&self, enabled: bool) {
        self.state().knobs.auto_answer = enabled;
    }

    pub fn reject_outbound(&self, code: Option<u16>) {
        self.state().knobs.reject_outbound = code;
    }

    pub fn reject_hold(&self, reject: bool) {
        self.state().knobs.reject_hold = reject;
    }

    pub fn reject_mute(&self, reject: bool) {
        self.state().knobs.reject_mute = reject;
    }

    pub fn reject_blind_refer(&self, code: Option<u16>) {
        self.state().knobs.reject_blind_refer = code;
    }

    pub fn reject_attended_refer(&self, code: Option<u16>) {
        self.state().knobs.reject_attended_refer = code;
    }

    /// Answer SUBSCRIBE for the extension with 403
    pub fn reject_subscriptions_for(&self, extension: &str) {
        self.state()
            .knobs
            .rejected_extensions
            .insert(extension.to_string());
    }

    // Inspection

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Handle of the most recent live session towards `target`
    pub fn handle_for(&self, target: &str) -> Option<TransportHandle> {
        self.state()
            .sessions
            .iter()
            .filter(|(_, t)| t.as_str() == target)
            .map(|(h, _)| h)
            .max_by_key(|h| handle_sequence(h))
            .cloned()
    }

    pub fn subscription_for(&self, extension: &str) -> Option<SubscriptionHandle> {
        self.state()
            .subscriptions
            .iter()
            .find(|(_, e)| e.as_str() == extension)
            .map(|(h, _)| h.clone())
    }

    pub fn live_subscriptions(&self) -> usize {
        self.state().subscriptions.len()
    }

    // Far end

    /// Offer an inbound call and return its handle
    pub fn remote_offer(&self, number: &str, display_name: Option<&str>) -> TransportHandle {
        let handle = {
            let mut state = self.state();
            let handle = TransportHandle::new(format!("in-{}", state.next_id()));
            state.sessions.insert(handle.clone(), number.to_string());
            handle
        };
        self.emit(TransportEvent::InboundOffer {
            handle: handle.clone(),
            remote: RemoteParty::new(number, display_name.map(str::to_string)),
        });
        handle
    }

    pub fn remote_progress(&self, handle: &TransportHandle) {
        self.session_event(handle, TransportSessionState::Progress);
    }

    pub fn remote_answer(&self, handle: &TransportHandle) {
        self.session_event(handle, TransportSessionState::Established);
    }

    pub fn remote_hangup(&self, handle: &TransportHandle) {
        self.state().sessions.remove(handle);
        self.session_event(handle, TransportSessionState::Terminated);
    }

    pub fn remote_fail(&self, handle: &TransportHandle, failure: CallFailure) {
        self.state().sessions.remove(handle);
        self.session_event(handle, TransportSessionState::Failed(failure));
    }

    pub fn remote_dtmf(&self, handle: &TransportHandle, tone: DtmfTone) {
        self.emit(TransportEvent::DtmfReceived {
            handle: handle.clone(),
            tone,
        });
    }

    /// Deliver a dialog-info notification for a subscribed extension
    pub fn remote_notify(&self, extension: &str, dialog_state: &str, remote_target: Option<&str>) {
        if let Some(subscription) = self.subscription_for(extension) {
            self.emit(TransportEvent::PresenceNotify {
                subscription,
                dialog_state: dialog_state.to_string(),
                remote_target: remote_target.map(str::to_string),
            });
        }
    }

    /// Server terminated a subscription with an error
    pub fn remote_reject_subscription(&self, extension: &str, reason: &str) {
        let subscription = {
            let mut state = self.state();
            let handle = state
                .subscriptions
                .iter()
                .find(|(_, e)| e.as_str() == extension)
                .map(|(h, _)| h.clone());
            if let Some(handle) = &handle {
                state.subscriptions.remove(handle);
            }
            handle
        };
        if let Some(subscription) = subscription {
            self.emit(TransportEvent::PresenceRejected {
                subscription,
                reason: reason.to_string(),
            });
        }
    }

    /// Drop the socket; every session and subscription is lost
    pub fn drop_connection(&self, error: &str) {
        {
            let mut state = self.state();
            state.connected = false;
            state.sessions.clear();
            state.subscriptions.clear();
        }
        self.emit(TransportEvent::TransportDisconnected {
            error: error.to_string(),
        });
    }

    /// Unsolicited traffic from the server
    pub fn remote_activity(&self) {
        self.emit(TransportEvent::Activity);
    }

    pub fn emit_keep_alive_timeout(&self) {
        self.emit(TransportEvent::KeepAliveTimeout);
    }

    fn session_event(&self, handle: &TransportHandle, state: TransportSessionState) {
        self.emit(TransportEvent::SessionStateChanged {
            handle: handle.clone(),
            state,
        });
    }
}

fn handle_sequence(handle: &TransportHandle) -> u64 {
    handle
        .as_str()
        .rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn take_one(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl TransportCapability for LoopbackTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.record(TransportCall::Connect);
        if take_one(&mut state.knobs.fail_connects) {
            return Err(TransportError::Other("connection refused".to_string()));
        }
        state.connected = true;
        drop(state);
        self.emit(TransportEvent::TransportConnected);
        Ok(())
    }

    async fn register(&self, account: &AccountConfig) -> Result<(), TransportError> {
        let mut state = self.record(TransportCall::Register(account.username.clone()));
        Self::ensure_connected(&state)?;
        if take_one(&mut state.knobs.fail_registrations) {
            return Err(TransportError::rejected(403, "Forbidden"));
        }
        drop(state);
        self.emit(TransportEvent::RegistrationStateChanged {
            state: RegistrationState::Registered,
        });
        Ok(())
    }

    async fn deregister(&self) -> Result<(), TransportError> {
        let state = self.record(TransportCall::Deregister);
        Self::ensure_connected(&state)
    }

    async fn create_outbound_session(
        &self,
        target: &str,
        _options: &OutboundOptions,
    ) -> Result<TransportHandle, TransportError> {
        let mut state = self.record(TransportCall::CreateOutbound(target.to_string()));
        Self::ensure_connected(&state)?;
        if let Some(code) = state.knobs.reject_outbound {
            return Err(TransportError::rejected(code, "Rejected"));
        }
        let handle = TransportHandle::new(format!("out-{}", state.next_id()));
        state.sessions.insert(handle.clone(), target.to_string());
        let auto_answer = state.knobs.auto_answer;
        drop(state);

        if auto_answer {
            self.remote_progress(&handle);
            self.remote_answer(&handle);
        }
        Ok(handle)
    }

    async fn await_media_ready(&self, handle: &TransportHandle) -> Result<(), TransportError> {
        let stall = {
            let state = self.state();
            Self::ensure_session(&state, handle)?;
            state.knobs.stall_media
        };
        if stall {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn accept_inbound_offer(&self, handle: &TransportHandle) -> Result<(), TransportError> {
        let state = self.record(TransportCall::Accept(handle.clone()));
        Self::ensure_session(&state, handle)
    }

    async fn reject_inbound_offer(
        &self,
        handle: &TransportHandle,
        reason: RejectReason,
    ) -> Result<(), TransportError> {
        let mut state = self.record(TransportCall::Reject(handle.clone(), reason));
        Self::ensure_session(&state, handle)?;
        state.sessions.remove(handle);
        Ok(())
    }

    async fn terminate(&self, handle: &TransportHandle) -> Result<(), TransportError> {
        let mut state = self.record(TransportCall::Terminate(handle.clone()));
        Self::ensure_session(&state, handle)?;
        state.sessions.remove(handle);
        Ok(())
    }

    async fn hold(&self, handle: &TransportHandle) -> Result<(), TransportError> {
        let state = self.record(TransportCall::Hold(handle.clone()));
        Self::ensure_session(&state, handle)?;
        if state.knobs.reject_hold {
            return Err(TransportError::rejected(488, "Not Acceptable Here"));
        }
        Ok(())
    }

    async fn unhold(&self, handle: &TransportHandle) -> Result<(), TransportError> {
        let state = self.record(TransportCall::Unhold(handle.clone()));
        Self::ensure_session(&state, handle)?;
        if state.knobs.reject_hold {
            return Err(TransportError::rejected(488, "Not Acceptable Here"));
        }
        Ok(())
    }

    async fn mute(&self, handle: &TransportHandle) -> Result<(), TransportError> {
        let state = self.record(TransportCall::Mute(handle.clone()));
        Self::ensure_session(&state, handle)?;
        if state.knobs.reject_mute {
            return Err(TransportError::Other("microphone unavailable".to_string()));
        }
        Ok(())
    }

    async fn unmute(&self, handle: &TransportHandle) -> Result<(), TransportError> {
        let state = self.record(TransportCall::Unmute(handle.clone()));
        Self::ensure_session(&state, handle)
    }

    async fn send_dtmf(&self, handle: &TransportHandle, tone: DtmfTone) -> Result<(), TransportError> {
        let state = self.record(TransportCall::Dtmf(handle.clone(), tone));
        Self::ensure_session(&state, handle)
    }

    async fn blind_refer(&self, handle: &TransportHandle, target: &str) -> Result<(), TransportError> {
        let state = self.record(TransportCall::BlindRefer(handle.clone(), target.to_string()));
        Self::ensure_session(&state, handle)?;
        match state.knobs.reject_blind_refer {
            Some(code) => Err(TransportError::rejected(code, "Transfer refused")),
            None => Ok(()),
        }
    }

    async fn attended_refer(
        &self,
        handle: &TransportHandle,
        replaces: &TransportHandle,
    ) -> Result<(), TransportError> {
        let state = self.record(TransportCall::AttendedRefer(handle.clone(), replaces.clone()));
        Self::ensure_session(&state, handle)?;
        Self::ensure_session(&state, replaces)?;
        match state.knobs.reject_attended_refer {
            Some(code) => Err(TransportError::rejected(code, "Transfer refused")),
            None => Ok(()),
        }
    }

    async fn subscribe_presence(&self, extension: &str) -> Result<SubscriptionHandle, TransportError> {
        let mut state = self.record(TransportCall::Subscribe(extension.to_string()));
        Self::ensure_connected(&state)?;
        if state.knobs.rejected_extensions.contains(extension) {
            return Err(TransportError::rejected(403, "Forbidden"));
        }
        let handle = SubscriptionHandle::new(format!("sub-{}", state.next_id()));
        state.subscriptions.insert(handle.clone(), extension.to_string());
        Ok(handle)
    }

    async fn unsubscribe_presence(&self, handle: &SubscriptionHandle) -> Result<(), TransportError> {
        let mut state = self.record(TransportCall::Unsubscribe(handle.clone()));
        Self::ensure_connected(&state)?;
        state.subscriptions.remove(handle);
        Ok(())
    }

    async fn send_keep_alive(&self) -> Result<(), TransportError> {
        let mut state = self.record(TransportCall::KeepAlive);
        Self::ensure_connected(&state)?;
        if take_one(&mut state.knobs.keep_alive_timeouts) {
            return Err(TransportError::Timeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn options() -> OutboundOptions {
        OutboundOptions {
            display_name: None,
            ice_gathering_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let (transport, _rx) = LoopbackTransport::new();
        let result = transport.create_outbound_session("100", &options()).await;
        assert_eq!(result, Err(TransportError::Disconnected));
    }

    #[tokio::test]
    async fn test_auto_answer_emits_progress_then_established() {
        let (transport, mut rx) = LoopbackTransport::new();
        transport.connect().await.unwrap();
        assert_eq!(rx.recv().await, Some(TransportEvent::TransportConnected));

        transport.auto_answer(true);
        let handle = transport.create_outbound_session("100", &options()).await.unwrap();
        assert_eq!(transport.handle_for("100"), Some(handle.clone()));

        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::SessionStateChanged {
                handle: handle.clone(),
                state: TransportSessionState::Progress
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::SessionStateChanged {
                handle,
                state: TransportSessionState::Established
            })
        );
    }

    #[tokio::test]
    async fn test_knobs_apply_once() {
        let (transport, _rx) = LoopbackTransport::new();
        transport.fail_next_connects(1);
        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_ok());

        transport.time_out_keep_alives(1);
        assert_eq!(transport.send_keep_alive().await, Err(TransportError::Timeout));
        assert_eq!(transport.send_keep_alive().await, Ok(()));
    }

    #[tokio::test]
    async fn test_drop_connection_clears_dialogs() {
        let (transport, _rx) = LoopbackTransport::new();
        transport.connect().await.unwrap();
        transport.subscribe_presence("101").await.unwrap();
        assert_eq!(transport.live_subscriptions(), 1);

        transport.drop_connection("network unreachable");
        assert!(!transport.is_connected());
        assert_eq!(transport.live_subscriptions(), 0);
    }
}
