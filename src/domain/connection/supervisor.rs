//! Resilience supervisor
//!
//! Pure state machine over the connection state. It never touches the
//! transport itself: every input returns a [`Directive`] that the softphone
//! and the runtime carry out (register, schedule a retry, tear down calls).

use crate::config::TimerConfig;
use crate::domain::connection::state::{
    ConnectionState, HealthSignal, RegistrationState, TransportState,
};
use crate::domain::events::{CoreEvent, Outbox};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tunables for keep-alive and reconnection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorPolicy {
    /// Consecutive keep-alive misses before the transport is declared failed
    pub keepalive_failure_threshold: u32,
    /// Extra misses allowed on top of the threshold while the internet is down
    pub keepalive_degraded_grace: u32,
    pub reconnect_max_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            keepalive_failure_threshold: 1,
            keepalive_degraded_grace: 3,
            reconnect_max_attempts: 5,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl From<&TimerConfig> for SupervisorPolicy {
    fn from(timers: &TimerConfig) -> Self {
        Self {
            keepalive_failure_threshold: timers.keepalive_failure_threshold,
            keepalive_degraded_grace: timers.keepalive_degraded_grace,
            reconnect_max_attempts: timers.reconnect_max_attempts,
            reconnect_delay: timers.reconnect_delay(),
        }
    }
}

/// Work the supervisor asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    None,
    /// Open the transport now
    Connect,
    /// Send a registration now
    Register,
    /// Transport is gone: fail live calls, drop subscriptions, and try to
    /// reconnect after the delay
    TransportLost { retry_in: Duration },
    /// Try again after the delay
    RetryIn(Duration),
    /// Registration established; recreate subscriptions
    Registered,
    /// Out of attempts, registration failed
    GiveUp,
}

pub struct ResilienceSupervisor {
    policy: SupervisorPolicy,
    state: ConnectionState,
    register_in_flight: bool,
    outbox: Outbox,
}

impl ResilienceSupervisor {
    pub fn new(policy: SupervisorPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::default(),
            register_in_flight: false,
            outbox: Outbox::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    /// First connection at startup
    pub fn start(&mut self) -> Directive {
        self.set_transport(TransportState::Connecting);
        Directive::Connect
    }

    /// Only a connect this supervisor asked for counts; repeats and late
    /// reports after a failed registration are dropped.
    pub fn on_transport_connected(&mut self) -> Directive {
        if self.state.transport != TransportState::Connecting {
            debug!("Ignoring connect report while {:?}", self.state.transport);
            return Directive::None;
        }
        self.set_transport(TransportState::Connected);
        self.state.consecutive_keepalive_failures = 0;

        if self.state.registration == RegistrationState::Registered || self.register_in_flight {
            return Directive::None;
        }

        self.register_in_flight = true;
        self.set_registration(RegistrationState::Registering);
        Directive::Register
    }

    pub fn on_transport_disconnected(&mut self, error: &str) -> Directive {
        if self.state.transport != TransportState::Connected {
            // Already handling a loss, or a connect attempt that will report itself
            debug!("Ignoring disconnect while not connected: {}", error);
            return Directive::None;
        }
        warn!("Transport disconnected: {}", error);
        self.declare_lost()
    }

    pub fn on_keep_alive_timeout(&mut self) -> Directive {
        if self.state.transport != TransportState::Connected {
            return Directive::None;
        }

        self.state.consecutive_keepalive_failures += 1;
        let failures = self.state.consecutive_keepalive_failures;

        // Only a dead internet excuses the signaling socket, and only for a while
        if !self.state.internet_reachable {
            let limit = self
                .policy
                .keepalive_failure_threshold
                .saturating_add(self.policy.keepalive_degraded_grace);
            if failures < limit {
                info!(
                    "Keep-alive miss {}/{} with the internet unreachable, holding off",
                    failures, limit
                );
                return Directive::None;
            }
            warn!("Keep-alive failed {} time(s) with the internet unreachable", failures);
            return self.declare_lost();
        }

        if failures >= self.policy.keepalive_failure_threshold {
            warn!(
                "Keep-alive failed {} time(s), threshold {}",
                failures, self.policy.keepalive_failure_threshold
            );
            return self.declare_lost();
        }

        debug!(
            "Keep-alive miss {}/{}",
            failures, self.policy.keepalive_failure_threshold
        );
        Directive::None
    }

    /// Also used for any out-of-band successful exchange
    pub fn on_keep_alive_success(&mut self) {
        if self.state.consecutive_keepalive_failures > 0 {
            debug!("Keep-alive recovered, resetting failure count");
        }
        self.state.consecutive_keepalive_failures = 0;
    }

    pub fn on_health_changed(&mut self, signal: HealthSignal) -> Directive {
        if self.state.health == signal.tier
            && self.state.internet_reachable == signal.internet_reachable
        {
            return Directive::None;
        }
        if self.state.health != signal.tier {
            self.outbox
                .record(CoreEvent::ConnectivityHealthChanged { tier: signal.tier });
        }
        self.state.health = signal.tier;
        self.state.internet_reachable = signal.internet_reachable;

        // Misses counted while offline count once the internet is back
        if signal.internet_reachable
            && self.state.transport == TransportState::Connected
            && self.state.consecutive_keepalive_failures >= self.policy.keepalive_failure_threshold
        {
            return self.declare_lost();
        }
        Directive::None
    }

    /// Reconnection delay elapsed
    pub fn on_reconnect_due(&mut self) -> Directive {
        if self.state.transport != TransportState::Disconnected {
            return Directive::None;
        }
        self.state.reconnect_attempts += 1;
        info!(
            "Reconnection attempt {}/{}",
            self.state.reconnect_attempts, self.policy.reconnect_max_attempts
        );
        self.set_transport(TransportState::Connecting);
        self.set_registration(RegistrationState::Registering);
        Directive::Connect
    }

    pub fn on_connect_failed(&mut self, error: &str) -> Directive {
        warn!("Transport connect failed: {}", error);
        self.set_transport(TransportState::Disconnected);
        self.retry_or_give_up()
    }

    pub fn on_registration_result(&mut self, result: Result<(), String>) -> Directive {
        self.register_in_flight = false;
        match result {
            Ok(()) => {
                info!("Registered");
                self.state.reconnect_attempts = 0;
                self.set_registration(RegistrationState::Registered);
                Directive::Registered
            }
            Err(error) => {
                warn!("Registration failed: {}", error);
                self.retry_or_give_up()
            }
        }
    }

    /// Registration change reported by the transport itself
    pub fn on_registration_state_changed(&mut self, state: RegistrationState) -> Directive {
        match state {
            RegistrationState::Registered => {
                if self.state.registration == RegistrationState::Registered {
                    return Directive::None;
                }
                self.on_registration_result(Ok(()))
            }
            RegistrationState::Registering => {
                self.set_registration(RegistrationState::Registering);
                Directive::None
            }
            RegistrationState::Unregistered | RegistrationState::Failed => {
                if self.state.registration != RegistrationState::Registered {
                    return Directive::None;
                }
                if self.state.transport == TransportState::Connected {
                    // Expired or dropped by the server, the socket is fine
                    self.register_in_flight = true;
                    self.set_registration(RegistrationState::Registering);
                    Directive::Register
                } else {
                    self.declare_lost()
                }
            }
        }
    }

    pub fn take_events(&mut self) -> Vec<CoreEvent> {
        self.outbox.take_events()
    }

    fn declare_lost(&mut self) -> Directive {
        self.register_in_flight = false;
        self.state.consecutive_keepalive_failures = 0;
        self.state.reconnect_attempts = 0;
        self.set_transport(TransportState::Disconnected);
        self.set_registration(RegistrationState::Unregistered);
        Directive::TransportLost {
            retry_in: self.policy.reconnect_delay,
        }
    }

    fn retry_or_give_up(&mut self) -> Directive {
        if self.state.reconnect_attempts >= self.policy.reconnect_max_attempts {
            error!(
                "Giving up after {} reconnection attempts",
                self.state.reconnect_attempts
            );
            self.set_transport(TransportState::Disconnected);
            self.set_registration(RegistrationState::Failed);
            return Directive::GiveUp;
        }
        self.set_transport(TransportState::Disconnected);
        self.set_registration(RegistrationState::Unregistered);
        Directive::RetryIn(self.policy.reconnect_delay)
    }

    fn set_transport(&mut self, transport: TransportState) {
        if self.state.transport != transport {
            self.state.transport = transport;
            self.outbox
                .record(CoreEvent::TransportStateChanged { state: transport });
        }
    }

    fn set_registration(&mut self, registration: RegistrationState) {
        if self.state.registration != registration {
            self.state.registration = registration;
            self.outbox.record(CoreEvent::RegistrationStateChanged {
                state: registration,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::state::HealthTier;

    fn supervisor(threshold: u32) -> ResilienceSupervisor {
        ResilienceSupervisor::new(SupervisorPolicy {
            keepalive_failure_threshold: threshold,
            keepalive_degraded_grace: 2,
            reconnect_max_attempts: 2,
            reconnect_delay: Duration::from_millis(10),
        })
    }

    fn registered(threshold: u32) -> ResilienceSupervisor {
        let mut sup = supervisor(threshold);
        assert_eq!(sup.start(), Directive::Connect);
        assert_eq!(sup.on_transport_connected(), Directive::Register);
        assert_eq!(sup.on_registration_result(Ok(())), Directive::Registered);
        sup
    }

    #[test]
    fn test_startup_sequence() {
        let sup = registered(1);
        let state = sup.state();
        assert_eq!(state.transport, TransportState::Connected);
        assert_eq!(state.registration, RegistrationState::Registered);
    }

    #[test]
    fn test_single_miss_with_threshold_one() {
        let mut sup = registered(1);
        let directive = sup.on_keep_alive_timeout();
        assert_eq!(
            directive,
            Directive::TransportLost {
                retry_in: Duration::from_millis(10)
            }
        );
        assert_eq!(sup.state().transport, TransportState::Disconnected);
        assert_eq!(sup.state().registration, RegistrationState::Unregistered);
    }

    #[test]
    fn test_threshold_three_and_reset() {
        let mut sup = registered(3);
        assert_eq!(sup.on_keep_alive_timeout(), Directive::None);
        assert_eq!(sup.on_keep_alive_timeout(), Directive::None);
        assert_eq!(sup.state().consecutive_keepalive_failures, 2);

        sup.on_keep_alive_success();
        assert_eq!(sup.state().consecutive_keepalive_failures, 0);

        assert_eq!(sup.on_keep_alive_timeout(), Directive::None);
        assert_eq!(sup.on_keep_alive_timeout(), Directive::None);
        assert!(matches!(
            sup.on_keep_alive_timeout(),
            Directive::TransportLost { .. }
        ));
        assert_eq!(sup.state().transport, TransportState::Disconnected);
    }

    const OFFLINE: HealthSignal = HealthSignal {
        tier: HealthTier::Degraded,
        internet_reachable: false,
    };

    #[test]
    fn test_offline_internet_defers_failure() {
        let mut sup = registered(1);
        sup.on_health_changed(OFFLINE);

        assert_eq!(sup.on_keep_alive_timeout(), Directive::None);
        assert_eq!(sup.state().transport, TransportState::Connected);

        assert!(matches!(
            sup.on_health_changed(HealthSignal::HEALTHY),
            Directive::TransportLost { .. }
        ));
    }

    #[test]
    fn test_signaling_outage_with_internet_up_fails_at_threshold() {
        let mut sup = registered(1);
        let pbx_down = HealthSignal {
            tier: HealthTier::Degraded,
            internet_reachable: true,
        };
        assert_eq!(sup.on_health_changed(pbx_down), Directive::None);
        assert_eq!(sup.state().health, HealthTier::Degraded);

        assert!(matches!(
            sup.on_keep_alive_timeout(),
            Directive::TransportLost { .. }
        ));
        assert_eq!(sup.state().transport, TransportState::Disconnected);
    }

    #[test]
    fn test_offline_deferral_is_bounded() {
        // threshold 1 plus grace 2
        let mut sup = registered(1);
        sup.on_health_changed(OFFLINE);

        assert_eq!(sup.on_keep_alive_timeout(), Directive::None);
        assert_eq!(sup.on_keep_alive_timeout(), Directive::None);
        assert!(matches!(
            sup.on_keep_alive_timeout(),
            Directive::TransportLost { .. }
        ));
        assert_eq!(sup.state().transport, TransportState::Disconnected);
    }

    #[test]
    fn test_internet_loss_within_degraded_tier() {
        let mut sup = registered(1);
        sup.on_health_changed(HealthSignal {
            tier: HealthTier::Degraded,
            internet_reachable: true,
        });
        sup.take_events();

        // Same tier, so no new health event, but the deferral now applies
        assert_eq!(sup.on_health_changed(OFFLINE), Directive::None);
        assert!(sup.take_events().is_empty());
        assert_eq!(sup.on_keep_alive_timeout(), Directive::None);
        assert_eq!(sup.state().transport, TransportState::Connected);
    }

    #[test]
    fn test_reconnect_attempts_are_bounded() {
        let mut sup = registered(1);
        sup.on_transport_disconnected("socket closed");

        assert_eq!(sup.on_reconnect_due(), Directive::Connect);
        assert_eq!(
            sup.on_connect_failed("refused"),
            Directive::RetryIn(Duration::from_millis(10))
        );

        assert_eq!(sup.on_reconnect_due(), Directive::Connect);
        assert_eq!(sup.on_connect_failed("refused"), Directive::GiveUp);
        assert_eq!(sup.state().registration, RegistrationState::Failed);
    }

    #[test]
    fn test_reconnect_success_resets_attempts() {
        let mut sup = registered(1);
        sup.on_transport_disconnected("socket closed");
        assert_eq!(sup.on_reconnect_due(), Directive::Connect);
        assert_eq!(sup.on_transport_connected(), Directive::Register);
        assert_eq!(sup.on_registration_result(Ok(())), Directive::Registered);
        assert_eq!(sup.state().reconnect_attempts, 0);
    }

    #[test]
    fn test_duplicate_disconnect_is_ignored() {
        let mut sup = registered(1);
        assert!(matches!(
            sup.on_transport_disconnected("closed"),
            Directive::TransportLost { .. }
        ));
        assert_eq!(sup.on_transport_disconnected("closed again"), Directive::None);
    }

    #[test]
    fn test_late_connect_report_is_ignored() {
        let mut sup = supervisor(1);
        sup.start();
        assert_eq!(sup.on_transport_connected(), Directive::Register);
        assert!(matches!(
            sup.on_registration_result(Err("403 Forbidden".to_string())),
            Directive::RetryIn(_)
        ));
        assert_eq!(sup.on_transport_connected(), Directive::None);
        assert_eq!(sup.state().transport, TransportState::Disconnected);
    }

    #[test]
    fn test_state_changes_are_recorded() {
        let mut sup = registered(1);
        let events = sup.take_events();
        assert!(events.contains(&CoreEvent::RegistrationStateChanged {
            state: RegistrationState::Registered
        }));
        assert!(events.contains(&CoreEvent::TransportStateChanged {
            state: TransportState::Connected
        }));
    }
}
