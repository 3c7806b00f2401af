//! Connection supervision: registration, keep-alive and reconnection

use super::Softphone;
use crate::domain::connection::{Directive, HealthSignal, RegistrationState, TransportState};
use crate::domain::transport::{CallFailure, TransportError};
use crate::interface::metrics;
use tracing::{debug, error, info, warn};

impl Softphone {
    /// Connect, register and queue the configured BLF extensions
    pub async fn start(&mut self) {
        info!(
            "Starting softphone for {} at {}",
            self.config.account.username, self.config.account.server_uri
        );
        self.monitor_configured_extensions();
        let directive = self.supervisor.start();
        self.drive(directive).await;
        self.flush();
    }

    /// Keep-alive timer fired
    pub async fn keep_alive(&mut self) {
        if self.supervisor.state().transport != TransportState::Connected {
            return;
        }
        match self.transport.send_keep_alive().await {
            Ok(()) => {
                debug!("Keep-alive answered");
                self.supervisor.on_keep_alive_success();
            }
            Err(TransportError::Disconnected) => {
                let directive = self
                    .supervisor
                    .on_transport_disconnected("keep-alive found the socket closed");
                self.drive(directive).await;
            }
            Err(e) => {
                debug!("Keep-alive failed: {}", e);
                self.on_keep_alive_miss().await;
            }
        }
        self.flush();
    }

    pub(super) async fn on_keep_alive_miss(&mut self) {
        metrics::record_keepalive_miss();
        let directive = self.supervisor.on_keep_alive_timeout();
        self.drive(directive).await;
    }

    /// Reconnection delay elapsed
    pub async fn reconnect_due(&mut self) {
        let directive = self.supervisor.on_reconnect_due();
        self.drive(directive).await;
        self.flush();
    }

    pub async fn on_health_changed(&mut self, signal: HealthSignal) {
        let directive = self.supervisor.on_health_changed(signal);
        self.drive(directive).await;
        self.flush();
    }

    /// Hang up, drop subscriptions and deregister
    pub async fn shutdown(&mut self) {
        info!("Shutting down softphone");
        for id in self.switchboard.session_ids() {
            if let Err(e) = self.hang_up(Some(id)).await {
                debug!("Session {} not hung up on shutdown: {}", id, e);
            }
        }

        let handles: Vec<_> = self
            .presence
            .iter()
            .filter_map(|s| s.handle().cloned())
            .collect();
        for handle in &handles {
            if let Err(e) = self.transport.unsubscribe_presence(handle).await {
                debug!("Subscription {} not closed: {}", handle, e);
            }
        }

        if self.supervisor.state().registration == RegistrationState::Registered {
            if let Err(e) = self.transport.deregister().await {
                warn!("Deregistration failed: {}", e);
            }
        }
        self.flush();
    }

    /// Carry out supervisor directives until none is left
    pub(super) async fn drive(&mut self, mut directive: Directive) {
        loop {
            directive = match directive {
                Directive::None => break,
                Directive::Connect => {
                    let reconnecting = self.supervisor.state().reconnect_attempts > 0;
                    match self.transport.connect().await {
                        Ok(()) => {
                            if reconnecting {
                                metrics::record_reconnect_attempt(true);
                            }
                            self.supervisor.on_transport_connected()
                        }
                        Err(e) => {
                            if reconnecting {
                                metrics::record_reconnect_attempt(false);
                            }
                            self.supervisor.on_connect_failed(&e.to_string())
                        }
                    }
                }
                Directive::Register => {
                    let result = self
                        .transport
                        .register(&self.config.account)
                        .await
                        .map_err(|e| e.to_string());
                    self.supervisor.on_registration_result(result)
                }
                Directive::Registered => {
                    self.flush();
                    self.resubscribe_all().await;
                    Directive::None
                }
                Directive::TransportLost { retry_in } => {
                    metrics::record_transport_lost();
                    self.on_transport_lost().await;
                    self.request_reconnect(retry_in);
                    Directive::None
                }
                Directive::RetryIn(delay) => {
                    self.request_reconnect(delay);
                    Directive::None
                }
                Directive::GiveUp => {
                    error!(
                        "Registration failed after {} attempts, giving up",
                        self.supervisor.policy().reconnect_max_attempts
                    );
                    Directive::None
                }
            };
        }
    }

    /// Every live call and subscription died with the transport
    async fn on_transport_lost(&mut self) {
        let live = self.switchboard.session_ids();
        if !live.is_empty() {
            warn!("Transport lost, failing {} live sessions", live.len());
        }
        for id in live {
            self.fail_session(id, CallFailure::TransportLost).await;
        }
        self.presence.invalidate_all();
        self.flush();
    }

    fn request_reconnect(&mut self, delay: std::time::Duration) {
        info!("Reconnecting in {:?}", delay);
        self.reconnect_after = Some(delay);
    }
}
