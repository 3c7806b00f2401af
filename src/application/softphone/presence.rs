//! BLF monitoring

use super::Softphone;
use crate::domain::connection::RegistrationState;
use crate::domain::presence::{Presence, SubscribeOutcome};
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{SubscriptionHandle, SubscriptionId};
use tracing::{debug, info, warn};

impl Softphone {
    /// Monitor an extension. Monitoring it again returns the same id.
    ///
    /// While unregistered the request is parked and sent on the next
    /// successful registration.
    pub async fn subscribe(
        &mut self,
        extension: &str,
        display_name: Option<String>,
    ) -> Result<SubscriptionId> {
        let outcome = self.presence.begin_subscribe(extension, display_name)?;
        let result = match outcome {
            SubscribeOutcome::Existing(id) => Ok(id),
            SubscribeOutcome::Send(id) => {
                if self.supervisor.state().registration == RegistrationState::Registered {
                    self.send_subscribe(id, extension.trim()).await.map(|_| id)
                } else {
                    self.presence.defer(id)?;
                    Ok(id)
                }
            }
        };
        self.flush();
        result
    }

    pub async fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()> {
        let subscription = self.presence.remove(id)?;
        if let Some(handle) = subscription.handle() {
            if let Err(e) = self.transport.unsubscribe_presence(handle).await {
                warn!(
                    "Failed to close subscription for {}: {}",
                    subscription.extension(),
                    e
                );
            }
        }
        self.flush();
        Ok(())
    }

    pub fn presence_state(&self, extension: &str) -> Option<Presence> {
        self.presence.current_state(extension)
    }

    async fn send_subscribe(&mut self, id: SubscriptionId, extension: &str) -> Result<()> {
        match self.transport.subscribe_presence(extension).await {
            Ok(handle) => {
                self.presence.confirm(id, handle)?;
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                self.presence.reject(id, e.to_string())?;
                Err(e.into())
            }
            Err(e) => {
                warn!("Subscription for {} not sent: {}", extension, e);
                self.presence.defer(id)?;
                Err(e.into())
            }
        }
    }

    /// Recreate every inactive subscription once
    pub(super) async fn resubscribe_all(&mut self) {
        let targets = self.presence.resubscribe_targets();
        if targets.is_empty() {
            return;
        }
        info!("Re-subscribing {} monitored extensions", targets.len());

        for extension in targets {
            let display_name = self
                .presence
                .get(&extension)
                .and_then(|s| s.display_name().map(str::to_string));
            match self.presence.begin_subscribe(&extension, display_name) {
                Ok(SubscribeOutcome::Send(id)) => {
                    if let Err(e) = self.send_subscribe(id, &extension).await {
                        debug!("Re-subscribe for {} failed: {}", extension, e);
                    }
                }
                Ok(SubscribeOutcome::Existing(_)) => {}
                Err(e) => warn!("Re-subscribe for {} skipped: {}", extension, e),
            }
        }
    }

    /// Park the configured extensions so the first registration sends them
    pub(super) fn monitor_configured_extensions(&mut self) {
        let extensions = self.config.presence.extensions.clone();
        for monitored in extensions {
            match self
                .presence
                .begin_subscribe(&monitored.extension, monitored.display_name)
            {
                Ok(outcome) => {
                    if let Err(e) = self.presence.defer(outcome.id()) {
                        warn!("Failed to park {}: {}", monitored.extension, e);
                    }
                }
                Err(e) => warn!("Skipping monitored extension: {}", e),
            }
        }
    }

    pub(super) fn on_presence_notify(
        &mut self,
        subscription: &SubscriptionHandle,
        dialog_state: &str,
        remote_target: Option<String>,
    ) {
        let Some(id) = self.presence.resolve(subscription) else {
            debug!("Notification for unknown subscription {}", subscription);
            return;
        };
        if let Err(e) = self.presence.on_notify(id, dialog_state, remote_target) {
            warn!("Failed to apply notification: {}", e);
        }
    }

    pub(super) fn on_presence_rejected(&mut self, subscription: &SubscriptionHandle, reason: &str) {
        let Some(id) = self.presence.resolve(subscription) else {
            debug!("Rejection for unknown subscription {}", subscription);
            return;
        };
        if let Err(e) = self.presence.reject(id, reason) {
            warn!("Failed to record rejection: {}", e);
        }
    }
}
