//! BLF subscription bookkeeping
//!
//! Tracks monitored extensions and their presence. Talking to the transport
//! is left to the softphone; this type only records what was requested and
//! what came back.

use crate::domain::events::{CoreEvent, Outbox};
use crate::domain::presence::subscription::{BlfSubscription, SubscriptionStatus};
use crate::domain::presence::value_object::{presence_for, Presence};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{SubscriptionHandle, SubscriptionId};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// What the caller has to do after `begin_subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Send a SUBSCRIBE for this subscription
    Send(SubscriptionId),
    /// Already monitored; nothing to send
    Existing(SubscriptionId),
}

impl SubscribeOutcome {
    pub fn id(&self) -> SubscriptionId {
        match self {
            SubscribeOutcome::Send(id) | SubscribeOutcome::Existing(id) => *id,
        }
    }
}

#[derive(Default)]
pub struct PresenceManager {
    // Keyed by extension; ordered so resubscription is deterministic
    subscriptions: BTreeMap<String, BlfSubscription>,
    by_id: HashMap<SubscriptionId, String>,
    by_handle: HashMap<SubscriptionHandle, String>,
    outbox: Outbox,
}

impl PresenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start monitoring an extension.
    ///
    /// Monitoring an extension twice returns the existing subscription. A
    /// rejected or inactive entry is reset to pending and has to be sent again.
    pub fn begin_subscribe(
        &mut self,
        extension: &str,
        display_name: Option<String>,
    ) -> Result<SubscribeOutcome> {
        let extension = extension.trim();
        if extension.is_empty() {
            return Err(DomainError::ValidationError(
                "Extension must not be empty".to_string(),
            ));
        }

        if let Some(existing) = self.subscriptions.get_mut(extension) {
            existing.set_display_name(display_name);
            let id = existing.id();
            let status = existing.status().clone();
            return match status {
                SubscriptionStatus::Pending | SubscriptionStatus::Accepted => {
                    Ok(SubscribeOutcome::Existing(id))
                }
                SubscriptionStatus::Rejected(_) | SubscriptionStatus::Inactive => {
                    existing.set_status(SubscriptionStatus::Pending);
                    self.update_presence(extension, Presence::Unknown);
                    Ok(SubscribeOutcome::Send(id))
                }
            };
        }

        let subscription = BlfSubscription::new(extension.to_string(), display_name);
        let id = subscription.id();
        self.by_id.insert(id, extension.to_string());
        self.subscriptions.insert(extension.to_string(), subscription);
        info!("Monitoring extension {}", extension);
        Ok(SubscribeOutcome::Send(id))
    }

    /// The transport accepted the SUBSCRIBE
    pub fn confirm(&mut self, id: SubscriptionId, handle: SubscriptionHandle) -> Result<()> {
        let extension = self.extension_of(&id)?;
        if let Some(subscription) = self.subscriptions.get_mut(&extension) {
            if let Some(previous) = subscription.handle() {
                self.by_handle.remove(previous);
            }
            subscription.set_handle(Some(handle.clone()));
            subscription.set_status(SubscriptionStatus::Accepted);
        }
        self.by_handle.insert(handle, extension.clone());
        debug!("Subscription for {} accepted", extension);
        Ok(())
    }

    /// The transport or server rejected the subscription. No retry is scheduled.
    pub fn reject(&mut self, id: SubscriptionId, reason: impl Into<String>) -> Result<()> {
        let extension = self.extension_of(&id)?;
        let reason = reason.into();
        if let Some(subscription) = self.subscriptions.get_mut(&extension) {
            if let Some(handle) = subscription.handle() {
                self.by_handle.remove(handle);
            }
            subscription.set_handle(None);
            subscription.set_status(SubscriptionStatus::Rejected(reason.clone()));
        }
        warn!("Subscription for {} rejected: {}", extension, reason);
        self.update_presence(&extension, Presence::Offline);
        Ok(())
    }

    /// Stop monitoring. Returns the removed entry so its dialog can be closed.
    pub fn remove(&mut self, id: SubscriptionId) -> Result<BlfSubscription> {
        let extension = self.extension_of(&id)?;
        self.by_id.remove(&id);
        let subscription = self
            .subscriptions
            .remove(&extension)
            .ok_or_else(|| DomainError::NotFound(format!("subscription {}", id)))?;
        if let Some(handle) = subscription.handle() {
            self.by_handle.remove(handle);
        }
        info!("Stopped monitoring extension {}", extension);
        Ok(subscription)
    }

    /// Apply a notification and return the resulting presence
    pub fn on_notify(
        &mut self,
        id: SubscriptionId,
        dialog_state: &str,
        remote_target: Option<String>,
    ) -> Result<Presence> {
        let extension = self.extension_of(&id)?;
        let presence = presence_for(dialog_state);

        let changed = match self.subscriptions.get_mut(&extension) {
            Some(subscription) => {
                if subscription.is_rejected() {
                    debug!("Ignoring notification for rejected extension {}", extension);
                    return Ok(subscription.presence());
                }
                subscription.notified(presence, remote_target)
            }
            None => return Err(DomainError::NotFound(format!("subscription {}", id))),
        };

        if changed {
            debug!("Extension {} is now {}", extension, presence.as_str());
            self.outbox.record(CoreEvent::BlfStateChanged {
                extension,
                presence,
            });
        }
        Ok(presence)
    }

    /// Drop every dialog after a transport loss, keeping the monitored set
    pub fn invalidate_all(&mut self) {
        self.by_handle.clear();
        let extensions: Vec<String> = self
            .subscriptions
            .values()
            .filter(|s| !s.is_rejected())
            .map(|s| s.extension().to_string())
            .collect();

        for extension in &extensions {
            if let Some(subscription) = self.subscriptions.get_mut(extension) {
                subscription.set_handle(None);
                subscription.set_status(SubscriptionStatus::Inactive);
            }
            self.update_presence(extension, Presence::Inactive);
        }

        if !extensions.is_empty() {
            info!("Invalidated {} BLF subscriptions", extensions.len());
        }
    }

    /// Park a pending subscription until the next registration
    pub fn defer(&mut self, id: SubscriptionId) -> Result<()> {
        let extension = self.extension_of(&id)?;
        if let Some(subscription) = self.subscriptions.get_mut(&extension) {
            if *subscription.status() == SubscriptionStatus::Pending {
                subscription.set_status(SubscriptionStatus::Inactive);
                debug!("Subscription for {} deferred until registered", extension);
            }
        }
        Ok(())
    }

    /// Extensions waiting to be recreated after re-registration
    pub fn resubscribe_targets(&self) -> Vec<String> {
        self.subscriptions
            .values()
            .filter(|s| *s.status() == SubscriptionStatus::Inactive)
            .map(|s| s.extension().to_string())
            .collect()
    }

    pub fn resolve(&self, handle: &SubscriptionHandle) -> Option<SubscriptionId> {
        self.by_handle
            .get(handle)
            .and_then(|extension| self.subscriptions.get(extension))
            .map(BlfSubscription::id)
    }

    pub fn id_for(&self, extension: &str) -> Option<SubscriptionId> {
        self.subscriptions.get(extension).map(BlfSubscription::id)
    }

    pub fn current_state(&self, extension: &str) -> Option<Presence> {
        self.subscriptions.get(extension).map(BlfSubscription::presence)
    }

    pub fn get(&self, extension: &str) -> Option<&BlfSubscription> {
        self.subscriptions.get(extension)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlfSubscription> {
        self.subscriptions.values()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn take_events(&mut self) -> Vec<CoreEvent> {
        self.outbox.take_events()
    }

    fn extension_of(&self, id: &SubscriptionId) -> Result<String> {
        self.by_id
            .get(id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("subscription {}", id)))
    }

    fn update_presence(&mut self, extension: &str, presence: Presence) {
        let changed = self
            .subscriptions
            .get_mut(extension)
            .map(|s| s.set_presence(presence))
            .unwrap_or(false);
        if changed {
            self.outbox.record(CoreEvent::BlfStateChanged {
                extension: extension.to_string(),
                presence,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscribed(manager: &mut PresenceManager, extension: &str) -> SubscriptionId {
        let id = manager.begin_subscribe(extension, None).unwrap().id();
        manager
            .confirm(id, SubscriptionHandle::new(format!("dlg-{}", extension)))
            .unwrap();
        id
    }

    #[test]
    fn test_presence_unknown_until_notified() {
        let mut manager = PresenceManager::new();
        let id = subscribed(&mut manager, "101");
        assert_eq!(manager.current_state("101"), Some(Presence::Unknown));

        let presence = manager
            .on_notify(id, "confirmed", Some("sip:101@pbx".to_string()))
            .unwrap();
        assert_eq!(presence, Presence::Busy);
        assert_eq!(manager.current_state("101"), Some(Presence::Busy));
        assert_eq!(manager.get("101").unwrap().remote_target(), Some("sip:101@pbx"));
    }

    #[test]
    fn test_repeated_notify_emits_once() {
        let mut manager = PresenceManager::new();
        let id = subscribed(&mut manager, "101");
        manager.take_events();

        manager.on_notify(id, "early", None).unwrap();
        manager.on_notify(id, "early", None).unwrap();
        assert_eq!(manager.take_events().len(), 1);
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut manager = PresenceManager::new();
        let first = manager.begin_subscribe("101", None).unwrap();
        let second = manager.begin_subscribe("101", None).unwrap();
        assert!(matches!(first, SubscribeOutcome::Send(_)));
        assert_eq!(second, SubscribeOutcome::Existing(first.id()));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_rejection_goes_offline_without_retry() {
        let mut manager = PresenceManager::new();
        let id = manager.begin_subscribe("999", None).unwrap().id();
        manager.reject(id, "404 Not Found").unwrap();

        assert_eq!(manager.current_state("999"), Some(Presence::Offline));
        assert!(manager.get("999").unwrap().is_rejected());

        manager.invalidate_all();
        assert!(manager.resubscribe_targets().is_empty());
        assert_eq!(manager.current_state("999"), Some(Presence::Offline));

        // Only an explicit subscribe brings it back
        let again = manager.begin_subscribe("999", None).unwrap();
        assert_eq!(again, SubscribeOutcome::Send(id));
        assert_eq!(manager.current_state("999"), Some(Presence::Unknown));
    }

    #[test]
    fn test_invalidate_keeps_monitored_set() {
        let mut manager = PresenceManager::new();
        let a = subscribed(&mut manager, "101");
        subscribed(&mut manager, "102");
        manager.on_notify(a, "confirmed", None).unwrap();

        manager.invalidate_all();
        assert_eq!(manager.resubscribe_targets(), vec!["101", "102"]);
        assert_eq!(manager.current_state("101"), Some(Presence::Inactive));
        assert_eq!(manager.resolve(&SubscriptionHandle::new("dlg-101")), None);
    }

    #[test]
    fn test_remove_forgets_handle() {
        let mut manager = PresenceManager::new();
        let id = subscribed(&mut manager, "101");
        let removed = manager.remove(id).unwrap();
        assert_eq!(removed.handle(), Some(&SubscriptionHandle::new("dlg-101")));
        assert!(manager.is_empty());
        assert!(manager.on_notify(id, "early", None).is_err());
    }
}
