//! BLF subscription entity

use crate::domain::presence::value_object::Presence;
use crate::domain::shared::value_objects::{SubscriptionHandle, SubscriptionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a BLF subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// SUBSCRIBE sent, no answer yet
    Pending,
    Accepted,
    /// Declined by the server; needs an explicit fresh subscribe
    Rejected(String),
    /// Lost with the transport; recreated after re-registration
    Inactive,
}

/// A monitored extension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlfSubscription {
    id: SubscriptionId,
    extension: String,
    display_name: Option<String>,
    presence: Presence,
    status: SubscriptionStatus,
    handle: Option<SubscriptionHandle>,
    remote_target: Option<String>,
    created_at: DateTime<Utc>,
    last_notified_at: Option<DateTime<Utc>>,
}

impl BlfSubscription {
    pub fn new(extension: String, display_name: Option<String>) -> Self {
        Self {
            id: SubscriptionId::new(),
            extension,
            display_name,
            presence: Presence::Unknown,
            status: SubscriptionStatus::Pending,
            handle: None,
            remote_target: None,
            created_at: Utc::now(),
            last_notified_at: None,
        }
    }

    /// Returns true when the presence value changed
    pub(crate) fn set_presence(&mut self, presence: Presence) -> bool {
        let changed = self.presence != presence;
        self.presence = presence;
        changed
    }

    pub(crate) fn notified(&mut self, presence: Presence, remote_target: Option<String>) -> bool {
        self.last_notified_at = Some(Utc::now());
        if remote_target.is_some() {
            self.remote_target = remote_target;
        }
        self.set_presence(presence)
    }

    pub(crate) fn set_status(&mut self, status: SubscriptionStatus) {
        self.status = status;
    }

    pub(crate) fn set_handle(&mut self, handle: Option<SubscriptionHandle>) {
        self.handle = handle;
    }

    pub(crate) fn set_display_name(&mut self, display_name: Option<String>) {
        if display_name.is_some() {
            self.display_name = display_name;
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn status(&self) -> &SubscriptionStatus {
        &self.status
    }

    pub fn handle(&self) -> Option<&SubscriptionHandle> {
        self.handle.as_ref()
    }

    pub fn remote_target(&self) -> Option<&str> {
        self.remote_target.as_deref()
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    pub fn last_notified_at(&self) -> Option<&DateTime<Utc>> {
        self.last_notified_at.as_ref()
    }

    pub fn is_accepted(&self) -> bool {
        self.status == SubscriptionStatus::Accepted
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.status, SubscriptionStatus::Rejected(_))
    }
}
