//! Connection state value objects

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
}

/// General network health as seen by the connectivity probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTier {
    Healthy,
    Degraded,
}

/// Health report handed to the supervisor after a probe cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSignal {
    pub tier: HealthTier,
    /// A degraded tier with the internet up means only the signaling server is gone
    pub internet_reachable: bool,
}

impl HealthSignal {
    pub const HEALTHY: HealthSignal = HealthSignal {
        tier: HealthTier::Healthy,
        internet_reachable: true,
    };
}

/// Snapshot of the connection for observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub registration: RegistrationState,
    pub transport: TransportState,
    pub consecutive_keepalive_failures: u32,
    pub health: HealthTier,
    pub internet_reachable: bool,
    pub reconnect_attempts: u32,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            registration: RegistrationState::Unregistered,
            transport: TransportState::Disconnected,
            consecutive_keepalive_failures: 0,
            health: HealthTier::Healthy,
            internet_reachable: true,
            reconnect_attempts: 0,
        }
    }
}
