//! Connectivity health tiering
//!
//! Tracks the outcome of probe cycles and decides when the next cycle runs.

use crate::domain::connection::state::{HealthSignal, HealthTier};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Which reachability question a probe target answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeClass {
    /// General internet access
    Internet,
    /// The signaling server socket
    Signaling,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Invalid probe target: {0}")]
    InvalidTarget(String),

    #[error("Unreachable: {0}")]
    Unreachable(String),
}

/// Port for a single reachability check. Timeouts are applied by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn check(&self, class: ProbeClass, target: &str) -> Result<(), ProbeError>;
}

/// Outcome of one probe cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeCycle {
    pub internet_reachable: bool,
    pub signaling_reachable: bool,
}

impl ProbeCycle {
    pub fn is_ok(&self) -> bool {
        self.internet_reachable && self.signaling_reachable
    }

    pub fn signal(&self) -> HealthSignal {
        HealthSignal {
            tier: if self.is_ok() {
                HealthTier::Healthy
            } else {
                HealthTier::Degraded
            },
            internet_reachable: self.internet_reachable,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    signal: HealthSignal,
    healthy_interval: Duration,
    degraded_interval: Duration,
    cycles: u64,
}

impl HealthMonitor {
    pub fn new(healthy_interval: Duration, degraded_interval: Duration) -> Self {
        Self {
            signal: HealthSignal::HEALTHY,
            healthy_interval,
            degraded_interval,
            cycles: 0,
        }
    }

    pub fn tier(&self) -> HealthTier {
        self.signal.tier
    }

    pub fn signal(&self) -> HealthSignal {
        self.signal
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Record a cycle. Returns the new signal when the tier or internet
    /// reachability changed.
    pub fn record_cycle(&mut self, cycle: ProbeCycle) -> Option<HealthSignal> {
        self.cycles += 1;
        let signal = cycle.signal();
        if signal == self.signal {
            return None;
        }

        if signal.tier != self.signal.tier {
            match signal.tier {
                HealthTier::Healthy => info!("Connectivity restored"),
                HealthTier::Degraded => warn!(
                    "Connectivity degraded (internet: {}, signaling: {})",
                    cycle.internet_reachable, cycle.signaling_reachable
                ),
            }
        } else {
            info!(
                "Internet reachability changed to {} while degraded",
                signal.internet_reachable
            );
        }
        self.signal = signal;
        Some(signal)
    }

    /// Delay before the next cycle for the current tier
    pub fn next_delay(&self) -> Duration {
        match self.signal.tier {
            HealthTier::Healthy => self.healthy_interval,
            HealthTier::Degraded => self.degraded_interval,
        }
    }
}
