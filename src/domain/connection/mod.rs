//! Connection bounded context - registration, keep-alive and network health

pub mod health;
pub mod state;
pub mod supervisor;

pub use health::{ConnectivityProbe, HealthMonitor, ProbeClass, ProbeCycle, ProbeError};
pub use state::{ConnectionState, HealthSignal, HealthTier, RegistrationState, TransportState};
pub use supervisor::{Directive, ResilienceSupervisor, SupervisorPolicy};
