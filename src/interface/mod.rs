//! Interface layer - What observers and embedders see
//!
//! This layer handles:
//! - Ordered event delivery to UI observers
//! - Metric recording through the `metrics` facade

pub mod events;
pub mod metrics;

pub use events::EventBus;
