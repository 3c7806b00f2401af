//! Application layer - Use cases and application services
//!
//! This layer orchestrates domain objects to fulfill use cases.
//! It's responsible for:
//! - Driving the transport on behalf of user actions
//! - Coordinating the switchboard, presence, transfers and supervisor
//! - Publishing domain events
//! - Running the dispatch loop and the connectivity monitor

pub mod health;
pub mod runtime;
pub mod softphone;

pub use health::HealthService;
pub use runtime::{Command, Input, SoftphoneHandle, SoftphoneRuntime};
pub use softphone::{Softphone, SoftphoneSnapshot};
