//! Domain layer - Core softphone rules
//!
//! This layer contains:
//! - Sessions and their state machine
//! - The three line keys and the switchboard that binds sessions to them
//! - BLF presence subscriptions
//! - Transfer records
//! - Connection supervision and health tiering
//! - The transport port the core drives

pub mod connection;
pub mod events;
pub mod line;
pub mod presence;
pub mod session;
pub mod shared;
pub mod switchboard;
pub mod transfer;
pub mod transport;

// Re-export commonly used types
pub use shared::{DomainError, Result};
