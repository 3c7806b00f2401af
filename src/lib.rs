//! Softphone core - multi-line call and presence orchestration
//!
//! Turns a signaling/media transport into a three-line softphone: call
//! sessions bound to line keys, Busy Lamp Field presence, blind and attended
//! transfer, and a supervisor that keeps the connection registered across
//! unreliable networks. Laid out in Domain-Driven Design layers.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
