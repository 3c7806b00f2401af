//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Transport adapters behind the transport port
//! - Network probes for the connectivity monitor

pub mod probe;
pub mod transport;
