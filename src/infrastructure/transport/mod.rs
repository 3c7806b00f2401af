//! Transport adapters

pub mod loopback;

pub use loopback::{LoopbackTransport, TransportCall};
