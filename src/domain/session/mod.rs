//! Session bounded context - call legs and their state machine

pub mod aggregate;
pub mod registry;
pub mod value_object;

pub use aggregate::Session;
pub use registry::SessionRegistry;
pub use value_object::{Direction, EndReason, SessionEvent, SessionState};
