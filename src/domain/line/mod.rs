//! Line bounded context - the three physical line keys

pub mod allocator;
pub mod entity;

pub use allocator::LineAllocator;
pub use entity::{CallerInfo, Line, LineState};
