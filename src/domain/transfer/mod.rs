//! Transfer bounded context - blind and attended transfer records

pub mod ledger;
pub mod record;

pub use ledger::TransferLedger;
pub use record::{Disposition, TransferKind, TransferRecord};
