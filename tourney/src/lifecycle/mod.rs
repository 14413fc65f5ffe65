//! Match lifecycle: reporting, confirmation, disputes and expiry.

pub mod dispute;
pub mod manager;
pub mod state_machine;

pub use dispute::{Dispute, DisputeId, DisputeStatus};
pub use manager::MatchLifecycle;
pub use state_machine::{MatchAction, Transition};
