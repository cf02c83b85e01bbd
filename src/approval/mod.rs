//! Human-in-the-loop approval gating.

mod card;
mod registry;

pub use card::approval_card;
pub use registry::{ApprovalRegistry, ApprovalRequest, ApprovalStatus};
