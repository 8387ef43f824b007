//! Rate budgets - pure accounting, no timers
//!
//! Both budgets take the current instant as an argument and answer with how
//! long a caller must wait. Suspension is the caller's job.

mod bucket;
mod window;

pub use bucket::BucketBudget;
pub use window::WindowBudget;
