//! State machine module.

pub mod machine;
pub mod mode;

pub use machine::{DfuContext, DfuState, PagePlan, sub_writes};
pub use mode::Mode;
