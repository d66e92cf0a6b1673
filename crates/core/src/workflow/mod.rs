pub mod generator;
pub mod processor;

pub use generator::{ManagerApproverGenerator, StepGenerator, WorkflowPlan};
pub use processor::{
    derive_status, override_step, validate_override_status, validate_rejection_comments,
    OVERRIDE_COMMENT_PREFIX, OVERRIDE_SEQUENCE,
};
