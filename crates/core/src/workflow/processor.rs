use chrono::{DateTime, Utc};

use crate::domain::employee::EmployeeId;
use crate::domain::expense::{ApprovalStep, ExpenseStatus, StepStatus};
use crate::errors::DomainError;

/// Sentinel sequence for override steps; sorts after any real step.
pub const OVERRIDE_SEQUENCE: i64 = 999;

pub const OVERRIDE_COMMENT_PREFIX: &str = "Admin Override: ";

const MIN_REJECTION_COMMENT_CHARS: usize = 5;

/// Expense status as a pure function of its steps: Rejected if any step is
/// Rejected, Approved if every step is Approved (or the workflow is empty),
/// Pending otherwise.
pub fn derive_status(steps: &[ApprovalStep]) -> ExpenseStatus {
    if steps.iter().any(|step| step.status == StepStatus::Rejected) {
        return ExpenseStatus::Rejected;
    }
    if steps.iter().all(|step| step.status == StepStatus::Approved) {
        return ExpenseStatus::Approved;
    }
    ExpenseStatus::Pending
}

/// Rejections must carry a substantive comment.
pub fn validate_rejection_comments(comments: &str) -> Result<(), DomainError> {
    if comments.trim().chars().count() < MIN_REJECTION_COMMENT_CHARS {
        return Err(DomainError::Validation(format!(
            "rejection comments must be at least {MIN_REJECTION_COMMENT_CHARS} characters"
        )));
    }
    Ok(())
}

/// Overrides may only target a terminal status.
pub fn validate_override_status(status: ExpenseStatus) -> Result<(), DomainError> {
    if status == ExpenseStatus::Pending {
        return Err(DomainError::Validation(
            "override status must be approved or rejected".to_string(),
        ));
    }
    Ok(())
}

/// Build the synthetic step recorded by an admin override.
pub fn override_step(
    admin_id: EmployeeId,
    status: ExpenseStatus,
    comments: &str,
    at: DateTime<Utc>,
) -> ApprovalStep {
    let step_status = match status {
        ExpenseStatus::Approved => StepStatus::Approved,
        _ => StepStatus::Rejected,
    };
    ApprovalStep {
        approver_id: admin_id,
        sequence: OVERRIDE_SEQUENCE,
        status: step_status,
        comments: Some(format!("{OVERRIDE_COMMENT_PREFIX}{comments}")),
        approval_date: Some(at),
    }
}

/// Resolve the current step for `approver_id` in an in-memory step list.
///
/// Returns the index of the step when it is both addressed to this approver
/// and the lowest-sequence Pending step; `None` means the approver has no
/// actionable step right now (already resolved, someone else's turn, or no
/// step at all) and maps to Forbidden at the call site.
pub fn current_step_for_approver(steps: &[ApprovalStep], approver_id: &EmployeeId) -> Option<usize> {
    let current = steps
        .iter()
        .enumerate()
        .filter(|(_, step)| step.status == StepStatus::Pending)
        .min_by_key(|(_, step)| step.sequence)?;

    (&current.1.approver_id == approver_id).then_some(current.0)
}

/// Apply an approval to an in-memory step list; the SQL repository performs
/// the equivalent transition as one conditional update.
pub fn apply_approval(
    steps: &mut [ApprovalStep],
    approver_id: &EmployeeId,
    comments: Option<String>,
    at: DateTime<Utc>,
) -> Result<ExpenseStatus, DomainError> {
    let index = current_step_for_approver(steps, approver_id)
        .ok_or_else(|| forbidden_step(approver_id))?;

    steps[index].status = StepStatus::Approved;
    steps[index].comments = comments;
    steps[index].approval_date = Some(at);

    Ok(derive_status(steps))
}

/// Apply a rejection; the whole workflow terminates, later steps stay
/// Pending in storage.
pub fn apply_rejection(
    steps: &mut [ApprovalStep],
    approver_id: &EmployeeId,
    comments: &str,
    at: DateTime<Utc>,
) -> Result<ExpenseStatus, DomainError> {
    validate_rejection_comments(comments)?;
    let index = current_step_for_approver(steps, approver_id)
        .ok_or_else(|| forbidden_step(approver_id))?;

    steps[index].status = StepStatus::Rejected;
    steps[index].comments = Some(comments.to_string());
    steps[index].approval_date = Some(at);

    Ok(ExpenseStatus::Rejected)
}

fn forbidden_step(approver_id: &EmployeeId) -> DomainError {
    DomainError::Forbidden(format!("no pending approval step for approver `{}`", approver_id.0))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::employee::EmployeeId;
    use crate::domain::expense::{ApprovalStep, ExpenseStatus, StepStatus};
    use crate::errors::DomainError;

    use super::{
        apply_approval, apply_rejection, derive_status, override_step, validate_override_status,
        validate_rejection_comments, OVERRIDE_SEQUENCE,
    };

    fn approver(id: &str) -> EmployeeId {
        EmployeeId(id.to_string())
    }

    fn pending_chain(ids: &[&str]) -> Vec<ApprovalStep> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| ApprovalStep::pending(approver(id), i as i64 + 1))
            .collect()
    }

    #[test]
    fn empty_workflow_derives_approved() {
        assert_eq!(derive_status(&[]), ExpenseStatus::Approved);
    }

    #[test]
    fn any_rejected_step_derives_rejected() {
        let mut steps = pending_chain(&["EMP-M", "EMP-F"]);
        steps[0].status = StepStatus::Approved;
        steps[1].status = StepStatus::Rejected;
        assert_eq!(derive_status(&steps), ExpenseStatus::Rejected);
    }

    #[test]
    fn mixed_pending_steps_derive_pending() {
        let mut steps = pending_chain(&["EMP-M", "EMP-F"]);
        steps[0].status = StepStatus::Approved;
        assert_eq!(derive_status(&steps), ExpenseStatus::Pending);
    }

    #[test]
    fn approving_the_only_step_approves_the_expense() {
        let mut steps = pending_chain(&["EMP-M"]);
        let status = apply_approval(&mut steps, &approver("EMP-M"), Some("ok".to_string()), Utc::now())
            .expect("approval should succeed");

        assert_eq!(status, ExpenseStatus::Approved);
        assert_eq!(steps[0].status, StepStatus::Approved);
        assert_eq!(steps[0].comments.as_deref(), Some("ok"));
        assert!(steps[0].approval_date.is_some());
    }

    #[test]
    fn approving_an_early_step_leaves_the_expense_pending() {
        let mut steps = pending_chain(&["EMP-M", "EMP-F"]);
        let status = apply_approval(&mut steps, &approver("EMP-M"), None, Utc::now())
            .expect("approval should succeed");

        assert_eq!(status, ExpenseStatus::Pending);
        assert_eq!(steps[1].status, StepStatus::Pending);
    }

    #[test]
    fn approving_out_of_turn_is_forbidden() {
        let mut steps = pending_chain(&["EMP-M", "EMP-F"]);
        let error = apply_approval(&mut steps, &approver("EMP-F"), None, Utc::now())
            .expect_err("second approver is not current");
        assert!(matches!(error, DomainError::Forbidden(_)));
    }

    #[test]
    fn repeated_approval_of_a_resolved_step_is_forbidden() {
        let mut steps = pending_chain(&["EMP-M"]);
        apply_approval(&mut steps, &approver("EMP-M"), None, Utc::now()).expect("first approval");

        let error = apply_approval(&mut steps, &approver("EMP-M"), None, Utc::now())
            .expect_err("second approval must not silently succeed");
        assert!(matches!(error, DomainError::Forbidden(_)));
    }

    #[test]
    fn rejection_terminates_the_workflow() {
        let mut steps = pending_chain(&["EMP-M", "EMP-F"]);
        let status = apply_rejection(&mut steps, &approver("EMP-M"), "not allowed", Utc::now())
            .expect("rejection should succeed");

        assert_eq!(status, ExpenseStatus::Rejected);
        assert_eq!(steps[0].status, StepStatus::Rejected);
        // Later steps are not processed further but stay recorded as Pending.
        assert_eq!(steps[1].status, StepStatus::Pending);
    }

    #[test]
    fn rejection_comments_must_be_at_least_five_characters() {
        let error = validate_rejection_comments("too").expect_err("4 chars should fail");
        assert!(matches!(error, DomainError::Validation(_)));
        assert!(validate_rejection_comments("  too  ").is_err());
        validate_rejection_comments("not allowed").expect("long enough comment");
    }

    #[test]
    fn override_status_must_be_terminal() {
        assert!(validate_override_status(ExpenseStatus::Pending).is_err());
        validate_override_status(ExpenseStatus::Approved).expect("approved is terminal");
        validate_override_status(ExpenseStatus::Rejected).expect("rejected is terminal");
    }

    #[test]
    fn override_step_carries_sentinel_sequence_and_prefixed_comment() {
        let step =
            override_step(approver("EMP-A"), ExpenseStatus::Approved, "policy exception", Utc::now());

        assert_eq!(step.sequence, OVERRIDE_SEQUENCE);
        assert_eq!(step.status, StepStatus::Approved);
        assert_eq!(step.comments.as_deref(), Some("Admin Override: policy exception"));
        assert!(step.approval_date.is_some());
    }
}
