use serde::{Deserialize, Serialize};

use crate::domain::company::Company;
use crate::domain::employee::{Employee, EmployeeId};
use crate::domain::expense::{ApprovalStep, ExpenseStatus};
use crate::errors::DomainError;

/// The computed review sequence for a newly submitted expense.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub steps: Vec<ApprovalStep>,
    pub initial_status: ExpenseStatus,
}

impl WorkflowPlan {
    fn auto_approved() -> Self {
        Self { steps: Vec::new(), initial_status: ExpenseStatus::Approved }
    }

    fn single_step(approver_id: EmployeeId) -> Self {
        Self {
            steps: vec![ApprovalStep::pending(approver_id, 1)],
            initial_status: ExpenseStatus::Pending,
        }
    }
}

/// Strategy seam for computing an expense's approval sequence. The data
/// model supports arbitrary ordered sequences; alternative generators (for
/// example one that consults the company's stored approval rules) plug in
/// here without reshaping the expense aggregate.
pub trait StepGenerator: Send + Sync {
    fn plan(
        &self,
        submitter: &Employee,
        company: &Company,
        designated_admin: Option<&Employee>,
    ) -> Result<WorkflowPlan, DomainError>;
}

/// Default strategy: a single-step chain routed to the submitter's manager
/// when manager approval applies, otherwise to the company's designated
/// admin. Admin submitters skip review entirely.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManagerApproverGenerator;

impl StepGenerator for ManagerApproverGenerator {
    fn plan(
        &self,
        submitter: &Employee,
        company: &Company,
        designated_admin: Option<&Employee>,
    ) -> Result<WorkflowPlan, DomainError> {
        if submitter.is_self_approving() {
            return Ok(WorkflowPlan::auto_approved());
        }

        if submitter.is_manager_approver {
            if let Some(manager_id) = &submitter.manager_id {
                return Ok(WorkflowPlan::single_step(manager_id.clone()));
            }
        }

        match designated_admin {
            Some(admin) => Ok(WorkflowPlan::single_step(admin.id.clone())),
            None => Err(DomainError::Validation(format!(
                "company `{}` has no designated approver for employee `{}`",
                company.id.0, submitter.id.0
            ))),
        }
    }
}
