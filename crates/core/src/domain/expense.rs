use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;
use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
}

/// One checkpoint in an expense's review sequence. Owned exclusively by its
/// expense; the current step is the lowest-sequence step still Pending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub approver_id: EmployeeId,
    pub sequence: i64,
    pub status: StepStatus,
    pub comments: Option<String>,
    pub approval_date: Option<DateTime<Utc>>,
}

impl ApprovalStep {
    pub fn pending(approver_id: EmployeeId, sequence: i64) -> Self {
        Self {
            approver_id,
            sequence,
            status: StepStatus::Pending,
            comments: None,
            approval_date: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub employee_id: EmployeeId,
    pub company_id: CompanyId,
    pub amount: Decimal,
    pub currency: String,
    /// Converted once at submission time and never recomputed.
    pub amount_in_company_currency: Decimal,
    pub category: String,
    pub description: String,
    pub date_of_expense: NaiveDate,
    pub receipt_data: Option<serde_json::Value>,
    pub status: ExpenseStatus,
    pub steps: Vec<ApprovalStep>,
    pub conditional_rule_applied: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// The lowest-sequence step still Pending, if any.
    pub fn current_step(&self) -> Option<&ApprovalStep> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Pending)
            .min_by_key(|step| step.sequence)
    }

    /// Submitters may edit their expense only while it is still Pending.
    pub fn is_editable(&self) -> bool {
        self.status == ExpenseStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use crate::domain::company::CompanyId;
    use crate::domain::employee::EmployeeId;

    use super::{ApprovalStep, Expense, ExpenseId, ExpenseStatus, StepStatus};

    fn expense(steps: Vec<ApprovalStep>, status: ExpenseStatus) -> Expense {
        let now = Utc::now();
        Expense {
            id: ExpenseId("EXP-1".to_string()),
            employee_id: EmployeeId("EMP-1".to_string()),
            company_id: CompanyId("CMP-1".to_string()),
            amount: Decimal::new(10_000, 2),
            currency: "USD".to_string(),
            amount_in_company_currency: Decimal::new(10_000, 2),
            category: "travel".to_string(),
            description: "client visit".to_string(),
            date_of_expense: NaiveDate::from_ymd_opt(2026, 7, 14).unwrap(),
            receipt_data: None,
            status,
            steps,
            conditional_rule_applied: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn current_step_is_lowest_pending_sequence() {
        let mut resolved = ApprovalStep::pending(EmployeeId("EMP-M".to_string()), 1);
        resolved.status = StepStatus::Approved;
        let steps = vec![
            ApprovalStep::pending(EmployeeId("EMP-F".to_string()), 3),
            resolved,
            ApprovalStep::pending(EmployeeId("EMP-D".to_string()), 2),
        ];

        let expense = expense(steps, ExpenseStatus::Pending);
        let current = expense.current_step().expect("should have a current step");
        assert_eq!(current.sequence, 2);
        assert_eq!(current.approver_id.0, "EMP-D");
    }

    #[test]
    fn current_step_is_none_when_all_steps_resolved() {
        let mut step = ApprovalStep::pending(EmployeeId("EMP-M".to_string()), 1);
        step.status = StepStatus::Approved;

        let expense = expense(vec![step], ExpenseStatus::Approved);
        assert!(expense.current_step().is_none());
    }

    #[test]
    fn only_pending_expenses_are_editable() {
        assert!(expense(vec![], ExpenseStatus::Pending).is_editable());
        assert!(!expense(vec![], ExpenseStatus::Approved).is_editable());
        assert!(!expense(vec![], ExpenseStatus::Rejected).is_editable());
    }
}
