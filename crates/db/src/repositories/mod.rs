use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use expensey_core::domain::company::{ApprovalRule, ApprovalRuleId, Company, CompanyId};
use expensey_core::domain::employee::{Employee, EmployeeId};
use expensey_core::domain::expense::{ApprovalStep, Expense, ExpenseId, ExpenseStatus};

pub mod company;
pub mod employee;
pub mod expense;
pub mod memory;

pub use company::SqlCompanyRepository;
pub use employee::SqlEmployeeRepository;
pub use expense::SqlExpenseRepository;
pub use memory::{InMemoryCompanyRepository, InMemoryEmployeeRepository, InMemoryExpenseRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Result of an atomic step transition. `NotCurrentStep` covers every case
/// where no row matched the conditional update: the step was already
/// resolved, it is another approver's turn, or the expense is no longer
/// Pending. Callers map it to Forbidden.
#[derive(Clone, Debug, PartialEq)]
pub enum StepActionOutcome {
    Applied(Expense),
    NotCurrentStep,
    ExpenseMissing,
}

/// Company-scoped expense row joined with submitter display fields.
#[derive(Clone, Debug, PartialEq)]
pub struct CompanyExpense {
    pub expense: Expense,
    pub submitter_name: String,
    pub submitter_email: String,
}

#[async_trait]
pub trait CompanyRepository: Send + Sync {
    async fn create(&self, company: Company) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError>;
    async fn add_rule(&self, rule: ApprovalRule) -> Result<(), RepositoryError>;

    /// Returns false when the rule does not exist.
    async fn update_rule(&self, rule: ApprovalRule) -> Result<bool, RepositoryError>;

    async fn find_rule_by_id(
        &self,
        id: &ApprovalRuleId,
    ) -> Result<Option<ApprovalRule>, RepositoryError>;

    async fn list_rules(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, RepositoryError>;
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn create(&self, employee: Employee) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError>;
    async fn update(&self, employee: Employee) -> Result<(), RepositoryError>;
    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Employee>, RepositoryError>;

    /// The company's designated approver of last resort: its earliest-created
    /// admin employee.
    async fn find_designated_admin(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<Employee>, RepositoryError>;
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn create(&self, expense: Expense) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError>;

    /// Persist submitter edits; callers verify the expense is still Pending.
    async fn update_details(&self, expense: Expense) -> Result<(), RepositoryError>;

    /// Approve the approver's current step as one conditional update: the
    /// flip happens only if the step is still the lowest-sequence Pending
    /// step and the expense itself is still Pending.
    async fn approve_step(
        &self,
        expense_id: &ExpenseId,
        approver_id: &EmployeeId,
        comments: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<StepActionOutcome, RepositoryError>;

    /// Reject the approver's current step; the expense becomes Rejected
    /// unconditionally, later steps stay Pending in storage.
    async fn reject_step(
        &self,
        expense_id: &ExpenseId,
        approver_id: &EmployeeId,
        comments: String,
        at: DateTime<Utc>,
    ) -> Result<StepActionOutcome, RepositoryError>;

    /// Append a synthetic override step and set the expense status directly,
    /// bypassing the step sequence. Returns None when the expense is absent.
    async fn append_override(
        &self,
        expense_id: &ExpenseId,
        step: ApprovalStep,
        status: ExpenseStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Expense>, RepositoryError>;

    /// Expenses where it is genuinely this approver's turn: the approver owns
    /// the minimum-sequence Pending step and the expense is still Pending.
    async fn list_pending_for_approver(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError>;

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError>;

    async fn list_for_team(
        &self,
        manager_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError>;

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<CompanyExpense>, RepositoryError>;
}
