pub mod config;
pub mod currency;
pub mod domain;
pub mod errors;
pub mod workflow;

pub use currency::{ConversionError, CurrencyConverter, RateSource, RateSourceError, StaticRateTable};
pub use domain::company::{ApprovalRule, ApprovalRuleId, Company, CompanyId, RuleKind};
pub use domain::employee::{Employee, EmployeeId, Role};
pub use domain::expense::{ApprovalStep, Expense, ExpenseId, ExpenseStatus, StepStatus};
pub use errors::{ApplicationError, DomainError};
pub use workflow::{ManagerApproverGenerator, StepGenerator, WorkflowPlan};
