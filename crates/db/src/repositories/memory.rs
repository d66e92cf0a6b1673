use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use expensey_core::domain::company::{ApprovalRule, ApprovalRuleId, Company, CompanyId};
use expensey_core::domain::employee::{Employee, EmployeeId, Role};
use expensey_core::domain::expense::{ApprovalStep, Expense, ExpenseId, ExpenseStatus};
use expensey_core::workflow::processor;

use super::{
    CompanyExpense, CompanyRepository, EmployeeRepository, ExpenseRepository, RepositoryError,
    StepActionOutcome,
};

#[derive(Default)]
pub struct InMemoryCompanyRepository {
    companies: RwLock<HashMap<String, Company>>,
    rules: RwLock<HashMap<String, ApprovalRule>>,
}

#[async_trait::async_trait]
impl CompanyRepository for InMemoryCompanyRepository {
    async fn create(&self, company: Company) -> Result<(), RepositoryError> {
        let mut companies = self.companies.write().await;
        companies.insert(company.id.0.clone(), company);
        Ok(())
    }

    async fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let companies = self.companies.read().await;
        Ok(companies.get(&id.0).cloned())
    }

    async fn add_rule(&self, rule: ApprovalRule) -> Result<(), RepositoryError> {
        let mut rules = self.rules.write().await;
        rules.insert(rule.id.0.clone(), rule);
        Ok(())
    }

    async fn update_rule(&self, rule: ApprovalRule) -> Result<bool, RepositoryError> {
        let mut rules = self.rules.write().await;
        match rules.get_mut(&rule.id.0) {
            Some(existing) if existing.company_id == rule.company_id => {
                *existing = rule;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_rule_by_id(
        &self,
        id: &ApprovalRuleId,
    ) -> Result<Option<ApprovalRule>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.get(&id.0).cloned())
    }

    async fn list_rules(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, RepositoryError> {
        let rules = self.rules.read().await;
        let mut matched: Vec<ApprovalRule> =
            rules.values().filter(|rule| &rule.company_id == company_id).cloned().collect();
        matched.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(matched)
    }
}

#[derive(Default)]
pub struct InMemoryEmployeeRepository {
    employees: RwLock<HashMap<String, Employee>>,
}

#[async_trait::async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn create(&self, employee: Employee) -> Result<(), RepositoryError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.0.clone(), employee);
        Ok(())
    }

    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.get(&id.0).cloned())
    }

    async fn update(&self, employee: Employee) -> Result<(), RepositoryError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.0.clone(), employee);
        Ok(())
    }

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        let mut matched: Vec<Employee> = employees
            .values()
            .filter(|employee| &employee.company_id == company_id)
            .cloned()
            .collect();
        matched.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(matched)
    }

    async fn find_designated_admin(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees
            .values()
            .filter(|employee| &employee.company_id == company_id && employee.role == Role::Admin)
            .min_by_key(|employee| employee.created_at)
            .cloned())
    }
}

/// In-memory expense store; step transitions reuse the pure workflow
/// processor so the semantics stay aligned with the SQL implementation.
#[derive(Default)]
pub struct InMemoryExpenseRepository {
    expenses: RwLock<HashMap<String, Expense>>,
    managers: RwLock<HashMap<String, String>>,
}

impl InMemoryExpenseRepository {
    /// Register a reporting edge so `list_for_team` can resolve direct
    /// reports without an employee repository.
    pub async fn set_manager(&self, employee_id: &EmployeeId, manager_id: &EmployeeId) {
        let mut managers = self.managers.write().await;
        managers.insert(employee_id.0.clone(), manager_id.0.clone());
    }
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn create(&self, expense: Expense) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.0.clone(), expense);
        Ok(())
    }

    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id.0).cloned())
    }

    async fn update_details(&self, expense: Expense) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.0.clone(), expense);
        Ok(())
    }

    async fn approve_step(
        &self,
        expense_id: &ExpenseId,
        approver_id: &EmployeeId,
        comments: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<StepActionOutcome, RepositoryError> {
        let mut expenses = self.expenses.write().await;
        let Some(expense) = expenses.get_mut(&expense_id.0) else {
            return Ok(StepActionOutcome::ExpenseMissing);
        };
        if expense.status != ExpenseStatus::Pending {
            return Ok(StepActionOutcome::NotCurrentStep);
        }

        match processor::apply_approval(&mut expense.steps, approver_id, comments, at) {
            Ok(status) => {
                expense.status = status;
                expense.updated_at = at;
                Ok(StepActionOutcome::Applied(expense.clone()))
            }
            Err(_) => Ok(StepActionOutcome::NotCurrentStep),
        }
    }

    async fn reject_step(
        &self,
        expense_id: &ExpenseId,
        approver_id: &EmployeeId,
        comments: String,
        at: DateTime<Utc>,
    ) -> Result<StepActionOutcome, RepositoryError> {
        let mut expenses = self.expenses.write().await;
        let Some(expense) = expenses.get_mut(&expense_id.0) else {
            return Ok(StepActionOutcome::ExpenseMissing);
        };
        if expense.status != ExpenseStatus::Pending {
            return Ok(StepActionOutcome::NotCurrentStep);
        }

        match processor::apply_rejection(&mut expense.steps, approver_id, &comments, at) {
            Ok(status) => {
                expense.status = status;
                expense.updated_at = at;
                Ok(StepActionOutcome::Applied(expense.clone()))
            }
            Err(_) => Ok(StepActionOutcome::NotCurrentStep),
        }
    }

    async fn append_override(
        &self,
        expense_id: &ExpenseId,
        step: ApprovalStep,
        status: ExpenseStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Expense>, RepositoryError> {
        let mut expenses = self.expenses.write().await;
        let Some(expense) = expenses.get_mut(&expense_id.0) else {
            return Ok(None);
        };

        expense.steps.push(step);
        expense.status = status;
        expense.updated_at = at;
        Ok(Some(expense.clone()))
    }

    async fn list_pending_for_approver(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        let mut matched: Vec<Expense> = expenses
            .values()
            .filter(|expense| {
                expense.status == ExpenseStatus::Pending
                    && expense
                        .current_step()
                        .is_some_and(|step| &step.approver_id == approver_id)
            })
            .cloned()
            .collect();
        matched.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(matched)
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        let mut matched: Vec<Expense> = expenses
            .values()
            .filter(|expense| &expense.employee_id == employee_id)
            .cloned()
            .collect();
        matched.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(matched)
    }

    async fn list_for_team(
        &self,
        manager_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let managers = self.managers.read().await;
        let expenses = self.expenses.read().await;
        let mut matched: Vec<Expense> = expenses
            .values()
            .filter(|expense| {
                managers.get(&expense.employee_id.0).map(String::as_str) == Some(&manager_id.0)
            })
            .cloned()
            .collect();
        matched.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(matched)
    }

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<CompanyExpense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        let mut matched: Vec<CompanyExpense> = expenses
            .values()
            .filter(|expense| &expense.company_id == company_id)
            .cloned()
            .map(|expense| {
                let submitter = expense.employee_id.0.clone();
                CompanyExpense {
                    expense,
                    submitter_name: submitter.clone(),
                    submitter_email: String::new(),
                }
            })
            .collect();
        matched
            .sort_by(|left, right| right.expense.created_at.cmp(&left.expense.created_at));
        Ok(matched)
    }
}
