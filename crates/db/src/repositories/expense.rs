use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use uuid::Uuid;

use expensey_core::domain::company::CompanyId;
use expensey_core::domain::employee::EmployeeId;
use expensey_core::domain::expense::{
    ApprovalStep, Expense, ExpenseId, ExpenseStatus, StepStatus,
};

use super::{CompanyExpense, ExpenseRepository, RepositoryError, StepActionOutcome};
use crate::DbPool;

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_steps(&self, expense_id: &str) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT approver_id, sequence, status, comments, approval_date
             FROM approval_step WHERE expense_id = ? ORDER BY sequence ASC, approval_date ASC",
        )
        .bind(expense_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()
    }

    async fn load_expense(
        &self,
        expense_id: &str,
    ) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EXPENSE_COLUMNS} FROM expense WHERE id = ?"))
            .bind(expense_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let steps = self.load_steps(expense_id).await?;
        Ok(Some(row_to_expense(&row, steps)?))
    }

    async fn load_many(
        &self,
        rows: Vec<sqlx::sqlite::SqliteRow>,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let mut expenses = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String =
                row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let steps = self.load_steps(&id).await?;
            expenses.push(row_to_expense(row, steps)?);
        }
        Ok(expenses)
    }
}

const EXPENSE_COLUMNS: &str = "id, employee_id, company_id, amount, currency, \
                               amount_in_company_currency, category, description, \
                               date_of_expense, receipt_data, status, \
                               conditional_rule_applied, created_at, updated_at";

fn parse_expense_status(s: &str) -> ExpenseStatus {
    match s {
        "approved" => ExpenseStatus::Approved,
        "rejected" => ExpenseStatus::Rejected,
        _ => ExpenseStatus::Pending,
    }
}

pub fn expense_status_as_str(status: &ExpenseStatus) -> &'static str {
    match status {
        ExpenseStatus::Pending => "pending",
        ExpenseStatus::Approved => "approved",
        ExpenseStatus::Rejected => "rejected",
    }
}

fn parse_step_status(s: &str) -> StepStatus {
    match s {
        "approved" => StepStatus::Approved,
        "rejected" => StepStatus::Rejected,
        _ => StepStatus::Pending,
    }
}

pub fn step_status_as_str(status: &StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "pending",
        StepStatus::Approved => "approved",
        StepStatus::Rejected => "rejected",
    }
}

fn parse_money(raw: &str, column: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("{column} `{raw}`: {e}")))
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let approver_id: String =
        row.try_get("approver_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sequence: i64 =
        row.try_get("sequence").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comments: Option<String> =
        row.try_get("comments").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approval_date_str: Option<String> =
        row.try_get("approval_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let approval_date = approval_date_str
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(ApprovalStep {
        approver_id: EmployeeId(approver_id),
        sequence,
        status: parse_step_status(&status_str),
        comments,
        approval_date,
    })
}

fn row_to_expense(
    row: &sqlx::sqlite::SqliteRow,
    steps: Vec<ApprovalStep>,
) -> Result<Expense, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let employee_id: String =
        row.try_get("employee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company_id: String =
        row.try_get("company_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_str: String =
        row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency: String =
        row.try_get("currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let converted_str: String = row
        .try_get("amount_in_company_currency")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let date_str: String =
        row.try_get("date_of_expense").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let receipt_data_str: Option<String> =
        row.try_get("receipt_data").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conditional_rule_applied: Option<String> = row
        .try_get("conditional_rule_applied")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let date_of_expense = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(format!("date_of_expense `{date_str}`: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Expense {
        id: ExpenseId(id),
        employee_id: EmployeeId(employee_id),
        company_id: CompanyId(company_id),
        amount: parse_money(&amount_str, "amount")?,
        currency,
        amount_in_company_currency: parse_money(&converted_str, "amount_in_company_currency")?,
        category,
        description,
        date_of_expense,
        receipt_data: receipt_data_str.and_then(|s| serde_json::from_str(&s).ok()),
        status: parse_expense_status(&status_str),
        steps,
        conditional_rule_applied,
        created_at,
        updated_at,
    })
}

fn step_row_id() -> String {
    format!("STEP-{}", &Uuid::new_v4().to_string()[..12])
}

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn create(&self, expense: Expense) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO expense (id, employee_id, company_id, amount, currency,
                                  amount_in_company_currency, category, description,
                                  date_of_expense, receipt_data, status,
                                  conditional_rule_applied, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&expense.id.0)
        .bind(&expense.employee_id.0)
        .bind(&expense.company_id.0)
        .bind(expense.amount.to_string())
        .bind(&expense.currency)
        .bind(expense.amount_in_company_currency.to_string())
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.date_of_expense.format("%Y-%m-%d").to_string())
        .bind(expense.receipt_data.as_ref().map(|value| value.to_string()))
        .bind(expense_status_as_str(&expense.status))
        .bind(&expense.conditional_rule_applied)
        .bind(expense.created_at.to_rfc3339())
        .bind(expense.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for step in &expense.steps {
            sqlx::query(
                "INSERT INTO approval_step (id, expense_id, approver_id, sequence,
                                            status, comments, approval_date)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(step_row_id())
            .bind(&expense.id.0)
            .bind(&step.approver_id.0)
            .bind(step.sequence)
            .bind(step_status_as_str(&step.status))
            .bind(&step.comments)
            .bind(step.approval_date.map(|dt| dt.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        self.load_expense(&id.0).await
    }

    async fn update_details(&self, expense: Expense) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE expense
             SET amount = ?, currency = ?, amount_in_company_currency = ?,
                 category = ?, description = ?, date_of_expense = ?,
                 receipt_data = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(expense.amount.to_string())
        .bind(&expense.currency)
        .bind(expense.amount_in_company_currency.to_string())
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.date_of_expense.format("%Y-%m-%d").to_string())
        .bind(expense.receipt_data.as_ref().map(|value| value.to_string()))
        .bind(expense.updated_at.to_rfc3339())
        .bind(&expense.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn approve_step(
        &self,
        expense_id: &ExpenseId,
        approver_id: &EmployeeId,
        comments: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<StepActionOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Single conditional update: the flip succeeds only while this is
        // still the lowest-sequence Pending step and the expense is Pending,
        // so two racing approvals cannot both pass.
        let updated = sqlx::query(
            "UPDATE approval_step
             SET status = 'approved', comments = ?, approval_date = ?
             WHERE expense_id = ? AND approver_id = ? AND status = 'pending'
               AND sequence = (SELECT MIN(sequence) FROM approval_step
                               WHERE expense_id = ? AND status = 'pending')
               AND (SELECT status FROM expense WHERE id = ?) = 'pending'",
        )
        .bind(&comments)
        .bind(at.to_rfc3339())
        .bind(&expense_id.0)
        .bind(&approver_id.0)
        .bind(&expense_id.0)
        .bind(&expense_id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM expense WHERE id = ?")
                .bind(&expense_id.0)
                .fetch_one(&self.pool)
                .await?;
            return Ok(if exists == 0 {
                StepActionOutcome::ExpenseMissing
            } else {
                StepActionOutcome::NotCurrentStep
            });
        }

        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM approval_step WHERE expense_id = ? AND status = 'pending'",
        )
        .bind(&expense_id.0)
        .fetch_one(&mut *tx)
        .await?;

        let next_status = if remaining == 0 { "approved" } else { "pending" };
        sqlx::query("UPDATE expense SET status = ?, updated_at = ? WHERE id = ?")
            .bind(next_status)
            .bind(at.to_rfc3339())
            .bind(&expense_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        match self.load_expense(&expense_id.0).await? {
            Some(expense) => Ok(StepActionOutcome::Applied(expense)),
            None => Ok(StepActionOutcome::ExpenseMissing),
        }
    }

    async fn reject_step(
        &self,
        expense_id: &ExpenseId,
        approver_id: &EmployeeId,
        comments: String,
        at: DateTime<Utc>,
    ) -> Result<StepActionOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE approval_step
             SET status = 'rejected', comments = ?, approval_date = ?
             WHERE expense_id = ? AND approver_id = ? AND status = 'pending'
               AND sequence = (SELECT MIN(sequence) FROM approval_step
                               WHERE expense_id = ? AND status = 'pending')
               AND (SELECT status FROM expense WHERE id = ?) = 'pending'",
        )
        .bind(&comments)
        .bind(at.to_rfc3339())
        .bind(&expense_id.0)
        .bind(&approver_id.0)
        .bind(&expense_id.0)
        .bind(&expense_id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM expense WHERE id = ?")
                .bind(&expense_id.0)
                .fetch_one(&self.pool)
                .await?;
            return Ok(if exists == 0 {
                StepActionOutcome::ExpenseMissing
            } else {
                StepActionOutcome::NotCurrentStep
            });
        }

        // Any rejection terminates the whole workflow; later steps are left
        // Pending in storage.
        sqlx::query("UPDATE expense SET status = 'rejected', updated_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(&expense_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        match self.load_expense(&expense_id.0).await? {
            Some(expense) => Ok(StepActionOutcome::Applied(expense)),
            None => Ok(StepActionOutcome::ExpenseMissing),
        }
    }

    async fn append_override(
        &self,
        expense_id: &ExpenseId,
        step: ApprovalStep,
        status: ExpenseStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Expense>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE expense SET status = ?, updated_at = ? WHERE id = ?")
            .bind(expense_status_as_str(&status))
            .bind(at.to_rfc3339())
            .bind(&expense_id.0)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO approval_step (id, expense_id, approver_id, sequence,
                                        status, comments, approval_date)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(step_row_id())
        .bind(&expense_id.0)
        .bind(&step.approver_id.0)
        .bind(step.sequence)
        .bind(step_status_as_str(&step.status))
        .bind(&step.comments)
        .bind(step.approval_date.map(|dt| dt.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.load_expense(&expense_id.0).await
    }

    async fn list_pending_for_approver(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense
             WHERE status = 'pending'
               AND EXISTS (
                   SELECT 1 FROM approval_step s
                   WHERE s.expense_id = expense.id
                     AND s.approver_id = ?
                     AND s.status = 'pending'
                     AND s.sequence = (SELECT MIN(sequence) FROM approval_step
                                       WHERE expense_id = expense.id AND status = 'pending')
               )
             ORDER BY created_at ASC"
        ))
        .bind(&approver_id.0)
        .fetch_all(&self.pool)
        .await?;

        self.load_many(rows).await
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense
             WHERE employee_id = ? ORDER BY created_at DESC"
        ))
        .bind(&employee_id.0)
        .fetch_all(&self.pool)
        .await?;

        self.load_many(rows).await
    }

    async fn list_for_team(
        &self,
        manager_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense
             WHERE employee_id IN (SELECT id FROM employee WHERE manager_id = ?)
             ORDER BY created_at DESC"
        ))
        .bind(&manager_id.0)
        .fetch_all(&self.pool)
        .await?;

        self.load_many(rows).await
    }

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<CompanyExpense>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT e.id, e.employee_id, e.company_id, e.amount, e.currency,
                    e.amount_in_company_currency, e.category, e.description,
                    e.date_of_expense, e.receipt_data, e.status,
                    e.conditional_rule_applied, e.created_at, e.updated_at,
                    emp.name AS submitter_name, emp.email AS submitter_email
             FROM expense e
             JOIN employee emp ON emp.id = e.employee_id
             WHERE e.company_id = ?
             ORDER BY e.created_at DESC",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String =
                row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let steps = self.load_steps(&id).await?;
            let submitter_name: String = row
                .try_get("submitter_name")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let submitter_email: String = row
                .try_get("submitter_email")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;
            results.push(CompanyExpense {
                expense: row_to_expense(row, steps)?,
                submitter_name,
                submitter_email,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use expensey_core::domain::company::{Company, CompanyId};
    use expensey_core::domain::employee::{Employee, EmployeeId, Role};
    use expensey_core::domain::expense::{
        ApprovalStep, Expense, ExpenseId, ExpenseStatus, StepStatus,
    };
    use expensey_core::workflow::{override_step, OVERRIDE_SEQUENCE};

    use super::SqlExpenseRepository;
    use crate::repositories::{
        CompanyRepository, EmployeeRepository, ExpenseRepository, SqlCompanyRepository,
        SqlEmployeeRepository, StepActionOutcome,
    };
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let companies = SqlCompanyRepository::new(pool.clone());
        companies
            .create(Company {
                id: CompanyId("CMP-001".to_string()),
                name: "Acme Corp".to_string(),
                default_currency: "USD".to_string(),
                country_code: "US".to_string(),
                override_approval_enabled: true,
                created_at: Utc::now(),
            })
            .await
            .expect("create company");

        let employees = SqlEmployeeRepository::new(pool.clone());
        for (id, role, manager) in [
            ("EMP-ADMIN", Role::Admin, None),
            ("EMP-M", Role::Manager, Some("EMP-ADMIN")),
            ("EMP-E", Role::Employee, Some("EMP-M")),
        ] {
            let now = Utc::now();
            employees
                .create(Employee {
                    id: EmployeeId(id.to_string()),
                    company_id: CompanyId("CMP-001".to_string()),
                    name: id.to_string(),
                    email: format!("{}@acme.test", id.to_ascii_lowercase()),
                    role,
                    manager_id: manager.map(|m| EmployeeId(m.to_string())),
                    is_manager_approver: true,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .expect("create employee");
        }

        pool
    }

    fn sample_expense(id: &str, steps: Vec<ApprovalStep>, status: ExpenseStatus) -> Expense {
        let now = Utc::now();
        Expense {
            id: ExpenseId(id.to_string()),
            employee_id: EmployeeId("EMP-E".to_string()),
            company_id: CompanyId("CMP-001".to_string()),
            amount: Decimal::new(10_000, 2),
            currency: "USD".to_string(),
            amount_in_company_currency: Decimal::new(10_000, 2),
            category: "travel".to_string(),
            description: "client visit".to_string(),
            date_of_expense: NaiveDate::from_ymd_opt(2026, 7, 14).unwrap(),
            receipt_data: Some(serde_json::json!({ "file": "receipt-1.jpg" })),
            status,
            steps,
            conditional_rule_applied: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn manager_step() -> ApprovalStep {
        ApprovalStep::pending(EmployeeId("EMP-M".to_string()), 1)
    }

    #[tokio::test]
    async fn create_and_find_round_trips_steps_and_amounts() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        repo.create(sample_expense("EXP-001", vec![manager_step()], ExpenseStatus::Pending))
            .await
            .expect("create");

        let found = repo
            .find_by_id(&ExpenseId("EXP-001".to_string()))
            .await
            .expect("find")
            .expect("should exist");

        assert_eq!(found.amount, Decimal::new(10_000, 2));
        assert_eq!(found.amount_in_company_currency, Decimal::new(10_000, 2));
        assert_eq!(found.status, ExpenseStatus::Pending);
        assert_eq!(found.steps.len(), 1);
        assert_eq!(found.steps[0].approver_id.0, "EMP-M");
        assert_eq!(found.steps[0].status, StepStatus::Pending);
        assert_eq!(found.receipt_data.unwrap()["file"], "receipt-1.jpg");
    }

    #[tokio::test]
    async fn approving_the_final_step_approves_the_expense() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        repo.create(sample_expense("EXP-001", vec![manager_step()], ExpenseStatus::Pending))
            .await
            .expect("create");

        let outcome = repo
            .approve_step(
                &ExpenseId("EXP-001".to_string()),
                &EmployeeId("EMP-M".to_string()),
                Some("ok".to_string()),
                Utc::now(),
            )
            .await
            .expect("approve");

        let StepActionOutcome::Applied(expense) = outcome else {
            panic!("expected applied outcome, got {outcome:?}");
        };
        assert_eq!(expense.status, ExpenseStatus::Approved);
        assert_eq!(expense.steps[0].status, StepStatus::Approved);
        assert_eq!(expense.steps[0].comments.as_deref(), Some("ok"));
        assert!(expense.steps[0].approval_date.is_some());
    }

    #[tokio::test]
    async fn approving_an_early_step_keeps_the_expense_pending() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        let steps = vec![
            manager_step(),
            ApprovalStep::pending(EmployeeId("EMP-ADMIN".to_string()), 2),
        ];
        repo.create(sample_expense("EXP-001", steps, ExpenseStatus::Pending))
            .await
            .expect("create");

        let outcome = repo
            .approve_step(
                &ExpenseId("EXP-001".to_string()),
                &EmployeeId("EMP-M".to_string()),
                None,
                Utc::now(),
            )
            .await
            .expect("approve");

        let StepActionOutcome::Applied(expense) = outcome else {
            panic!("expected applied outcome, got {outcome:?}");
        };
        assert_eq!(expense.status, ExpenseStatus::Pending);
        assert_eq!(expense.steps[1].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn second_approval_of_the_same_step_does_not_apply() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        repo.create(sample_expense("EXP-001", vec![manager_step()], ExpenseStatus::Pending))
            .await
            .expect("create");

        let expense_id = ExpenseId("EXP-001".to_string());
        let approver = EmployeeId("EMP-M".to_string());
        let first = repo
            .approve_step(&expense_id, &approver, None, Utc::now())
            .await
            .expect("first approve");
        assert!(matches!(first, StepActionOutcome::Applied(_)));

        let second = repo
            .approve_step(&expense_id, &approver, None, Utc::now())
            .await
            .expect("second approve");
        assert_eq!(second, StepActionOutcome::NotCurrentStep);
    }

    #[tokio::test]
    async fn out_of_turn_approver_is_not_current() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        let steps = vec![
            manager_step(),
            ApprovalStep::pending(EmployeeId("EMP-ADMIN".to_string()), 2),
        ];
        repo.create(sample_expense("EXP-001", steps, ExpenseStatus::Pending))
            .await
            .expect("create");

        let outcome = repo
            .approve_step(
                &ExpenseId("EXP-001".to_string()),
                &EmployeeId("EMP-ADMIN".to_string()),
                None,
                Utc::now(),
            )
            .await
            .expect("approve");
        assert_eq!(outcome, StepActionOutcome::NotCurrentStep);
    }

    #[tokio::test]
    async fn missing_expense_is_reported_distinctly() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        let outcome = repo
            .approve_step(
                &ExpenseId("EXP-404".to_string()),
                &EmployeeId("EMP-M".to_string()),
                None,
                Utc::now(),
            )
            .await
            .expect("approve");
        assert_eq!(outcome, StepActionOutcome::ExpenseMissing);
    }

    #[tokio::test]
    async fn rejection_terminates_the_workflow_and_leaves_later_steps_pending() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        let steps = vec![
            manager_step(),
            ApprovalStep::pending(EmployeeId("EMP-ADMIN".to_string()), 2),
        ];
        repo.create(sample_expense("EXP-001", steps, ExpenseStatus::Pending))
            .await
            .expect("create");

        let outcome = repo
            .reject_step(
                &ExpenseId("EXP-001".to_string()),
                &EmployeeId("EMP-M".to_string()),
                "not allowed".to_string(),
                Utc::now(),
            )
            .await
            .expect("reject");

        let StepActionOutcome::Applied(expense) = outcome else {
            panic!("expected applied outcome, got {outcome:?}");
        };
        assert_eq!(expense.status, ExpenseStatus::Rejected);
        assert_eq!(expense.steps[0].status, StepStatus::Rejected);
        assert_eq!(expense.steps[0].comments.as_deref(), Some("not allowed"));
        assert_eq!(expense.steps[1].status, StepStatus::Pending);

        // The rejected workflow accepts no further actions.
        let follow_up = repo
            .approve_step(
                &ExpenseId("EXP-001".to_string()),
                &EmployeeId("EMP-ADMIN".to_string()),
                None,
                Utc::now(),
            )
            .await
            .expect("approve after reject");
        assert_eq!(follow_up, StepActionOutcome::NotCurrentStep);
    }

    #[tokio::test]
    async fn override_appends_sentinel_step_and_sets_status_directly() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        repo.create(sample_expense("EXP-001", vec![manager_step()], ExpenseStatus::Pending))
            .await
            .expect("create");
        repo.reject_step(
            &ExpenseId("EXP-001".to_string()),
            &EmployeeId("EMP-M".to_string()),
            "missing receipt".to_string(),
            Utc::now(),
        )
        .await
        .expect("reject");

        let step = override_step(
            EmployeeId("EMP-ADMIN".to_string()),
            ExpenseStatus::Approved,
            "policy exception",
            Utc::now(),
        );
        let expense = repo
            .append_override(
                &ExpenseId("EXP-001".to_string()),
                step,
                ExpenseStatus::Approved,
                Utc::now(),
            )
            .await
            .expect("override")
            .expect("expense should exist");

        assert_eq!(expense.status, ExpenseStatus::Approved);
        let synthetic = expense
            .steps
            .iter()
            .find(|step| step.sequence == OVERRIDE_SEQUENCE)
            .expect("override step should be recorded");
        assert_eq!(synthetic.status, StepStatus::Approved);
        assert_eq!(synthetic.comments.as_deref(), Some("Admin Override: policy exception"));
    }

    #[tokio::test]
    async fn pending_queue_only_lists_the_current_approvers_turn() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        // EMP-M first, then EMP-ADMIN: only EMP-M's queue shows the expense.
        let steps = vec![
            manager_step(),
            ApprovalStep::pending(EmployeeId("EMP-ADMIN".to_string()), 2),
        ];
        repo.create(sample_expense("EXP-001", steps, ExpenseStatus::Pending))
            .await
            .expect("create");

        let manager_queue = repo
            .list_pending_for_approver(&EmployeeId("EMP-M".to_string()))
            .await
            .expect("manager queue");
        assert_eq!(manager_queue.len(), 1);

        let admin_queue = repo
            .list_pending_for_approver(&EmployeeId("EMP-ADMIN".to_string()))
            .await
            .expect("admin queue");
        assert!(admin_queue.is_empty());

        repo.approve_step(
            &ExpenseId("EXP-001".to_string()),
            &EmployeeId("EMP-M".to_string()),
            None,
            Utc::now(),
        )
        .await
        .expect("approve first step");

        let admin_queue = repo
            .list_pending_for_approver(&EmployeeId("EMP-ADMIN".to_string()))
            .await
            .expect("admin queue after first approval");
        assert_eq!(admin_queue.len(), 1);

        let manager_queue = repo
            .list_pending_for_approver(&EmployeeId("EMP-M".to_string()))
            .await
            .expect("manager queue after approval");
        assert!(manager_queue.is_empty());
    }

    #[tokio::test]
    async fn history_is_sorted_newest_first() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        let mut older = sample_expense("EXP-OLD", vec![manager_step()], ExpenseStatus::Pending);
        older.created_at = Utc::now() - chrono::Duration::days(7);
        older.updated_at = older.created_at;
        repo.create(older).await.expect("create older");
        repo.create(sample_expense("EXP-NEW", vec![manager_step()], ExpenseStatus::Pending))
            .await
            .expect("create newer");

        let history = repo
            .list_for_employee(&EmployeeId("EMP-E".to_string()))
            .await
            .expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id.0, "EXP-NEW");
        assert_eq!(history[1].id.0, "EXP-OLD");
    }

    #[tokio::test]
    async fn team_query_covers_direct_reports_only() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        repo.create(sample_expense("EXP-001", vec![manager_step()], ExpenseStatus::Pending))
            .await
            .expect("create");

        // EMP-E reports to EMP-M; EMP-M reports to EMP-ADMIN.
        let team = repo
            .list_for_team(&EmployeeId("EMP-M".to_string()))
            .await
            .expect("team expenses");
        assert_eq!(team.len(), 1);
        assert_eq!(team[0].employee_id.0, "EMP-E");

        let admin_team = repo
            .list_for_team(&EmployeeId("EMP-ADMIN".to_string()))
            .await
            .expect("admin team expenses");
        assert!(admin_team.is_empty());
    }

    #[tokio::test]
    async fn company_query_joins_submitter_display_fields() {
        let pool = setup().await;
        let repo = SqlExpenseRepository::new(pool);

        repo.create(sample_expense("EXP-001", vec![manager_step()], ExpenseStatus::Pending))
            .await
            .expect("create");

        let company = repo
            .list_for_company(&CompanyId("CMP-001".to_string()))
            .await
            .expect("company expenses");
        assert_eq!(company.len(), 1);
        assert_eq!(company[0].submitter_name, "EMP-E");
        assert_eq!(company[0].submitter_email, "emp-e@acme.test");

        let other = repo
            .list_for_company(&CompanyId("CMP-unknown".to_string()))
            .await
            .expect("unknown company");
        assert!(other.is_empty());
    }
}
