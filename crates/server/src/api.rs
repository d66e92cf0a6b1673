//! REST surface for the expense reimbursement workflow.
//!
//! Endpoints:
//! - `POST  /api/v1/companies`                        — company signup (company + first admin)
//! - `GET   /api/v1/companies/{id}`                   — company detail
//! - `POST  /api/v1/companies/{id}/rules`             — add an approval rule
//! - `PUT   /api/v1/companies/{id}/rules/{rule_id}`   — edit an approval rule
//! - `GET   /api/v1/companies/{id}/rules`             — list approval rules
//! - `POST  /api/v1/employees`                        — create an employee
//! - `PATCH /api/v1/employees/{id}`                   — mutate role / manager / approver flag
//! - `GET   /api/v1/employees?company_id=`            — list company employees
//! - `POST  /api/v1/expenses`                         — submit an expense
//! - `GET   /api/v1/expenses/{id}`                    — expense detail
//! - `PATCH /api/v1/expenses/{id}`                    — submitter edits while Pending
//! - `POST  /api/v1/expenses/{id}/approve`            — approve the current step
//! - `POST  /api/v1/expenses/{id}/reject`             — reject the current step
//! - `POST  /api/v1/expenses/{id}/override`           — admin override
//! - `GET   /api/v1/approvals/pending?approver_id=`   — pending-approval queue
//! - `GET   /api/v1/expenses?employee_id=`            — submission history
//! - `GET   /api/v1/expenses/team?manager_id=`        — direct reports' expenses
//! - `GET   /api/v1/expenses/company?company_id=`     — all company expenses

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use expensey_core::currency::{ConversionError, CurrencyConverter};
use expensey_core::domain::company::{ApprovalRule, ApprovalRuleId, Company, CompanyId, RuleKind};
use expensey_core::domain::employee::{Employee, EmployeeId, Role};
use expensey_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use expensey_core::errors::DomainError;
use expensey_core::workflow::{
    override_step, validate_override_status, validate_rejection_comments,
    ManagerApproverGenerator, StepGenerator,
};
use expensey_db::repositories::{
    CompanyRepository, EmployeeRepository, ExpenseRepository, RepositoryError,
    SqlCompanyRepository, SqlEmployeeRepository, SqlExpenseRepository, StepActionOutcome,
};
use expensey_db::DbPool;

#[derive(Clone)]
pub struct ApiState {
    db_pool: DbPool,
    converter: Arc<CurrencyConverter>,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub default_currency: String,
    pub country_code: String,
    pub admin_name: String,
    pub admin_email: String,
}

#[derive(Debug, Serialize)]
pub struct CompanyResponse {
    pub company: Company,
    pub admin: Option<Employee>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub kind: RuleKind,
    pub value: Decimal,
    pub specific_approver_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmployeeRequest {
    pub company_id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub manager_id: Option<String>,
    #[serde(default)]
    pub is_manager_approver: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmployeeRequest {
    pub role: Option<Role>,
    pub manager_id: Option<String>,
    pub is_manager_approver: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitExpenseRequest {
    pub employee_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub date_of_expense: NaiveDate,
    pub receipt_data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateExpenseRequest {
    pub employee_id: String,
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub date_of_expense: Option<NaiveDate>,
    pub receipt_data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveStepRequest {
    pub approver_id: String,
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectStepRequest {
    pub approver_id: String,
    pub comments: String,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub admin_id: String,
    pub company_id: String,
    pub status: ExpenseStatus,
    pub comments: String,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub approver_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub employee_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TeamQuery {
    pub manager_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CompanyQuery {
    pub company_id: String,
}

/// Summary projection used by the history listing.
#[derive(Debug, Serialize)]
pub struct ExpenseSummary {
    pub id: String,
    pub amount: Decimal,
    pub currency: String,
    pub amount_in_company_currency: Decimal,
    pub category: String,
    pub description: String,
    pub date_of_expense: NaiveDate,
    pub status: ExpenseStatus,
    pub created_at: String,
}

impl From<&Expense> for ExpenseSummary {
    fn from(expense: &Expense) -> Self {
        Self {
            id: expense.id.0.clone(),
            amount: expense.amount,
            currency: expense.currency.clone(),
            amount_in_company_currency: expense.amount_in_company_currency,
            category: expense.category.clone(),
            description: expense.description.clone(),
            date_of_expense: expense.date_of_expense,
            status: expense.status,
            created_at: expense.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompanyExpenseResponse {
    #[serde(flatten)]
    pub expense: Expense,
    pub submitter_name: String,
    pub submitter_email: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(db_pool: DbPool, converter: Arc<CurrencyConverter>) -> Router {
    Router::new()
        .route("/api/v1/companies", post(create_company))
        .route("/api/v1/companies/{id}", get(get_company))
        .route("/api/v1/companies/{id}/rules", post(add_rule).get(list_rules))
        .route("/api/v1/companies/{id}/rules/{rule_id}", put(update_rule))
        .route("/api/v1/employees", post(create_employee).get(list_employees))
        .route("/api/v1/employees/{id}", patch(update_employee))
        .route("/api/v1/expenses", post(submit_expense).get(expense_history))
        .route("/api/v1/expenses/team", get(team_expenses))
        .route("/api/v1/expenses/company", get(company_expenses))
        .route("/api/v1/expenses/{id}", get(expense_detail).patch(update_expense))
        .route("/api/v1/expenses/{id}/approve", post(approve_expense))
        .route("/api/v1/expenses/{id}/reject", post(reject_expense))
        .route("/api/v1/expenses/{id}/override", post(override_expense))
        .route("/api/v1/approvals/pending", get(pending_approvals))
        .with_state(ApiState { db_pool, converter })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

fn repo_error(error: RepositoryError) -> (StatusCode, Json<ApiError>) {
    error!(error = %error, "repository error");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiError { error: "storage temporarily unavailable".to_string() }),
    )
}

fn domain_error(error: DomainError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
    };
    (status, Json(ApiError { error: error.to_string() }))
}

fn not_found(entity: &'static str, id: &str) -> (StatusCode, Json<ApiError>) {
    domain_error(DomainError::not_found(entity, id))
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message.into() }))
}

fn forbidden(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::FORBIDDEN, Json(ApiError { error: message.into() }))
}

fn conversion_error(error: ConversionError) -> (StatusCode, Json<ApiError>) {
    match error {
        // The caller picked a currency the source does not publish.
        ConversionError::UnknownPair { .. } => bad_request(error.to_string()),
        ConversionError::UpstreamUnavailable(_) => {
            (StatusCode::BAD_GATEWAY, Json(ApiError { error: error.to_string() }))
        }
    }
}

fn require_id(value: &str, field: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(bad_request(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().to_string()[..12])
}

// ---------------------------------------------------------------------------
// Company handlers
// ---------------------------------------------------------------------------

async fn create_company(
    State(state): State<ApiState>,
    Json(body): Json<CreateCompanyRequest>,
) -> ApiResult<(StatusCode, Json<CompanyResponse>)> {
    let name = body.name.trim();
    let currency = body.default_currency.trim().to_ascii_uppercase();
    if name.is_empty() || currency.is_empty() {
        return Err(bad_request("name and default_currency are required"));
    }
    let admin_name = body.admin_name.trim();
    let admin_email = body.admin_email.trim();
    if admin_name.is_empty() || !admin_email.contains('@') {
        return Err(bad_request("admin_name and a valid admin_email are required"));
    }

    let now = Utc::now();
    let company = Company {
        id: CompanyId(new_id("CMP")),
        name: name.to_string(),
        default_currency: currency,
        country_code: body.country_code.trim().to_ascii_uppercase(),
        override_approval_enabled: true,
        created_at: now,
    };
    let admin = Employee {
        id: EmployeeId(new_id("EMP")),
        company_id: company.id.clone(),
        name: admin_name.to_string(),
        email: admin_email.to_string(),
        role: Role::Admin,
        manager_id: None,
        is_manager_approver: false,
        created_at: now,
        updated_at: now,
    };

    let companies = SqlCompanyRepository::new(state.db_pool.clone());
    let employees = SqlEmployeeRepository::new(state.db_pool.clone());
    companies.create(company.clone()).await.map_err(repo_error)?;
    employees.create(admin.clone()).await.map_err(repo_error)?;

    info!(
        event_name = "company.created",
        correlation_id = %company.id.0,
        company_id = %company.id.0,
        "company signed up with initial admin"
    );

    Ok((StatusCode::CREATED, Json(CompanyResponse { company, admin: Some(admin) })))
}

async fn get_company(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<CompanyResponse>> {
    let companies = SqlCompanyRepository::new(state.db_pool.clone());
    let company = companies
        .find_by_id(&CompanyId(id.clone()))
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("company", &id))?;

    let employees = SqlEmployeeRepository::new(state.db_pool.clone());
    let admin = employees.find_designated_admin(&company.id).await.map_err(repo_error)?;

    Ok(Json(CompanyResponse { company, admin }))
}

async fn add_rule(
    Path(company_id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<CreateRuleRequest>,
) -> ApiResult<(StatusCode, Json<ApprovalRule>)> {
    let companies = SqlCompanyRepository::new(state.db_pool.clone());
    companies
        .find_by_id(&CompanyId(company_id.clone()))
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("company", &company_id))?;

    let rule = ApprovalRule {
        id: ApprovalRuleId(new_id("RULE")),
        company_id: CompanyId(company_id),
        name: body.name.trim().to_string(),
        kind: body.kind,
        value: body.value,
        specific_approver_id: body.specific_approver_id.map(EmployeeId),
    };
    rule.validate().map_err(domain_error)?;
    if rule.name.is_empty() {
        return Err(bad_request("rule name is required"));
    }

    companies.add_rule(rule.clone()).await.map_err(repo_error)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn update_rule(
    Path((company_id, rule_id)): Path<(String, String)>,
    State(state): State<ApiState>,
    Json(body): Json<CreateRuleRequest>,
) -> ApiResult<Json<ApprovalRule>> {
    let rule = ApprovalRule {
        id: ApprovalRuleId(rule_id.clone()),
        company_id: CompanyId(company_id),
        name: body.name.trim().to_string(),
        kind: body.kind,
        value: body.value,
        specific_approver_id: body.specific_approver_id.map(EmployeeId),
    };
    rule.validate().map_err(domain_error)?;

    let companies = SqlCompanyRepository::new(state.db_pool.clone());
    let updated = companies.update_rule(rule.clone()).await.map_err(repo_error)?;
    if !updated {
        return Err(not_found("approval rule", &rule_id));
    }
    Ok(Json(rule))
}

async fn list_rules(
    Path(company_id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Vec<ApprovalRule>>> {
    let companies = SqlCompanyRepository::new(state.db_pool.clone());
    let rules =
        companies.list_rules(&CompanyId(company_id)).await.map_err(repo_error)?;
    Ok(Json(rules))
}

// ---------------------------------------------------------------------------
// Employee handlers
// ---------------------------------------------------------------------------

async fn create_employee(
    State(state): State<ApiState>,
    Json(body): Json<CreateEmployeeRequest>,
) -> ApiResult<(StatusCode, Json<Employee>)> {
    let company_id = require_id(&body.company_id, "company_id")?;
    let name = body.name.trim();
    let email = body.email.trim();
    if name.is_empty() || !email.contains('@') {
        return Err(bad_request("name and a valid email are required"));
    }

    let companies = SqlCompanyRepository::new(state.db_pool.clone());
    companies
        .find_by_id(&CompanyId(company_id.clone()))
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("company", &company_id))?;

    let employees = SqlEmployeeRepository::new(state.db_pool.clone());
    if let Some(manager_id) = &body.manager_id {
        employees
            .find_by_id(&EmployeeId(manager_id.clone()))
            .await
            .map_err(repo_error)?
            .ok_or_else(|| not_found("employee", manager_id))?;
    }

    let now = Utc::now();
    let employee = Employee {
        id: EmployeeId(new_id("EMP")),
        company_id: CompanyId(company_id),
        name: name.to_string(),
        email: email.to_string(),
        role: body.role,
        manager_id: body.manager_id.map(EmployeeId),
        is_manager_approver: body.is_manager_approver,
        created_at: now,
        updated_at: now,
    };
    employees.create(employee.clone()).await.map_err(repo_error)?;

    Ok((StatusCode::CREATED, Json(employee)))
}

async fn update_employee(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<UpdateEmployeeRequest>,
) -> ApiResult<Json<Employee>> {
    let employees = SqlEmployeeRepository::new(state.db_pool.clone());
    let mut employee = employees
        .find_by_id(&EmployeeId(id.clone()))
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("employee", &id))?;

    if let Some(manager_id) = &body.manager_id {
        if manager_id == &employee.id.0 {
            return Err(bad_request("an employee cannot be their own manager"));
        }
        employees
            .find_by_id(&EmployeeId(manager_id.clone()))
            .await
            .map_err(repo_error)?
            .ok_or_else(|| not_found("employee", manager_id))?;
        employee.manager_id = Some(EmployeeId(manager_id.clone()));
    }
    if let Some(role) = body.role {
        employee.role = role;
    }
    if let Some(is_manager_approver) = body.is_manager_approver {
        employee.is_manager_approver = is_manager_approver;
    }
    employee.updated_at = Utc::now();

    employees.update(employee.clone()).await.map_err(repo_error)?;
    Ok(Json(employee))
}

async fn list_employees(
    Query(query): Query<CompanyQuery>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Vec<Employee>>> {
    let company_id = require_id(&query.company_id, "company_id")?;
    let employees = SqlEmployeeRepository::new(state.db_pool.clone());
    let listed =
        employees.list_for_company(&CompanyId(company_id)).await.map_err(repo_error)?;
    Ok(Json(listed))
}

// ---------------------------------------------------------------------------
// Expense lifecycle handlers
// ---------------------------------------------------------------------------

async fn submit_expense(
    State(state): State<ApiState>,
    Json(body): Json<SubmitExpenseRequest>,
) -> ApiResult<(StatusCode, Json<Expense>)> {
    let employee_id = require_id(&body.employee_id, "employee_id")?;
    let currency = body.currency.trim().to_ascii_uppercase();
    if currency.is_empty() {
        return Err(bad_request("currency is required"));
    }
    if body.amount <= Decimal::ZERO {
        return Err(bad_request("amount must be positive"));
    }

    let employees = SqlEmployeeRepository::new(state.db_pool.clone());
    let submitter = employees
        .find_by_id(&EmployeeId(employee_id.clone()))
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("employee", &employee_id))?;

    let companies = SqlCompanyRepository::new(state.db_pool.clone());
    let company = companies
        .find_by_id(&submitter.company_id)
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("company", &submitter.company_id.0))?;

    // Conversion runs before any write: a failed lookup leaves no partial
    // expense behind.
    let amount_in_company_currency = state
        .converter
        .convert(body.amount, &currency, &company.default_currency)
        .await
        .map_err(conversion_error)?;

    let designated_admin =
        employees.find_designated_admin(&company.id).await.map_err(repo_error)?;
    let plan = ManagerApproverGenerator
        .plan(&submitter, &company, designated_admin.as_ref())
        .map_err(domain_error)?;

    let now = Utc::now();
    let expense = Expense {
        id: ExpenseId(new_id("EXP")),
        employee_id: submitter.id.clone(),
        company_id: company.id.clone(),
        amount: body.amount,
        currency,
        amount_in_company_currency,
        category: body.category.trim().to_string(),
        description: body.description.trim().to_string(),
        date_of_expense: body.date_of_expense,
        receipt_data: body.receipt_data,
        status: plan.initial_status,
        steps: plan.steps,
        conditional_rule_applied: None,
        created_at: now,
        updated_at: now,
    };

    let expenses = SqlExpenseRepository::new(state.db_pool.clone());
    expenses.create(expense.clone()).await.map_err(repo_error)?;

    record_audit_event(
        &state.db_pool,
        Some(&expense.id.0),
        &submitter.id.0,
        "expense.submitted",
        &format!(
            "{} {} submitted by {} ({} {} in company currency)",
            expense.amount, expense.currency, submitter.name,
            expense.amount_in_company_currency, company.default_currency
        ),
    )
    .await;

    info!(
        event_name = "expense.submitted",
        correlation_id = %expense.id.0,
        expense_id = %expense.id.0,
        employee_id = %submitter.id.0,
        status = ?expense.status,
        "expense submitted"
    );

    Ok((StatusCode::CREATED, Json(expense)))
}

async fn expense_detail(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Expense>> {
    let expenses = SqlExpenseRepository::new(state.db_pool.clone());
    let expense = expenses
        .find_by_id(&ExpenseId(id.clone()))
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("expense", &id))?;
    Ok(Json(expense))
}

async fn update_expense(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<UpdateExpenseRequest>,
) -> ApiResult<Json<Expense>> {
    let employee_id = require_id(&body.employee_id, "employee_id")?;

    let expenses = SqlExpenseRepository::new(state.db_pool.clone());
    let mut expense = expenses
        .find_by_id(&ExpenseId(id.clone()))
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("expense", &id))?;

    if expense.employee_id.0 != employee_id {
        return Err(forbidden("only the submitter may edit an expense"));
    }
    if !expense.is_editable() {
        return Err(forbidden("expense is no longer editable"));
    }

    // The converted amount stays fixed at its submission-time value even if
    // the raw amount is edited.
    if let Some(amount) = body.amount {
        if amount <= Decimal::ZERO {
            return Err(bad_request("amount must be positive"));
        }
        expense.amount = amount;
    }
    if let Some(category) = body.category {
        expense.category = category.trim().to_string();
    }
    if let Some(description) = body.description {
        expense.description = description.trim().to_string();
    }
    if let Some(date_of_expense) = body.date_of_expense {
        expense.date_of_expense = date_of_expense;
    }
    if let Some(receipt_data) = body.receipt_data {
        expense.receipt_data = Some(receipt_data);
    }
    expense.updated_at = Utc::now();

    expenses.update_details(expense.clone()).await.map_err(repo_error)?;
    Ok(Json(expense))
}

async fn approve_expense(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<ApproveStepRequest>,
) -> ApiResult<Json<Expense>> {
    let approver_id = require_id(&body.approver_id, "approver_id")?;

    let expenses = SqlExpenseRepository::new(state.db_pool.clone());
    let outcome = expenses
        .approve_step(
            &ExpenseId(id.clone()),
            &EmployeeId(approver_id.clone()),
            body.comments.clone(),
            Utc::now(),
        )
        .await
        .map_err(repo_error)?;

    let expense = match outcome {
        StepActionOutcome::Applied(expense) => expense,
        StepActionOutcome::NotCurrentStep => {
            return Err(forbidden(format!(
                "no pending approval step for approver `{approver_id}`"
            )))
        }
        StepActionOutcome::ExpenseMissing => return Err(not_found("expense", &id)),
    };

    record_audit_event(
        &state.db_pool,
        Some(&expense.id.0),
        &approver_id,
        "expense.step_approved",
        &format!("step approved by {approver_id}; expense is now {:?}", expense.status),
    )
    .await;

    info!(
        event_name = "expense.step_approved",
        correlation_id = %expense.id.0,
        expense_id = %expense.id.0,
        approver_id = %approver_id,
        status = ?expense.status,
        "approval step applied"
    );

    Ok(Json(expense))
}

async fn reject_expense(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<RejectStepRequest>,
) -> ApiResult<Json<Expense>> {
    let approver_id = require_id(&body.approver_id, "approver_id")?;
    validate_rejection_comments(&body.comments).map_err(domain_error)?;

    let expenses = SqlExpenseRepository::new(state.db_pool.clone());
    let outcome = expenses
        .reject_step(
            &ExpenseId(id.clone()),
            &EmployeeId(approver_id.clone()),
            body.comments.trim().to_string(),
            Utc::now(),
        )
        .await
        .map_err(repo_error)?;

    let expense = match outcome {
        StepActionOutcome::Applied(expense) => expense,
        StepActionOutcome::NotCurrentStep => {
            return Err(forbidden(format!(
                "no pending approval step for approver `{approver_id}`"
            )))
        }
        StepActionOutcome::ExpenseMissing => return Err(not_found("expense", &id)),
    };

    record_audit_event(
        &state.db_pool,
        Some(&expense.id.0),
        &approver_id,
        "expense.step_rejected",
        &format!("step rejected by {approver_id}"),
    )
    .await;

    info!(
        event_name = "expense.step_rejected",
        correlation_id = %expense.id.0,
        expense_id = %expense.id.0,
        approver_id = %approver_id,
        "rejection applied, workflow terminated"
    );

    Ok(Json(expense))
}

async fn override_expense(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<OverrideRequest>,
) -> ApiResult<Json<Expense>> {
    let admin_id = require_id(&body.admin_id, "admin_id")?;
    let company_id = require_id(&body.company_id, "company_id")?;
    validate_override_status(body.status).map_err(domain_error)?;

    let companies = SqlCompanyRepository::new(state.db_pool.clone());
    let company = companies
        .find_by_id(&CompanyId(company_id.clone()))
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("company", &company_id))?;
    if !company.override_approval_enabled {
        return Err(forbidden("admin override is disabled for this company"));
    }

    let employees = SqlEmployeeRepository::new(state.db_pool.clone());
    let admin = employees
        .find_by_id(&EmployeeId(admin_id.clone()))
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("employee", &admin_id))?;
    if admin.role != Role::Admin || admin.company_id != company.id {
        return Err(forbidden("override requires an admin of the expense's company"));
    }

    let expenses = SqlExpenseRepository::new(state.db_pool.clone());
    let existing = expenses
        .find_by_id(&ExpenseId(id.clone()))
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("expense", &id))?;
    if existing.company_id != company.id {
        return Err(not_found("expense", &id));
    }

    let now = Utc::now();
    let step = override_step(admin.id.clone(), body.status, body.comments.trim(), now);
    let expense = expenses
        .append_override(&ExpenseId(id.clone()), step, body.status, now)
        .await
        .map_err(repo_error)?
        .ok_or_else(|| not_found("expense", &id))?;

    record_audit_event(
        &state.db_pool,
        Some(&expense.id.0),
        &admin.id.0,
        "expense.overridden",
        &format!("status forced to {:?} by {}", body.status, admin.name),
    )
    .await;

    info!(
        event_name = "expense.overridden",
        correlation_id = %expense.id.0,
        expense_id = %expense.id.0,
        admin_id = %admin.id.0,
        status = ?body.status,
        "admin override applied"
    );

    Ok(Json(expense))
}

// ---------------------------------------------------------------------------
// Query handlers
// ---------------------------------------------------------------------------

async fn pending_approvals(
    Query(query): Query<PendingQuery>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Vec<Expense>>> {
    let approver_id = require_id(&query.approver_id, "approver_id")?;
    let expenses = SqlExpenseRepository::new(state.db_pool.clone());
    let pending = expenses
        .list_pending_for_approver(&EmployeeId(approver_id))
        .await
        .map_err(repo_error)?;
    Ok(Json(pending))
}

async fn expense_history(
    Query(query): Query<HistoryQuery>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Vec<ExpenseSummary>>> {
    let employee_id = require_id(&query.employee_id, "employee_id")?;
    let expenses = SqlExpenseRepository::new(state.db_pool.clone());
    let history =
        expenses.list_for_employee(&EmployeeId(employee_id)).await.map_err(repo_error)?;
    Ok(Json(history.iter().map(ExpenseSummary::from).collect()))
}

async fn team_expenses(
    Query(query): Query<TeamQuery>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Vec<Expense>>> {
    let manager_id = require_id(&query.manager_id, "manager_id")?;
    let expenses = SqlExpenseRepository::new(state.db_pool.clone());
    let team = expenses.list_for_team(&EmployeeId(manager_id)).await.map_err(repo_error)?;
    Ok(Json(team))
}

async fn company_expenses(
    Query(query): Query<CompanyQuery>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Vec<CompanyExpenseResponse>>> {
    let company_id = require_id(&query.company_id, "company_id")?;
    let expenses = SqlExpenseRepository::new(state.db_pool.clone());
    let listed =
        expenses.list_for_company(&CompanyId(company_id)).await.map_err(repo_error)?;
    Ok(Json(
        listed
            .into_iter()
            .map(|entry| CompanyExpenseResponse {
                expense: entry.expense,
                submitter_name: entry.submitter_name,
                submitter_email: entry.submitter_email,
            })
            .collect(),
    ))
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

async fn record_audit_event(
    pool: &DbPool,
    expense_id: Option<&str>,
    actor: &str,
    event_type: &str,
    detail: &str,
) {
    let now = Utc::now();
    let audit_id = new_id("AUD");
    let payload = serde_json::json!({ "detail": detail }).to_string();

    let result = sqlx::query(
        "INSERT INTO audit_event (id, timestamp, actor, expense_id, event_type, payload_json)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&audit_id)
    .bind(now.to_rfc3339())
    .bind(actor)
    .bind(expense_id)
    .bind(event_type)
    .bind(&payload)
    .execute(pool)
    .await;

    if let Err(e) = result {
        error!(
            event_name = "audit.write_failed",
            expense_id = expense_id.unwrap_or("unknown"),
            error = %e,
            "failed to write audit event"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
