use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use expensey_core::domain::company::{ApprovalRule, ApprovalRuleId, Company, CompanyId, RuleKind};
use expensey_core::domain::employee::EmployeeId;

use super::{CompanyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCompanyRepository {
    pool: DbPool,
}

impl SqlCompanyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_rule_kind(s: &str) -> RuleKind {
    match s {
        "specific_approver" => RuleKind::SpecificApprover,
        "hybrid" => RuleKind::Hybrid,
        _ => RuleKind::Percentage,
    }
}

pub fn rule_kind_as_str(kind: &RuleKind) -> &'static str {
    match kind {
        RuleKind::Percentage => "percentage",
        RuleKind::SpecificApprover => "specific_approver",
        RuleKind::Hybrid => "hybrid",
    }
}

fn row_to_company(row: &sqlx::sqlite::SqliteRow) -> Result<Company, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let default_currency: String =
        row.try_get("default_currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let country_code: String =
        row.try_get("country_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let override_approval_enabled: bool = row
        .try_get("override_approval_enabled")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Company {
        id: CompanyId(id),
        name,
        default_currency,
        country_code,
        override_approval_enabled,
        created_at,
    })
}

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalRule, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company_id: String =
        row.try_get("company_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_str: String =
        row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let value_str: String =
        row.try_get("value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let specific_approver_id: Option<String> = row
        .try_get("specific_approver_id")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let value = Decimal::from_str(&value_str)
        .map_err(|e| RepositoryError::Decode(format!("rule value `{value_str}`: {e}")))?;

    Ok(ApprovalRule {
        id: ApprovalRuleId(id),
        company_id: CompanyId(company_id),
        name,
        kind: parse_rule_kind(&kind_str),
        value,
        specific_approver_id: specific_approver_id.map(EmployeeId),
    })
}

#[async_trait::async_trait]
impl CompanyRepository for SqlCompanyRepository {
    async fn create(&self, company: Company) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO company (id, name, default_currency, country_code,
                                  override_approval_enabled, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&company.id.0)
        .bind(&company.name)
        .bind(&company.default_currency)
        .bind(&company.country_code)
        .bind(company.override_approval_enabled)
        .bind(company.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, default_currency, country_code, override_approval_enabled, created_at
             FROM company WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_company(r)?)),
            None => Ok(None),
        }
    }

    async fn add_rule(&self, rule: ApprovalRule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval_rule (id, company_id, name, kind, value, specific_approver_id)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&rule.id.0)
        .bind(&rule.company_id.0)
        .bind(&rule.name)
        .bind(rule_kind_as_str(&rule.kind))
        .bind(rule.value.to_string())
        .bind(rule.specific_approver_id.as_ref().map(|id| id.0.clone()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_rule(&self, rule: ApprovalRule) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE approval_rule
             SET name = ?, kind = ?, value = ?, specific_approver_id = ?
             WHERE id = ? AND company_id = ?",
        )
        .bind(&rule.name)
        .bind(rule_kind_as_str(&rule.kind))
        .bind(rule.value.to_string())
        .bind(rule.specific_approver_id.as_ref().map(|id| id.0.clone()))
        .bind(&rule.id.0)
        .bind(&rule.company_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_rule_by_id(
        &self,
        id: &ApprovalRuleId,
    ) -> Result<Option<ApprovalRule>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, name, kind, value, specific_approver_id
             FROM approval_rule WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_rule(r)?)),
            None => Ok(None),
        }
    }

    async fn list_rules(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, company_id, name, kind, value, specific_approver_id
             FROM approval_rule WHERE company_id = ? ORDER BY name ASC",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_rule).collect::<Result<Vec<_>, _>>()
    }
}
