use chrono::{DateTime, Utc};
use sqlx::Row;

use expensey_core::domain::company::CompanyId;
use expensey_core::domain::employee::{Employee, EmployeeId, Role};

use super::{EmployeeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEmployeeRepository {
    pool: DbPool,
}

impl SqlEmployeeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_role(s: &str) -> Role {
    match s {
        "admin" => Role::Admin,
        "manager" => Role::Manager,
        _ => Role::Employee,
    }
}

pub fn role_as_str(role: &Role) -> &'static str {
    match role {
        Role::Employee => "employee",
        Role::Manager => "manager",
        Role::Admin => "admin",
    }
}

fn row_to_employee(row: &sqlx::sqlite::SqliteRow) -> Result<Employee, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company_id: String =
        row.try_get("company_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: String =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_str: String =
        row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_id: Option<String> =
        row.try_get("manager_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_manager_approver: bool = row
        .try_get("is_manager_approver")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Employee {
        id: EmployeeId(id),
        company_id: CompanyId(company_id),
        name,
        email,
        role: parse_role(&role_str),
        manager_id: manager_id.map(EmployeeId),
        is_manager_approver,
        created_at,
        updated_at,
    })
}

const EMPLOYEE_COLUMNS: &str = "id, company_id, name, email, role, manager_id, \
                                is_manager_approver, created_at, updated_at";

#[async_trait::async_trait]
impl EmployeeRepository for SqlEmployeeRepository {
    async fn create(&self, employee: Employee) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (id, company_id, name, email, role, manager_id,
                                   is_manager_approver, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&employee.id.0)
        .bind(&employee.company_id.0)
        .bind(&employee.name)
        .bind(&employee.email)
        .bind(role_as_str(&employee.role))
        .bind(employee.manager_id.as_ref().map(|id| id.0.clone()))
        .bind(employee.is_manager_approver)
        .bind(employee.created_at.to_rfc3339())
        .bind(employee.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employee WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_employee(r)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, employee: Employee) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE employee
             SET name = ?, email = ?, role = ?, manager_id = ?,
                 is_manager_approver = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&employee.name)
        .bind(&employee.email)
        .bind(role_as_str(&employee.role))
        .bind(employee.manager_id.as_ref().map(|id| id.0.clone()))
        .bind(employee.is_manager_approver)
        .bind(employee.updated_at.to_rfc3339())
        .bind(&employee.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Employee>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employee WHERE company_id = ? ORDER BY created_at ASC"
        ))
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_employee).collect::<Result<Vec<_>, _>>()
    }

    async fn find_designated_admin(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employee
             WHERE company_id = ? AND role = 'admin'
             ORDER BY created_at ASC
             LIMIT 1"
        ))
        .bind(&company_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_employee(r)?)),
            None => Ok(None),
        }
    }
}
