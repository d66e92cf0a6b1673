use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    Manager,
    Admin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub company_id: CompanyId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub manager_id: Option<EmployeeId>,
    /// When true, this employee's expenses route to their manager first.
    pub is_manager_approver: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    /// Admin submitters are exempt from approval on their own expenses.
    pub fn is_self_approving(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::company::CompanyId;

    use super::{Employee, EmployeeId, Role};

    fn employee(role: Role) -> Employee {
        let now = Utc::now();
        Employee {
            id: EmployeeId("EMP-1".to_string()),
            company_id: CompanyId("CMP-1".to_string()),
            name: "Dana".to_string(),
            email: "dana@acme.test".to_string(),
            role,
            manager_id: None,
            is_manager_approver: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn admins_are_self_approving() {
        assert!(employee(Role::Admin).is_self_approving());
        assert!(!employee(Role::Manager).is_self_approving());
        assert!(!employee(Role::Employee).is_self_approving());
    }
}
