use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalRuleId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Percentage,
    SpecificApprover,
    Hybrid,
}

/// A stored approval-rule definition. Rules are configuration owned by a
/// company; the default workflow generator does not consult them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub id: ApprovalRuleId,
    pub company_id: CompanyId,
    pub name: String,
    pub kind: RuleKind,
    /// Threshold for `Percentage`/`Hybrid` kinds, unused for `SpecificApprover`.
    pub value: Decimal,
    pub specific_approver_id: Option<EmployeeId>,
}

impl ApprovalRule {
    /// `SpecificApprover` and `Hybrid` rules must name an approver.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self.kind {
            RuleKind::SpecificApprover | RuleKind::Hybrid => {
                if self.specific_approver_id.is_none() {
                    return Err(DomainError::Validation(format!(
                        "rule `{}` requires specific_approver_id for its kind",
                        self.name
                    )));
                }
                Ok(())
            }
            RuleKind::Percentage => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    /// All expense amounts are normalized into this currency at submission.
    pub default_currency: String,
    pub country_code: String,
    pub override_approval_enabled: bool,
    pub created_at: DateTime<Utc>,
}
