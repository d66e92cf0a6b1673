use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("currency rate source failure: {0}")]
    RateSource(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Whether a caller could reasonably retry the failed request as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::RateSource(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplicationError, DomainError};

    #[test]
    fn not_found_names_the_entity_and_id() {
        let error = DomainError::not_found("expense", "EXP-42");
        assert_eq!(error.to_string(), "expense `EXP-42` not found");
    }

    #[test]
    fn domain_errors_are_not_retryable() {
        let error = ApplicationError::from(DomainError::Forbidden("not your step".to_string()));
        assert!(!error.is_retryable());
    }

    #[test]
    fn upstream_failures_are_retryable() {
        assert!(ApplicationError::RateSource("timeout".to_string()).is_retryable());
        assert!(ApplicationError::Persistence("lock timeout".to_string()).is_retryable());
        assert!(!ApplicationError::Configuration("bad url".to_string()).is_retryable());
    }
}
