use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

/// Origination floor: top-ups below the configured minimum are rejected
/// before a ledger row is ever created.
pub fn validate_topup_amount(amount: i64, min_amount: i64) -> ValidationResult {
    if amount < min_amount {
        return Err(ValidationError::new(
            "amount",
            format!("minimum top-up amount is {} UZS", min_amount),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_topup_floor() {
        assert!(validate_topup_amount(5000, 5000).is_ok());
        assert!(validate_topup_amount(15000, 5000).is_ok());
        assert!(validate_topup_amount(4999, 5000).is_err());
        assert!(validate_topup_amount(0, 5000).is_err());
        assert!(validate_topup_amount(-100, 5000).is_err());
    }
}
