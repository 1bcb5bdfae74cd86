use thiserror::Error;

/// Failure to read a stored or submitted enum value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown payment status: {0}")]
    PaymentStatus(String),

    #[error("unknown payment method: {0}")]
    PaymentMethod(String),

    #[error("unknown project status: {0}")]
    ProjectStatus(String),
}
