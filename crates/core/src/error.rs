#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}
