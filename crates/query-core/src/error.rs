use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Transformation error: {0}")]
    Transformation(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueryError {
    /// Whether this error originated in a transformation pipeline
    pub fn is_transformation_error(&self) -> bool {
        matches!(
            self,
            QueryError::Transformation(_)
                | QueryError::ColumnNotFound(_)
                | QueryError::InvalidParameter { .. }
                | QueryError::Arrow(_)
        )
    }

    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
