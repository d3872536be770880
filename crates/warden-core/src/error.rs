use thiserror::Error;

/// Top-level error type for configuration and cross-cutting concerns.
/// Component-specific errors (storage, budget, permissions, ...) live in
/// their own crates and convert into this one only at the CLI edge.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Short error code, mirrored in CLI diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            WardenError::Config(_) => "CONFIG_ERROR",
            WardenError::MissingEnv(_) => "MISSING_ENV",
            WardenError::Serialization(_) => "SERIALIZATION_ERROR",
            WardenError::Io(_) => "IO_ERROR",
            WardenError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
