use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed entry at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("header parse error: {0}")]
    Header(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
