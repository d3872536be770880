use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Storage(#[from] warden_storage::StorageError),

    #[error("invalid cron expression {expr:?}: {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("chain_depth {depth} exceeds max_chain {max}")]
    ChainDepthExceedsMax { depth: u32, max: u32 },

    #[error("allowed_tools and blocked_tools are mutually exclusive")]
    ToolFilterConflict,

    #[error("entry not found: {id}")]
    NotFound { id: String },

    #[error("missing required header field {0:?}")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
