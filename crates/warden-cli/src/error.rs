//! Process-edge error type. Everything downstream carries its own
//! crate-specific error; this only exists to give the CLI a single
//! `Display` to print and a single place to decide the exit code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] warden_core::WardenError),

    #[error(transparent)]
    Storage(#[from] warden_storage::StorageError),

    #[error(transparent)]
    Budget(#[from] warden_budget::BudgetError),

    #[error(transparent)]
    Schedule(#[from] warden_schedule::error::SchedulerError),

    #[error(transparent)]
    Agent(#[from] warden_agent::AgentError),

    #[error(transparent)]
    Inquiry(#[from] warden_inquiries::InquiryError),

    #[error("another warden process is already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// 0 for success, 1 for a user-facing error. Every path through this
    /// binary ends up here, so there is exactly one place that encodes
    /// that mapping.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
