use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("tool denied: {0}")]
    Denied(String),
    #[error("invalid tool input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Budget(#[from] warden_budget::BudgetError),
    #[error(transparent)]
    Inquiry(#[from] warden_inquiries::error::InquiryError),
    #[error(transparent)]
    Schedule(#[from] warden_schedule::error::SchedulerError),
    #[error("session backend failed: {0}")]
    Session(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
