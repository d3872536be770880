use thiserror::Error;

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error(transparent)]
    Storage(#[from] warden_storage::StorageError),
}

pub type Result<T> = std::result::Result<T, BudgetError>;
