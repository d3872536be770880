use thiserror::Error;

#[derive(Debug, Error)]
pub enum InquiryError {
    #[error(transparent)]
    Storage(#[from] warden_storage::StorageError),
}

pub type Result<T> = std::result::Result<T, InquiryError>;
