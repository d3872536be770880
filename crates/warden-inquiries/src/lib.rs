//! Inquiries (button-click prompt recall) and pending updates (fork
//! reports queued for the next main-session turn).

pub mod error;
pub mod inquiries;
pub mod pending_updates;

pub use error::{InquiryError, Result};
pub use inquiries::Inquiries;
pub use pending_updates::{PendingUpdate, PendingUpdates};
