//! Atomic file persistence for schedule entries and small JSON/JSONL
//! state files: the on-disk substrate every other component reads and
//! writes through.

pub mod error;
pub mod git;
pub mod json;
pub mod markdown;
pub mod sessions;
pub mod slug;

pub use error::{Result, StorageError};
pub use markdown::MdEntry;
pub use sessions::{SessionEvent, SessionRecord, SessionStore};

use serde_yaml::Mapping;

/// Pull the `id` field out of a parsed header, if present and a string.
pub(crate) fn id_field(header: &Mapping) -> Option<String> {
    header
        .get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
