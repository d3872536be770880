//! Atomic JSON and JSON-Lines persistence, shared by session state,
//! inquiries, pending updates, and the ping budget — all small files
//! rewritten wholesale on every update, so a torn write would otherwise
//! corrupt the entire file rather than just the last line.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StorageError};
use crate::markdown::atomic_write;

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Read and deserialize `path` as JSON. Returns `None` if the file
/// doesn't exist yet.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&text)?))
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    atomic_write(path, text.as_bytes())
}

/// Read every non-blank line of a JSON-Lines file, skipping and logging
/// any line that fails to deserialize.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut out = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(v) => out.push(v),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping malformed jsonl line"),
        }
    }
    Ok(out)
}

/// Append one record to a JSON-Lines file, creating it if needed. Not
/// atomic by itself (a bare append survives a crash as at worst a
/// truncated trailing line, which `read_jsonl` skips), but serialized
/// behind the caller's own lock.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    use std::io::Write as _;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    let line = serde_json::to_string(value)?;
    writeln!(file, "{line}").map_err(|e| io_err(path, e))?;
    Ok(())
}

/// Rewrite a JSON-Lines file keeping only records for which `keep`
/// returns true, via the same atomic tempfile+rename as everything else.
pub fn retain_jsonl<T, F>(path: &Path, mut keep: F) -> Result<()>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(&T) -> bool,
{
    let records: Vec<T> = read_jsonl(path)?.into_iter().filter(|r| keep(r)).collect();
    let mut body = String::new();
    for record in &records {
        body.push_str(&serde_json::to_string(record)?);
        body.push('\n');
    }
    atomic_write(path, body.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Rec {
        id: String,
        n: i32,
    }

    #[test]
    fn json_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        let rec = Rec { id: "a".into(), n: 1 };
        write_json(&path, &rec).unwrap();
        let back: Rec = read_json(&path).unwrap().unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn missing_json_file_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing.json");
        assert!(read_json::<Rec>(&path).unwrap().is_none());
    }

    #[test]
    fn jsonl_append_and_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        append_jsonl(&path, &Rec { id: "a".into(), n: 1 }).unwrap();
        append_jsonl(&path, &Rec { id: "b".into(), n: 2 }).unwrap();
        let all: Vec<Rec> = read_jsonl(&path).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].id, "b");
    }

    #[test]
    fn jsonl_retain_drops_filtered_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        append_jsonl(&path, &Rec { id: "a".into(), n: 1 }).unwrap();
        append_jsonl(&path, &Rec { id: "b".into(), n: 2 }).unwrap();
        retain_jsonl::<Rec, _>(&path, |r| r.n != 1).unwrap();
        let remaining: Vec<Rec> = read_jsonl(&path).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "b");
    }
}
