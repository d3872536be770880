//! Atomic read/write of the `---`-delimited markdown entry format shared
//! by routines, reminders, webhooks, and any other schedule entry: a
//! YAML front-matter header between `---` lines, followed by a free-text
//! body.
//!
//! Readers must tolerate unknown header keys (forward compatibility) and
//! writers must omit any key that equals its type's default, so files
//! stay minimal and diff-friendly.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde_yaml::Mapping;

use crate::error::{Result, StorageError};
use crate::slug::slugify;
use crate::{git, id_field};

/// One parsed entry: its header fields and free-text body.
#[derive(Debug, Clone)]
pub struct MdEntry {
    pub header: Mapping,
    pub body: String,
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Render `header` + `body` into the on-disk format.
pub fn serialize(header: &Mapping, body: &str) -> Result<String> {
    let yaml = if header.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(header)?
    };
    Ok(format!("---\n{yaml}---\n{body}\n"))
}

/// Parse the on-disk format back into a header mapping and body string.
/// Unknown keys in the header are passed through untouched — it's the
/// caller's job to pick out the fields it understands.
pub fn parse(text: &str) -> Result<MdEntry> {
    let mut parts = text.splitn(3, "---\n");
    let _leading = parts.next().unwrap_or_default();
    let header_block = parts.next().ok_or_else(|| StorageError::Malformed {
        path: String::new(),
        reason: "missing header delimiters".to_string(),
    })?;
    let body = parts.next().unwrap_or_default();

    let header: Mapping = if header_block.trim().is_empty() {
        Mapping::new()
    } else {
        serde_yaml::from_str(header_block)?
    };

    Ok(MdEntry {
        header,
        body: body.trim_end_matches('\n').to_string(),
    })
}

/// Read every `*.md` file in `dir`, sorted by filename. Files that fail
/// to parse are logged and skipped rather than aborting the whole read.
pub fn read_dir(dir: &Path) -> Result<Vec<(PathBuf, MdEntry)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
        .collect();
    paths.sort();

    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read entry");
                continue;
            }
        };
        match parse(&text) {
            Ok(entry) => out.push((path, entry)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse entry, skipping");
            }
        }
    }
    Ok(out)
}

/// Write an entry identified by `id` into `dir`, slugging `slug_source`
/// for the filename. If a file in `dir` already has a header `id` field
/// matching `id`, it is overwritten in place; otherwise a new
/// `<slug>.md` file is created, with a numeric suffix (`<slug>-2.md`,
/// ...) on filename collision.
pub fn write(dir: &Path, id: &str, slug_source: &str, header: &Mapping, body: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let existing = read_dir(dir)?
        .into_iter()
        .find(|(_, entry)| id_field(&entry.header).as_deref() == Some(id));

    let path = match existing {
        Some((path, _)) => path,
        None => unique_path(dir, &slugify(slug_source)),
    };

    let rendered = serialize(header, body)?;
    atomic_write(&path, rendered.as_bytes())?;
    git::commit(&path, &format!("update {id}"));
    Ok(path)
}

fn unique_path(dir: &Path, slug: &str) -> PathBuf {
    let candidate = dir.join(format!("{slug}.md"));
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 2;
    loop {
        let candidate = dir.join(format!("{slug}-{n}.md"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Remove the entry whose header `id` field matches `id`. Returns
/// whether an entry was found and removed.
pub fn remove(dir: &Path, id: &str) -> Result<bool> {
    let found = read_dir(dir)?
        .into_iter()
        .find(|(_, entry)| id_field(&entry.header).as_deref() == Some(id));

    let Some((path, _)) = found else {
        return Ok(false);
    };
    fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
    git::rm_commit(&path, &format!("remove {id}"));
    Ok(true)
}

/// Write `bytes` to `path` via a temp file in the same directory plus an
/// atomic rename, so a crash mid-write never leaves a truncated file.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_err(dir, e))?;
    tmp.write_all(bytes).map_err(|e| io_err(path, e))?;
    tmp.flush().map_err(|e| io_err(path, e))?;
    tmp.persist(path)
        .map_err(|e| io_err(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(pairs: &[(&str, &str)]) -> Mapping {
        let mut m = Mapping::new();
        for (k, v) in pairs {
            m.insert((*k).into(), (*v).into());
        }
        m
    }

    #[test]
    fn round_trips_header_and_body() {
        let h = header(&[("id", "abc12345"), ("cron", "0 9 * * *")]);
        let rendered = serialize(&h, "Take out the trash").unwrap();
        let parsed = parse(&rendered).unwrap();
        assert_eq!(parsed.body, "Take out the trash");
        assert_eq!(
            parsed.header.get("id").unwrap().as_str().unwrap(),
            "abc12345"
        );
    }

    #[test]
    fn tolerates_unknown_header_keys() {
        let rendered = "---\nid: x\nfuture_field: 1\n---\nbody\n";
        let parsed = parse(rendered).unwrap();
        assert_eq!(parsed.body, "body");
        assert!(parsed.header.contains_key("future_field"));
    }

    #[test]
    fn write_then_read_dir_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let h = header(&[("id", "abc12345")]);
        write(tmp.path(), "abc12345", "Water the plants", &h, "Water the plants").unwrap();
        let entries = read_dir(tmp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.body, "Water the plants");
    }

    #[test]
    fn write_overwrites_matching_id_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let h1 = header(&[("id", "abc12345")]);
        let path1 = write(tmp.path(), "abc12345", "first", &h1, "first").unwrap();
        let h2 = header(&[("id", "abc12345")]);
        let path2 = write(tmp.path(), "abc12345", "first", &h2, "second").unwrap();
        assert_eq!(path1, path2);
        assert_eq!(read_dir(tmp.path()).unwrap().len(), 1);
    }

    #[test]
    fn filename_collision_gets_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "id-one", "same slug", &header(&[("id", "id-one")]), "a").unwrap();
        let path = write(tmp.path(), "id-two", "same slug", &header(&[("id", "id-two")]), "b").unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().contains("-2"));
    }

    #[test]
    fn remove_deletes_matching_entry() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "abc12345", "slug", &header(&[("id", "abc12345")]), "body").unwrap();
        assert!(remove(tmp.path(), "abc12345").unwrap());
        assert!(read_dir(tmp.path()).unwrap().is_empty());
        assert!(!remove(tmp.path(), "abc12345").unwrap());
    }
}
