//! Best-effort git commit of state-directory changes. If the state
//! directory isn't inside a git repository, every call here is a no-op —
//! version control of schedule entries is a convenience, never a
//! requirement.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Walk up from `start` looking for a `.git` directory.
fn find_repo(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        if d.join(".git").exists() {
            return Some(d.to_path_buf());
        }
        dir = d.parent();
    }
    None
}

fn run_git(repo: &Path, args: &[&str]) {
    match Command::new("git").arg("-C").arg(repo).args(args).output() {
        Ok(output) if !output.status.success() => {
            tracing::warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "git command failed"
            );
        }
        Err(err) => tracing::warn!(error = %err, "failed to invoke git"),
        Ok(_) => {}
    }
}

/// Stage and commit `path` with `message`, if `path` lives inside a git
/// repository. Failures are logged and swallowed.
pub fn commit(path: &Path, message: &str) {
    let Some(repo) = path.parent().and_then(find_repo) else {
        return;
    };
    run_git(&repo, &["add", "--", &path.to_string_lossy()]);
    run_git(&repo, &["commit", "-m", message, "--", &path.to_string_lossy()]);
}

/// Stage the removal of `path` and commit, if inside a git repository.
pub fn rm_commit(path: &Path, message: &str) {
    let Some(repo) = path.parent().and_then(find_repo) else {
        return;
    };
    run_git(&repo, &["rm", "--ignore-unmatch", "--", &path.to_string_lossy()]);
    run_git(&repo, &["commit", "-m", message, "--", &path.to_string_lossy()]);
}
