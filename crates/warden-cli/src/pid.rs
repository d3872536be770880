//! Single-instance guard (§4.L): a pid file under the state directory,
//! refusing to start a second orchestrator against the same state while
//! another one is still alive.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};

pub struct PidGuard {
    path: PathBuf,
}

impl PidGuard {
    /// Acquire the guard, writing our own pid. Fails if `bot.pid` names a
    /// process that's still alive; a stale file (process gone) is
    /// overwritten silently.
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        fs::create_dir_all(state_dir)?;
        let path = state_dir.join("bot.pid");

        if let Some(existing) = read_pid(&path) {
            if process_alive(existing) {
                return Err(CliError::AlreadyRunning(existing));
            }
            tracing::warn!(pid = existing, "removing stale pid file from a dead process");
        }

        fs::write(&path, std::process::id().to_string())?;
        Ok(Self { path })
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// `kill(pid, 0)` — the standard liveness probe: delivers no signal, just
/// reports whether the pid still identifies a process we could signal.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // SAFETY: libc::kill with signal 0 performs no action on the target
    // process; it only validates that `pid` exists and is signalable.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    // No portable liveness probe without `libc`; assume stale rather than
    // block startup forever on non-Unix targets.
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_our_own_pid() {
        let tmp = tempfile::tempdir().unwrap();
        let guard = PidGuard::acquire(tmp.path()).unwrap();
        let written = read_pid(&guard.path).unwrap();
        assert_eq!(written, std::process::id());
    }

    #[test]
    fn acquire_overwrites_a_stale_pid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bot.pid");
        fs::write(&path, "999999999").unwrap();
        let guard = PidGuard::acquire(tmp.path()).unwrap();
        assert_eq!(read_pid(&guard.path).unwrap(), std::process::id());
    }

    #[test]
    fn drop_removes_the_pid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bot.pid");
        {
            let _guard = PidGuard::acquire(tmp.path()).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
