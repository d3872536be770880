//! On-disk description of the fork a single `claude` CLI invocation is
//! running under, and the signal it leaves behind for the orchestrator.
//!
//! The agent SDK normally drives `canUseTool`/tool calls in-process, so
//! `warden-agent`'s `FireContext` is an in-memory struct. Here the model
//! loop lives inside a child `claude` process instead, and its MCP tool
//! calls run inside a second child process (the `mcp-bridge` subcommand,
//! spawned by `claude` itself) — so the fork's read side (kind, policy,
//! chain) and write side (exit actions, enter-fork requests) have to
//! cross a process boundary through small JSON files rather than shared
//! memory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use warden_core::policy::{ForkPolicy, UpdateMainSession};
use warden_fork::ForkState;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FireKind {
    Idle,
    Background { policy: ForkPolicy },
    Interactive { idle_timeout_minutes: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSourceDescriptor {
    pub message: String,
    pub description: Option<String>,
    pub background: bool,
    pub skip_if_busy: bool,
    pub model: Option<String>,
    pub isolated: bool,
    pub thinking: bool,
    pub policy: ForkPolicy,
    pub chain_parent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireDescriptor {
    pub kind: FireKind,
    pub busy: bool,
    pub chain_depth: Option<u32>,
    pub max_chain: Option<u32>,
    pub chain_source: Option<ChainSourceDescriptor>,
}

impl FireDescriptor {
    pub fn idle(busy: bool) -> Self {
        Self {
            kind: FireKind::Idle,
            busy,
            chain_depth: None,
            max_chain: None,
            chain_source: None,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        warden_storage::json::write_json(path, self)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Option<Self>> {
        Ok(warden_storage::json::read_json(path)?)
    }
}

/// What a fork-exit tool (`save_context`/`exit_fork`) or `enter_fork`
/// leaves for the orchestrator once the `claude` subprocess exits. Named
/// with a leading dot: it's transient IPC, not part of the persisted
/// state layout the rest of the process owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FireSignal {
    Save,
    Report,
    Exit,
    EnterFork { topic: Option<String>, idle_timeout_minutes: Option<u32> },
}

pub fn signal_path(state_dir: &Path) -> PathBuf {
    state_dir.join(".fork_signal.json")
}

pub fn write_signal(state_dir: &Path, signal: &FireSignal) -> Result<()> {
    warden_storage::json::write_json(&signal_path(state_dir), signal)?;
    Ok(())
}

/// Take (read and remove) any signal left by the last fire, if one did.
pub fn take_signal(state_dir: &Path) -> Result<Option<FireSignal>> {
    let path = signal_path(state_dir);
    let signal: Option<FireSignal> = warden_storage::json::read_json(&path)?;
    if signal.is_some() {
        let _ = std::fs::remove_file(&path);
    }
    Ok(signal)
}

pub fn fire_context_path(state_dir: &Path) -> PathBuf {
    state_dir.join(".fire_context.json")
}

/// A serializable shadow of the bits of [`ForkState`] the `stop-hook`
/// subcommand needs (§4.G's `check_stop_hook` contract), written by
/// `mcp-bridge` after every tool call since `BackgroundFork`/
/// `InteractiveFork` aren't themselves `Serialize` — they carry
/// monotonic-ms timestamps that have no business surviving a process
/// boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkStateSnapshot {
    pub in_background: bool,
    pub update_main_session: UpdateMainSession,
    pub output_sent: bool,
    pub reported: bool,
}

impl ForkStateSnapshot {
    pub fn from_fork_state(state: &ForkState) -> Self {
        match state {
            ForkState::Background(bg) => Self {
                in_background: true,
                update_main_session: bg.policy.update_main_session,
                output_sent: bg.output_sent,
                reported: bg.reported,
            },
            ForkState::Idle | ForkState::Interactive(_) => Self {
                in_background: false,
                update_main_session: UpdateMainSession::default(),
                output_sent: false,
                reported: false,
            },
        }
    }

    /// Rebuild a [`ForkState`] good enough for `check_stop_hook` — only
    /// the fields `evaluate_background` reads are reconstructed.
    pub fn to_fork_state(&self) -> ForkState {
        if !self.in_background {
            return ForkState::Idle;
        }
        let mut policy = ForkPolicy::default();
        policy.update_main_session = self.update_main_session;
        let mut bg = warden_fork::BackgroundFork::new(policy);
        bg.output_sent = self.output_sent;
        bg.reported = self.reported;
        ForkState::Background(bg)
    }
}

pub fn fork_state_snapshot_path(state_dir: &Path) -> PathBuf {
    state_dir.join(".fork_state_snapshot.json")
}

pub fn write_fork_state_snapshot(state_dir: &Path, state: &ForkState) -> Result<()> {
    warden_storage::json::write_json(&fork_state_snapshot_path(state_dir), &ForkStateSnapshot::from_fork_state(state))?;
    Ok(())
}

pub fn read_fork_state_snapshot(state_dir: &Path) -> Result<Option<ForkStateSnapshot>> {
    Ok(warden_storage::json::read_json(&fork_state_snapshot_path(state_dir))?)
}
