//! Owns the single live main session and mediates forking, promotion,
//! and the busy lock (§4.G). The scheduler and the Discord handler both
//! go through this rather than touching a `SessionClient` directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex as AsyncMutex, MutexGuard};
use warden_core::types::SessionId;
use warden_fork::{BackgroundFork, ForkExitAction};

use crate::session::{self, SessionClient, StreamEvent};
use crate::Result;

/// Held while a turn is in flight; `locked()` reports `true` to anyone
/// checking busy-state (e.g. `ping_user`'s busy refusal) for as long as
/// the guard is alive.
pub struct AgentLockGuard<'a> {
    _inner: MutexGuard<'a, ()>,
    locked: &'a AtomicBool,
}

impl Drop for AgentLockGuard<'_> {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::SeqCst);
    }
}

pub struct AgentRuntime {
    main: StdMutex<Arc<dyn SessionClient>>,
    lock: AsyncMutex<()>,
    locked: AtomicBool,
    fork_exit: StdMutex<Option<(ForkExitAction, Option<String>)>>,
}

impl AgentRuntime {
    pub fn new(main: Arc<dyn SessionClient>) -> Self {
        Self {
            main: StdMutex::new(main),
            lock: AsyncMutex::new(()),
            locked: AtomicBool::new(false),
            fork_exit: StdMutex::new(None),
        }
    }

    /// Stream a prompt's response on the current main session.
    pub async fn stream_chat(&self, prompt: &str, tx: mpsc::Sender<StreamEvent>) -> Result<SessionId> {
        let client = self.main.lock().expect("main session lock poisoned").clone();
        client.stream_chat(prompt, tx).await
    }

    /// A clone of the current main session to run a fork on.
    pub fn create_forked_client(&self) -> Box<dyn SessionClient> {
        self.main.lock().expect("main session lock poisoned").fork()
    }

    /// Forward the chat surface's channel id to whichever client is
    /// currently main, so its fork tools (if any are declared) know
    /// where to notify. Safe to call again after a promotion swaps it.
    pub fn set_channel_id(&self, channel_id: u64) {
        self.main
            .lock()
            .expect("main session lock poisoned")
            .set_channel_id(channel_id);
    }

    pub async fn run_on_client(&self, client: &dyn SessionClient, prompt: &str) -> Result<SessionId> {
        session::run_on_client(client, prompt).await
    }

    /// Adopt `client` as the new main session (promotion).
    pub fn swap_client(&self, client: Arc<dyn SessionClient>, _session_id: SessionId) {
        *self.main.lock().expect("main session lock poisoned") = client;
    }

    pub async fn lock(&self) -> AgentLockGuard<'_> {
        let guard = self.lock.lock().await;
        self.locked.store(true, Ordering::SeqCst);
        AgentLockGuard {
            _inner: guard,
            locked: &self.locked,
        }
    }

    /// Non-blocking variant of [`Self::lock`], for `skip_if_busy` routines
    /// that should be skipped rather than queued behind the current turn.
    pub fn try_lock(&self) -> Option<AgentLockGuard<'_>> {
        let guard = self.lock.try_lock().ok()?;
        self.locked.store(true, Ordering::SeqCst);
        Some(AgentLockGuard {
            _inner: guard,
            locked: &self.locked,
        })
    }

    pub fn locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn record_fork_exit(&self, action: ForkExitAction, summary: Option<String>) {
        *self.fork_exit.lock().expect("fork exit lock poisoned") = Some((action, summary));
    }

    /// Drained by the idle watchdog.
    pub fn pop_fork_exit(&self) -> Option<(ForkExitAction, Option<String>)> {
        self.fork_exit.lock().expect("fork exit lock poisoned").take()
    }

    /// Promotion rule: after bg-fork completion, adopt the forked client
    /// if it asked to be saved and produced a session id; otherwise the
    /// forked client is simply dropped (`disconnect`).
    pub fn promote_background(&self, bg: &BackgroundFork, forked: Box<dyn SessionClient>) {
        if !bg.fork_saved {
            return;
        }
        if let Some(session_id) = forked.session_id() {
            self.swap_client(Arc::from(forked), session_id);
        }
    }

    /// Interactive-fork completion consults `exit_action` the same way.
    pub fn promote_interactive(&self, exit_action: ForkExitAction, forked: Box<dyn SessionClient>) {
        if exit_action != ForkExitAction::Save {
            return;
        }
        if let Some(session_id) = forked.session_id() {
            self.swap_client(Arc::from(forked), session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use warden_core::policy::ForkPolicy;

    struct FakeClient {
        session_id: SessionId,
    }

    #[async_trait]
    impl SessionClient for FakeClient {
        async fn stream_chat(&self, _prompt: &str, tx: mpsc::Sender<StreamEvent>) -> Result<SessionId> {
            tx.send(StreamEvent::Done {
                session_id: self.session_id.clone(),
                stop_reason: crate::session::StopReason::EndTurn,
            })
            .await
            .ok();
            Ok(self.session_id.clone())
        }

        fn fork(&self) -> Box<dyn SessionClient> {
            Box::new(FakeClient {
                session_id: self.session_id.clone(),
            })
        }

        async fn compact(&self) -> Result<()> {
            Ok(())
        }

        fn session_id(&self) -> Option<SessionId> {
            Some(self.session_id.clone())
        }
    }

    #[tokio::test]
    async fn lock_guard_reports_busy_until_dropped() {
        let runtime = AgentRuntime::new(Arc::new(FakeClient {
            session_id: SessionId::from("main".to_string()),
        }));
        assert!(!runtime.locked());
        {
            let _guard = runtime.lock().await;
            assert!(runtime.locked());
        }
        assert!(!runtime.locked());
    }

    #[tokio::test]
    async fn try_lock_fails_while_held() {
        let runtime = AgentRuntime::new(Arc::new(FakeClient {
            session_id: SessionId::from("main".to_string()),
        }));
        let guard = runtime.lock().await;
        assert!(runtime.try_lock().is_none());
        drop(guard);
        assert!(runtime.try_lock().is_some());
    }

    #[tokio::test]
    async fn promote_background_swaps_when_saved_with_session_id() {
        let runtime = AgentRuntime::new(Arc::new(FakeClient {
            session_id: SessionId::from("main".to_string()),
        }));
        let mut bg = BackgroundFork::new(ForkPolicy::default());
        bg.request_save();
        let forked = Box::new(FakeClient {
            session_id: SessionId::from("forked".to_string()),
        });
        runtime.promote_background(&bg, forked);

        let (tx, mut rx) = mpsc::channel(4);
        runtime.stream_chat("hi", tx).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, StreamEvent::Done { session_id, .. } if session_id.as_str() == "forked"));
    }

    #[tokio::test]
    async fn promote_background_skips_swap_when_not_saved() {
        let runtime = AgentRuntime::new(Arc::new(FakeClient {
            session_id: SessionId::from("main".to_string()),
        }));
        let bg = BackgroundFork::new(ForkPolicy::default());
        let forked = Box::new(FakeClient {
            session_id: SessionId::from("forked".to_string()),
        });
        runtime.promote_background(&bg, forked);

        let (tx, mut rx) = mpsc::channel(4);
        runtime.stream_chat("hi", tx).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, StreamEvent::Done { session_id, .. } if session_id.as_str() == "main"));
    }
}
