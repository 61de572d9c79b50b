//! Conversation session
//!
//! Holds the single active assistant thread, the busy flag for the turn that
//! is using it, and the idle timer that discards the thread after a period of
//! inactivity. All state lives behind one mutex; the idle timer task is the
//! only writer outside the turn flow.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::backend::AssistantBackend;
use crate::voice::{AudioPlayer, SoundEffect};
use crate::{Error, Result};

/// Proof that a turn started on a particular thread
///
/// The engine checks the ticket before every backend step so a turn that
/// lost the race with idle expiry fails instead of silently switching threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnTicket {
    thread_id: String,
    generation: u64,
}

impl TurnTicket {
    /// Thread the turn runs on
    #[must_use]
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }
}

#[derive(Default)]
struct SessionState {
    thread_id: Option<String>,
    in_progress: bool,
    /// Bumped whenever the thread is replaced or discarded
    generation: u64,
    idle_timer: Option<JoinHandle<()>>,
    /// Identifies the most recently scheduled timer
    timer_seq: u64,
}

struct Inner {
    state: Mutex<SessionState>,
    idle_ttl: Duration,
    player: Arc<dyn AudioPlayer>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.idle_timer.take() {
            timer.abort();
        }
    }
}

/// Shared handle to the conversation session
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Create an empty session whose thread expires after `idle_ttl`
    #[must_use]
    pub fn new(idle_ttl: Duration, player: Arc<dyn AudioPlayer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::default()),
                idle_ttl,
                player,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.inner)
    }

    /// Claim the thread for a new turn, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionBusy`] if a turn is already in progress (the
    /// backend is not contacted), or [`Error::ThreadCreateFailed`] if a new
    /// thread cannot be created.
    pub async fn begin_turn(&self, backend: &dyn AssistantBackend) -> Result<TurnTicket> {
        {
            let state = self.state();
            if state.in_progress {
                return Err(Error::SessionBusy);
            }
            if let Some(thread_id) = &state.thread_id {
                return Ok(TurnTicket {
                    thread_id: thread_id.clone(),
                    generation: state.generation,
                });
            }
        }

        let thread_id = backend.create_thread().await.map_err(|e| match e {
            Error::ThreadCreateFailed(_) => e,
            other => Error::ThreadCreateFailed(other.to_string()),
        })?;

        let mut state = self.state();
        if state.in_progress {
            return Err(Error::SessionBusy);
        }
        state.generation += 1;
        state.thread_id = Some(thread_id.clone());
        tracing::info!(thread_id = %thread_id, "conversation thread created");

        Ok(TurnTicket {
            thread_id,
            generation: state.generation,
        })
    }

    /// Verify the ticket's thread is still the active one
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionExpiredDuringTurn`] if the thread was discarded
    /// or replaced since the ticket was issued.
    pub fn check(&self, ticket: &TurnTicket) -> Result<()> {
        let state = self.state();
        if state.generation == ticket.generation
            && state.thread_id.as_deref() == Some(ticket.thread_id.as_str())
        {
            Ok(())
        } else {
            Err(Error::SessionExpiredDuringTurn)
        }
    }

    /// Mark a turn as running on the thread
    pub fn mark_in_progress(&self) {
        self.state().in_progress = true;
    }

    /// Mark the turn finished and restart the idle timer
    pub fn mark_done(&self) {
        self.state().in_progress = false;
        self.touch_idle_timer(self.inner.idle_ttl);
    }

    /// Cancel any pending idle timer and schedule a new one
    pub fn touch_idle_timer(&self, ttl: Duration) {
        let mut state = self.state();
        if let Some(previous) = state.idle_timer.take() {
            previous.abort();
        }
        state.timer_seq += 1;
        let seq = state.timer_seq;

        let weak = Arc::downgrade(&self.inner);
        state.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            expire(&weak, seq);
        }));

        tracing::trace!(ttl_secs = ttl.as_secs(), "idle timer scheduled");
    }

    /// Discard the thread and cancel the idle timer
    pub fn reset(&self) {
        let mut state = self.state();
        if let Some(timer) = state.idle_timer.take() {
            timer.abort();
        }
        clear(&mut state);
        tracing::debug!("session reset");
    }

    /// Active thread, if any
    #[must_use]
    pub fn thread_id(&self) -> Option<String> {
        self.state().thread_id.clone()
    }

    /// Whether a turn is running
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.state().in_progress
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Session")
            .field("thread_id", &state.thread_id)
            .field("in_progress", &state.in_progress)
            .field("idle_ttl", &self.inner.idle_ttl)
            .finish_non_exhaustive()
    }
}

fn lock(inner: &Inner) -> MutexGuard<'_, SessionState> {
    inner.state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn clear(state: &mut SessionState) {
    state.thread_id = None;
    state.in_progress = false;
    state.generation += 1;
}

/// Idle timer body; a superseded timer does nothing
fn expire(inner: &Weak<Inner>, seq: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    {
        let mut state = lock(&inner);
        if state.timer_seq != seq {
            return;
        }
        state.idle_timer = None;
        if let Some(thread_id) = &state.thread_id {
            tracing::info!(thread_id = %thread_id, "conversation thread expired");
        }
        clear(&mut state);
    }

    inner.player.play_sound(SoundEffect::TimerReset);
}
