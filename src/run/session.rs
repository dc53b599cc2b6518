//! Per-driver conversational state shared with the interrupt handle.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{PaiprogError, Result};

/// State of the conversation a driver owns.
#[derive(Debug)]
pub struct RunSession {
    pub thread_id: String,
    pub current_run_id: Option<String>,
    pub is_interrupted: bool,
    pub turn_active: bool,
    /// Run id for which a remote cancel was already requested.
    pub cancel_requested_for: Option<String>,
    turn_id: Option<Uuid>,
    cancel: CancellationToken,
}

pub(crate) type SharedSession = Arc<Mutex<RunSession>>;

pub(crate) fn lock(session: &Mutex<RunSession>) -> MutexGuard<'_, RunSession> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RunSession {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            current_run_id: None,
            is_interrupted: false,
            turn_active: false,
            cancel_requested_for: None,
            turn_id: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Start a turn. An unresolved turn that was not interrupted blocks a new one.
    pub(crate) fn begin_turn(&mut self, turn_id: Uuid) -> Result<CancellationToken> {
        if self.turn_active && !self.is_interrupted {
            return Err(PaiprogError::InvalidState(
                "a turn is already in progress on this thread".to_string(),
            ));
        }

        self.turn_id = Some(turn_id);
        self.turn_active = true;
        self.is_interrupted = false;
        self.current_run_id = None;
        self.cancel_requested_for = None;
        self.cancel = CancellationToken::new();
        Ok(self.cancel.clone())
    }

    /// Release the turn if `turn_id` still owns it.
    pub(crate) fn end_turn(&mut self, turn_id: Uuid) {
        if self.turn_id == Some(turn_id) {
            self.turn_active = false;
        }
    }

    /// Record the run serving `turn_id`.
    ///
    /// Returns true when the turn was interrupted before the run id was known,
    /// in which case the caller still owes the remote a cancel.
    pub(crate) fn record_run(&mut self, turn_id: Uuid, run_id: &str) -> bool {
        if self.turn_id != Some(turn_id) {
            return false;
        }
        self.current_run_id = Some(run_id.to_string());
        if self.is_interrupted && self.cancel_requested_for.as_deref() != Some(run_id) {
            self.cancel_requested_for = Some(run_id.to_string());
            return true;
        }
        false
    }

    /// Flag the interrupt and return the run to cancel, at most once per run id.
    ///
    /// Without an active turn there is nothing to stop and the session is left as is.
    pub(crate) fn interrupt(&mut self) -> Option<String> {
        if !self.turn_active {
            return None;
        }
        self.is_interrupted = true;
        self.cancel.cancel();

        let run_id = self.current_run_id.clone()?;
        if self.cancel_requested_for.as_deref() == Some(run_id.as_str()) {
            return None;
        }
        self.cancel_requested_for = Some(run_id.clone());
        Some(run_id)
    }
}

/// Releases the session's turn when the turn stream is dropped.
#[derive(Debug)]
pub(crate) struct TurnGuard {
    session: SharedSession,
    turn_id: Uuid,
}

impl TurnGuard {
    pub(crate) fn new(session: SharedSession, turn_id: Uuid) -> Self {
        Self { session, turn_id }
    }

    pub(crate) fn session(&self) -> &SharedSession {
        &self.session
    }

    pub(crate) fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    pub(crate) fn release(&self) {
        lock(&self.session).end_turn(self.turn_id);
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.release();
    }
}
