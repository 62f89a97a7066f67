//! Client-side conversation controller
//!
//! Library-side counterpart of the controller script in the chat page. A
//! `ChatSession` owns the visible conversation for one user and drives
//! exactly one relay call at a time:
//! 1. Validates and appends the user's message
//! 2. Sends the whole history through the relay
//! 3. Appends the reply, or records the error and leaves the history as is
//!
//! The in-flight slot is only claimed and released while the state lock is
//! held, so `clear` and `cancel` always see it consistent with the stored
//! messages and cancel handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::relay::{Relay, RelayError};

use super::{Message, Role, SessionMessage};

/// Why a submission produced no reply
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Message is empty")]
    Empty,

    #[error("A request is already in progress")]
    Busy,

    #[error("Request cancelled")]
    Cancelled,

    #[error(transparent)]
    Relay(#[from] RelayError),
}

#[derive(Default)]
struct SessionState {
    messages: Vec<SessionMessage>,
    last_error: Option<String>,
    cancel: Option<oneshot::Sender<()>>,
}

/// Conversation store for a single session
pub struct ChatSession {
    relay: Arc<dyn Relay>,
    in_flight: AtomicBool,
    state: Mutex<SessionState>,
}

/// Releases the in-flight slot however the submission ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChatSession {
    pub fn new(relay: Arc<dyn Relay>) -> Self {
        Self {
            relay,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Send `text` as the next user message and wait for the reply
    pub async fn submit(&self, text: &str) -> Result<Message, SubmitError> {
        let content = text.trim();
        if content.is_empty() {
            return Err(SubmitError::Empty);
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (slot, history) = {
            let mut state = self.state.lock().await;
            if self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                debug!("Submission rejected, request already in flight");
                return Err(SubmitError::Busy);
            }
            let slot = InFlight(&self.in_flight);

            state.last_error = None;
            state.messages.push(SessionMessage::new(Role::User, content));
            state.cancel = Some(cancel_tx);
            let history: Vec<Message> =
                state.messages.iter().map(SessionMessage::to_message).collect();
            (slot, history)
        };

        debug!(messages = history.len(), "Submitting conversation");

        let outcome = tokio::select! {
            result = self.relay.complete(&history) => result.map_err(SubmitError::from),
            _ = cancel_rx => Err(SubmitError::Cancelled),
        };

        let mut state = self.state.lock().await;
        state.cancel = None;

        let result = match outcome {
            Ok(reply) => {
                state.messages.push(SessionMessage::from(reply.clone()));
                Ok(reply)
            }
            Err(err) => {
                warn!(error = %err, "Submission failed");
                state.last_error = Some(err.to_string());
                Err(err)
            }
        };

        drop(slot);
        result
    }

    /// Abort the in-flight submission, if any. Returns whether one was running.
    pub async fn cancel(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.cancel.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Start over with an empty conversation. Refused while a request is in
    /// flight.
    pub async fn clear(&self) -> Result<(), SubmitError> {
        let mut state = self.state.lock().await;
        if self.is_loading() {
            return Err(SubmitError::Busy);
        }
        state.messages.clear();
        state.last_error = None;
        Ok(())
    }

    /// Snapshot of the visible conversation, oldest first
    pub async fn messages(&self) -> Vec<SessionMessage> {
        self.state.lock().await.messages.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}
