//! # Conversation Tracker
//!
//! Owns the ordered transcript of one call and decides when the interview is
//! over. Two signals end an interview:
//!
//! 1. **Closing phrase**: an utterance ending in "goodbye." or containing
//!    "interview is complete" (case-insensitive).
//! 2. **Function call**: the agent asks the client to run `end_interview`.
//!
//! ## Finalize sequence:
//! 1. Wait a short grace period so the caller hears the agent's last words
//! 2. Close the telephony socket if it is still open
//! 3. Persist `completed` plus the transcript when the call has a user

use crate::bridge::transport::TelephonySink;
use crate::protocol::FunctionCall;
use crate::repository::{StatusUpdate, Turn, UserRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Name of the agent function that ends the interview.
pub const END_INTERVIEW_FUNCTION: &str = "end_interview";

/// Why the interview ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    ClosingPhrase,
    EndInterviewCall,
}

pub struct ConversationTracker {
    turns: Vec<Turn>,
    finalized: bool,
    grace: Duration,
    repository: Arc<dyn UserRepository>,
}

impl ConversationTracker {
    pub fn new(repository: Arc<dyn UserRepository>, grace: Duration) -> Self {
        Self {
            turns: Vec::new(),
            finalized: false,
            grace,
            repository,
        }
    }

    /// Append a turn; returns a reason when the utterance closes the interview.
    pub fn record_turn(&mut self, role: &str, content: &str) -> Option<FinalizeReason> {
        self.turns.push(Turn {
            role: role.to_string(),
            content: content.to_string(),
        });

        is_closing_phrase(content).then_some(FinalizeReason::ClosingPhrase)
    }

    /// Returns a reason when any requested function is `end_interview`.
    pub fn check_function_calls(&self, functions: &[FunctionCall]) -> Option<FinalizeReason> {
        functions
            .iter()
            .any(|f| f.name == END_INTERVIEW_FUNCTION)
            .then_some(FinalizeReason::EndInterviewCall)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Run the finalize sequence once. Later calls return `false` and do nothing.
    pub async fn finalize<S>(&mut self, user_id: Option<&str>, sink: &S) -> bool
    where
        S: TelephonySink + ?Sized,
    {
        if self.finalized {
            return false;
        }
        self.finalized = true;

        info!(turns = self.turns.len(), "Interview completed");
        for turn in &self.turns {
            info!(role = %turn.role, "{}", turn.content);
        }

        tokio::time::sleep(self.grace).await;

        if sink.is_open() {
            sink.close().await;
            info!("Telephony socket closed after interview");
        } else {
            warn!("Telephony socket already closed at finalize");
        }

        if let Some(user_id) = user_id {
            let update = StatusUpdate::completed(self.turns.clone());
            if let Err(err) = self.repository.update_status(user_id, update).await {
                warn!(user_id, error = %err, "Failed to persist completed interview");
            }
        }

        true
    }
}

/// Closing phrases the agent uses at the end of an interview.
pub fn is_closing_phrase(content: &str) -> bool {
    let normalized = content.trim().to_lowercase();
    normalized.ends_with("goodbye.") || normalized.contains("interview is complete")
}
