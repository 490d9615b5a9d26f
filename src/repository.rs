//! # User Repository
//!
//! Persistence for interview candidates and their call status. The bridge only
//! depends on the `UserRepository` trait; the shipped implementation keeps
//! everything in memory, and a database-backed one can be injected through
//! `AppState` without touching the bridge.
//!
//! ## Concurrency:
//! Sessions update their own user concurrently. Updates are applied whole under
//! a write lock; the last writer wins, which is all a single call needs.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One attributed utterance in a call transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
}

/// Persisted call status.
///
/// The bridge only writes `Talking`, `Completed` and `Disconnected`; the others
/// come from call initiation and provider webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    #[serde(rename = "initiated")]
    Initiated,
    #[serde(rename = "connected to ai")]
    ConnectedToAi,
    #[serde(rename = "call picked up")]
    CallPickedUp,
    #[serde(rename = "talking")]
    Talking,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "disconnected")]
    Disconnected,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Initiated => "initiated",
            CallStatus::ConnectedToAi => "connected to ai",
            CallStatus::CallPickedUp => "call picked up",
            CallStatus::Talking => "talking",
            CallStatus::Completed => "completed",
            CallStatus::Disconnected => "disconnected",
        }
    }
}

/// An interview candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub call_status: Option<CallStatus>,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub transcript: Vec<Turn>,
}

/// Fields written by `update_status`. `None` leaves the stored value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub call_status: Option<CallStatus>,
    pub transcript: Option<Vec<Turn>>,
    pub call_sid: Option<String>,
}

impl StatusUpdate {
    pub fn status(status: CallStatus) -> Self {
        Self {
            call_status: Some(status),
            transcript: None,
            call_sid: None,
        }
    }

    pub fn completed(transcript: Vec<Turn>) -> Self {
        Self {
            call_status: Some(CallStatus::Completed),
            transcript: Some(transcript),
            call_sid: None,
        }
    }

    pub fn call_sid(call_sid: String) -> Self {
        Self {
            call_status: None,
            transcript: None,
            call_sid: Some(call_sid),
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>>;
    /// Apply `update` to the user. Unknown users are ignored.
    async fn update_status(&self, user_id: &str, update: StatusUpdate) -> Result<()>;
    async fn insert_user(&self, user: User) -> Result<()>;
    async fn list_users(&self) -> Result<Vec<User>>;
}

/// Map-backed repository used by the server binary and tests.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn update_status(&self, user_id: &str, update: StatusUpdate) -> Result<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(user_id) {
            if let Some(status) = update.call_status {
                user.call_status = Some(status);
            }
            if let Some(transcript) = update.transcript {
                user.transcript = transcript;
            }
            if let Some(call_sid) = update.call_sid {
                user.call_sid = Some(call_sid);
            }
        }
        Ok(())
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        self.users.write().await.insert(user.user_id.clone(), user);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(users)
    }
}

#[cfg(test)]
pub(crate) fn sample_user(user_id: &str) -> User {
    User {
        user_id: user_id.to_string(),
        name: "Ada".to_string(),
        phone: "+15550001111".to_string(),
        questions: vec!["Tell me about yourself.".to_string()],
        selected: true,
        call_status: None,
        call_sid: None,
        transcript: Vec::new(),
    }
}
