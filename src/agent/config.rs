//! # Agent Settings
//!
//! Every session starts by sending the agent one JSON settings message. The
//! message is a template loaded from disk at startup, with the interview
//! prompt (`agent.think.prompt`) rewritten for the user being called.
//!
//! ## Failure policy:
//! A template that is missing, is not JSON, or has no `agent.think` object is
//! rejected at startup. A session never discovers a broken template halfway
//! through setup.

use crate::bridge::END_INTERVIEW_FUNCTION;
use crate::repository::{User, UserRepository};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces the settings message for one call.
#[async_trait]
pub trait AgentConfigSource: Send + Sync {
    async fn build_agent_config(&self, user_id: Option<&str>) -> Result<Value>;
}

/// Settings template read from a JSON file.
pub struct FileAgentConfig {
    template: Value,
    repository: Arc<dyn UserRepository>,
}

impl FileAgentConfig {
    pub fn load(path: impl AsRef<Path>, repository: Arc<dyn UserRepository>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Agent settings file {} not found", path.display()))?;
        let template: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Agent settings file {} contains invalid JSON", path.display()))?;

        info!(path = %path.display(), "Loaded agent settings template");
        Self::from_template(template, repository)
    }

    pub fn from_template(template: Value, repository: Arc<dyn UserRepository>) -> Result<Self> {
        if !template.pointer("/agent/think").is_some_and(Value::is_object) {
            return Err(anyhow!("Agent settings must contain an `agent.think` object"));
        }
        Ok(Self {
            template,
            repository,
        })
    }
}

#[async_trait]
impl AgentConfigSource for FileAgentConfig {
    async fn build_agent_config(&self, user_id: Option<&str>) -> Result<Value> {
        let user = match user_id {
            Some(id) => {
                let user = self.repository.find_user(id).await?;
                if user.is_none() {
                    warn!(user_id = id, "Unknown user, using generic interview prompt");
                }
                user
            }
            None => None,
        };

        let mut settings = self.template.clone();
        let think = settings
            .pointer_mut("/agent/think")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow!("Agent settings lost their `agent.think` object"))?;
        think.insert("prompt".to_string(), Value::String(build_prompt(user.as_ref())));

        debug!(personalized = user.is_some(), "Built agent settings");
        Ok(settings)
    }
}

/// Interview prompt for `user`, or a generic one when the caller is unknown.
pub fn build_prompt(user: Option<&User>) -> String {
    let mut prompt = String::new();

    match user {
        Some(user) => {
            let _ = writeln!(
                prompt,
                "You are a friendly interviewer on a phone call with {}. \
                 Greet them by name and keep your sentences short.",
                user.name
            );
            if user.questions.is_empty() {
                prompt.push_str(
                    "Ask them to introduce themselves and talk briefly about their background.\n",
                );
            } else {
                prompt.push_str(
                    "Ask the following questions one at a time and wait for each answer:\n",
                );
                for (index, question) in user.questions.iter().enumerate() {
                    let _ = writeln!(prompt, "{}. {}", index + 1, question);
                }
            }
        }
        None => prompt.push_str(
            "You are a friendly interviewer on a phone call with a candidate. \
             Ask them to introduce themselves, then ask about their experience \
             and what they are looking for in their next role.\n",
        ),
    }

    let _ = write!(
        prompt,
        "When the interview is over, thank the candidate, end your last sentence \
         with \"goodbye.\" and call the `{}` function.",
        END_INTERVIEW_FUNCTION
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{sample_user, InMemoryUserRepository};
    use serde_json::json;

    fn template() -> Value {
        json!({
            "type": "Settings",
            "agent": {
                "think": {"provider": {"type": "open_ai"}, "prompt": "placeholder"},
                "speak": {"provider": {"type": "deepgram"}}
            }
        })
    }

    #[test]
    fn test_template_requires_think_object() {
        let repo = Arc::new(InMemoryUserRepository::new());
        assert!(FileAgentConfig::from_template(json!({"agent": {}}), repo.clone()).is_err());
        assert!(FileAgentConfig::from_template(json!({"agent": {"think": "x"}}), repo.clone()).is_err());
        assert!(FileAgentConfig::from_template(template(), repo).is_ok());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let repo = Arc::new(InMemoryUserRepository::new());
        let result = FileAgentConfig::load("/nonexistent/agent-settings.json", repo);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let path = std::env::temp_dir().join(format!("agent-settings-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{not json").unwrap();

        let repo = Arc::new(InMemoryUserRepository::new());
        let err = FileAgentConfig::load(&path, repo).err().unwrap();
        assert!(err.to_string().contains("invalid JSON"));
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_prompt_personalized_for_user() {
        let repo = Arc::new(InMemoryUserRepository::new());
        let mut user = sample_user("u1");
        user.name = "Ada".to_string();
        user.questions = vec!["Why Rust?".to_string(), "Favourite crate?".to_string()];
        repo.insert_user(user).await.unwrap();

        let source = FileAgentConfig::from_template(template(), repo).unwrap();
        let settings = source.build_agent_config(Some("u1")).await.unwrap();

        let prompt = settings["agent"]["think"]["prompt"].as_str().unwrap();
        assert!(prompt.contains("Ada"));
        assert!(prompt.contains("1. Why Rust?"));
        assert!(prompt.contains("2. Favourite crate?"));
        assert!(prompt.contains("end_interview"));
        // Everything else in the template is untouched.
        assert_eq!(settings["agent"]["think"]["provider"]["type"], "open_ai");
        assert_eq!(settings["type"], "Settings");
    }

    #[tokio::test]
    async fn test_generic_prompt_for_unknown_user() {
        let repo = Arc::new(InMemoryUserRepository::new());
        let source = FileAgentConfig::from_template(template(), repo).unwrap();

        let anonymous = source.build_agent_config(None).await.unwrap();
        let unknown = source.build_agent_config(Some("ghost")).await.unwrap();
        assert_eq!(anonymous, unknown);
        assert_ne!(anonymous["agent"]["think"]["prompt"], "placeholder");
    }

    #[test]
    fn test_prompt_without_questions() {
        let mut user = sample_user("u1");
        user.questions.clear();
        let prompt = build_prompt(Some(&user));
        assert!(prompt.contains("introduce themselves"));
        assert!(prompt.ends_with("function."));
    }
}
