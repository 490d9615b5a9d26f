//! Voice-agent control events.
//!
//! Text frames from the agent are JSON objects discriminated by `"type"`.
//! Binary frames are raw agent audio and never reach this module.

use serde::Deserialize;
use serde_json::Value;

/// One function the agent asks the client to run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    /// Arguments as sent by the agent; usually a JSON-encoded string.
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub client_side: Option<bool>,
}

/// A decoded agent control event.
///
/// Unknown `type` values decode to `Unknown` so that new agent event kinds
/// never break a running call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlEvent {
    ConversationText {
        role: String,
        content: String,
    },
    FunctionCallRequest {
        #[serde(default)]
        functions: Vec<FunctionCall>,
    },
    UserStartedSpeaking,
    Welcome {
        #[serde(default)]
        request_id: Option<String>,
    },
    SettingsApplied,
    Error {
        #[serde(default)]
        description: String,
        #[serde(default)]
        code: Option<String>,
    },
    Warning {
        #[serde(default)]
        description: String,
        #[serde(default)]
        code: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ControlEvent {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
