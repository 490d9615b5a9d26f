//! # Agent Relay
//!
//! Reads the agent connection and routes each message:
//! - **Binary** audio is base64-encoded and sent to the caller as a media event
//! - **Text** control events feed the conversation tracker or trigger barge-in
//!
//! Nothing is sent to the telephony side before the stream id is known.
//!
//! ## Failure policy:
//! Agent events that fail to decode are logged and skipped. The agent adds new
//! event kinds over time and an unfamiliar event must not hang up on a caller.
//! Only transport failures end the relay with an error.

use crate::bridge::session::Session;
use crate::bridge::tracker::FinalizeReason;
use crate::bridge::transport::{with_idle_timeout, AgentMessage, AgentReceiver, TelephonySink};
use crate::error::BridgeError;
use crate::protocol::{ControlEvent, OutboundTelephonyEvent};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// How the relay ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// The interview is over; the orchestrator runs finalize.
    Finalize(FinalizeReason),
    AgentClosed,
    TelephonyClosed,
    /// Capture ended before a `start` event arrived.
    StreamNeverStarted,
}

pub async fn relay_agent_responses<R, S>(
    agent: &mut R,
    sink: &S,
    stream_id: oneshot::Receiver<String>,
    session: &mut Session,
    idle_timeout: Option<Duration>,
) -> Result<RelayExit, BridgeError>
where
    R: AgentReceiver + ?Sized,
    S: TelephonySink + ?Sized,
{
    let Ok(stream_sid) = stream_id.await else {
        return Ok(RelayExit::StreamNeverStarted);
    };
    session.stream_id = Some(stream_sid.clone());
    debug!(stream_sid = %stream_sid, "Relay attached to telephony stream");

    loop {
        let message = match with_idle_timeout(agent.recv(), idle_timeout, "agent").await? {
            Some(message) => message?,
            None => {
                info!("Agent connection closed");
                return Ok(RelayExit::AgentClosed);
            }
        };

        match message {
            AgentMessage::Audio(audio) => {
                if !sink.is_open() {
                    return Ok(RelayExit::TelephonyClosed);
                }
                let media = OutboundTelephonyEvent::media(&stream_sid, &audio).to_json();
                if let Err(err) = sink.send_text(media).await {
                    debug!(error = %err, "Dropping agent audio, telephony closed");
                    return Ok(RelayExit::TelephonyClosed);
                }
            }
            AgentMessage::Text(text) => {
                if let Some(reason) = dispatch_event(&text, &stream_sid, sink, session).await {
                    info!(?reason, "Interview end detected");
                    return Ok(RelayExit::Finalize(reason));
                }
            }
        }
    }
}

async fn dispatch_event<S>(
    text: &str,
    stream_sid: &str,
    sink: &S,
    session: &mut Session,
) -> Option<FinalizeReason>
where
    S: TelephonySink + ?Sized,
{
    let event = match ControlEvent::decode(text) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "Skipping undecodable agent event");
            return None;
        }
    };

    match event {
        ControlEvent::ConversationText { role, content } => {
            debug!(role = %role, "{}", content);
            session.conversation.record_turn(&role, &content)
        }
        ControlEvent::FunctionCallRequest { functions } => {
            let reason = session.conversation.check_function_calls(&functions);
            if reason.is_none() {
                for function in &functions {
                    warn!(name = %function.name, "Unhandled agent function call");
                }
            }
            reason
        }
        ControlEvent::UserStartedSpeaking => {
            let clear = OutboundTelephonyEvent::clear(stream_sid).to_json();
            if let Err(err) = sink.send_text(clear).await {
                warn!(error = %err, "Failed to clear telephony audio on barge-in");
            }
            None
        }
        ControlEvent::Welcome { request_id } => {
            info!(request_id = ?request_id, "Agent session opened");
            None
        }
        ControlEvent::SettingsApplied => {
            info!("Agent settings applied");
            None
        }
        ControlEvent::Error { description, code } => {
            warn!(code = ?code, "Agent reported error: {}", description);
            None
        }
        ControlEvent::Warning { description, code } => {
            warn!(code = ?code, "Agent warning: {}", description);
            None
        }
        ControlEvent::Unknown => None,
    }
}
