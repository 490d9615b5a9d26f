//! # Session Orchestrator
//!
//! Runs one bridged call from the first telephony message to teardown.
//!
//! ## Lifecycle:
//! 1. **Setup**: build the agent settings (fails before any socket is touched),
//!    persist `talking`, connect to the agent and send the settings
//! 2. **Active**: capture, forwarder and relay run concurrently on this task
//! 3. **Teardown**: as soon as one of them finishes the other two are dropped,
//!    then finalize or flush runs, the agent connection is closed and the
//!    telephony socket is closed if still open
//!
//! ## Why one task:
//! The three units share the frame channel, the stream-id slot and the session
//! by borrowing. Racing them with `select!` means a finished unit cancels the
//! others at their next suspension point and teardown runs with exclusive
//! access again, so no locks are needed.

use crate::agent::AgentConfigSource;
use crate::bridge::forwarder::{flush_queued, forward_audio};
use crate::bridge::inbound::{InboundCapture, InboundExit};
use crate::bridge::relay::{relay_agent_responses, RelayExit};
use crate::bridge::tracker::ConversationTracker;
use crate::bridge::transport::{AgentConnector, AgentSender, TelephonySink, TelephonySource};
use crate::error::BridgeError;
use crate::repository::{CallStatus, StatusUpdate, UserRepository};
use crate::settings::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// State of one bridged call, owned by the orchestrator.
pub struct Session {
    pub call_id: String,
    pub user_id: Option<String>,
    /// Set once, by the relay, from the first `start` event.
    pub stream_id: Option<String>,
    pub status: CallStatus,
    pub conversation: ConversationTracker,
    repository: Arc<dyn UserRepository>,
}

impl Session {
    pub fn new(
        call_id: String,
        user_id: Option<String>,
        repository: Arc<dyn UserRepository>,
        finalize_grace: Duration,
    ) -> Self {
        Self {
            call_id,
            user_id,
            stream_id: None,
            status: CallStatus::Talking,
            conversation: ConversationTracker::new(repository.clone(), finalize_grace),
            repository,
        }
    }

    /// Record `status` and persist it when the call belongs to a user.
    pub async fn persist_status(&mut self, status: CallStatus) {
        self.status = status;
        if let Some(user_id) = &self.user_id {
            if let Err(err) = self
                .repository
                .update_status(user_id, StatusUpdate::status(status))
                .await
            {
                warn!(user_id = %user_id, status = status.as_str(), error = %err, "Failed to persist call status");
            }
        }
    }

    pub async fn finalize<S>(&mut self, sink: &S)
    where
        S: TelephonySink + ?Sized,
    {
        let user_id = self.user_id.clone();
        if self.conversation.finalize(user_id.as_deref(), sink).await {
            self.status = CallStatus::Completed;
        }
    }
}

/// Per-session tunables derived from `AppConfig`.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub frame_size: usize,
    pub queue_capacity: usize,
    pub finalize_grace: Duration,
    pub telephony_idle_timeout: Option<Duration>,
    pub agent_idle_timeout: Option<Duration>,
}

impl From<&AppConfig> for BridgeSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            frame_size: config.audio.frame_size(),
            queue_capacity: config.audio.queue_capacity,
            finalize_grace: config.bridge.finalize_grace(),
            telephony_idle_timeout: config.bridge.telephony_idle_timeout(),
            agent_idle_timeout: config.bridge.agent_idle_timeout(),
        }
    }
}

/// Which unit finished first, with its result.
#[derive(Debug)]
enum UnitExit {
    Inbound(Result<InboundExit, BridgeError>),
    Forwarder(Result<(), BridgeError>),
    Relay(Result<RelayExit, BridgeError>),
}

/// What a finished call looked like.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub call_id: String,
    pub stream_id: Option<String>,
    pub status: CallStatus,
    pub turns: usize,
}

pub struct SessionOrchestrator<C> {
    connector: Arc<C>,
    repository: Arc<dyn UserRepository>,
    agent_config: Arc<dyn AgentConfigSource>,
    settings: BridgeSettings,
}

impl<C> Clone for SessionOrchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            repository: self.repository.clone(),
            agent_config: self.agent_config.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<C: AgentConnector> SessionOrchestrator<C> {
    pub fn new(
        connector: Arc<C>,
        repository: Arc<dyn UserRepository>,
        agent_config: Arc<dyn AgentConfigSource>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            connector,
            repository,
            agent_config,
            settings,
        }
    }

    /// Bridge one call. The telephony socket is closed on every path out.
    ///
    /// Errors are returned after teardown; they concern this call only.
    pub async fn run<T, S>(
        &self,
        call_id: String,
        user_id: Option<String>,
        telephony: T,
        sink: &S,
    ) -> Result<SessionReport, BridgeError>
    where
        T: TelephonySource,
        S: TelephonySink + ?Sized,
    {
        let span = info_span!("session", call_id = %call_id, user_id = ?user_id);
        self.run_session(call_id, user_id, telephony, sink)
            .instrument(span)
            .await
    }

    async fn run_session<T, S>(
        &self,
        call_id: String,
        user_id: Option<String>,
        telephony: T,
        sink: &S,
    ) -> Result<SessionReport, BridgeError>
    where
        T: TelephonySource,
        S: TelephonySink + ?Sized,
    {
        let agent_settings = match self.agent_config.build_agent_config(user_id.as_deref()).await {
            Ok(settings) => settings,
            Err(err) => {
                error!(error = %err, "Agent settings unavailable, refusing call");
                close_telephony(sink).await;
                return Err(BridgeError::AgentConfig(err.to_string()));
            }
        };

        let mut session = Session::new(
            call_id,
            user_id,
            self.repository.clone(),
            self.settings.finalize_grace,
        );
        session.persist_status(CallStatus::Talking).await;

        let result = self
            .bridge(&mut session, agent_settings, telephony, sink)
            .await;

        close_telephony(sink).await;

        if !session.conversation.is_finalized() {
            session.persist_status(CallStatus::Disconnected).await;
        }

        let report = SessionReport {
            call_id: session.call_id.clone(),
            stream_id: session.stream_id.clone(),
            status: session.status,
            turns: session.conversation.turns().len(),
        };
        info!(status = report.status.as_str(), turns = report.turns, "Session terminated");

        result.map(|_| report)
    }

    async fn bridge<T, S>(
        &self,
        session: &mut Session,
        agent_settings: serde_json::Value,
        telephony: T,
        sink: &S,
    ) -> Result<(), BridgeError>
    where
        T: TelephonySource,
        S: TelephonySink + ?Sized,
    {
        let (mut agent_tx, mut agent_rx) = self.connector.connect().await?;

        if let Err(err) = agent_tx.send_text(agent_settings.to_string()).await {
            let _ = agent_tx.close().await;
            return Err(err);
        }

        let (frames_tx, mut frames_rx) = mpsc::channel(self.settings.queue_capacity);
        let (stream_id_tx, stream_id_rx) = oneshot::channel();
        let capture = InboundCapture::new(
            telephony,
            self.settings.frame_size,
            frames_tx,
            stream_id_tx,
            self.settings.telephony_idle_timeout,
        );

        let exit = tokio::select! {
            result = capture.run() => UnitExit::Inbound(result),
            result = forward_audio(&mut frames_rx, &mut agent_tx) => UnitExit::Forwarder(result),
            result = relay_agent_responses(
                &mut agent_rx,
                sink,
                stream_id_rx,
                session,
                self.settings.agent_idle_timeout,
            ) => UnitExit::Relay(result),
        };
        debug!(?exit, "First unit finished, others cancelled");

        let outcome = match exit {
            UnitExit::Inbound(Ok(reason)) => {
                info!(?reason, "Telephony stream ended");
                match flush_queued(&mut frames_rx, &mut agent_tx).await {
                    Ok(0) => {}
                    Ok(flushed) => debug!(flushed, "Flushed queued frames to agent"),
                    Err(err) => warn!(error = %err, "Failed to flush queued frames"),
                }
                Ok(())
            }
            UnitExit::Forwarder(Ok(())) => Ok(()),
            UnitExit::Relay(Ok(RelayExit::Finalize(_))) => {
                session.finalize(sink).await;
                Ok(())
            }
            UnitExit::Relay(Ok(reason)) => {
                info!(?reason, "Agent relay ended");
                Ok(())
            }
            UnitExit::Inbound(Err(err))
            | UnitExit::Forwarder(Err(err))
            | UnitExit::Relay(Err(err)) => {
                warn!(error = %err, "Session unit failed");
                Err(err)
            }
        };

        if let Err(err) = agent_tx.close().await {
            debug!(error = %err, "Agent connection already closed");
        }

        outcome
    }
}

async fn close_telephony<S>(sink: &S)
where
    S: TelephonySink + ?Sized,
{
    if sink.is_open() {
        sink.close().await;
    }
}
