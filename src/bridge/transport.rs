//! Transport seams between the bridge and the two sockets of a call.
//!
//! The bridge is written against these traits only. The server plugs in the
//! actix websocket actor (telephony side) and a tokio-tungstenite client
//! (agent side); tests plug in channel-backed doubles.

use crate::audio::AudioFrame;
use crate::error::BridgeError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

/// Incoming side of the telephony socket.
#[async_trait]
pub trait TelephonySource: Send {
    /// Next text message, or `None` once the caller's socket is gone.
    async fn recv(&mut self) -> Option<String>;
}

/// Outgoing side of the telephony socket.
///
/// Shared by the relay (media, clear) and teardown (close), hence `&self`.
#[async_trait]
pub trait TelephonySink: Send + Sync {
    fn is_open(&self) -> bool;
    async fn send_text(&self, text: String) -> Result<(), BridgeError>;
    async fn close(&self);
}

/// A message read from the agent connection.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// Raw agent speech, passed through untouched.
    Audio(Vec<u8>),
    /// JSON control event.
    Text(String),
}

#[async_trait]
pub trait AgentSender: Send {
    async fn send_audio(&mut self, frame: AudioFrame) -> Result<(), BridgeError>;
    async fn send_text(&mut self, text: String) -> Result<(), BridgeError>;
    async fn close(&mut self) -> Result<(), BridgeError>;
}

#[async_trait]
pub trait AgentReceiver: Send {
    /// Next agent message, or `None` once the agent closed the connection.
    async fn recv(&mut self) -> Option<Result<AgentMessage, BridgeError>>;
}

/// Opens one agent connection per call.
#[async_trait]
pub trait AgentConnector: Send + Sync {
    type Sender: AgentSender;
    type Receiver: AgentReceiver;

    async fn connect(&self) -> Result<(Self::Sender, Self::Receiver), BridgeError>;
}

/// The websocket actor forwards text frames into a bounded channel; the actor
/// dropping its sender is the disconnect signal.
#[async_trait]
impl TelephonySource for mpsc::Receiver<String> {
    async fn recv(&mut self) -> Option<String> {
        mpsc::Receiver::recv(self).await
    }
}

/// Await a socket read, failing with `IdleTimeout` when `timeout` elapses first.
pub async fn with_idle_timeout<F>(
    read: F,
    timeout: Option<Duration>,
    side: &'static str,
) -> Result<F::Output, BridgeError>
where
    F: Future,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .map_err(|_| BridgeError::IdleTimeout(side)),
        None => Ok(read.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_idle_timeout_elapses() {
        let never = std::future::pending::<()>();
        let result = with_idle_timeout(never, Some(Duration::from_millis(10)), "agent").await;
        assert_eq!(result, Err(BridgeError::IdleTimeout("agent")));
    }

    #[tokio::test]
    async fn test_no_timeout_passes_through() {
        let result = with_idle_timeout(async { 7 }, None, "agent").await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_channel_source_reports_disconnect() {
        let (tx, mut rx) = mpsc::channel::<String>(1);
        tx.try_send("hello".to_string()).unwrap();
        drop(tx);
        assert_eq!(TelephonySource::recv(&mut rx).await.as_deref(), Some("hello"));
        assert_eq!(TelephonySource::recv(&mut rx).await, None);
    }
}
