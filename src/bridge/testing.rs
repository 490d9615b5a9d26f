//! In-memory transport doubles for bridge tests.

use crate::audio::AudioFrame;
use crate::bridge::transport::{
    AgentConnector, AgentMessage, AgentReceiver, AgentSender, TelephonySink,
};
use crate::error::BridgeError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Telephony sink that records every text message it is asked to send.
#[derive(Debug)]
pub struct RecordingSink {
    sent: Mutex<Vec<String>>,
    open: AtomicBool,
    closes: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn hang_up(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl TelephonySink for RecordingSink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: String) -> Result<(), BridgeError> {
        if !self.is_open() {
            return Err(BridgeError::TelephonyClosed);
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything the bridge wrote to the agent.
#[derive(Debug, Default)]
pub struct AgentLog {
    pub frames: Vec<AudioFrame>,
    pub texts: Vec<String>,
    pub closed: bool,
}

pub struct RecordingAgentSender {
    log: Arc<Mutex<AgentLog>>,
    fail_writes: bool,
}

impl RecordingAgentSender {
    pub fn new(log: Arc<Mutex<AgentLog>>) -> Self {
        Self {
            log,
            fail_writes: false,
        }
    }

    pub fn failing(log: Arc<Mutex<AgentLog>>) -> Self {
        Self {
            log,
            fail_writes: true,
        }
    }
}

#[async_trait]
impl AgentSender for RecordingAgentSender {
    async fn send_audio(&mut self, frame: AudioFrame) -> Result<(), BridgeError> {
        if self.fail_writes {
            return Err(BridgeError::AgentConnection("broken pipe".to_string()));
        }
        self.log.lock().unwrap().frames.push(frame);
        Ok(())
    }

    async fn send_text(&mut self, text: String) -> Result<(), BridgeError> {
        self.log.lock().unwrap().texts.push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Agent receiver fed by the test through a channel. Dropping the test's
/// sender simulates the agent closing the connection.
pub struct ChannelAgentReceiver {
    rx: mpsc::UnboundedReceiver<Result<AgentMessage, BridgeError>>,
}

pub fn agent_channel() -> (
    mpsc::UnboundedSender<Result<AgentMessage, BridgeError>>,
    ChannelAgentReceiver,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ChannelAgentReceiver { rx })
}

#[async_trait]
impl AgentReceiver for ChannelAgentReceiver {
    async fn recv(&mut self) -> Option<Result<AgentMessage, BridgeError>> {
        self.rx.recv().await
    }
}

/// Hands out one prepared agent connection.
pub struct TestConnector {
    pair: Mutex<Option<(RecordingAgentSender, ChannelAgentReceiver)>>,
    pub connects: AtomicUsize,
}

impl TestConnector {
    pub fn new(sender: RecordingAgentSender, receiver: ChannelAgentReceiver) -> Self {
        Self {
            pair: Mutex::new(Some((sender, receiver))),
            connects: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AgentConnector for TestConnector {
    type Sender = RecordingAgentSender;
    type Receiver = ChannelAgentReceiver;

    async fn connect(&self) -> Result<(Self::Sender, Self::Receiver), BridgeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.pair
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BridgeError::AgentConnection("already connected".to_string()))
    }
}

pub fn text(json: serde_json::Value) -> Result<AgentMessage, BridgeError> {
    Ok(AgentMessage::Text(json.to_string()))
}
