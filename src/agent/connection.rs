//! Agent websocket client.
//!
//! One `tokio-tungstenite` connection per call, split into a sender half owned
//! by the forwarder and a receiver half owned by the relay.

use crate::audio::AudioFrame;
use crate::bridge::transport::{AgentConnector, AgentMessage, AgentReceiver, AgentSender};
use crate::error::BridgeError;
use crate::settings::AgentConfig;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type AgentStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct AgentWsConnector {
    url: String,
    api_key: String,
}

impl AgentWsConnector {
    /// Fails without touching the network when no API key is configured.
    pub fn new(config: &AgentConfig) -> Result<Self, BridgeError> {
        if config.api_key.trim().is_empty() {
            return Err(BridgeError::AgentConfig(
                "DEEPGRAM_API_KEY not found".to_string(),
            ));
        }
        Ok(Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Handshake request authenticated through the websocket subprotocol list.
    fn request(&self) -> Result<Request, BridgeError> {
        let mut request = self.url.as_str().into_client_request()?;
        let protocols = HeaderValue::from_str(&format!("token, {}", self.api_key))
            .map_err(|err| BridgeError::AgentConfig(format!("Invalid API key: {}", err)))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", protocols);
        Ok(request)
    }
}

#[async_trait]
impl AgentConnector for AgentWsConnector {
    type Sender = AgentWsSender;
    type Receiver = AgentWsReceiver;

    async fn connect(&self) -> Result<(Self::Sender, Self::Receiver), BridgeError> {
        let request = self.request()?;
        let started = Instant::now();

        let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
        info!(
            url = %self.url,
            latency_ms = started.elapsed().as_millis() as u64,
            "Connected to agent"
        );

        let (sink, stream) = stream.split();
        Ok((AgentWsSender { sink }, AgentWsReceiver { stream }))
    }
}

pub struct AgentWsSender {
    sink: SplitSink<AgentStream, Message>,
}

#[async_trait]
impl AgentSender for AgentWsSender {
    async fn send_audio(&mut self, frame: AudioFrame) -> Result<(), BridgeError> {
        self.sink.send(Message::Binary(frame.into_bytes())).await?;
        Ok(())
    }

    async fn send_text(&mut self, text: String) -> Result<(), BridgeError> {
        self.sink.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        self.sink.close().await?;
        Ok(())
    }
}

pub struct AgentWsReceiver {
    stream: SplitStream<AgentStream>,
}

#[async_trait]
impl AgentReceiver for AgentWsReceiver {
    async fn recv(&mut self) -> Option<Result<AgentMessage, BridgeError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Binary(audio)) => return Some(Ok(AgentMessage::Audio(audio))),
                Ok(Message::Text(text)) => return Some(Ok(AgentMessage::Text(text))),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Agent sent close frame");
                    return None;
                }
                // Pings are answered by tungstenite itself.
                Ok(_) => continue,
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}
