//! # Telephony Media-Stream WebSocket
//!
//! Endpoint the telephony provider connects to once a call is answered
//! (`/ws` or `/ws/{user_id}`). Each connection is one actix actor plus one
//! bridge session running next to it.
//!
//! ## Actor ⇄ session plumbing:
//! - **Inbound**: every text frame is pushed into a bounded channel the
//!   session reads as its `TelephonySource`. The actor stopping drops the
//!   sender, which the session sees as a disconnect.
//! - **Overflow**: when the session falls `bridge.telephony_queue_capacity`
//!   messages behind (a stalled agent), the call is closed. Dropping single
//!   messages would lose `stop` events and tear holes in the audio.
//! - **Outbound**: the session holds an `ActorTelephonySink` that sends
//!   `SendText` / `CloseSocket` messages to the actor's address.
//!
//! ## Capacity:
//! A slot is reserved before the upgrade and released when the session task
//! ends. Requests beyond `max_concurrent_sessions` get a 503 and never reach
//! the actor.

use crate::bridge::TelephonySink;
use crate::error::{AppError, BridgeError};
use crate::state::{AppState, CallOrchestrator};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Message for sending text to the telephony provider.
#[derive(Message)]
#[rtype(result = "()")]
struct SendText(String);

/// Message asking the actor to close the socket.
#[derive(Message)]
#[rtype(result = "()")]
struct CloseSocket;

/// WebSocket actor for one telephony media stream.
pub struct TelephonyWebSocket {
    call_id: String,
    user_id: Option<String>,

    /// Sender half of the session's inbound channel; `None` once stopped.
    inbound: Option<mpsc::Sender<String>>,

    /// Receiver half, handed to the session when the actor starts.
    source: Option<mpsc::Receiver<String>>,

    /// Shared with the session's sink so it can tell when the caller is gone.
    open: Arc<AtomicBool>,

    orchestrator: CallOrchestrator,
    state: web::Data<AppState>,
    last_heartbeat: Instant,
}

impl TelephonyWebSocket {
    pub fn new(state: web::Data<AppState>, user_id: Option<String>) -> Self {
        let capacity = state.get_config().bridge.telephony_queue_capacity;
        let (inbound, source) = mpsc::channel(capacity);
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            inbound: Some(inbound),
            source: Some(source),
            open: Arc::new(AtomicBool::new(true)),
            orchestrator: state.orchestrator.clone(),
            state,
            last_heartbeat: Instant::now(),
        }
    }

    /// Spawn the bridge session on the actor's arbiter.
    fn start_session(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(source) = self.source.take() else {
            return;
        };
        let sink = ActorTelephonySink {
            addr: ctx.address(),
            open: self.open.clone(),
        };
        let orchestrator = self.orchestrator.clone();
        let state = self.state.clone();
        let call_id = self.call_id.clone();
        let user_id = self.user_id.clone();

        actix_web::rt::spawn(async move {
            match orchestrator.run(call_id.clone(), user_id, source, &sink).await {
                Ok(report) => debug!(?report, "Session finished"),
                Err(err) => error!(call_id = %call_id, error = %err, "Error in telephony bridge"),
            }
            state.end_session();
        });
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(call_id = %act.call_id, "Telephony heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn forward_text(&mut self, text: String, ctx: &mut ws::WebsocketContext<Self>) {
        match offer_inbound(self.inbound.as_ref(), text) {
            Forwarded::Queued => {}
            Forwarded::Overflow => {
                warn!(
                    call_id = %self.call_id,
                    capacity = ?self.inbound.as_ref().map(|tx| tx.max_capacity()),
                    "Session is not keeping up with the telephony stream, closing call"
                );
                ctx.close(Some(ws::CloseCode::Again.into()));
                ctx.stop();
            }
            Forwarded::SessionGone => {
                debug!(call_id = %self.call_id, "Session gone, closing telephony socket");
                ctx.stop();
            }
        }
    }
}

/// Result of handing one telephony message to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forwarded {
    Queued,
    /// The inbound queue is full.
    Overflow,
    SessionGone,
}

/// Queue `text` for the session without waiting; the actor must never block.
fn offer_inbound(inbound: Option<&mpsc::Sender<String>>, text: String) -> Forwarded {
    let Some(inbound) = inbound else {
        return Forwarded::SessionGone;
    };
    match inbound.try_send(text) {
        Ok(()) => Forwarded::Queued,
        Err(TrySendError::Full(_)) => Forwarded::Overflow,
        Err(TrySendError::Closed(_)) => Forwarded::SessionGone,
    }
}

impl Actor for TelephonyWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(call_id = %self.call_id, user_id = ?self.user_id, "Telephony stream connected");
        self.start_heartbeat(ctx);
        self.start_session(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.open.store(false, Ordering::SeqCst);
        self.inbound.take();
        info!(call_id = %self.call_id, "Telephony stream closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TelephonyWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.forward_text(text.to_string(), ctx);
            }
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                warn!(bytes = data.len(), "Ignoring binary frame on telephony stream");
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(call_id = %self.call_id, ?reason, "Telephony provider closed the stream");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(call_id = %self.call_id, "WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<SendText> for TelephonyWebSocket {
    type Result = ();

    fn handle(&mut self, msg: SendText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<CloseSocket> for TelephonyWebSocket {
    type Result = ();

    fn handle(&mut self, _msg: CloseSocket, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseCode::Normal.into()));
        ctx.stop();
    }
}

/// Session-side handle on the actor.
pub struct ActorTelephonySink {
    addr: Addr<TelephonyWebSocket>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl TelephonySink for ActorTelephonySink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.addr.connected()
    }

    async fn send_text(&self, text: String) -> Result<(), BridgeError> {
        if !self.is_open() {
            return Err(BridgeError::TelephonyClosed);
        }
        // `do_send` ignores the mailbox limit; agent audio arrives in bursts.
        self.addr.do_send(SendText(text));
        Ok(())
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.addr.do_send(CloseSocket);
        }
    }
}

/// `GET /ws` and `GET /ws/{user_id}`: upgrade to the telephony media stream.
pub async fn telephony_websocket(
    req: HttpRequest,
    stream: web::Payload,
    path: Option<web::Path<String>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.map(|p| p.into_inner()).filter(|id| !id.is_empty());
    info!(
        peer = ?req.connection_info().peer_addr(),
        user_id = ?user_id,
        "New telephony websocket request"
    );

    let max_sessions = state.get_config().performance.max_concurrent_sessions;
    if !state.try_begin_session(max_sessions) {
        warn!(max_sessions, "Rejecting telephony stream, session limit reached");
        return Err(AppError::Unavailable(format!(
            "Maximum of {} concurrent calls reached",
            max_sessions
        )));
    }

    let websocket = TelephonyWebSocket::new(state.clone(), user_id);
    ws::start(websocket, &req, stream).map_err(|err| {
        state.end_session();
        AppError::BadRequest(format!("WebSocket upgrade failed: {}", err))
    })
}
