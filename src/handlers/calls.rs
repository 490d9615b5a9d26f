//! # Call REST API Handlers
//!
//! Endpoints that start outbound calls and answer the provider's webhook.
//!
//! ## Available Endpoints:
//! - `POST /api/v1/start-call` - Call a user (queued) or a raw number (direct)
//! - `POST /api/v1/schedule-calls` - Queue a staggered batch of user calls
//! - `POST /twiml` - Answer webhook returning TwiML that opens the media stream

use crate::repository::{CallStatus, StatusUpdate};
use crate::telephony::{CallJob, CallbackParams};
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

/// Gap between two calls of a batch when the request doesn't say.
const DEFAULT_STAGGER_SECONDS: u64 = 2;

#[derive(Debug, Deserialize)]
pub struct StartCallRequest {
    pub destination_number: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleCallsRequest {
    pub user_ids: Vec<String>,
    pub delay_seconds: Option<u64>,
    pub stagger_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct TwimlQuery {
    pub user_id: Option<String>,
}

/// Start a call.
///
/// ## Endpoint: `POST /api/v1/start-call`
///
/// ## Request Body:
/// ```json
/// { "user_id": "u1" }
/// ```
/// or
/// ```json
/// { "destination_number": "+15551234567" }
/// ```
///
/// With a user id the call is queued for the scheduler and the response is
/// `202 {"status": "queued", "user_id": "u1"}`. With only a number the call
/// is placed right away and the response is `{"sid": "CA..."}`.
pub async fn start_call(
    state: web::Data<AppState>,
    request: web::Json<StartCallRequest>,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();

    if let Some(user_id) = request.user_id.filter(|id| !id.is_empty()) {
        if state.repository.find_user(&user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }
        state.scheduler.enqueue(
            CallJob::CallUser {
                user_id: user_id.clone(),
            },
            Duration::ZERO,
        );
        return Ok(HttpResponse::Accepted().json(json!({
            "status": "queued",
            "user_id": user_id
        })));
    }

    let destination = request
        .destination_number
        .filter(|number| !number.trim().is_empty())
        .ok_or_else(|| {
            AppError::BadRequest("Missing 'destination_number' in request body".to_string())
        })?;

    let sid = state
        .placer
        .place_call(&destination, CallbackParams::default())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "sid": sid })))
}

/// Queue calls for several users.
///
/// ## Endpoint: `POST /api/v1/schedule-calls`
///
/// ## Request Body:
/// ```json
/// { "user_ids": ["u1", "u2"], "delay_seconds": 60, "stagger_seconds": 5 }
/// ```
pub async fn schedule_calls(
    state: web::Data<AppState>,
    request: web::Json<ScheduleCallsRequest>,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    if request.user_ids.is_empty() {
        return Err(AppError::BadRequest("'user_ids' must not be empty".to_string()));
    }

    let delay = Duration::from_secs(request.delay_seconds.unwrap_or(0));
    let stagger = Duration::from_secs(request.stagger_seconds.unwrap_or(DEFAULT_STAGGER_SECONDS));
    let count = request.user_ids.len();
    state
        .scheduler
        .enqueue_batch(request.user_ids, delay, stagger);

    Ok(HttpResponse::Accepted().json(json!({
        "status": "scheduled",
        "count": count,
        "delay_seconds": delay.as_secs(),
        "stagger_seconds": stagger.as_secs()
    })))
}

/// Answer webhook: connect the answered call to this server's media stream.
///
/// ## Endpoint: `POST /twiml?user_id=u1`
///
/// The stream URL is `telephony.stream_url` when configured, otherwise
/// `wss://<host>/ws` built from the request's host.
pub async fn twiml(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<TwimlQuery>,
) -> Result<HttpResponse, AppError> {
    let user_id = query.into_inner().user_id.filter(|id| !id.is_empty());

    let configured = state.get_config().telephony.stream_url;
    let base = if configured.trim().is_empty() {
        format!("wss://{}/ws", req.connection_info().host())
    } else {
        configured.trim_end_matches('/').to_string()
    };
    let stream_url = match &user_id {
        Some(id) => format!("{}/{}", base, id),
        None => base,
    };

    if let Some(id) = &user_id {
        state
            .repository
            .update_status(id, StatusUpdate::status(CallStatus::CallPickedUp))
            .await?;
    }
    info!(user_id = ?user_id, stream_url = %stream_url, "Answering call with media stream");

    Ok(HttpResponse::Ok()
        .content_type("application/xml")
        .body(twiml_connect_stream(&stream_url)))
}

fn twiml_connect_stream(stream_url: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response><Connect><Stream url=\"{}\" /></Connect></Response>",
        xml_escape(stream_url)
    )
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
