//! # Call Bridge - Main Application Entry Point
//!
//! HTTP and websocket server that connects phone calls to a conversational
//! voice agent.
//!
//! ## Application Architecture:
//! - **settings**: Layered configuration (defaults, `config.toml`, environment)
//! - **state**: Shared state, metrics and collaborators
//! - **bridge**: Per-call session between the telephony stream and the agent
//! - **agent**: Agent settings template and websocket client
//! - **telephony**: Outbound calls and the call scheduler
//! - **protocol**: Wire formats of both sockets
//! - **websocket**: The telephony media-stream endpoint
//! - **handlers**: REST endpoints for calls and users
//! - **health / middleware**: Health reports and request metrics

mod agent;
mod audio;
mod bridge;
mod error;
mod handlers;
mod health;
mod middleware;
mod protocol;
mod repository;
mod settings;
mod state;
mod telephony;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use agent::FileAgentConfig;
use anyhow::Result;
use repository::InMemoryUserRepository;
use settings::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use telephony::TwilioClient;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set by the signal handler task, polled by `wait_for_shutdown`.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// ## Startup sequence:
/// 1. Load `.env`, set up logging, load and validate configuration
/// 2. Build the collaborators; a missing agent key or a broken agent settings
///    template stops the server here
/// 3. Serve until the server fails or a shutdown signal arrives
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting call-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{} (frame size {} bytes)",
        config.server.host,
        config.server.port,
        config.audio.frame_size()
    );

    let app_state = build_state(config.clone())?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware runs in reverse order of registration for requests
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/start-call", web::post().to(handlers::start_call))
                    .route("/schedule-calls", web::post().to(handlers::schedule_calls))
                    .route("/users", web::post().to(handlers::create_user))
                    .route("/users", web::get().to(handlers::list_users))
                    .route("/users/{id}", web::get().to(handlers::get_user)),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/api", web::get().to(health::health_check))
            .route("/twiml", web::post().to(handlers::twiml))
            .route("/ws", web::get().to(websocket::telephony_websocket))
            .route("/ws/{user_id}", web::get().to(websocket::telephony_websocket))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Wire the repository, agent settings and telephony client into `AppState`.
fn build_state(config: AppConfig) -> Result<AppState> {
    let repository = Arc::new(InMemoryUserRepository::new());
    let agent_config = Arc::new(FileAgentConfig::load(
        &config.agent.settings_path,
        repository.clone(),
    )?);
    let placer = Arc::new(TwilioClient::new(config.telephony.clone())?);

    if config.telephony.account_sid.is_empty() {
        warn!("Twilio credentials not configured, outbound calls will fail");
    }

    Ok(AppState::new(config, repository, agent_config, placer)?)
}

/// Initialize tracing.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Log filter (e.g., "debug", "call_bridge=trace")
/// - If not set, defaults to "call_bridge=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_bridge=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM / SIGINT and raise the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
