//! # Application State Management
//!
//! Shared state handed to every HTTP handler and websocket actor.
//!
//! ## What lives here:
//! - **Configuration**: loaded once at startup, read by handlers
//! - **Metrics**: request counters and the active session gauge
//! - **Collaborators**: the user repository, the session orchestrator, the
//!   call placer and the call scheduler
//!
//! ## Arc<RwLock<T>> Pattern
//! Handlers run concurrently on several worker threads, so mutable data sits
//! behind `Arc<RwLock<T>>`. Locks are held only long enough to copy or bump a
//! value; nothing awaits while holding one.

use crate::agent::{AgentConfigSource, AgentWsConnector};
use crate::bridge::{BridgeSettings, SessionOrchestrator};
use crate::error::BridgeError;
use crate::repository::UserRepository;
use crate::settings::AppConfig;
use crate::telephony::{CallPlacer, CallScheduler};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// Orchestrator type used by the server.
pub type CallOrchestrator = SessionOrchestrator<AgentWsConnector>;

/// The main application state that's shared across all HTTP request handlers.
///
/// Cloning is cheap: every field is either `Copy` or reference counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub start_time: Instant,
    pub repository: Arc<dyn UserRepository>,
    pub orchestrator: CallOrchestrator,
    pub placer: Arc<dyn CallPlacer>,
    pub scheduler: CallScheduler,
}

/// Counters collected across requests and calls.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of error responses since server start
    pub error_count: u64,

    /// Bridged calls currently in progress
    pub active_sessions: u32,

    /// Bridged calls accepted since server start
    pub total_sessions: u64,

    /// Key: route pattern with method (e.g., "GET /ws/{user_id}")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Per-endpoint request statistics.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Wire the shared collaborators.
    ///
    /// ## Errors:
    /// Fails when the agent connector cannot be built (no API key), so a
    /// misconfigured server refuses to start instead of failing every call.
    pub fn new(
        config: AppConfig,
        repository: Arc<dyn UserRepository>,
        agent_config: Arc<dyn AgentConfigSource>,
        placer: Arc<dyn CallPlacer>,
    ) -> Result<Self, BridgeError> {
        let connector = Arc::new(AgentWsConnector::new(&config.agent)?);
        let orchestrator = SessionOrchestrator::new(
            connector,
            repository.clone(),
            agent_config,
            BridgeSettings::from(&config),
        );
        let scheduler = CallScheduler::new(repository.clone(), placer.clone());

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            repository,
            orchestrator,
            placer,
            scheduler,
        })
    }

    /// Copy of the current configuration; the lock is released on return.
    pub fn get_config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_metrics<R>(&self, update: impl FnOnce(&mut AppMetrics) -> R) -> R {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut metrics)
    }

    pub fn increment_request_count(&self) {
        self.with_metrics(|m| m.request_count += 1);
    }

    pub fn increment_error_count(&self) {
        self.with_metrics(|m| m.error_count += 1);
    }

    /// Record one request against `endpoint`.
    ///
    /// The first request to an endpoint creates its entry with zeroed counters.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        self.with_metrics(|m| {
            let endpoint_metric = m.endpoint_metrics.entry(endpoint.to_string()).or_default();
            endpoint_metric.request_count += 1;
            endpoint_metric.total_duration_ms += duration_ms;
            if is_error {
                endpoint_metric.error_count += 1;
            }
        });
    }

    /// Reserve a slot for a new call. Returns `false` when `max` calls are
    /// already running; check and increment happen under one lock.
    pub fn try_begin_session(&self, max: usize) -> bool {
        self.with_metrics(|m| {
            if m.active_sessions as usize >= max {
                return false;
            }
            m.active_sessions += 1;
            m.total_sessions += 1;
            true
        })
    }

    /// Release a slot taken by `try_begin_session`. Never goes below zero.
    pub fn end_session(&self) {
        self.with_metrics(|m| m.active_sessions = m.active_sessions.saturating_sub(1));
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of failed requests, between 0.0 and 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
