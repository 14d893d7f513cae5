//! # Application State Management
//!
//! State shared by every HTTP handler and websocket actor.
//!
//! ## Contents:
//! - **config**: the loaded configuration (read-only after startup)
//! - **metrics**: HTTP request counters and session outcome counters
//! - **launches**: session configs registered by `/join-meeting`, waiting for
//!   the bot's websocket connection to claim them
//! - **factory**: builds the capabilities of each new session
//!
//! All mutable data sits behind `Arc<RwLock<T>>`. A poisoned lock is
//! recovered rather than propagated: the counters stay usable even if some
//! handler panicked while holding the lock.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::pipeline::{Outcome, SessionConfig, UsageReport};
use crate::services::CapabilityFactory;
use crate::session::SessionReport;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared application state, cloned into every worker.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    launches: Arc<RwLock<HashMap<String, PendingLaunch>>>,
    pub factory: Arc<dyn CapabilityFactory>,
    /// Shared connection pool for the REST adapters
    pub http: reqwest::Client,
    pub start_time: Instant,
}

#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,
    pub error_count: u64,
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
    pub sessions: SessionMetrics,
    pub launches_registered: u64,
}

/// Counters over all bridge sessions since server start.
#[derive(Debug, Default, Clone)]
pub struct SessionMetrics {
    pub active: usize,
    pub total: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub failed: u64,
    /// Connections closed because the concurrency limit was reached
    pub rejected: u64,
    pub frames_in: u64,
    pub frames_out: u64,
    /// Provider usage and latency summed over finished sessions
    pub usage: UsageReport,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate as a fraction between 0.0 and 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

struct PendingLaunch {
    config: SessionConfig,
    created: Instant,
}

/// Reservation of one concurrent session. Releases the slot on drop.
pub struct SessionSlot {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        let mut metrics = write(&self.metrics);
        metrics.sessions.active = metrics.sessions.active.saturating_sub(1);
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AppState {
    pub fn new(
        config: AppConfig,
        factory: Arc<dyn CapabilityFactory>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            launches: Arc::new(RwLock::new(HashMap::new())),
            factory,
            http,
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> AppConfig {
        read(&self.config).clone()
    }

    pub fn increment_request_count(&self) {
        write(&self.metrics).request_count += 1;
    }

    pub fn increment_error_count(&self) {
        write(&self.metrics).error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = write(&self.metrics);
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Reserve a session slot, or fail with 503 when
    /// `session.max_concurrent_sessions` are already running.
    pub fn try_begin_session(&self) -> AppResult<SessionSlot> {
        let limit = read(&self.config).session.max_concurrent_sessions;
        let mut metrics = write(&self.metrics);

        if metrics.sessions.active >= limit {
            metrics.sessions.rejected += 1;
            warn!(active = metrics.sessions.active, limit, "Session limit reached");
            return Err(AppError::Unavailable(format!(
                "Maximum number of concurrent sessions ({}) reached",
                limit
            )));
        }

        metrics.sessions.active += 1;
        metrics.sessions.total += 1;
        Ok(SessionSlot {
            metrics: self.metrics.clone(),
        })
    }

    /// Fold a finished session into the outcome counters.
    pub fn record_session(&self, report: &SessionReport) {
        let mut metrics = write(&self.metrics);
        let sessions = &mut metrics.sessions;

        match report.outcome {
            Outcome::Completed => sessions.completed += 1,
            Outcome::Cancelled => sessions.cancelled += 1,
            Outcome::Failed(_) => sessions.failed += 1,
        }
        sessions.frames_in += report.frames_in;
        sessions.frames_out += report.frames_out;
        sessions.usage.accumulate(&report.usage);
    }

    /// Store the persona of a launch and return its id.
    pub fn register_launch(&self, config: SessionConfig) -> String {
        let launch_id = Uuid::new_v4().to_string();
        write(&self.launches).insert(
            launch_id.clone(),
            PendingLaunch {
                config,
                created: Instant::now(),
            },
        );
        write(&self.metrics).launches_registered += 1;

        launch_id
    }

    /// Look up a launch's session config without claiming it.
    pub fn launch_config(&self, launch_id: &str) -> Option<SessionConfig> {
        read(&self.launches)
            .get(launch_id)
            .map(|launch| launch.config.clone())
    }

    /// Claim a launch's session config. Each id can be claimed once.
    pub fn take_launch(&self, launch_id: &str) -> Option<SessionConfig> {
        write(&self.launches)
            .remove(launch_id)
            .map(|launch| launch.config)
    }

    pub fn pending_launches(&self) -> usize {
        read(&self.launches).len()
    }

    /// Forget launches whose bot never connected within `ttl`.
    pub fn purge_stale_launches(&self, ttl: Duration) -> usize {
        let mut launches = write(&self.launches);
        let before = launches.len();
        launches.retain(|_, launch| launch.created.elapsed() < ttl);

        let purged = before - launches.len();
        if purged > 0 {
            debug!(purged, "Purged stale launches");
        }
        purged
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        read(&self.metrics).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFactory;

    fn state_with_limit(limit: usize) -> AppState {
        let mut config = AppConfig::default();
        config.session.max_concurrent_sessions = limit;
        AppState::new(config, Arc::new(MockFactory::default()), reqwest::Client::new())
    }

    fn report(outcome: Outcome) -> SessionReport {
        SessionReport {
            session_id: "s".to_string(),
            outcome,
            frames_in: 3,
            frames_out: 2,
            duration_ms: 10,
            usage: UsageReport {
                prompt_tokens: 30,
                completion_tokens: 5,
                ..UsageReport::default()
            },
        }
    }

    #[test]
    fn test_session_limit_is_enforced_and_released() {
        let state = state_with_limit(1);

        let slot = state.try_begin_session().unwrap();
        assert!(matches!(state.try_begin_session(), Err(AppError::Unavailable(_))));

        drop(slot);
        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.sessions.active, 0);
        assert_eq!(metrics.sessions.rejected, 1);

        assert!(state.try_begin_session().is_ok());
    }

    #[test]
    fn test_outcomes_are_counted() {
        let state = state_with_limit(4);
        state.record_session(&report(Outcome::Completed));
        state.record_session(&report(Outcome::Cancelled));
        state.record_session(&report(Outcome::Failed("stt".to_string())));

        let sessions = state.get_metrics_snapshot().sessions;
        assert_eq!((sessions.completed, sessions.cancelled, sessions.failed), (1, 1, 1));
        assert_eq!(sessions.frames_in, 9);
        assert_eq!(sessions.frames_out, 6);
        assert_eq!(sessions.usage.prompt_tokens, 90);
        assert_eq!(sessions.usage.completion_tokens, 15);
    }

    #[test]
    fn test_launch_is_claimed_once() {
        let state = state_with_limit(1);
        let config = SessionConfig::from_defaults(&AppConfig::default().agent);

        let id = state.register_launch(config.clone());
        assert_eq!(state.launch_config(&id), Some(config.clone()));
        assert_eq!(state.pending_launches(), 1);
        assert_eq!(state.take_launch(&id), Some(config));
        assert_eq!(state.take_launch(&id), None);
        assert_eq!(state.get_metrics_snapshot().launches_registered, 1);
    }

    #[test]
    fn test_stale_launches_are_purged() {
        let state = state_with_limit(1);
        let config = SessionConfig::from_defaults(&AppConfig::default().agent);
        state.register_launch(config);

        assert_eq!(state.purge_stale_launches(Duration::from_secs(60)), 0);
        assert_eq!(state.purge_stale_launches(Duration::ZERO), 1);
        assert_eq!(state.pending_launches(), 0);
    }

    #[test]
    fn test_endpoint_metric_averages() {
        let state = state_with_limit(1);
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let metrics = state.get_metrics_snapshot();
        let health = &metrics.endpoint_metrics["GET /health"];
        assert_eq!(health.average_duration_ms(), 20.0);
        assert_eq!(health.error_rate(), 0.5);
    }
}
