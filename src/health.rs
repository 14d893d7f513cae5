//! # Health and Metrics Endpoints
//!
//! - `GET /health`, `GET /api/v1/health`: liveness, uptime, session load and
//!   which providers have credentials configured
//! - `GET /api/v1/metrics`: HTTP and session counters, provider usage and
//!   time to first byte

use crate::config::AppConfig;
use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "sessions": {
            "active": metrics.sessions.active,
            "total": metrics.sessions.total,
            "failed": metrics.sessions.failed
        },
        "providers": providers(&config),
        "memory": get_memory_info(),
        "system": get_system_status(&config, &metrics)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();

    let sessions = &metrics.sessions;
    let usage = &sessions.usage;

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "http": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "endpoints": endpoint_stats
        },
        "sessions": {
            "active": sessions.active,
            "total": sessions.total,
            "completed": sessions.completed,
            "cancelled": sessions.cancelled,
            "failed": sessions.failed,
            "rejected": sessions.rejected,
            "frames_in": sessions.frames_in,
            "frames_out": sessions.frames_out
        },
        "usage": {
            "prompt_tokens": usage.prompt_tokens,
            "completion_tokens": usage.completion_tokens,
            "tts_characters": usage.tts_characters,
            "llm_ttfb_ms_avg": usage.average_llm_ttfb_ms(),
            "tts_ttfb_ms_avg": usage.average_tts_ttfb_ms()
        },
        "launches": {
            "registered": metrics.launches_registered,
            "pending": state.pending_launches()
        },
        "memory": get_memory_info()
    }))
}

fn providers(config: &AppConfig) -> serde_json::Value {
    let services = &config.services;
    json!({
        "deepgram": !services.deepgram_api_key.is_empty(),
        "openai": !services.openai_api_key.is_empty(),
        "attendee": !services.attendee_api_key.is_empty()
    })
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let field = |name: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(name))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .unwrap_or(0)
                    * 1024
            };

            return json!({
                "resident_memory_bytes": field("VmRSS:"),
                "virtual_memory_bytes": field("VmSize:"),
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

fn get_system_status(config: &AppConfig, metrics: &AppMetrics) -> serde_json::Value {
    let limit = config.session.max_concurrent_sessions;
    let session_usage = if limit > 0 {
        metrics.sessions.active as f64 / limit as f64
    } else {
        0.0
    };

    let status = if session_usage > 0.9 {
        "high_load"
    } else if session_usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "session_usage_percent": (session_usage * 100.0).round(),
        "max_sessions": limit,
        "current_sessions": metrics.sessions.active,
        "load_warnings": if session_usage > 0.8 {
            vec!["High session usage - consider raising session.max_concurrent_sessions"]
        } else {
            vec![]
        }
    })
}
