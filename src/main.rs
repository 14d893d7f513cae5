//! # Meeting Voice Bridge
//!
//! Puts a conversational voice agent into a video meeting. `/join-meeting`
//! asks Attendee to send a bot into the meeting; the bot streams the meeting
//! audio to `/ws`, where each connection runs one session:
//! speech-to-text, a chat model and text-to-speech, with the synthesized
//! reply streamed back to the meeting.
//!
//! ## Architecture:
//! - **wire**: Attendee message codec
//! - **audio**: PCM helpers, voice activity detection, session recording
//! - **services**: provider adapters behind capability traits
//! - **pipeline**: per-session stage pipeline and its orchestrator
//! - **session**: wire transport seams and the session manager
//! - **websocket / handlers / health**: the HTTP surface

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod pipeline;
mod services;
mod session;
mod state;
mod websocket;
mod wire;

#[cfg(test)]
mod testing;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use services::ServiceFactory;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often unclaimed launches are checked for expiry.
const LAUNCH_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let http = reqwest::Client::new();
    let factory = Arc::new(ServiceFactory::new(config.clone(), http.clone()));
    let app_state = AppState::new(config.clone(), factory, http);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    spawn_launch_purge(
        app_state.clone(),
        Duration::from_secs(config.session.launch_ttl_seconds),
    );

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/join-meeting", web::post().to(handlers::join_meeting))
            .route("/ws", web::get().to(websocket::bridge_websocket))
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
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meeting_voice_bridge=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

fn spawn_launch_purge(state: AppState, ttl: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LAUNCH_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            state.purge_stale_launches(ttl);
        }
    });
}

/// Resolves on SIGINT, or SIGTERM on unix. If a handler cannot be
/// installed the error is logged and that signal is never waited on.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received SIGINT");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
