//! # Attendee WebSocket Endpoint
//!
//! Attendee's bot connects to `GET /ws` (optionally `?launch=<id>`) and
//! streams the meeting's mixed audio; the bot's synthesized speech goes back
//! on the same socket.
//!
//! ## Connection flow:
//! 1. **Admission**: a session slot is reserved (503 over the limit)
//! 2. **Persona**: the launch id picks the session config registered by
//!    `/join-meeting`; unknown or missing ids use the configured defaults
//! 3. **Assembly**: the pipeline is built before the upgrade, so missing
//!    credentials are reported as an HTTP error and no wire traffic happens.
//!    The launch is claimed only after assembly succeeds, so a rejected
//!    connection leaves it in place for the bot's retry
//! 4. **Run**: the actor bridges socket frames into the session's wire
//!    channels and the session manager runs in a background task
//!
//! The actor owns the socket. It never interprets audio itself: inbound
//! frames are forwarded as-is and outbound commands are written as-is.

use crate::error::AppError;
use crate::pipeline::{assemble, PipelineHandle, SessionConfig};
use crate::session::run_session;
use crate::session::transport::{ChannelWireReceiver, ChannelWireSender, WireCommand, WireSender};
use crate::state::{AppState, SessionSlot};
use crate::wire::WireFrame;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the session task needs, handed over when the actor starts.
struct PendingSession {
    handle: PipelineHandle,
    receiver: ChannelWireReceiver,
    sender: Arc<dyn WireSender>,
    slot: SessionSlot,
    state: AppState,
    read_timeout: Duration,
}

/// Actor owning one Attendee websocket.
pub struct BridgeSocket {
    session_id: String,
    inbound: Option<mpsc::Sender<WireFrame>>,
    commands: Option<mpsc::UnboundedReceiver<WireCommand>>,
    pending: Option<PendingSession>,
    last_heartbeat: Instant,
}

impl BridgeSocket {
    fn forward(&mut self, frame: WireFrame) {
        let Some(inbound) = &self.inbound else {
            return;
        };

        match inbound.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(session_id = %self.session_id, "Inbound queue full, dropping frame");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session_id = %self.session_id, "Session no longer reading");
                self.inbound = None;
            }
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(session_id = %act.session_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for BridgeSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "WebSocket connection started");

        if let Some(commands) = self.commands.take() {
            ctx.add_stream(UnboundedReceiverStream::new(commands));
        }
        self.heartbeat(ctx);

        if let Some(pending) = self.pending.take() {
            tokio::spawn(async move {
                let PendingSession {
                    handle,
                    receiver,
                    sender,
                    slot,
                    state,
                    read_timeout,
                } = pending;

                let report = run_session(handle, Box::new(receiver), sender, read_timeout).await;
                state.record_session(&report);
                drop(slot);
            });
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "WebSocket connection stopped");
        // The session's read loop sees the end of the inbound channel as a disconnect.
        self.inbound = None;
    }
}

/// Frames from the peer.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for BridgeSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.forward(WireFrame::Text(text.to_string())),
            Ok(ws::Message::Binary(data)) => self.forward(WireFrame::Binary(data.to_vec())),
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session_id, "WebSocket closed by peer: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session_id = %self.session_id, "WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// Commands from the session.
impl StreamHandler<WireCommand> for BridgeSocket {
    fn handle(&mut self, command: WireCommand, ctx: &mut Self::Context) {
        match command {
            WireCommand::Text(text) => ctx.text(text),
            WireCommand::Close => {
                debug!(session_id = %self.session_id, "Session closed the wire");
                ctx.close(Some(ws::CloseCode::Normal.into()));
                ctx.stop();
            }
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        ctx.stop();
    }
}

/// Persona for a connection: the registered launch if the id is known,
/// otherwise the configured defaults. Nothing is claimed here.
fn session_config_for(state: &AppState, query: &HashMap<String, String>) -> SessionConfig {
    if let Some(launch_id) = query.get("launch") {
        if let Some(config) = state.launch_config(launch_id) {
            debug!(%launch_id, "Using launch session config");
            return config;
        }
        warn!(%launch_id, "Unknown launch id, using default session config");
    }

    SessionConfig::from_defaults(&state.get_config().agent)
}

/// WebSocket endpoint handler.
pub async fn bridge_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New WebSocket connection request from: {:?}", req.connection_info().peer_addr());

    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .map(web::Query::into_inner)
        .unwrap_or_default();

    let config = state.get_config();
    let slot = state.try_begin_session()?;
    let session_config = session_config_for(&state, &query);

    let session_id = Uuid::new_v4().to_string();
    let (inbound_tx, inbound_rx) = mpsc::channel(config.session.channel_capacity);
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let sender: Arc<dyn WireSender> = Arc::new(ChannelWireSender::new(command_tx));

    let handle = assemble(
        session_config,
        &session_id,
        state.factory.as_ref(),
        sender.clone(),
        &config,
    )
    .map_err(|e| {
        error!(%session_id, "Session assembly failed: {}", e);
        AppError::from(e)
    })?;

    if let Some(launch_id) = query.get("launch") {
        state.take_launch(launch_id);
    }

    let socket = BridgeSocket {
        session_id,
        inbound: Some(inbound_tx),
        commands: Some(command_rx),
        pending: Some(PendingSession {
            handle,
            receiver: ChannelWireReceiver::new(inbound_rx),
            sender,
            slot,
            state: state.get_ref().clone(),
            read_timeout: Duration::from_millis(config.session.read_timeout_ms),
        }),
        last_heartbeat: Instant::now(),
    };

    ws::start(socket, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::testing::MockFactory;
    use actix_web::{http::StatusCode, test as actix_test, App};

    fn app_state(config: AppConfig) -> AppState {
        AppState::new(config, Arc::new(MockFactory::default()), reqwest::Client::new())
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn pirate_launch(state: &AppState) -> (String, SessionConfig) {
        let mut launch = SessionConfig::from_defaults(&AppConfig::default().agent);
        launch.system_prompt = "You are a pirate".to_string();
        (state.register_launch(launch.clone()), launch)
    }

    #[test]
    fn test_launch_config_lookup_does_not_claim() {
        let state = app_state(AppConfig::default());
        let (id, launch) = pirate_launch(&state);

        assert_eq!(session_config_for(&state, &query(&[("launch", id.as_str())])), launch);
        assert_eq!(state.pending_launches(), 1);

        state.take_launch(&id);
        let fallback = session_config_for(&state, &query(&[("launch", id.as_str())]));
        assert_eq!(fallback.system_prompt, AppConfig::default().agent.prompt);
    }

    #[test]
    fn test_no_launch_uses_defaults() {
        let state = app_state(AppConfig::default());
        let config = session_config_for(&state, &HashMap::new());
        assert_eq!(config, SessionConfig::from_defaults(&AppConfig::default().agent));
    }

    #[actix_web::test]
    async fn test_connection_over_limit_is_rejected_before_upgrade() {
        let mut config = AppConfig::default();
        config.session.max_concurrent_sessions = 1;
        let state = app_state(config);
        let _busy = state.try_begin_session().unwrap();
        let (id, launch) = pirate_launch(&state);

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/ws", web::get().to(bridge_websocket)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri(&format!("/ws?launch={}", id))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.launch_config(&id), Some(launch));
    }

    #[actix_web::test]
    async fn test_missing_credentials_fail_before_upgrade() {
        let config = AppConfig::default();
        let factory = crate::services::ServiceFactory::new(config.clone(), reqwest::Client::new());
        let state = AppState::new(config, Arc::new(factory), reqwest::Client::new());
        let (id, _) = pirate_launch(&state);

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/ws", web::get().to(bridge_websocket)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri(&format!("/ws?launch={}", id))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(state.get_metrics_snapshot().sessions.active, 0);
        assert_eq!(state.pending_launches(), 1);
    }
}
