//! # Bot Launch Handler
//!
//! `POST /join-meeting` accepts the launch form (or the same fields as JSON),
//! registers the session persona under a fresh launch id and asks Attendee to
//! send a bot into the meeting. The bot's audio websocket URL carries the
//! launch id, so the websocket handler can pick the persona back up.

use crate::error::{AppError, AppResult};
use crate::pipeline::SessionConfig;
use crate::services::attendee::AttendeeClient;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

/// Launch request. Field names follow the launch form.
#[derive(Debug, Deserialize)]
pub struct JoinMeeting {
    #[serde(rename = "meetingUrl")]
    pub meeting_url: String,
    /// Public websocket URL of this server's `/ws` endpoint
    #[serde(rename = "wsUrl")]
    pub ws_url: String,
    pub prompt: Option<String>,
    pub greeting: Option<String>,
    /// Text-to-speech voice identifier
    #[serde(alias = "voice")]
    pub model: Option<String>,
}

impl JoinMeeting {
    fn validate(&self) -> AppResult<()> {
        let meeting_url = self.meeting_url.trim();
        if !(meeting_url.starts_with("https://") || meeting_url.starts_with("http://")) {
            return Err(AppError::ValidationError(
                "meetingUrl must be an http(s) URL".to_string(),
            ));
        }

        let ws_url = self.ws_url.trim();
        if !(ws_url.starts_with("wss://") || ws_url.starts_with("ws://")) {
            return Err(AppError::ValidationError(
                "wsUrl must be a ws(s) URL".to_string(),
            ));
        }

        Ok(())
    }

    /// Session persona: supplied fields win, blanks fall back to `defaults`.
    fn session_config(&self, defaults: SessionConfig) -> SessionConfig {
        fn pick(value: &Option<String>, fallback: String) -> String {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => fallback,
            }
        }

        SessionConfig {
            system_prompt: pick(&self.prompt, defaults.system_prompt),
            greeting: pick(&self.greeting, defaults.greeting),
            generation_model: defaults.generation_model,
            voice: pick(&self.model, defaults.voice),
        }
    }
}

/// Append `launch=<id>` to the websocket URL's query string.
pub fn with_launch_id(ws_url: &str, launch_id: &str) -> String {
    let separator = if ws_url.contains('?') { '&' } else { '?' };
    format!("{}{}launch={}", ws_url.trim(), separator, launch_id)
}

pub async fn join_meeting(
    state: web::Data<AppState>,
    body: web::Either<web::Form<JoinMeeting>, web::Json<JoinMeeting>>,
) -> AppResult<HttpResponse> {
    let request = match body {
        web::Either::Left(form) => form.into_inner(),
        web::Either::Right(json) => json.into_inner(),
    };
    request.validate()?;

    let config = state.get_config();
    let client = AttendeeClient::new(
        state.http.clone(),
        &config.services.attendee_base_url,
        &config.services.attendee_api_key,
    )?;

    let session = request.session_config(SessionConfig::from_defaults(&config.agent));
    info!(
        meeting_url = %request.meeting_url,
        ws_url = %request.ws_url,
        voice = %session.voice,
        "Launching meeting bot"
    );

    let launch_id = state.register_launch(session);
    let ws_url = with_launch_id(&request.ws_url, &launch_id);

    let bot = match client
        .launch_bot(request.meeting_url.trim(), &ws_url, &config.agent.bot_name)
        .await
    {
        Ok(bot) => bot,
        Err(e) => {
            state.take_launch(&launch_id);
            warn!(%launch_id, "Discarded launch after failed bot request");
            return Err(AppError::Upstream(e.to_string()));
        }
    };

    Ok(HttpResponse::Ok().json(json!({
        "message": "Success! The bot will join the meeting in 30 seconds and start speaking 30 seconds after joining.",
        "launch_id": launch_id,
        "bot": bot
    })))
}
