use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Effective configuration. Credentials only show as "set" / "not set".
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config.redacted()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::testing::MockFactory;
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_config_never_exposes_credentials() {
        let mut config = AppConfig::default();
        config.services.openai_api_key = "sk-secret".to_string();
        let state = AppState::new(config, Arc::new(MockFactory::default()), reqwest::Client::new());

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["config"]["services"]["openai_api_key"], "set");
        assert_eq!(body["config"]["services"]["deepgram_api_key"], "not set");
        assert!(!body.to_string().contains("sk-secret"));
    }
}
