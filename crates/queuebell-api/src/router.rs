//! Router configuration and server setup.

use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::auth::{MASTER_KEY_HEADER, OPERATOR_PIN_HEADER, TENANT_HEADER};
use crate::config::ApiConfig;
use crate::handlers;
use crate::state::AppState;

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(MASTER_KEY_HEADER),
            HeaderName::from_static(TENANT_HEADER),
            HeaderName::from_static(OPERATOR_PIN_HEADER),
        ])
}

/// Creates the API router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health))
        // Provisioning
        .route("/api/createBusiness", post(handlers::create_business))
        .route(
            "/api/getBusiness",
            get(handlers::get_business).post(handlers::lookup_business),
        )
        .route("/api/updateBusiness", post(handlers::update_business))
        // Telegram
        .route("/api/createTelegramLink", post(handlers::create_telegram_link))
        .route("/api/telegramWebhook", post(handlers::telegram_webhook))
        // Calls and broadcasts
        .route("/api/notifyCounter", post(handlers::notify_counter))
        .route("/api/announce", post(handlers::announce))
        // Operator console
        .route("/api/counters/:action", post(handlers::counter_action))
        .route("/api/verifyPin", post(handlers::verify_pin))
        // Client configuration
        .route("/api/env", get(handlers::env_config))
        .route("/api/get-firebase-config", get(handlers::firebase_config))
        .layer(cors_layer())
        .with_state(state)
}

/// Starts the API server.
pub async fn serve(config: ApiConfig, state: AppState) -> Result<(), std::io::Error> {
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, create_router(state)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::{HeaderValue, StatusCode};
    use axum_test::TestServer;
    use queuebell_notifier::{Notifier, NotifierConfig};
    use queuebell_persistence::{MemoryDb, MemoryKv, RealtimeDb, TicketStoreFactory};
    use queuebell_telegram::{TelegramClient, WebhookConfig};
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SEND_PATH: &str = "/bot1:t/sendMessage";

    struct Harness {
        db: Arc<MemoryDb>,
        server: TestServer,
        telegram: MockServer,
    }

    async fn telegram_ok() -> MockServer {
        let telegram = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 1}})),
            )
            .mount(&telegram)
            .await;
        telegram
    }

    async fn harness_with(data: Value, telegram: MockServer, config: ApiConfig) -> Harness {
        let db = Arc::new(MemoryDb::with_data(data));
        let notifier = Notifier::new(
            db.clone(),
            TicketStoreFactory::Kv(Arc::new(MemoryKv::new())),
            NotifierConfig {
                bot_token: Some("1:t".into()),
                telegram_api_base: telegram.uri(),
                send_pause: Duration::ZERO,
                retry_backoff: Some(Duration::from_millis(1)),
                ..NotifierConfig::default()
            },
        );
        let client = TelegramClient::new("1:t")
            .unwrap()
            .with_base_url(telegram.uri())
            .with_backoff(Duration::from_millis(1));
        let state = AppState::new(config, db.clone(), notifier, Some(client), WebhookConfig::default());
        let server = TestServer::new(create_router(state)).unwrap();
        Harness { db, server, telegram }
    }

    fn cafe() -> Value {
        json!({
            "tenants": {"cafe": {
                "slug": "cafe",
                "name": "Cafe",
                "status": "active",
                "settings": {"privacy": {"scrubLinkedNumbers": true}, "operatorPin": "1234"},
                "links": {"explore": "https://cafe.example"},
                "counters": {
                    "c1": {"name": "Counter 1", "prefix": "A", "nowServing": 1, "lastIssued": 2, "active": true}
                },
                "queue": {
                    "-OaQ1": {"number": "A002", "queueId": "A002", "status": "waiting", "counterId": "c1"}
                },
                "analytics": {"servedCount": 0}
            }}
        })
    }

    fn admin_config() -> ApiConfig {
        ApiConfig::default()
            .with_master_key("k1")
            .with_bot_username("@QueueBellBot")
    }

    async fn harness() -> Harness {
        harness_with(cafe(), telegram_ok().await, admin_config()).await
    }

    fn master_key() -> (HeaderName, HeaderValue) {
        (HeaderName::from_static("x-master-key"), HeaderValue::from_static("k1"))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let h = harness().await;

        let response = h.server.get("/api/health").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert!(!body["version"].as_str().unwrap().is_empty());
        assert_eq!(body["tickets"], "kv");
        assert_eq!(body["telegram"], true);
    }

    #[tokio::test]
    async fn test_create_business_then_conflict() {
        let h = harness().await;
        let (name, value) = master_key();

        let response = h
            .server
            .post("/api/createBusiness")
            .add_header(name.clone(), value.clone())
            .json(&json!({"slug": "Joes-Bakery", "name": "Joe's Bakery", "settings": {"operatorPin": "9999"}}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["slug"], "joes-bakery");
        assert!(body["tenant"]["settings"].get("operatorPin").is_none());

        let stored = h.db.get("tenants/joes-bakery").await.unwrap().unwrap();
        assert_eq!(stored["name"], "Joe's Bakery");
        assert_eq!(stored["analytics"]["servedCount"], 0);
        assert_eq!(stored["counters"].as_object().unwrap().len(), 1);
        assert_eq!(stored["settings"]["operatorPin"], "9999");
        assert_eq!(
            h.db.get("tenantIndex/byName/joe-s-bakery").await.unwrap(),
            Some(json!("joes-bakery"))
        );

        let response = h
            .server
            .post("/api/createBusiness")
            .add_header(name, value)
            .json(&json!({"slug": "joes-bakery", "name": "Other"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "conflict");
        assert_eq!(body["existing"]["name"], "Joe's Bakery");
    }

    #[tokio::test]
    async fn test_create_business_requires_master_key() {
        let h = harness().await;
        let response = h
            .server
            .post("/api/createBusiness")
            .json(&json!({"slug": "shop", "name": "Shop"}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        let body: Value = response.json();
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_missing_server_key_is_misconfiguration() {
        let h = harness_with(cafe(), telegram_ok().await, ApiConfig::default()).await;
        let (name, value) = master_key();
        let response = h
            .server
            .post("/api/updateBusiness")
            .add_header(name, value)
            .json(&json!({"slug": "cafe", "name": "Cafe 2"}))
            .await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["error"], "server_misconfigured");
    }

    #[tokio::test]
    async fn test_get_business_hides_pin() {
        let h = harness().await;

        let response = h.server.get("/api/getBusiness").add_query_param("slug", "cafe").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["name"], "Cafe");
        assert_eq!(body["pinRequired"], true);
        assert!(body["settings"].get("operatorPin").is_none());
        assert_eq!(body["links"]["explore"], "https://cafe.example");

        let response = h.server.post("/api/getBusiness").json(&json!({"slug": "cafe"})).await;
        response.assert_status_ok();

        let response = h.server.get("/api/getBusiness").add_query_param("slug", "nope").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_business_patches_settings_and_index() {
        let h = harness().await;
        h.db.set("tenantIndex/byName/cafe", json!("cafe")).await.unwrap();
        let (name, value) = master_key();

        let response = h
            .server
            .post("/api/updateBusiness")
            .add_header(name, value)
            .json(&json!({"slug": "cafe", "name": "Cafe Central", "settings": {"locale": "de"}}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["updated"], json!(["name", "settings/locale"]));

        let tenant = h.db.get("tenants/cafe").await.unwrap().unwrap();
        assert_eq!(tenant["name"], "Cafe Central");
        assert_eq!(tenant["settings"]["locale"], "de");
        assert_eq!(tenant["settings"]["operatorPin"], "1234");
        assert_eq!(h.db.get("tenantIndex/byName/cafe").await.unwrap(), None);
        assert_eq!(
            h.db.get("tenantIndex/byName/cafe-central").await.unwrap(),
            Some(json!("cafe"))
        );
    }

    #[tokio::test]
    async fn test_link_then_webhook_binds_chat() {
        let h = harness().await;

        let response = h
            .server
            .post("/api/createTelegramLink")
            .json(&json!({"tenant": "cafe", "queueKey": "-OaQ1", "counterName": "Counter 1"}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        let token = body["token"].as_str().unwrap().to_string();
        let link = body["link"].as_str().unwrap();
        assert_eq!(link, format!("https://t.me/QueueBellBot?start=cafe__{token}"));

        let record = h
            .db
            .get(&format!("tenants/cafe/telegramTokens/{token}"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["queueKey"], "-OaQ1");
        assert_eq!(record["tenant"], "cafe");

        let update = json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "date": 1_735_732_800,
                "chat": {"id": 77, "type": "private", "first_name": "Ann"},
                "from": {"id": 77, "is_bot": false, "first_name": "Ann"},
                "text": format!("/start cafe__{token}")
            }
        });
        let response = h.server.post("/api/telegramWebhook").json(&update).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["action"], "linked");
        assert_eq!(body["tenant"], "cafe");

        let entry = h.db.get("tenants/cafe/queue/-OaQ1").await.unwrap().unwrap();
        assert_eq!(entry["chatId"], "77");
        assert_eq!(entry["telegramConnected"], true);
    }

    #[tokio::test]
    async fn test_link_for_missing_entry_is_not_found() {
        let h = harness().await;
        let response = h
            .server
            .post("/api/createTelegramLink")
            .json(&json!({"tenant": "cafe", "queueKey": "-Missing"}))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);

        let response = h
            .server
            .post("/api/createTelegramLink")
            .json(&json!({"tenant": "cafe"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_secret_is_checked() {
        let config = admin_config().with_webhook_secret("hook");
        let h = harness_with(cafe(), telegram_ok().await, config).await;

        let response = h
            .server
            .post("/api/telegramWebhook")
            .json(&json!({"update_id": 1}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        let response = h
            .server
            .post("/api/telegramWebhook")
            .add_header(
                HeaderName::from_static("x-telegram-bot-api-secret-token"),
                HeaderValue::from_static("hook"),
            )
            .json(&json!({"update_id": 1}))
            .await;
        response.assert_status_ok();
    }

    #[tokio::test]
    async fn test_notify_counter_rejects_empty_called() {
        let h = harness().await;
        let response = h
            .server
            .post("/api/notifyCounter")
            .json(&json!({"tenant": "cafe", "calledFull": "  "}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_input");
    }

    #[tokio::test]
    async fn test_notify_counter_serves_recipient() {
        let h = harness().await;
        let response = h
            .server
            .post("/api/notifyCounter")
            .add_header(HeaderName::from_static("x-tenant"), HeaderValue::from_static("cafe"))
            .json(&json!({
                "calledFull": "A002",
                "counterName": "Counter 1",
                "recipients": [{"chatId": 42, "theirNumber": "A002", "ticketId": "-OaQ1"}]
            }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["sent"], 1);
        assert_eq!(body["tenant"], "cafe");
        assert_eq!(h.db.get("tenants/cafe/analytics/servedCount").await.unwrap(), Some(json!(1)));
        assert_eq!(h.telegram.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_shape() {
        let h = harness().await;
        let response = h
            .server
            .post("/api/verifyPin")
            .content_type("application/json")
            .bytes("{not json".into())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_input");
    }

    #[tokio::test]
    async fn test_verify_pin() {
        let h = harness().await;

        let response = h
            .server
            .post("/api/verifyPin")
            .json(&json!({"tenant": "cafe", "pin": 1234}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["required"], true);

        let response = h
            .server
            .post("/api/verifyPin")
            .json(&json!({"tenant": "cafe", "pin": "0000"}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_counter_actions_require_pin_and_patch_once() {
        let h = harness().await;

        let response = h
            .server
            .post("/api/counters/issue")
            .json(&json!({"tenant": "cafe", "counterId": "c1"}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        let before = h.db.patch_count();
        let response = h
            .server
            .post("/api/counters/issue")
            .add_header(HeaderName::from_static("x-operator-pin"), HeaderValue::from_static("1234"))
            .json(&json!({"tenant": "cafe", "counterId": "c1"}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["number"], "A003");
        assert_eq!(h.db.patch_count(), before + 1);
        assert_eq!(
            h.db.get("tenants/cafe/counters/c1/lastIssued").await.unwrap(),
            Some(json!(3))
        );

        let response = h
            .server
            .post("/api/counters/explode")
            .json(&json!({"tenant": "cafe", "counterId": "c1", "pin": "1234"}))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_call_next_with_notify_runs_pipeline() {
        let h = harness().await;

        let response = h
            .server
            .post("/api/counters/callNext")
            .json(&json!({"tenant": "cafe", "counterId": "c1", "pin": "1234", "notify": true}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["number"], "A002");
        assert_eq!(body["counter"]["nowServing"], 2);
        assert_eq!(body["notify"]["calledFull"], "A002");

        let response = h
            .server
            .post("/api/counters/callNext")
            .json(&json!({"tenant": "cafe", "counterId": "c1", "pin": "1234"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_announce_removes_blocked_subscribers() {
        let telegram = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .and(wiremock::matchers::body_partial_json(json!({"chat_id": 1})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 1}})),
            )
            .mount(&telegram)
            .await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .and(wiremock::matchers::body_partial_json(json!({"chat_id": 2})))
            .respond_with(ResponseTemplate::new(403).set_body_json(
                json!({"ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"}),
            ))
            .mount(&telegram)
            .await;

        let mut data = cafe();
        data["tenants"]["cafe"]["announcement"] = json!({"chatIds": {"1": true, "2": true}});
        let h = harness_with(data, telegram, admin_config()).await;

        let before = h.db.patch_count();
        let response = h
            .server
            .post("/api/announce")
            .json(&json!({"tenant": "cafe", "text": "Closing early today"}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["recipients"], 2);
        assert_eq!(body["delivered"], 1);
        assert_eq!(body["removed"], json!(["2"]));

        assert_eq!(h.db.patch_count(), before + 1);
        let announcement = h.db.get("tenants/cafe/announcement").await.unwrap().unwrap();
        assert_eq!(announcement["chatIds"], json!({"1": true}));
        assert_eq!(announcement["last"]["text"], "Closing early today");
    }

    #[tokio::test]
    async fn test_announce_requires_key_when_configured() {
        let mut config = admin_config();
        config.announce_requires_key = true;
        let h = harness_with(cafe(), telegram_ok().await, config).await;

        let response = h
            .server
            .post("/api/announce")
            .json(&json!({"tenant": "cafe", "text": "hi"}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_env_endpoints() {
        let h = harness().await;

        let response = h.server.get("/api/env").add_query_param("slug", "cafe").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["tenant"], "cafe");
        assert_eq!(body["botUsername"], "QueueBellBot");
        assert_eq!(body["telegramEnabled"], true);

        let response = h.server.get("/api/get-firebase-config").await;
        response.assert_status_ok();
    }
}
