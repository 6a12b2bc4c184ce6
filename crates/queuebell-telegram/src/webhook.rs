//! Telegram linking webhook.
//!
//! Receives bot updates, resolves the customer's start token to a queue
//! record and binds the chat to it inside the right tenant. Resolution order:
//!
//! 1. `tenants/{slug}/telegramTokens/{token}` when a tenant is known
//! 2. root-level `telegramTokens/{token}` (read-only, must name a tenant)
//! 3. bare queue key
//! 4. inline base64 record (`queueKey`, else indexed `queueId`)
//! 5. short id matched against `queueId`, raw then normalized
//!
//! Token problems are answered in chat and reported as handled; only
//! database failures surface as errors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use teloxide::types::{Update, UpdateKind};
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

use queuebell_models::{normalize, Counter, QueueEntry, Slug, StartTokenRecord};
use queuebell_persistence::{validate_path, RealtimeDb, TenantPatch, TenantStore};

use crate::client::{SendOutcome, TelegramClient};
use crate::error::{Result, TokenError};
use crate::keyboard::{html_escape, status_keyboard, CALLBACK_HELP, CALLBACK_STATUS};
use crate::token::{decode, split_tenant, start_param_from_text, DecodedToken, StartParam};

/// Bot commands understood by the webhook.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "QueueBell commands:")]
pub enum Command {
    #[command(description = "link this chat to your ticket: /start <code>")]
    Start(String),

    #[command(description = "show your ticket status")]
    Status,

    #[command(description = "show this help")]
    Help,
}

impl Command {
    /// Parses a command, ignoring any `@botname` suffix.
    pub fn from_text(text: &str) -> Option<Self> {
        let text = text.trim();
        let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let head = head.split('@').next().unwrap_or(head);
        let normalized = if rest.is_empty() {
            head.to_string()
        } else {
            format!("{head} {}", rest.trim())
        };
        Self::parse(&normalized, "").ok()
    }
}

/// Static settings of the webhook.
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// Customer status page linked under replies.
    pub status_url: Option<String>,
    /// Tenant used when an update carries no hint at all.
    pub default_tenant: Option<Slug>,
}

/// What the webhook did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    Linked,
    Relinked,
    InvalidToken,
    ExpiredToken,
    NoMatch,
    Status,
    Help,
    Welcome,
    Ignored,
}

/// Response body of the webhook endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub ok: bool,
    pub action: WebhookAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<SendOutcome>,
}

impl WebhookOutcome {
    fn new(action: WebhookAction) -> Self {
        Self {
            ok: true,
            action,
            tenant: None,
            queue_key: None,
            reply: None,
        }
    }
}

/// A chat bound to a queue record.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub tenant: Slug,
    pub queue_key: String,
    pub number: Option<String>,
    pub counter_name: Option<String>,
    pub relinked: bool,
}

#[derive(Debug)]
enum Resolution {
    Bound(Binding),
    Rejected(TokenError),
    NoMatch,
}

/// Record path key for a token: base64 alphabets folded to URL-safe,
/// padding dropped. `None` when the token cannot be a database key.
fn record_key(token: &str) -> Option<String> {
    let key: String = token
        .chars()
        .filter(|&c| c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let safe = !key.is_empty()
        && key.len() <= 768
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    safe.then_some(key)
}

fn parse_record(value: Value) -> std::result::Result<StartTokenRecord, TokenError> {
    serde_json::from_value(value).map_err(|_| TokenError::InvalidToken)
}

fn record_tenant(record: &StartTokenRecord) -> Option<Slug> {
    record.tenant.as_deref().and_then(|t| Slug::parse(t).ok())
}

/// Stateless handler for bot updates.
pub struct LinkingWebhook {
    db: Arc<dyn RealtimeDb>,
    client: TelegramClient,
    config: WebhookConfig,
}

impl LinkingWebhook {
    pub fn new(db: Arc<dyn RealtimeDb>, client: TelegramClient, config: WebhookConfig) -> Self {
        Self { db, client, config }
    }

    fn tenant_store(&self, tenant: &Slug) -> TenantStore {
        TenantStore::new(self.db.clone(), tenant.clone())
    }

    /// Handles one raw update. `tenant_hint` comes from the request
    /// (`x-tenant` header or `?slug=`).
    pub async fn handle(&self, payload: &Value, tenant_hint: Option<Slug>) -> Result<WebhookOutcome> {
        let update: Update = match serde_json::from_value(payload.clone()) {
            Ok(update) => update,
            Err(e) => {
                debug!(error = %e, "Ignoring unparseable update");
                return Ok(WebhookOutcome::new(WebhookAction::Ignored));
            }
        };
        let hint = tenant_hint.or_else(|| self.config.default_tenant.clone());

        match update.kind {
            UpdateKind::Message(msg) | UpdateKind::EditedMessage(msg) => {
                let chat_id = msg.chat.id.0.to_string();
                match msg.text() {
                    Some(text) => self.handle_text(&chat_id, text, hint).await,
                    None => Ok(WebhookOutcome::new(WebhookAction::Ignored)),
                }
            }
            UpdateKind::CallbackQuery(query) => {
                let chat_id = query.from.id.0.to_string();
                let ack = self.client.answer_callback(&query.id.to_string(), None).await;
                if !ack.ok {
                    warn!(chat_id = %chat_id, error = ?ack.error, "Failed to answer callback");
                }
                match query.data.as_deref().map(str::trim) {
                    Some(CALLBACK_HELP) => self.reply_help(&chat_id).await,
                    Some(CALLBACK_STATUS) => self.reply_status(&chat_id, hint).await,
                    Some(data) if !data.is_empty() => self.link_and_reply(&chat_id, data, hint).await,
                    _ => Ok(WebhookOutcome::new(WebhookAction::Ignored)),
                }
            }
            _ => Ok(WebhookOutcome::new(WebhookAction::Ignored)),
        }
    }

    async fn handle_text(&self, chat_id: &str, text: &str, hint: Option<Slug>) -> Result<WebhookOutcome> {
        let text = text.trim();
        if !text.starts_with('/') {
            return self.link_and_reply(chat_id, text, hint).await;
        }
        match Command::from_text(text) {
            Some(Command::Start(arg)) if arg.trim().is_empty() => self.reply_welcome(chat_id).await,
            Some(Command::Start(arg)) => self.link_and_reply(chat_id, &arg, hint).await,
            Some(Command::Status) => self.reply_status(chat_id, hint).await,
            Some(Command::Help) | None => self.reply_help(chat_id).await,
        }
    }

    async fn send(&self, chat_id: &str, text: &str) -> SendOutcome {
        let keyboard = status_keyboard(self.config.status_url.as_deref());
        let outcome = self.client.send_message(chat_id, text, Some(&keyboard)).await;
        if !outcome.ok {
            warn!(chat_id = %chat_id, error = ?outcome.error, "Reply not delivered");
        }
        outcome
    }

    async fn reply_welcome(&self, chat_id: &str) -> Result<WebhookOutcome> {
        let text = "👋 Welcome to <b>QueueBell</b>!\n\n\
                    Open the Telegram link on your ticket page and we'll message you \
                    here when your number is called.";
        let mut outcome = WebhookOutcome::new(WebhookAction::Welcome);
        outcome.reply = Some(self.send(chat_id, text).await);
        Ok(outcome)
    }

    async fn reply_help(&self, chat_id: &str) -> Result<WebhookOutcome> {
        let text = html_escape(&Command::descriptions().to_string());
        let mut outcome = WebhookOutcome::new(WebhookAction::Help);
        outcome.reply = Some(self.send(chat_id, &text).await);
        Ok(outcome)
    }

    async fn link_and_reply(&self, chat_id: &str, text: &str, hint: Option<Slug>) -> Result<WebhookOutcome> {
        let resolution = self.link(chat_id, text, hint, Utc::now()).await?;
        let (mut outcome, reply) = match resolution {
            Resolution::Bound(binding) => {
                let number = html_escape(binding.number.as_deref().unwrap_or("your number"));
                let counter = binding
                    .counter_name
                    .as_deref()
                    .map(|c| format!(" at <b>{}</b>", html_escape(c)))
                    .unwrap_or_default();
                let (action, text) = if binding.relinked {
                    (
                        WebhookAction::Relinked,
                        format!("✅ This chat is already linked to number <b>{number}</b>{counter}."),
                    )
                } else {
                    (
                        WebhookAction::Linked,
                        format!(
                            "✅ You're linked! We'll message you here when number <b>{number}</b> \
                             is called{counter}."
                        ),
                    )
                };
                info!(
                    chat_id = %chat_id,
                    tenant = %binding.tenant,
                    queue_key = %binding.queue_key,
                    relinked = binding.relinked,
                    "Linked chat to ticket"
                );
                let mut outcome = WebhookOutcome::new(action);
                outcome.tenant = Some(binding.tenant.to_string());
                outcome.queue_key = Some(binding.queue_key);
                (outcome, text)
            }
            Resolution::Rejected(TokenError::ExpiredToken) => (
                WebhookOutcome::new(WebhookAction::ExpiredToken),
                "⌛ This link has expired. Please take a new number or open the link \
                 on your ticket page again."
                    .to_string(),
            ),
            Resolution::Rejected(TokenError::InvalidToken) => (
                WebhookOutcome::new(WebhookAction::InvalidToken),
                "❌ This link is invalid. Please open the Telegram link on your ticket page again."
                    .to_string(),
            ),
            Resolution::NoMatch => (
                WebhookOutcome::new(WebhookAction::NoMatch),
                "🔎 We couldn't find a ticket for that code. Please check it and try again."
                    .to_string(),
            ),
        };
        outcome.reply = Some(self.send(chat_id, &reply).await);
        Ok(outcome)
    }

    /// Resolves the token in `text` and binds `chat_id` to its queue record.
    async fn link(
        &self,
        chat_id: &str,
        text: &str,
        hint: Option<Slug>,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        let Some(param) = start_param_from_text(text) else {
            return Ok(Resolution::NoMatch);
        };
        let StartParam { tenant, token } = split_tenant(&param);
        let tenant = tenant.or(hint);
        let key = record_key(&token);

        if let (Some(tenant), Some(key)) = (&tenant, &key) {
            let store = self.tenant_store(tenant);
            if let Some(value) = store.get(&format!("telegramTokens/{key}")).await? {
                let record = match parse_record(value) {
                    Ok(record) => record,
                    Err(e) => return Ok(Resolution::Rejected(e)),
                };
                return self.bind_record(&store, record, Some(key.as_str()), chat_id, now).await;
            }
        }

        if let Some(key) = &key {
            let global = TenantStore::global(self.db.clone());
            if let Some(value) = global.get(&format!("telegramTokens/{key}")).await? {
                let record = match parse_record(value) {
                    Ok(record) => record,
                    Err(e) => return Ok(Resolution::Rejected(e)),
                };
                let Some(owner) = record_tenant(&record).or_else(|| tenant.clone()) else {
                    debug!(chat_id = %chat_id, "Global token names no tenant");
                    return Ok(Resolution::NoMatch);
                };
                let store = self.tenant_store(&owner);
                return self.bind_record(&store, record, Some(key.as_str()), chat_id, now).await;
            }
        }

        let decoded = match decode(&token, now) {
            Ok(decoded) => decoded,
            Err(e) => return Ok(Resolution::Rejected(e)),
        };
        match decoded {
            DecodedToken::BareKey(queue_key) => {
                let Some(tenant) = tenant else {
                    return Ok(Resolution::NoMatch);
                };
                let store = self.tenant_store(&tenant);
                self.bind(&store, &queue_key, chat_id, None, now).await
            }
            DecodedToken::Record(record) => {
                let Some(owner) = record_tenant(&record).or(tenant) else {
                    return Ok(Resolution::NoMatch);
                };
                let store = self.tenant_store(&owner);
                if let Some(key) = &key {
                    let previous = store.get(&format!("telegramTokens/{key}")).await?;
                    if let Some(previous) = previous.and_then(|v| parse_record(v).ok()) {
                        if previous.used_by_other(chat_id) {
                            return Ok(Resolution::Rejected(TokenError::InvalidToken));
                        }
                    }
                }
                self.bind_record(&store, record, key.as_deref(), chat_id, now).await
            }
            DecodedToken::ShortId(id) => {
                let Some(tenant) = tenant else {
                    return Ok(Resolution::NoMatch);
                };
                let store = self.tenant_store(&tenant);
                match find_by_queue_id(&store, &id).await? {
                    Some(queue_key) => self.bind(&store, &queue_key, chat_id, None, now).await,
                    None => Ok(Resolution::NoMatch),
                }
            }
        }
    }

    async fn bind_record(
        &self,
        store: &TenantStore,
        record: StartTokenRecord,
        marker: Option<&str>,
        chat_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        if record.is_expired(now) {
            return Ok(Resolution::Rejected(TokenError::ExpiredToken));
        }
        if record.used_by_other(chat_id) {
            return Ok(Resolution::Rejected(TokenError::InvalidToken));
        }
        let queue_key = match (&record.queue_key, &record.queue_id) {
            (Some(key), _) => Some(key.clone()),
            (None, Some(id)) => find_by_queue_id(store, id).await?,
            (None, None) => None,
        };
        let Some(queue_key) = queue_key else {
            return Ok(Resolution::NoMatch);
        };
        let resolution = self.bind(store, &queue_key, chat_id, marker, now).await?;
        Ok(match resolution {
            Resolution::Bound(mut binding) => {
                if binding.counter_name.is_none() {
                    binding.counter_name = record.counter_name;
                }
                Resolution::Bound(binding)
            }
            other => other,
        })
    }

    /// Writes the binding in one patch.
    async fn bind(
        &self,
        store: &TenantStore,
        queue_key: &str,
        chat_id: &str,
        marker: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        let Some(tenant) = store.slug().cloned() else {
            return Ok(Resolution::NoMatch);
        };
        if validate_path(queue_key).is_err() || queue_key.contains('/') {
            return Ok(Resolution::NoMatch);
        }
        let Some(raw) = store.get(&format!("queue/{queue_key}")).await? else {
            return Ok(Resolution::NoMatch);
        };
        let entry = QueueEntry::from_value(&raw).unwrap_or_default();
        let connected_at = now.to_rfc3339();

        let relinked = entry.telegram_connected && entry.chat_id.as_deref() == Some(chat_id);
        let mut patch = TenantPatch::new();
        patch.set(format!("queue/{queue_key}/connectedAt"), connected_at.clone());
        if !relinked {
            if let Some(previous) = entry.chat_id.as_deref().filter(|c| *c != chat_id) {
                warn!(tenant = %tenant, queue_key = %queue_key, previous = %previous, "Rebinding ticket to a new chat");
            }
            patch
                .set(format!("queue/{queue_key}/chatId"), chat_id)
                .set(format!("queue/{queue_key}/telegramConnected"), true)
                .set(format!("announcement/chatIds/{chat_id}"), true);
            if let Some(marker) = marker {
                patch
                    .set(format!("telegramTokens/{marker}/used"), true)
                    .set(format!("telegramTokens/{marker}/usedAt"), connected_at)
                    .set(format!("telegramTokens/{marker}/chatId"), chat_id)
                    .set(format!("telegramTokens/{marker}/linkedQueueKey"), queue_key);
            }
        }
        store.patch(patch).await?;

        let counter_name = match (&entry.counter_name, &entry.counter_id) {
            (Some(name), _) => Some(name.clone()),
            (None, Some(id)) => counter_name(store, id).await?,
            (None, None) => None,
        };
        Ok(Resolution::Bound(Binding {
            tenant,
            queue_key: queue_key.to_string(),
            number: entry.display_number().map(str::to_string),
            counter_name,
            relinked,
        }))
    }

    async fn reply_status(&self, chat_id: &str, hint: Option<Slug>) -> Result<WebhookOutcome> {
        let global = TenantStore::global(self.db.clone());
        let mut found = None;
        if let Some(tenant) = &hint {
            let store = self.tenant_store(tenant);
            if let Some(hit) = active_ticket(&store, chat_id).await? {
                found = Some((store, hit));
            }
        }
        if found.is_none() {
            if let Some(hit) = active_ticket(&global, chat_id).await? {
                found = Some((global, hit));
            }
        }

        let mut outcome = WebhookOutcome::new(WebhookAction::Status);
        outcome.tenant = hint.as_ref().map(Slug::to_string);
        let text = match found {
            Some((store, (_, entry))) => {
                outcome.tenant = store.slug().map(Slug::to_string);
                let number = html_escape(entry.display_number().unwrap_or("?"));
                let (name, serving) = match &entry.counter_id {
                    Some(id) => counter_view(&store, id).await?,
                    None => (None, None),
                };
                let counter = entry
                    .counter_name
                    .clone()
                    .or(name)
                    .map(|c| format!(" at <b>{}</b>", html_escape(&c)))
                    .unwrap_or_default();
                let serving = serving
                    .map(|s| format!("\nNow serving: <b>{}</b>.", html_escape(&s)))
                    .unwrap_or_default();
                format!("🎫 Your number <b>{number}</b> is waiting{counter}.{serving}")
            }
            None => "You have no active ticket linked to this chat. Open the Telegram link \
                     on your ticket page to get notified."
                .to_string(),
        };
        outcome.reply = Some(self.send(chat_id, &text).await);
        Ok(outcome)
    }
}

/// Finds a queue key by `queueId`: raw, then normalized, then numeric.
async fn find_by_queue_id(store: &TenantStore, id: &str) -> Result<Option<String>> {
    let mut candidates = vec![json!(id)];
    let normalized = normalize(id);
    if !normalized.is_empty() && normalized != id {
        candidates.push(json!(normalized));
    }
    if let Ok(n) = id.parse::<i64>() {
        candidates.push(json!(n));
    }
    for candidate in candidates {
        let hits = store.query_by_index("queue", "queueId", &candidate).await?;
        if let Some(key) = hits.keys().next() {
            return Ok(Some(key.clone()));
        }
    }
    Ok(None)
}

/// Most recent waiting queue record linked to `chat_id`.
async fn active_ticket(store: &TenantStore, chat_id: &str) -> Result<Option<(String, QueueEntry)>> {
    let mut hits = store.query_by_index("queue", "chatId", &json!(chat_id)).await?;
    if hits.is_empty() {
        if let Ok(n) = chat_id.parse::<i64>() {
            hits = store.query_by_index("queue", "chatId", &json!(n)).await?;
        }
    }
    Ok(hits
        .into_iter()
        .filter_map(|(key, value)| QueueEntry::from_value(&value).map(|entry| (key, entry)))
        .filter(|(_, entry)| entry.is_waiting())
        .max_by_key(|(_, entry)| entry.created_at))
}

async fn counter_name(store: &TenantStore, counter_id: &str) -> Result<Option<String>> {
    Ok(counter_view(store, counter_id).await?.0)
}

/// Counter name and the number it is serving.
async fn counter_view(store: &TenantStore, counter_id: &str) -> Result<(Option<String>, Option<String>)> {
    if validate_path(counter_id).is_err() || counter_id.contains('/') {
        return Ok((None, None));
    }
    let Some(raw) = store.get(&format!("counters/{counter_id}")).await? else {
        return Ok((None, None));
    };
    match serde_json::from_value::<Counter>(raw.clone()) {
        Ok(counter) => {
            let serving = counter.called_full();
            Ok((Some(counter.name), serving))
        }
        Err(_) => Ok((
            raw.get("name").and_then(Value::as_str).map(str::to_string),
            None,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use queuebell_persistence::MemoryDb;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const S4_TOKEN: &str = "eyJxdWV1ZUtleSI6Ii1PYVZLIn0";

    async fn telegram() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 1}})),
            )
            .mount(&server)
            .await;
        server
    }

    fn webhook(db: &Arc<MemoryDb>, server: &MockServer) -> LinkingWebhook {
        let client = TelegramClient::new("1:t")
            .unwrap()
            .with_base_url(server.uri())
            .with_backoff(std::time::Duration::from_millis(1));
        LinkingWebhook::new(
            db.clone(),
            client,
            WebhookConfig {
                status_url: Some("https://cafe.example/status".into()),
                default_tenant: None,
            },
        )
    }

    fn cafe() -> Option<Slug> {
        Some(Slug::parse("cafe").unwrap())
    }

    fn message(chat_id: i64, text: &str) -> Value {
        json!({
            "update_id": 1000,
            "message": {
                "message_id": 1,
                "date": 1_735_732_800,
                "chat": {"id": chat_id, "type": "private", "first_name": "Ann"},
                "from": {"id": chat_id, "is_bot": false, "first_name": "Ann"},
                "text": text
            }
        })
    }

    fn callback(chat_id: i64, data: &str) -> Value {
        json!({
            "update_id": 1001,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": chat_id, "is_bot": false, "first_name": "Ann"},
                "chat_instance": "ci-1",
                "data": data
            }
        })
    }

    fn cafe_db() -> Arc<MemoryDb> {
        Arc::new(MemoryDb::with_data(json!({
            "tenants": {"cafe": {
                "queue": {
                    "-OaVK": {"number": "VANILLA002", "queueId": "V2", "status": "waiting", "counterId": "c1"},
                    "-OaVL": {"number": "VANILLA003", "queueId": "V3", "status": "waiting"}
                },
                "counters": {"c1": {"name": "Counter 1", "prefix": "VANILLA", "nowServing": 1, "lastIssued": 3}}
            }}
        })))
    }

    #[tokio::test]
    async fn test_base64_token_links_chat() {
        let db = cafe_db();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook
            .handle(&message(99, &format!("/start {S4_TOKEN}")), cafe())
            .await
            .unwrap();

        assert_eq!(outcome.action, WebhookAction::Linked);
        assert_eq!(outcome.queue_key.as_deref(), Some("-OaVK"));
        assert_eq!(db.patch_count(), 1);

        let entry = db.get("tenants/cafe/queue/-OaVK").await.unwrap().unwrap();
        assert_eq!(entry["chatId"], "99");
        assert_eq!(entry["telegramConnected"], true);
        assert!(entry["connectedAt"].is_string());

        let marker = db
            .get(&format!("tenants/cafe/telegramTokens/{S4_TOKEN}"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(marker["used"], true);
        assert_eq!(marker["chatId"], "99");
        assert_eq!(marker["linkedQueueKey"], "-OaVK");
        assert_eq!(
            db.get("tenants/cafe/announcement/chatIds/99").await.unwrap(),
            Some(json!(true))
        );

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests.last().unwrap().body).to_string();
        assert!(body.contains("VANILLA002"));
        assert!(body.contains("Counter 1"));
    }

    #[tokio::test]
    async fn test_expired_record_replies_without_patch() {
        let db = cafe_db();
        let expired = StartTokenRecord {
            expires_at: Some(Utc::now() - Duration::hours(1)),
            ..StartTokenRecord::new("-OaVK", Utc::now() - Duration::hours(25))
        };
        db.set(
            "tenants/cafe/telegramTokens/tok_expired_1",
            serde_json::to_value(&expired).unwrap(),
        )
        .await
        .unwrap();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook
            .handle(&message(99, "/start tok_expired_1"), cafe())
            .await
            .unwrap();

        assert_eq!(outcome.action, WebhookAction::ExpiredToken);
        assert_eq!(db.patch_count(), 0);
        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests.last().unwrap().body).to_string();
        assert!(body.contains("expired"));
    }

    #[tokio::test]
    async fn test_relinking_same_chat_only_refreshes_connected_at() {
        let db = cafe_db();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        hook.handle(&message(99, "/start -OaVK"), cafe()).await.unwrap();
        let outcome = hook.handle(&message(99, "/start -OaVK"), cafe()).await.unwrap();

        assert_eq!(outcome.action, WebhookAction::Relinked);
        assert_eq!(db.patch_count(), 2);
        let entry = db.get("tenants/cafe/queue/-OaVK").await.unwrap().unwrap();
        assert_eq!(entry["chatId"], "99");
        assert_eq!(entry["telegramConnected"], true);
    }

    #[tokio::test]
    async fn test_token_used_by_other_chat_is_rejected() {
        let db = cafe_db();
        let mut record = StartTokenRecord::new("-OaVK", Utc::now());
        record.used = true;
        record.chat_id = Some("77".into());
        db.set(
            "tenants/cafe/telegramTokens/tok_used_1",
            serde_json::to_value(&record).unwrap(),
        )
        .await
        .unwrap();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook.handle(&message(99, "/start tok_used_1"), cafe()).await.unwrap();
        assert_eq!(outcome.action, WebhookAction::InvalidToken);
        assert_eq!(db.patch_count(), 0);
    }

    #[tokio::test]
    async fn test_global_record_binds_in_named_tenant() {
        let db = cafe_db();
        let mut record = StartTokenRecord::new("-OaVL", Utc::now());
        record.tenant = Some("cafe".into());
        db.set("telegramTokens/tok_global_1", serde_json::to_value(&record).unwrap())
            .await
            .unwrap();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook.handle(&message(5, "/start tok_global_1"), None).await.unwrap();

        assert_eq!(outcome.action, WebhookAction::Linked);
        assert_eq!(outcome.tenant.as_deref(), Some("cafe"));
        let marker = db.get("tenants/cafe/telegramTokens/tok_global_1/used").await.unwrap();
        assert_eq!(marker, Some(json!(true)));
        assert!(db.get("telegramTokens/tok_global_1/used").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_global_record_without_tenant_is_no_match() {
        let db = cafe_db();
        let record = StartTokenRecord::new("-OaVL", Utc::now());
        db.set("telegramTokens/tok_orphan", serde_json::to_value(&record).unwrap())
            .await
            .unwrap();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook.handle(&message(5, "/start tok_orphan"), None).await.unwrap();
        assert_eq!(outcome.action, WebhookAction::NoMatch);
        assert_eq!(db.patch_count(), 0);
    }

    #[tokio::test]
    async fn test_pasted_short_id_with_slug_prefix() {
        let db = cafe_db();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook.handle(&message(7, "cafe:v3"), None).await.unwrap();

        assert_eq!(outcome.action, WebhookAction::Linked);
        assert_eq!(outcome.queue_key.as_deref(), Some("-OaVL"));
    }

    #[tokio::test]
    async fn test_pasted_deep_link_url() {
        let db = cafe_db();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook
            .handle(&message(7, "https://t.me/QueueBellBot?start=-OaVL"), cafe())
            .await
            .unwrap();
        assert_eq!(outcome.action, WebhookAction::Linked);
    }

    #[tokio::test]
    async fn test_unknown_short_id_is_no_match() {
        let db = cafe_db();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook.handle(&message(7, "/start ZZ99"), cafe()).await.unwrap();
        assert_eq!(outcome.action, WebhookAction::NoMatch);
    }

    #[tokio::test]
    async fn test_start_without_token_welcomes() {
        let db = cafe_db();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook.handle(&message(7, "/start@QueueBellBot"), cafe()).await.unwrap();
        assert_eq!(outcome.action, WebhookAction::Welcome);
        assert_eq!(db.patch_count(), 0);
    }

    #[tokio::test]
    async fn test_status_reports_counter() {
        let db = cafe_db();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        hook.handle(&message(99, "/start -OaVK"), cafe()).await.unwrap();
        let outcome = hook.handle(&callback(99, "status"), cafe()).await.unwrap();

        assert_eq!(outcome.action, WebhookAction::Status);
        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests.last().unwrap().body).to_string();
        assert!(body.contains("VANILLA002"));
        assert!(body.contains("Counter 1"));
        assert!(body.contains("VANILLA001"));
    }

    #[tokio::test]
    async fn test_status_falls_back_to_global_queue() {
        let db = Arc::new(MemoryDb::with_data(json!({
            "tenants": {"cafe": {
                "queue": {"-OaVK": {"number": "VANILLA002", "status": "waiting", "chatId": "7"}}
            }},
            "queue": {"-G1": {"number": "B004", "status": "waiting", "chatId": "88", "counterId": "g1"}},
            "counters": {"g1": {"name": "Front Desk", "prefix": "B", "nowServing": 2, "lastIssued": 4}}
        })));
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook.handle(&message(88, "/status"), cafe()).await.unwrap();

        assert_eq!(outcome.action, WebhookAction::Status);
        assert_eq!(outcome.tenant, None);
        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests.last().unwrap().body).to_string();
        assert!(body.contains("B004"));
        assert!(body.contains("Front Desk"));
        assert!(body.contains("B002"));
    }

    #[tokio::test]
    async fn test_status_prefers_tenant_queue() {
        let db = Arc::new(MemoryDb::with_data(json!({
            "tenants": {"cafe": {
                "queue": {"-OaVK": {"number": "VANILLA002", "status": "waiting", "chatId": "88"}}
            }},
            "queue": {"-G1": {"number": "B004", "status": "waiting", "chatId": "88"}}
        })));
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook.handle(&message(88, "/status"), cafe()).await.unwrap();

        assert_eq!(outcome.tenant.as_deref(), Some("cafe"));
        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests.last().unwrap().body).to_string();
        assert!(body.contains("VANILLA002"));
        assert!(!body.contains("B004"));
    }

    #[tokio::test]
    async fn test_help_callback_is_acknowledged() {
        let db = cafe_db();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot1:t/answerCallbackQuery"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot1:t/sendMessage"))
            .and(body_string_contains("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;
        let hook = webhook(&db, &server);

        let outcome = hook.handle(&callback(5, "help"), None).await.unwrap();
        assert_eq!(outcome.action, WebhookAction::Help);
    }

    #[tokio::test]
    async fn test_garbage_update_is_ignored() {
        let db = cafe_db();
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let outcome = hook.handle(&json!({"hello": "world"}), None).await.unwrap();
        assert_eq!(outcome.action, WebhookAction::Ignored);
    }

    #[tokio::test]
    async fn test_database_failure_is_an_error() {
        let db = cafe_db();
        db.set_fail_patches(true);
        let server = telegram().await;
        let hook = webhook(&db, &server);

        let result = hook.handle(&message(99, "/start -OaVK"), cafe()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(
            Command::from_text("/start@QueueBellBot abc"),
            Some(Command::Start("abc".into()))
        );
        assert_eq!(Command::from_text("/status"), Some(Command::Status));
        assert_eq!(Command::from_text("/nope"), None);
    }

    #[test]
    fn test_record_key_folds_base64() {
        assert_eq!(record_key("ab+/cd==").as_deref(), Some("ab-_cd"));
        assert_eq!(record_key("a.b"), None);
    }
}
