//! Minimal Telegram Bot API client with bounded retries.
//!
//! Requests go straight to `{base}/bot{token}/{method}` as JSON. Network
//! errors, 5xx and 429 are retried up to [`MAX_ATTEMPTS`] times with
//! exponential backoff; other 4xx answers are final. Every call resolves to
//! a [`SendOutcome`] so callers can fan out sends and settle all of them.

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use teloxide::types::InlineKeyboardMarkup;
use tracing::{debug, warn};

use crate::error::{Result, TelegramError};

/// Default Bot API endpoint.
pub const API_BASE_URL: &str = "https://api.telegram.org";

/// Longest message text sent; longer texts are cut.
pub const MAX_TEXT_CHARS: usize = 4000;

/// Longest photo caption sent.
pub const MAX_CAPTION_CHARS: usize = 1000;

/// Attempts per call, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

const BASE_BACKOFF: Duration = Duration::from_millis(150);
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(8);

/// Result of one Bot API call after retries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The chat blocked the bot or no longer exists.
    #[serde(skip)]
    pub blocked: bool,
    #[serde(skip)]
    pub attempts: u32,
}

impl SendOutcome {
    /// Outcome for a send that was never attempted.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Converts into the `result` field of the Bot API answer.
    pub fn into_result(self) -> Result<Value> {
        if self.ok {
            return Ok(self
                .body
                .and_then(|b| b.get("result").cloned())
                .unwrap_or(Value::Null));
        }
        let description = self.error.unwrap_or_else(|| "unknown error".to_string());
        if self.blocked {
            return Err(TelegramError::Blocked(description));
        }
        match self.status {
            Some(status) => Err(TelegramError::Api {
                status,
                description,
            }),
            None => Err(TelegramError::HttpError(description)),
        }
    }
}

/// Cuts `text` to at most `limit` characters, marking the cut with `…`.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Returns true for statuses worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status.as_u16() == 429
}

fn is_blocked(status: u16, description: &str) -> bool {
    if !(400..500).contains(&status) {
        return false;
    }
    let lower = description.to_lowercase();
    lower.contains("blocked") || lower.contains("deactivated") || lower.contains("chat not found")
}

/// Numeric chat ids go out as numbers, `@channel` names as strings.
fn chat_id_value(chat_id: &str) -> Value {
    chat_id
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(chat_id))
}

/// HTTP client for the Bot API.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
    backoff: Duration,
}

impl TelegramClient {
    /// Creates a client for `token`.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(TelegramError::NoToken);
        }
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            token,
            base_url: API_BASE_URL.to_string(),
            backoff: BASE_BACKOFF,
        })
    }

    /// Overrides the API endpoint (self-hosted Bot API server, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the base retry delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sends an HTML message.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> SendOutcome {
        let mut payload = json!({
            "chat_id": chat_id_value(chat_id),
            "text": truncate(text, MAX_TEXT_CHARS),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = json!(keyboard);
        }
        self.call("sendMessage", &payload).await
    }

    /// Sends a photo by URL with an HTML caption.
    pub async fn send_photo(
        &self,
        chat_id: &str,
        photo_url: &str,
        caption: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> SendOutcome {
        let mut payload = json!({
            "chat_id": chat_id_value(chat_id),
            "photo": photo_url,
            "caption": truncate(caption, MAX_CAPTION_CHARS),
            "parse_mode": "HTML",
        });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = json!(keyboard);
        }
        self.call("sendPhoto", &payload).await
    }

    /// Acknowledges a callback query, optionally with a toast.
    pub async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> SendOutcome {
        let mut payload = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            payload["text"] = json!(truncate(text, 200));
        }
        self.call("answerCallbackQuery", &payload).await
    }

    /// Calls a Bot API method with retries.
    pub async fn call(&self, method: &str, payload: &Value) -> SendOutcome {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);
        let mut outcome = SendOutcome::default();

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                let delay = self.backoff * 2u32.pow(attempt - 2);
                warn!(method, attempt, delay_ms = delay.as_millis() as u64, "Retrying Bot API call");
                tokio::time::sleep(delay).await;
            }
            outcome.attempts = attempt;

            let response = match self
                .client
                .post(&url)
                .timeout(ATTEMPT_TIMEOUT)
                .json(payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    // The URL carries the bot token.
                    let e = e.without_url();
                    warn!(method, attempt, error = %e, "Bot API request failed");
                    outcome.status = None;
                    outcome.body = None;
                    outcome.error = Some(e.to_string());
                    continue;
                }
            };

            let status = response.status();
            let body: Option<Value> = response.json().await.ok();
            let api_ok = body
                .as_ref()
                .and_then(|b| b.get("ok"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            debug!(method, status = %status, attempt, "Bot API answered");

            outcome.status = Some(status.as_u16());
            if status.is_success() && api_ok {
                outcome.ok = true;
                outcome.error = None;
                outcome.body = body;
                return outcome;
            }

            let description = body
                .as_ref()
                .and_then(|b| b.get("description"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status}"));
            outcome.body = body;
            outcome.error = Some(description.clone());

            if is_transient_error(status) {
                warn!(method, status = %status, attempt, "Transient Bot API error");
                continue;
            }
            outcome.blocked = is_blocked(status.as_u16(), &description);
            return outcome;
        }
        outcome
    }
}
