//! Message texts and inline keyboards.
//!
//! Everything is sent with HTML parse mode, so any text that came from a
//! user or operator goes through [`html_escape`].

use serde::{Deserialize, Serialize};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;
use url::Url;

/// Callback data of the "Help" button.
pub const CALLBACK_HELP: &str = "help";
/// Callback data of the "Status" button.
pub const CALLBACK_STATUS: &str = "status";

/// Escapes `&`, `<`, `>` and `"` for Telegram HTML.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A button as supplied by the operator console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonSpec {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        default,
        alias = "callback_data",
        skip_serializing_if = "Option::is_none"
    )]
    pub callback_data: Option<String>,
}

impl ButtonSpec {
    /// Converts to a Telegram button; invalid URLs and empty buttons are dropped.
    pub fn to_button(&self) -> Option<InlineKeyboardButton> {
        if self.text.trim().is_empty() {
            return None;
        }
        if let Some(raw) = &self.url {
            return url_button(&self.text, raw);
        }
        self.callback_data
            .as_ref()
            .map(|data| InlineKeyboardButton::callback(self.text.clone(), data.clone()))
    }
}

fn url_button(text: &str, raw: &str) -> Option<InlineKeyboardButton> {
    match Url::parse(raw) {
        Ok(url) => Some(InlineKeyboardButton::url(text.to_string(), url)),
        Err(e) => {
            warn!(url = %raw, error = %e, "Dropping button with invalid URL");
            None
        }
    }
}

/// Notifier keyboard: an "Explore" row, then the caller's rows.
pub fn notify_keyboard(
    explore_url: Option<&str>,
    rows: &[Vec<ButtonSpec>],
) -> Option<InlineKeyboardMarkup> {
    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    if let Some(button) = explore_url.and_then(|u| url_button("Explore", u)) {
        keyboard.push(vec![button]);
    }
    keyboard.extend(
        rows.iter()
            .map(|row| row.iter().filter_map(ButtonSpec::to_button).collect::<Vec<_>>())
            .filter(|row| !row.is_empty()),
    );
    (!keyboard.is_empty()).then(|| InlineKeyboardMarkup::new(keyboard))
}

/// Linking replies: [Open Status], [Help, Status].
pub fn status_keyboard(status_url: Option<&str>) -> InlineKeyboardMarkup {
    let mut keyboard = Vec::new();
    if let Some(button) = status_url.and_then(|u| url_button("Open Status", u)) {
        keyboard.push(vec![button]);
    }
    keyboard.push(vec![
        InlineKeyboardButton::callback("Help", CALLBACK_HELP),
        InlineKeyboardButton::callback("Status", CALLBACK_STATUS),
    ]);
    InlineKeyboardMarkup::new(keyboard)
}

/// Text sent when the customer's own number is called.
pub fn served_text(number: &str, counter_name: Option<&str>) -> String {
    let counter = counter_name
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("the counter");
    format!(
        "Your number <b>{}</b> has been called. Please proceed to <b>{}</b>.",
        html_escape(number),
        html_escape(counter)
    )
}

/// Text sent to customers later in the same series.
pub fn reminder_text(called: &str, theirs: &str) -> String {
    format!(
        "REMINDER: Number <b>{}</b> was called. Your number is <b>{}</b>. \
         Please stay nearby, your turn is coming up.",
        html_escape(called),
        html_escape(theirs)
    )
}
