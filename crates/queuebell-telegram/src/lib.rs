//! Telegram side of QueueBell.
//!
//! - [`token`]: start-token encodings and deep links
//! - [`client`]: Bot API client with bounded retries
//! - [`keyboard`]: message texts and inline keyboards
//! - [`webhook`]: the linking webhook that binds a chat to a ticket
//!
//! # Commands
//!
//! - `/start <code>` - Link this chat to a ticket
//! - `/status` - Show the linked ticket
//! - `/help` - Show available commands

pub mod client;
pub mod error;
pub mod keyboard;
pub mod token;
pub mod webhook;

pub use client::{SendOutcome, TelegramClient, MAX_CAPTION_CHARS, MAX_TEXT_CHARS};
pub use error::{Result, TelegramError, TokenError};
pub use keyboard::{html_escape, notify_keyboard, status_keyboard, ButtonSpec};
pub use token::{
    deep_link, decode, encode, split_tenant, tenant_start_param, DecodedToken, StartParam,
};
pub use webhook::{Command, LinkingWebhook, WebhookAction, WebhookConfig, WebhookOutcome};
