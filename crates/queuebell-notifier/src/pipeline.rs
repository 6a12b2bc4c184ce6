//! The call pipeline.
//!
//! One invocation handles one called number for one tenant:
//!
//! 1. collect recipients (from the request, or the tenant's waiting queue)
//! 2. classify each one against the called number, staging state changes
//! 3. send the Telegram messages while the ticket store flushes
//! 4. apply every tenant mutation in a single multi-path patch
//!
//! Classification never waits on the network per queue entry; the only
//! reads inside the loop go to the ticket store.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use queuebell_core::config::Config;
use queuebell_models::{
    is_behind, is_match, normalize, push_id, series, QueueEntry, SeriesStats, ServiceEvent, Slug,
    TenantLinks, TenantSettings, Ticket,
};
use queuebell_persistence::{
    PersistenceError, RealtimeDb, TenantPatch, TenantStore, TicketStore, TicketStoreFactory,
};
use queuebell_telegram::client::API_BASE_URL;
use queuebell_telegram::keyboard::{notify_keyboard, reminder_text, served_text};
use queuebell_telegram::{SendOutcome, TelegramClient};

use crate::error::{NotifyError, Result};
use crate::request::{
    Action, NotifyRequest, NotifyResponse, PatchReport, PersistenceReport, RecipientInput,
    RecipientResult,
};

/// Default pause between consecutive sends.
pub const DEFAULT_SEND_PAUSE: Duration = Duration::from_millis(90);

/// Default budget for one invocation.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(25);

/// Queue fields removed from served entries of linked chats.
const SCRUBBED_FIELDS: [&str; 5] = ["number", "queueId", "ticketId", "recipientFull", "fullNumber"];

/// Settings for [`Notifier`].
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Used when the request carries no `botToken`.
    pub bot_token: Option<String>,
    pub telegram_api_base: String,
    /// Used when neither the request nor the tenant links name one.
    pub explore_url: Option<String>,
    pub send_pause: Duration,
    pub handler_timeout: Duration,
    /// Overrides the Bot API client's retry delay.
    pub retry_backoff: Option<Duration>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            telegram_api_base: API_BASE_URL.to_string(),
            explore_url: None,
            send_pause: DEFAULT_SEND_PAUSE,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            retry_backoff: None,
        }
    }
}

impl NotifierConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            telegram_api_base: config.telegram_api_base.clone(),
            explore_url: config.explore_url.clone(),
            send_pause: config.send_pause,
            handler_timeout: config.handler_timeout,
            retry_backoff: None,
        }
    }
}

/// A recipient after seeding, before classification.
#[derive(Debug, Clone)]
struct Candidate {
    key: String,
    ticket_id: Option<String>,
    chat_id: Option<String>,
    number: String,
    created_at: Option<DateTime<Utc>>,
    linked: bool,
}

impl Candidate {
    fn from_input(input: &RecipientInput) -> Option<Self> {
        let number = normalize(input.number()?);
        if number.is_empty() {
            return None;
        }
        let ticket_id = input.ticket_id.clone();
        let chat_id = input.chat_id.clone();
        Some(Self {
            key: Ticket::key_for(ticket_id.as_deref(), chat_id.as_deref(), &number),
            linked: input.telegram_connected.unwrap_or(chat_id.is_some()),
            ticket_id,
            chat_id,
            number,
            created_at: input.created_at,
        })
    }

    fn from_entry(key: &str, entry: &QueueEntry) -> Option<Self> {
        Some(Self {
            key: key.to_string(),
            ticket_id: Some(key.to_string()),
            chat_id: entry.chat_id.clone(),
            number: entry.normalized_number()?,
            created_at: entry.created_at,
            linked: entry.telegram_connected,
        })
    }

    fn result(&self, action: Action) -> RecipientResult {
        RecipientResult {
            chat_id: self.chat_id.clone(),
            ticket_key: self.key.clone(),
            ticket_id: self.ticket_id.clone(),
            their_number: self.number.clone(),
            action,
            send_res: None,
        }
    }
}

/// A message waiting for dispatch; `index` points into the results.
struct Outgoing {
    index: usize,
    chat_id: String,
    text: String,
}

/// Stats live under a path segment, which cannot be empty.
fn series_label(series: &str) -> &str {
    if series.is_empty() {
        "_"
    } else {
        series
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Runs the call pipeline.
#[derive(Clone)]
pub struct Notifier {
    db: Arc<dyn RealtimeDb>,
    tickets: TicketStoreFactory,
    config: Arc<NotifierConfig>,
}

impl Notifier {
    pub fn new(db: Arc<dyn RealtimeDb>, tickets: TicketStoreFactory, config: NotifierConfig) -> Self {
        Self {
            db,
            tickets,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Name of the ticket store backend.
    pub fn ticket_backend(&self) -> &'static str {
        self.tickets.name()
    }

    /// Handles a called number. `tenant_hint` comes from `?slug=` or
    /// `x-tenant` and is used when the body names no tenant.
    pub async fn notify(&self, request: NotifyRequest, tenant_hint: Option<&str>) -> Result<NotifyResponse> {
        self.notify_at(request, tenant_hint, Utc::now()).await
    }

    /// [`Notifier::notify`] with an explicit clock.
    pub async fn notify_at(
        &self,
        request: NotifyRequest,
        tenant_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<NotifyResponse> {
        let deadline = Instant::now() + self.config.handler_timeout;

        let called = non_empty(&request.called_full).map(normalize).unwrap_or_default();
        if called.is_empty() {
            return Err(NotifyError::InvalidInput("calledFull is required".to_string()));
        }
        let called_series = series(&called);
        let raw_tenant = non_empty(&request.tenant)
            .or(tenant_hint.map(str::trim).filter(|t| !t.is_empty()))
            .ok_or_else(|| NotifyError::InvalidInput("tenant is required".to_string()))?;
        let slug = Slug::parse(raw_tenant).map_err(|e| NotifyError::InvalidInput(e.to_string()))?;

        let store = TenantStore::new(self.db.clone(), slug.clone());
        let (settings, links) = tokio::join!(
            store.get_as::<TenantSettings>("settings"),
            store.get_as::<TenantLinks>("links"),
        );
        let settings = settings?.unwrap_or_default();
        let links = links?.unwrap_or_default();
        let explore_url = non_empty(&request.explore_url)
            .map(str::to_string)
            .or(links.explore)
            .or_else(|| self.config.explore_url.clone());
        let keyboard = notify_keyboard(explore_url.as_deref(), &request.inline_buttons);
        let counter_name = non_empty(&request.counter_name).map(str::to_string);

        let candidates = match request.recipients.as_deref() {
            Some(inputs) if !inputs.is_empty() => {
                inputs.iter().filter_map(Candidate::from_input).collect()
            }
            _ => seed(&store, &called_series).await?,
        };
        let candidates = dedupe(candidates);
        debug!(
            tenant = %slug,
            called = %called,
            recipients = candidates.len(),
            "Classifying recipients"
        );

        // Classification
        let tenant = slug.as_str();
        let mut tickets = self.tickets.open();
        let mut patch = TenantPatch::new();
        let mut results: Vec<RecipientResult> = Vec::with_capacity(candidates.len());
        let mut outgoing: Vec<Outgoing> = Vec::new();
        let mut touched: BTreeMap<String, SeriesStats> = BTreeMap::new();
        let mut served: u64 = 0;
        let scrub = settings.privacy.scrub_linked_numbers;

        for candidate in &candidates {
            let stored = match tickets.load_ticket(tenant, &candidate.key).await {
                Ok(ticket) => ticket,
                Err(e) => {
                    warn!(ticket = %candidate.key, error = %e, "Ticket lookup failed, treating as new");
                    None
                }
            };
            if stored.as_ref().is_some_and(Ticket::is_served) {
                results.push(candidate.result(Action::SkippedAlreadyServed));
                continue;
            }

            let mut ticket = stored.unwrap_or_else(|| {
                Ticket::new(
                    candidate.ticket_id.clone(),
                    candidate.chat_id.clone(),
                    &candidate.number,
                    candidate.created_at.unwrap_or(now),
                )
            });
            if ticket.chat_id.is_none() {
                ticket.chat_id = candidate.chat_id.clone();
            }

            let action = if is_match(&candidate.number, &called) {
                Action::Served
            } else if !is_behind(&candidate.number, &called) {
                Action::SkippedAhead
            } else if ticket.is_stale(now) {
                Action::CancelledStale
            } else {
                Action::Reminder
            };

            let text = match action {
                Action::SkippedAhead | Action::SkippedAlreadyServed => None,
                Action::CancelledStale => {
                    ticket.mark_cancelled();
                    tickets.delete_ticket(tenant, &ticket.ticket_key);
                    if let Some(id) = &candidate.ticket_id {
                        patch.set(format!("queue/{id}/status"), "cancelled");
                    }
                    info!(tenant, ticket = %ticket.ticket_key, "Cancelled stale ticket");
                    None
                }
                Action::Served => {
                    let service_ms = ticket.mark_served(now);
                    let served_ms = now.timestamp_millis();
                    if let Some(id) = &candidate.ticket_id {
                        patch
                            .set(format!("queue/{id}/status"), "served")
                            .set(format!("queue/{id}/servedAt"), served_ms)
                            .set(format!("queue/{id}/serviceMs"), service_ms);
                        if scrub && candidate.linked && candidate.chat_id.is_some() {
                            for field in SCRUBBED_FIELDS {
                                patch.remove(format!("queue/{id}/{field}"));
                            }
                        }
                    }

                    let event = ServiceEvent {
                        ticket_id: candidate
                            .ticket_id
                            .clone()
                            .unwrap_or_else(|| ticket.ticket_key.clone()),
                        requested_at: ticket.created_at,
                        served_at: now,
                        service_ms: service_ms as u64,
                        counter: counter_name.clone(),
                        series: ticket.series.clone(),
                    };
                    patch.set(
                        format!("analytics/serviceEvents/{}", push_id(served_ms)),
                        serde_json::to_value(&event).map_err(PersistenceError::from)?,
                    );

                    let label = series_label(&ticket.series).to_string();
                    let stats = match touched.entry(label) {
                        Entry::Occupied(e) => e.into_mut(),
                        Entry::Vacant(v) => {
                            let loaded = tickets
                                .load_series_stats(tenant, v.key())
                                .await
                                .unwrap_or_else(|e| {
                                    warn!(series = %v.key(), error = %e, "Stats lookup failed, starting fresh");
                                    SeriesStats::default()
                                });
                            v.insert(loaded)
                        }
                    };
                    stats.record(service_ms as u64, now);
                    served += 1;

                    tickets.put_ticket(tenant, ticket.clone());
                    Some(served_text(&candidate.number, counter_name.as_deref()))
                }
                Action::Reminder => {
                    ticket.mark_reminded(now);
                    if let Some(id) = &candidate.ticket_id {
                        patch.set(format!("queue/{id}/lastReminderAt"), now.timestamp_millis());
                    }
                    tickets.put_ticket(tenant, ticket.clone());
                    Some(reminder_text(&called, &candidate.number))
                }
            };

            results.push(candidate.result(action));
            if let (Some(text), Some(chat_id)) = (text, &candidate.chat_id) {
                outgoing.push(Outgoing {
                    index: results.len() - 1,
                    chat_id: chat_id.clone(),
                    text,
                });
            }
        }

        for (label, stats) in &touched {
            tickets.put_series_stats(tenant, label, stats.clone());
            patch.set(
                format!("analytics/seriesStats/{label}"),
                serde_json::to_value(stats).map_err(PersistenceError::from)?,
            );
        }

        let called_label = series_label(&called_series);
        let stats_snapshot = match touched.get(called_label) {
            Some(stats) => Some(stats.snapshot(&called_series)),
            None => tickets
                .load_series_stats(tenant, called_label)
                .await
                .ok()
                .map(|stats| stats.snapshot(&called_series)),
        };

        let mut count_error = None;
        if served > 0 {
            match store.get("analytics/servedCount").await {
                Ok(current) => {
                    let current = current.as_ref().and_then(Value::as_u64).unwrap_or(0);
                    patch.set("analytics/servedCount", current + served);
                }
                Err(e) => {
                    error!(tenant, error = %e, "Failed to read servedCount");
                    count_error = Some(e.to_string());
                }
            }
        }

        // Dispatch. A bot token is only needed when there is something to send.
        let client = if outgoing.is_empty() {
            None
        } else {
            Some(self.client(non_empty(&request.bot_token))?)
        };
        let pause = self.config.send_pause;
        let sends = outgoing.iter().enumerate().filter_map(|(slot, out)| {
            let client = client.as_ref()?;
            let keyboard = keyboard.as_ref();
            let delay = pause.saturating_mul(u32::try_from(slot).unwrap_or(u32::MAX));
            Some(async move {
                let send = async {
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    client.send_message(&out.chat_id, &out.text, keyboard).await
                };
                match timeout_at(deadline, send).await {
                    Ok(outcome) => (out.index, outcome, false),
                    Err(_) => (
                        out.index,
                        SendOutcome::skipped("handler budget exceeded"),
                        true,
                    ),
                }
            })
        });
        let (outcomes, flush) = tokio::join!(join_all(sends), tickets.flush());
        if !flush.ok() {
            warn!(tenant, failed = flush.failed, errors = ?flush.errors, "Ticket store flush incomplete");
        }

        let mut sent = 0;
        let mut timed_out = 0;
        for (index, outcome, cut) in outcomes {
            if cut {
                timed_out += 1;
            }
            if outcome.ok {
                sent += 1;
            } else if outcome.blocked {
                info!(tenant, chat_id = ?results[index].chat_id, "Chat has blocked the bot");
            } else {
                warn!(tenant, chat_id = ?results[index].chat_id, error = ?outcome.error, "Send failed");
            }
            results[index].send_res = Some(outcome);
        }

        let mut patch_report = PatchReport {
            keys: patch.len(),
            ..PatchReport::default()
        };
        if !patch.is_empty() {
            match store.patch(patch).await {
                Ok(()) => patch_report.applied = true,
                Err(e) => {
                    error!(tenant, error = %e, "Tenant patch failed");
                    patch_report.error = Some(e.to_string());
                }
            }
        }
        if let Some(e) = patch_report.error.clone().or(count_error) {
            return Err(NotifyError::PersistencePartial(e));
        }

        info!(
            tenant,
            called = %called,
            recipients = results.len(),
            served,
            sent,
            "Notify complete"
        );

        Ok(NotifyResponse {
            ok: true,
            called_full: called,
            called_series,
            counter_name,
            sent,
            results,
            stats_snapshot,
            persistence: PersistenceReport {
                tickets: flush,
                patch: patch_report,
                timed_out,
            },
            tenant: slug.to_string(),
        })
    }

    fn client(&self, request_token: Option<&str>) -> Result<TelegramClient> {
        let token = request_token
            .map(str::to_string)
            .or_else(|| self.config.bot_token.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| NotifyError::ServerMisconfigured("TELEGRAM_BOT_TOKEN is not set".to_string()))?;
        let client = TelegramClient::new(token)
            .map_err(|e| NotifyError::ServerMisconfigured(e.to_string()))?
            .with_base_url(self.config.telegram_api_base.clone());
        Ok(match self.config.retry_backoff {
            Some(backoff) => client.with_backoff(backoff),
            None => client,
        })
    }
}

/// Waiting queue entries of the called series: one indexed query, then
/// one full read when the index returns nothing.
async fn seed(store: &TenantStore, called_series: &str) -> Result<Vec<Candidate>> {
    let mut entries = store
        .query_by_index("queue", "series", &Value::String(called_series.to_string()))
        .await?;
    if entries.is_empty() {
        entries = match store.get("queue").await? {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
    }
    Ok(entries
        .iter()
        .filter_map(|(key, raw)| {
            let entry = QueueEntry::from_value(raw)?;
            if !entry.is_waiting() {
                return None;
            }
            Candidate::from_entry(key, &entry)
        })
        .collect())
}

fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.key.clone()))
        .collect()
}
