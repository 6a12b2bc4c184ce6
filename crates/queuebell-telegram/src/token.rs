//! Start-token encodings.
//!
//! A customer reaches the bot through `https://t.me/{bot}?start={token}`.
//! Tokens arrive in several shapes, tried in this order:
//!
//! 1. base64 (URL-safe or standard, padded or not) of a JSON record
//! 2. bare queue key `-[A-Za-z0-9_]+`
//! 3. short identifier `[A-Za-z0-9\-_]{2,30}`
//!
//! Any of them may carry a `slug:` or `slug__` prefix naming the tenant. Only the
//! URL-safe unpadded base64 form is ever emitted.

use std::sync::OnceLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use url::Url;

use queuebell_models::{Slug, StartTokenRecord};

use crate::error::TokenError;

/// Telegram's limit on the `start` parameter.
pub const MAX_START_PARAM: usize = 64;

/// Keys that identify the queue entry inside a base64 record.
const ID_KEYS: [&str; 4] = ["queueId", "ticket", "number", "id"];

fn bare_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-[A-Za-z0-9_]+$").expect("valid regex"))
}

fn short_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9\-_]{2,30}$").expect("valid regex"))
}

fn start_param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9\-_]{1,64}$").expect("valid regex"))
}

/// A decoded start token.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedToken {
    /// Inline record from a base64 token.
    Record(StartTokenRecord),
    /// Direct queue key.
    BareKey(String),
    /// Short identifier matched against `queueId`.
    ShortId(String),
}

/// A start parameter with its optional tenant prefix split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartParam {
    pub tenant: Option<Slug>,
    pub token: String,
}

/// Separator usable inside a Telegram `start` parameter, where `:` is not.
/// Slugs never contain `_`, so the first occurrence ends the slug.
pub const LINK_TENANT_SEPARATOR: &str = "__";

/// Splits `slug:token` or `slug__token`. A prefix that is not a valid slug
/// stays part of the token.
pub fn split_tenant(param: &str) -> StartParam {
    let param = param.trim();
    for separator in [":", LINK_TENANT_SEPARATOR] {
        if let Some((prefix, rest)) = param.split_once(separator) {
            if let Ok(slug) = Slug::parse(prefix) {
                if !rest.is_empty() {
                    return StartParam {
                        tenant: Some(slug),
                        token: rest.to_string(),
                    };
                }
            }
        }
    }
    StartParam {
        tenant: None,
        token: param.to_string(),
    }
}

/// Start parameter for a minted token, prefixed with its tenant.
pub fn tenant_start_param(tenant: &Slug, token: &str) -> String {
    format!("{tenant}{LINK_TENANT_SEPARATOR}{token}")
}

/// Finds the start parameter in free text: a `t.me/...?start=` link, or the
/// first word.
pub fn start_param_from_text(text: &str) -> Option<String> {
    let text = text.trim();
    if text.contains("start=") {
        let candidate = text
            .split_whitespace()
            .find(|w| w.contains("start="))
            .unwrap_or(text);
        let absolute = if candidate.starts_with("http://") || candidate.starts_with("https://") {
            candidate.to_string()
        } else {
            format!("https://{candidate}")
        };
        if let Ok(url) = Url::parse(&absolute) {
            if let Some((_, value)) = url.query_pairs().find(|(k, _)| k == "start") {
                let value = value.trim().to_string();
                return (!value.is_empty()).then_some(value);
            }
        }
    }
    text.split_whitespace().next().map(str::to_string)
}

/// Emits the URL-safe unpadded base64 form of a record.
pub fn encode(record: &StartTokenRecord) -> serde_json::Result<String> {
    let json = serde_json::to_vec(record)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decodes a token (without tenant prefix). Inline records past their
/// `expiresAt` are rejected.
pub fn decode(token: &str, now: DateTime<Utc>) -> Result<DecodedToken, TokenError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::InvalidToken);
    }

    if let Some(record) = decode_record(token)? {
        if record.is_expired(now) {
            return Err(TokenError::ExpiredToken);
        }
        return Ok(DecodedToken::Record(record));
    }
    if bare_key_re().is_match(token) {
        return Ok(DecodedToken::BareKey(token.to_string()));
    }
    if short_id_re().is_match(token) {
        return Ok(DecodedToken::ShortId(token.to_string()));
    }
    Err(TokenError::InvalidToken)
}

/// `Ok(None)` when the token is not base64 JSON at all.
fn decode_record(token: &str) -> Result<Option<StartTokenRecord>, TokenError> {
    let normalized: String = token
        .chars()
        .filter(|&c| c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(normalized.as_bytes()) else {
        return Ok(None);
    };
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(&bytes) else {
        return Ok(None);
    };

    let fallback_id = ID_KEYS.iter().find_map(|k| match map.get(*k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });
    let mut record: StartTokenRecord =
        serde_json::from_value(Value::Object(map)).map_err(|_| TokenError::InvalidToken)?;
    if record.queue_id.is_none() {
        record.queue_id = fallback_id;
    }
    if record.queue_key.is_none() && record.queue_id.is_none() {
        return Err(TokenError::InvalidToken);
    }
    Ok(Some(record))
}

/// Builds the deep link for a token Telegram will accept.
pub fn deep_link(bot_username: &str, token: &str) -> Result<String, TokenError> {
    if token.len() > MAX_START_PARAM || !start_param_re().is_match(token) {
        return Err(TokenError::InvalidToken);
    }
    Ok(format!(
        "https://t.me/{}?start={}",
        bot_username.trim_start_matches('@'),
        token
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_record_round_trip() {
        let mut record = StartTokenRecord::new("-OaVK1xyz", now());
        record.tenant = Some("acme".into());
        record.counter_id = Some("c1".into());
        record.meta = Some(json!({"source": "kiosk"}));

        let token = encode(&record).unwrap();
        assert!(!token.contains('='));
        assert_eq!(decode(&token, now()).unwrap(), DecodedToken::Record(record));
    }

    #[test]
    fn test_standard_padded_base64_is_accepted() {
        let payload = json!({"queueId": "A017", "tenant": "acme"}).to_string();
        let token = STANDARD.encode(payload);

        match decode(&token, now()).unwrap() {
            DecodedToken::Record(r) => {
                assert_eq!(r.queue_id.as_deref(), Some("A017"));
                assert_eq!(r.tenant.as_deref(), Some("acme"));
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_alternate_id_keys() {
        let token = URL_SAFE_NO_PAD.encode(json!({"number": 17}).to_string());
        match decode(&token, now()).unwrap() {
            DecodedToken::Record(r) => assert_eq!(r.queue_id.as_deref(), Some("17")),
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_record_without_identifier_is_invalid() {
        let token = URL_SAFE_NO_PAD.encode(json!({"counterName": "Desk 1"}).to_string());
        assert_eq!(decode(&token, now()), Err(TokenError::InvalidToken));
    }

    #[test]
    fn test_expired_record() {
        let mut record = StartTokenRecord::new("-OaVK1", now() - Duration::hours(30));
        record.expires_at = Some(now() - Duration::hours(6));
        let token = encode(&record).unwrap();
        assert_eq!(decode(&token, now()), Err(TokenError::ExpiredToken));
    }

    #[test]
    fn test_bare_key_and_short_id() {
        assert_eq!(
            decode("-OaVK1xyz_2", now()).unwrap(),
            DecodedToken::BareKey("-OaVK1xyz_2".into())
        );
        assert_eq!(
            decode("A017", now()).unwrap(),
            DecodedToken::ShortId("A017".into())
        );
    }

    #[test]
    fn test_invalid_tokens() {
        assert_eq!(decode("", now()), Err(TokenError::InvalidToken));
        assert_eq!(decode("x", now()), Err(TokenError::InvalidToken));
        assert_eq!(decode("has space", now()), Err(TokenError::InvalidToken));
        assert_eq!(decode(&"a".repeat(31), now()), Err(TokenError::InvalidToken));
    }

    #[test]
    fn test_split_tenant_prefix() {
        let param = split_tenant("acme:A017");
        assert_eq!(param.tenant.unwrap().as_str(), "acme");
        assert_eq!(param.token, "A017");

        let plain = split_tenant("A017");
        assert!(plain.tenant.is_none());
        assert_eq!(plain.token, "A017");

        let bad_prefix = split_tenant("-bad-:A017");
        assert!(bad_prefix.tenant.is_none());

        let linked = split_tenant("joes-cafe__x_Y-z");
        assert_eq!(linked.tenant.unwrap().as_str(), "joes-cafe");
        assert_eq!(linked.token, "x_Y-z");
    }

    #[test]
    fn test_tenant_start_param_fits_deep_link() {
        let slug = Slug::parse(&"a".repeat(40)).unwrap();
        let param = tenant_start_param(&slug, &queuebell_models::random_token());
        assert!(deep_link("QueueBellBot", &param).is_ok());
        assert_eq!(split_tenant(&param).tenant, Some(slug));
    }

    #[test]
    fn test_start_param_from_link_and_text() {
        assert_eq!(
            start_param_from_text("https://t.me/QueueBellBot?start=abc_123").as_deref(),
            Some("abc_123")
        );
        assert_eq!(
            start_param_from_text("open t.me/QueueBellBot?start=A017 please").as_deref(),
            Some("A017")
        );
        assert_eq!(start_param_from_text("  A017  ").as_deref(), Some("A017"));
        assert_eq!(start_param_from_text("   "), None);
    }

    #[test]
    fn test_deep_link() {
        assert_eq!(
            deep_link("@QueueBellBot", "abc-123_x").unwrap(),
            "https://t.me/QueueBellBot?start=abc-123_x"
        );
        assert!(deep_link("QueueBellBot", &"a".repeat(65)).is_err());
        assert!(deep_link("QueueBellBot", "acme:A017").is_err());
    }
}
