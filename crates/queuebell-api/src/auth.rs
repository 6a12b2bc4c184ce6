//! Request authentication and tenant resolution.

use axum::http::HeaderMap;
use serde::Deserialize;

use queuebell_models::Slug;

use crate::config::ApiConfig;
use crate::error::{ApiError, Result};

pub const MASTER_KEY_HEADER: &str = "x-master-key";
pub const TENANT_HEADER: &str = "x-tenant";
pub const OPERATOR_PIN_HEADER: &str = "x-operator-pin";
pub const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// `?slug=` / `?tenant=` query parameters accepted by tenant-scoped endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantQuery {
    pub slug: Option<String>,
    pub tenant: Option<String>,
}

/// Compares without short-circuiting on the first differing byte.
pub fn constant_time_eq(left: &str, right: &str) -> bool {
    let left_bytes = left.as_bytes();
    let right_bytes = right.as_bytes();
    if left_bytes.len() != right_bytes.len() {
        return false;
    }

    let mut diff = 0_u8;
    for (a, b) in left_bytes.iter().zip(right_bytes.iter()) {
        diff |= *a ^ *b;
    }
    diff == 0
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = header(headers, "authorization")?;
    if raw.len() < 7 || !raw[..7].eq_ignore_ascii_case("bearer ") {
        return None;
    }
    Some(raw[7..].trim()).filter(|t| !t.is_empty())
}

/// Checks `x-master-key` or `Authorization: Bearer` against the server key.
pub fn require_master_key(config: &ApiConfig, headers: &HeaderMap) -> Result<()> {
    let expected = config
        .master_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::ServerMisconfigured("MASTER_KEY is not set".to_string()))?;
    let presented = header(headers, MASTER_KEY_HEADER).or_else(|| bearer_token(headers));
    match presented {
        Some(key) if constant_time_eq(key, expected) => Ok(()),
        _ => Err(ApiError::Unauthorized("missing or invalid master key".to_string())),
    }
}

/// Checks the Telegram webhook secret when one is configured.
pub fn check_webhook_secret(config: &ApiConfig, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = config.webhook_secret.as_deref() else {
        return Ok(());
    };
    match header(headers, TELEGRAM_SECRET_HEADER) {
        Some(secret) if constant_time_eq(secret, expected) => Ok(()),
        _ => Err(ApiError::Unauthorized("invalid webhook secret".to_string())),
    }
}

/// Checks an operator PIN against the tenant's configured one.
pub fn check_pin(expected: Option<&str>, presented: Option<&str>) -> Result<()> {
    let Some(expected) = expected.filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    match presented {
        Some(pin) if constant_time_eq(pin.trim(), expected) => Ok(()),
        _ => Err(ApiError::Unauthorized("operator PIN required".to_string())),
    }
}

/// PIN from the body, else from `x-operator-pin`.
pub fn presented_pin<'a>(body_pin: Option<&'a str>, headers: &'a HeaderMap) -> Option<&'a str> {
    body_pin
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .or_else(|| header(headers, OPERATOR_PIN_HEADER))
}

/// Tenant named by the query string, then `x-tenant`.
pub fn tenant_hint(query: &TenantQuery, headers: &HeaderMap) -> Option<String> {
    query
        .slug
        .as_deref()
        .or(query.tenant.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| header(headers, TENANT_HEADER))
        .map(str::to_string)
}

/// Picks the tenant: body, then hint, then the configured default.
pub fn resolve_tenant(
    config: &ApiConfig,
    body: Option<&str>,
    hint: Option<&str>,
) -> Result<Slug> {
    let raw = body
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or(hint)
        .or(config.default_tenant.as_deref())
        .ok_or_else(|| ApiError::InvalidInput("tenant slug is required".to_string()))?;
    Ok(Slug::parse(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }

    #[test]
    fn test_master_key_sources() {
        let config = ApiConfig::default().with_master_key("k1");
        assert!(require_master_key(&config, &headers(&[("x-master-key", "k1")])).is_ok());
        assert!(require_master_key(&config, &headers(&[("authorization", "Bearer k1")])).is_ok());
        assert!(matches!(
            require_master_key(&config, &headers(&[("x-master-key", "k2")])),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            require_master_key(&config, &HeaderMap::new()),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_missing_server_key_is_misconfiguration() {
        let config = ApiConfig::default();
        assert!(matches!(
            require_master_key(&config, &headers(&[("x-master-key", "k1")])),
            Err(ApiError::ServerMisconfigured(_))
        ));
    }

    #[test]
    fn test_pin() {
        assert!(check_pin(None, None).is_ok());
        assert!(check_pin(Some("1234"), Some(" 1234 ")).is_ok());
        assert!(check_pin(Some("1234"), Some("0000")).is_err());
        assert!(check_pin(Some("1234"), None).is_err());
    }

    #[test]
    fn test_tenant_resolution_order() {
        let config = ApiConfig::default().with_default_tenant("fallback");
        let query = TenantQuery {
            slug: Some("from-query".into()),
            tenant: None,
        };
        let hint = tenant_hint(&query, &headers(&[("x-tenant", "from-header")]));
        assert_eq!(hint.as_deref(), Some("from-query"));

        let hint = tenant_hint(&TenantQuery::default(), &headers(&[("x-tenant", "from-header")]));
        assert_eq!(hint.as_deref(), Some("from-header"));

        assert_eq!(
            resolve_tenant(&config, Some("cafe"), Some("other")).unwrap().as_str(),
            "cafe"
        );
        assert_eq!(resolve_tenant(&config, None, None).unwrap().as_str(), "fallback");
        assert!(resolve_tenant(&ApiConfig::default(), None, None).is_err());
    }
}
