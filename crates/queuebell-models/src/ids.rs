//! Identifier types: tenant slugs, push ids and random link tokens.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, Result};

/// Alphabet used by realtime-database push ids (sorts lexicographically by time).
const PUSH_CHARS: &[u8] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// URL-safe alphabet for start tokens.
const TOKEN_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Length of minted start tokens (Telegram allows up to 64).
const TOKEN_LEN: usize = 22;

const SLUG_MIN: usize = 2;
const SLUG_MAX: usize = 40;

/// A tenant's URL-safe identifier.
///
/// Always lowercase `a-z0-9-`, 2-40 characters, never starting or ending
/// with `-`. The slug owns everything under `tenants/{slug}/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Parses and lowercases a slug, rejecting anything outside the alphabet.
    pub fn parse(raw: &str) -> Result<Self> {
        let slug = raw.trim().to_lowercase();
        let valid_chars = slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_chars
            || slug.len() < SLUG_MIN
            || slug.len() > SLUG_MAX
            || slug.starts_with('-')
            || slug.ends_with('-')
        {
            return Err(ModelError::InvalidSlug(raw.to_string()));
        }
        Ok(Self(slug))
    }

    /// Returns the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Slug {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self> {
        Slug::parse(&s)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates a time-ordered push id (8 timestamp chars + 12 random chars).
pub fn push_id(now_ms: i64) -> String {
    let mut ts = now_ms.max(0) as u64;
    let mut stamp = [0u8; 8];
    for slot in stamp.iter_mut().rev() {
        *slot = PUSH_CHARS[(ts % 64) as usize];
        ts /= 64;
    }

    let random = Uuid::new_v4();
    let mut id: String = stamp.iter().map(|&b| b as char).collect();
    id.extend(
        random
            .as_bytes()
            .iter()
            .take(12)
            .map(|b| PUSH_CHARS[(b % 64) as usize] as char),
    );
    id
}

/// Generates an unguessable URL-safe token for Telegram deep links.
pub fn random_token() -> String {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    a.as_bytes()
        .iter()
        .chain(b.as_bytes().iter())
        .take(TOKEN_LEN)
        .map(|b| TOKEN_CHARS[(b % 64) as usize] as char)
        .collect()
}
