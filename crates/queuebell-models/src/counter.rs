//! Service counters and their two cursors.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::number::format_number;

const PREFIX_MAX: usize = 5;

/// A physical service point with its own numbering prefix.
///
/// `now_serving` never exceeds `last_issued`; every mutation below keeps
/// that invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counter {
    pub name: String,
    pub prefix: String,
    #[serde(default)]
    pub now_serving: u32,
    #[serde(default)]
    pub last_issued: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Validates and uppercases a counter prefix.
pub fn validate_prefix(raw: &str) -> Result<String> {
    let prefix = raw.trim().to_uppercase();
    let valid = !prefix.is_empty()
        && prefix.len() <= PREFIX_MAX
        && prefix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if !valid {
        return Err(ModelError::InvalidPrefix(raw.to_string()));
    }
    Ok(prefix)
}

impl Counter {
    /// Creates an empty, active counter.
    pub fn new(name: impl Into<String>, prefix: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            prefix: validate_prefix(prefix)?,
            now_serving: 0,
            last_issued: 0,
            active: true,
        })
    }

    /// Issues the next number and returns its position.
    pub fn issue(&mut self) -> Result<u32> {
        self.last_issued = self
            .last_issued
            .checked_add(1)
            .ok_or_else(|| ModelError::CounterExhausted(self.name.clone()))?;
        Ok(self.last_issued)
    }

    /// Advances to the next waiting number.
    pub fn call_next(&mut self) -> Result<u32> {
        self.advance()
    }

    /// Skips the current number: advances by exactly one, never past `last_issued`.
    pub fn skip(&mut self) -> Result<u32> {
        self.advance()
    }

    fn advance(&mut self) -> Result<u32> {
        if self.now_serving >= self.last_issued {
            return Err(ModelError::NothingWaiting(self.name.clone()));
        }
        self.now_serving += 1;
        Ok(self.now_serving)
    }

    /// Resets both cursors to `base`.
    pub fn reset(&mut self, base: u32) {
        self.now_serving = base;
        self.last_issued = base;
    }

    /// Changes the prefix; uniqueness across the tenant is checked by the caller.
    pub fn set_prefix(&mut self, prefix: &str) -> Result<()> {
        self.prefix = validate_prefix(prefix)?;
        Ok(())
    }

    /// Number currently being served, if any.
    pub fn called_full(&self) -> Option<String> {
        (self.now_serving > 0).then(|| format_number(&self.prefix, self.now_serving))
    }

    /// Numbers issued but not yet called.
    pub fn waiting(&self) -> u32 {
        self.last_issued.saturating_sub(self.now_serving)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_validation() {
        assert_eq!(validate_prefix(" a1 ").unwrap(), "A1");
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("TOOLONG").is_err());
        assert!(validate_prefix("A-1").is_err());
    }

    #[test]
    fn test_issue_and_call() {
        let mut counter = Counter::new("Counter 1", "A").unwrap();
        assert_eq!(counter.issue().unwrap(), 1);
        assert_eq!(counter.issue().unwrap(), 2);
        assert_eq!(counter.call_next().unwrap(), 1);
        assert_eq!(counter.called_full().as_deref(), Some("A001"));
        assert_eq!(counter.waiting(), 1);
    }

    #[test]
    fn test_skip_never_passes_last_issued() {
        let mut counter = Counter::new("Counter 1", "A").unwrap();
        counter.issue().unwrap();
        assert_eq!(counter.skip().unwrap(), 1);
        assert!(matches!(counter.skip(), Err(ModelError::NothingWaiting(_))));
        assert_eq!(counter.now_serving, 1);
        assert!(counter.now_serving <= counter.last_issued);
    }

    #[test]
    fn test_issue_stops_at_the_last_number() {
        let mut counter = Counter::new("Counter 1", "A").unwrap();
        counter.reset(u32::MAX - 1);
        assert_eq!(counter.issue().unwrap(), u32::MAX);
        assert!(matches!(counter.issue(), Err(ModelError::CounterExhausted(_))));
        assert_eq!(counter.last_issued, u32::MAX);
    }

    #[test]
    fn test_monotonic_over_sequences() {
        let mut counter = Counter::new("Counter 1", "B").unwrap();
        let ops = ["issue", "call", "skip", "issue", "issue", "skip", "call", "call", "reset", "call"];
        for op in ops {
            match op {
                "issue" => {
                    counter.issue().unwrap();
                }
                "call" => {
                    let _ = counter.call_next();
                }
                "skip" => {
                    let _ = counter.skip();
                }
                _ => counter.reset(0),
            }
            assert!(counter.now_serving <= counter.last_issued, "after {}", op);
        }
        assert_eq!(counter.now_serving, 0);
        assert_eq!(counter.last_issued, 0);
    }

    #[test]
    fn test_deserialize_defaults() {
        let counter: Counter = serde_json::from_str(r#"{"name":"Desk","prefix":"D"}"#).unwrap();
        assert!(counter.active);
        assert_eq!(counter.now_serving, 0);
        assert!(counter.called_full().is_none());
    }
}
