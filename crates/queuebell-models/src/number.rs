//! Ticket number normalization and series ordering.
//!
//! Customers type their number by hand ("a 12", "vanilla/002"), the
//! operator console emits canonical ones ("A012", "VANILLA002"). Everything
//! that compares numbers goes through [`normalize`] first.

use std::cmp::Ordering;

fn is_separator(c: char) -> bool {
    matches!(c, '-' | '_' | '.')
}

/// Canonical form of a ticket number.
///
/// Uppercases and trims, turns whitespace and `/` into `-`, drops anything
/// outside `[A-Z0-9-_.]` and collapses separator runs to their first char.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    // Start "after a separator" so leading separators are dropped.
    let mut after_separator = true;

    for c in raw.trim().to_uppercase().chars() {
        let c = if c.is_whitespace() || c == '/' { '-' } else { c };
        if c.is_ascii_uppercase() || c.is_ascii_digit() {
            out.push(c);
            after_separator = false;
        } else if is_separator(c) && !after_separator {
            out.push(c);
            after_separator = true;
        }
    }

    while out.ends_with(is_separator) {
        out.pop();
    }
    out
}

/// Leading letter group of the normalized number ("VANILLA002" -> "VANILLA").
pub fn series(raw: &str) -> String {
    normalize(raw)
        .chars()
        .take_while(|c| c.is_ascii_uppercase())
        .collect()
}

/// Part of the normalized number after its series letters.
fn tail(normalized: &str) -> &str {
    let start = normalized
        .find(|c: char| !c.is_ascii_uppercase())
        .unwrap_or(normalized.len());
    &normalized[start..]
}

/// Trailing integer of the normalized number, if any.
pub fn numeric_tail(raw: &str) -> Option<u64> {
    let normalized = normalize(raw);
    let digits: String = normalized
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Orders two numbers of the same series: trailing integer first, then the
/// raw tail lexicographically.
pub fn compare_in_series(a: &str, b: &str) -> Ordering {
    let (na, nb) = (normalize(a), normalize(b));
    let by_tail = tail(&na).cmp(tail(&nb));
    match (numeric_tail(&na), numeric_tail(&nb)) {
        (Some(x), Some(y)) => x.cmp(&y).then(by_tail),
        _ => by_tail,
    }
}

/// True when both numbers normalize to the same value.
pub fn is_match(their: &str, called: &str) -> bool {
    let their = normalize(their);
    !their.is_empty() && their == normalize(called)
}

/// True when both numbers share a series.
pub fn same_series(a: &str, b: &str) -> bool {
    series(a) == series(b)
}

/// True when `their` is still waiting behind `called` in the same series.
pub fn is_behind(their: &str, called: &str) -> bool {
    !is_match(their, called)
        && same_series(their, called)
        && compare_in_series(their, called) == Ordering::Greater
}

/// Formats a counter position as a ticket number ("A" + 7 -> "A007").
pub fn format_number(prefix: &str, position: u32) -> String {
    format!("{}{:03}", prefix, position)
}
