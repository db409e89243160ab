//! Security Identifiers
//!
//! Rewrites the identifier syntaxes users type (ISIN, SEDOL,
//! exchange-qualified tickers) into the canonical form the vendor
//! services resolve.
//!
//! | Input | Canonical |
//! |-------|-----------|
//! | `IE00BYVZV757 ISIN` | `/isin/IE00BYVZV757` |
//! | `IE00BYVZV757 LN ISIN` | `/isin/IE00BYVZV757 LN` |
//! | `2046251 US SEDOL` | `/sedol/2046251 US` |
//! | `jpst ln equity` | `JPST LN EQUITY` |

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// =============================================================================
// Patterns
// =============================================================================

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
static ISIN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}[A-Z0-9]{9}[0-9]").expect("ISIN regex is valid"));

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
static EXCHANGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" [A-Z0-9]{2} ").expect("exchange regex is valid"));

const SEDOL_MARKER: &str = " SEDOL";

// =============================================================================
// SecurityId
// =============================================================================

/// A normalised vendor security identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityId(String);

impl SecurityId {
    /// Wrap an already-canonical identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Exchange code embedded in the identifier, if any.
    #[must_use]
    pub fn exchange_code(&self) -> Option<String> {
        exchange_code(&self.0)
    }
}

impl fmt::Display for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SecurityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SecurityId {
    fn from(value: &str) -> Self {
        normalize(value)
    }
}

impl From<String> for SecurityId {
    fn from(value: String) -> Self {
        normalize(&value)
    }
}

// =============================================================================
// Normalisation
// =============================================================================

/// Normalise a user-supplied identifier into canonical vendor form.
#[must_use]
pub fn normalize(raw: &str) -> SecurityId {
    let ticker = raw.trim().to_uppercase();

    let prefix = if ISIN_PATTERN.is_match(&ticker) {
        Some("isin")
    } else if ticker.contains(SEDOL_MARKER) {
        Some("sedol")
    } else {
        None
    };

    match prefix {
        Some(scheme) => {
            let id = ticker.split_whitespace().next().unwrap_or_default();
            let suffix = embedded_exchange(&ticker)
                .map(|code| format!(" {code}"))
                .unwrap_or_default();
            SecurityId(format!("/{scheme}/{id}{suffix}"))
        }
        None => SecurityId(ticker),
    }
}

/// Normalise a list of identifiers, preserving order and duplicates.
#[must_use]
pub fn normalize_all<S: AsRef<str>>(raw: &[S]) -> Vec<SecurityId> {
    raw.iter().map(|t| normalize(t.as_ref())).collect()
}

/// Render a security-search result (`IBM US<equity>`) as a ticker
/// (`IBM US Equity`).
#[must_use]
pub fn search_result_ticker(raw: &str) -> String {
    let mut parts = raw.split('<');
    let base = parts.next().unwrap_or_default();
    match parts.next() {
        Some(key) => format!("{base} {}", title_case(&key.replace('>', ""))),
        None => base.to_string(),
    }
}

/// Exchange code for a ticker.
///
/// A two character input is treated as the code itself.
#[must_use]
pub fn exchange_code(ticker: &str) -> Option<String> {
    let trimmed = ticker.trim();
    if trimmed.chars().count() == 2 {
        return Some(trimmed.to_uppercase());
    }
    embedded_exchange(&ticker.to_uppercase())
}

fn embedded_exchange(ticker: &str) -> Option<String> {
    EXCHANGE_PATTERN
        .find(ticker)
        .map(|m| m.as_str().trim().to_string())
}

fn title_case(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("IE00BYVZV757 ISIN", "/isin/IE00BYVZV757" ; "bare isin")]
    #[test_case("IE00BYVZV757@BVAL ISIN", "/isin/IE00BYVZV757@BVAL" ; "isin with pricing source")]
    #[test_case("IE00BYVZV757 LN ISIN", "/isin/IE00BYVZV757 LN" ; "isin with exchange")]
    #[test_case("2046251 US SEDOL", "/sedol/2046251 US" ; "sedol with exchange")]
    #[test_case("B0YBKJ7 SEDOL", "/sedol/B0YBKJ7" ; "bare sedol")]
    #[test_case("jpst ln equity", "JPST LN EQUITY" ; "plain ticker uppercased")]
    #[test_case("  vod ln equity  ", "VOD LN EQUITY" ; "whitespace trimmed")]
    fn normalisation_table(raw: &str, expected: &str) {
        assert_eq!(normalize(raw).as_str(), expected);
    }

    #[test]
    fn normalize_all_keeps_order_and_duplicates() {
        let ids = normalize_all(&["a ln equity", "b us equity", "a ln equity"]);
        let rendered: Vec<&str> = ids.iter().map(SecurityId::as_str).collect();
        assert_eq!(rendered, ["A LN EQUITY", "B US EQUITY", "A LN EQUITY"]);
    }

    #[test]
    fn search_results_become_tickers() {
        assert_eq!(search_result_ticker("IBM US<equity>"), "IBM US Equity");
        assert_eq!(search_result_ticker("T 2 05/15/25<govt>"), "T 2 05/15/25 Govt");
        assert_eq!(search_result_ticker("NOKEY"), "NOKEY");
    }

    #[test_case("VOD LN EQUITY", Some("LN") ; "qualified ticker")]
    #[test_case("ln", Some("LN") ; "bare code")]
    #[test_case("SPX INDEX", None ; "no exchange")]
    fn exchange_code_lookup(ticker: &str, expected: Option<&str>) {
        assert_eq!(exchange_code(ticker).as_deref(), expected);
    }

    #[test]
    fn patterns_match_their_targets() {
        assert!(ISIN_PATTERN.is_match("US4592001014"));
        assert!(!ISIN_PATTERN.is_match("IBM US EQUITY"));
        assert_eq!(
            EXCHANGE_PATTERN.find("IBM US EQUITY").map(|m| m.as_str()),
            Some(" US ")
        );
    }
}
