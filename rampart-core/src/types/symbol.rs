use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// Instrument identifier such as `BTC-USDT` or `ETH/USDT`.
///
/// Letters, digits, `-`, `_` and `/` only. Deserialization goes through the
/// same check, so a `Symbol` read from config or state is always well formed.
///
/// ```
/// use rampart_core::types::Symbol;
///
/// let symbol: Symbol = "BTC-USDT".parse().unwrap();
/// assert_eq!(symbol.to_string(), "BTC-USDT");
/// assert!("BTC USDT".parse::<Symbol>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

fn allowed(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '/')
}

impl Symbol {
    /// Checked constructor.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            Err(ValidationError::EmptySymbol)
        } else if value.chars().all(allowed) {
            Ok(Self(value))
        } else {
            Err(ValidationError::InvalidSymbol(value))
        }
    }

    /// Skips the character check; for literals in tests and fixtures.
    #[must_use]
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrowed form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slash_and_dash_pairs() {
        assert_eq!(Symbol::new("ETH/USDT").unwrap().as_str(), "ETH/USDT");
        assert_eq!(Symbol::new("sol_perp-1").unwrap().as_str(), "sol_perp-1");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(Symbol::new(""), Err(ValidationError::EmptySymbol));
        assert_eq!(
            Symbol::new("BTC@USDT"),
            Err(ValidationError::InvalidSymbol("BTC@USDT".to_string()))
        );
    }

    #[test]
    fn test_deserialize_checks_characters() {
        let parsed: Symbol = serde_json::from_str("\"SOL-USDT\"").unwrap();
        assert_eq!(parsed, Symbol::new_unchecked("SOL-USDT"));
        assert!(serde_json::from_str::<Symbol>("\"\"").is_err());
        assert!(serde_json::from_str::<Symbol>("\"a b\"").is_err());
    }
}
