//! Domain primitives: Symbol, Venue, Side, LendingClass.

use serde::{Deserialize, Serialize};

/// Stock ticker symbol (e.g., "AAPL").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    /// Create a Symbol from a string, upper-cased and trimmed.
    pub fn new(symbol: impl Into<String>) -> Self {
        Symbol(symbol.into().trim().to_uppercase())
    }

    /// Get the symbol as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trading venue the broker routes a symbol through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Venue {
    Nasdaq,
    Nyse,
    Amex,
}

impl Venue {
    /// Broker wire code for this venue.
    pub fn code(&self) -> &'static str {
        match self {
            Venue::Nasdaq => "NASD",
            Venue::Nyse => "NYSE",
            Venue::Amex => "AMEX",
        }
    }

    /// Parse a broker wire code, accepting both long and short forms.
    pub fn from_code(code: &str) -> Option<Venue> {
        match code {
            "NASD" | "NAS" => Some(Venue::Nasdaq),
            "NYSE" | "NYS" => Some(Venue::Nyse),
            "AMEX" | "AMS" => Some(Venue::Amex),
            _ => None,
        }
    }

    /// Detection order when a symbol's venue is unknown.
    pub fn all() -> [Venue; 3] {
        [Venue::Nasdaq, Venue::Nyse, Venue::Amex]
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Trade side: Buy or Sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Lending classification of a trade or lot.
///
/// Cash trades and credit (margin-loan) trades settle into separate lots
/// even for the same symbol and date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LendingClass {
    Cash,
    Credit,
}

impl LendingClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LendingClass::Cash => "CASH",
            LendingClass::Credit => "CREDIT",
        }
    }

    pub fn from_str_or_cash(s: &str) -> LendingClass {
        match s {
            "CREDIT" => LendingClass::Credit,
            _ => LendingClass::Cash,
        }
    }
}

impl std::fmt::Display for LendingClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
