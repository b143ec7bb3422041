//! Watchlist and settings files: CSV-backed, reloaded when mtime advances.

use crate::config::TradingSettings;
use crate::domain::{Decimal, Symbol};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("watchlist I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("watchlist CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One watched symbol with its breakout target.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchlistItem {
    pub ticker: Symbol,
    pub target_price: Decimal,
    /// Per-symbol stop-loss override; None falls back to the global setting.
    pub stop_loss_pct: Option<Decimal>,
    /// Pyramiding cap in units; None means the configured default of 1.
    pub max_units: Option<u32>,
    /// When the symbol was added. Carried for external cleanup, unused here.
    pub added_date: Option<NaiveDate>,
}

impl WatchlistItem {
    pub fn max_units_or_default(&self) -> u32 {
        self.max_units.unwrap_or(1)
    }
}

#[derive(Debug, Deserialize)]
struct WatchlistRow {
    ticker: String,
    target_price: String,
    #[serde(default)]
    stop_loss_pct: Option<String>,
    #[serde(default)]
    max_units: Option<String>,
    #[serde(default)]
    added_date: Option<String>,
}

/// A CSV file watched for modification-time changes.
///
/// `changed` is cheap to call every tick; it stats the file and only
/// reports true when the mtime advanced past the last observed one.
#[derive(Debug)]
pub struct WatchedFile {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl WatchedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WatchedFile {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the file's mtime advanced since the last check (or on the
    /// first check). Missing files are treated as unchanged.
    pub fn changed(&mut self) -> bool {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => return false,
        };
        match self.last_modified {
            Some(seen) if modified <= seen => false,
            _ => {
                self.last_modified = Some(modified);
                true
            }
        }
    }
}

/// Load the watchlist, skipping malformed rows row-wise.
pub fn load_watchlist(path: &Path) -> Result<Vec<WatchlistItem>, WatchlistError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut items = Vec::new();
    for (line, row) in reader.deserialize::<WatchlistRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(line = line + 2, error = %e, "skipping malformed watchlist row");
                continue;
            }
        };
        match parse_row(&row) {
            Some(item) => items.push(item),
            None => {
                warn!(line = line + 2, ticker = %row.ticker, "skipping unusable watchlist row");
            }
        }
    }
    info!(path = %path.display(), count = items.len(), "watchlist loaded");
    Ok(items)
}

fn parse_row(row: &WatchlistRow) -> Option<WatchlistItem> {
    let ticker = row.ticker.trim();
    if ticker.is_empty() {
        return None;
    }
    let target_price = Decimal::from_str_canonical(row.target_price.trim()).ok()?;
    if !target_price.is_positive() {
        return None;
    }

    let stop_loss_pct = match row.stop_loss_pct.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(Decimal::from_str_canonical(s).ok()?),
    };
    let max_units = match row.max_units.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(s.parse::<u32>().ok()?),
    };
    // added_date is informational; a bad date drops the field, not the row
    let added_date = row
        .added_date
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<NaiveDate>().ok());

    Some(WatchlistItem {
        ticker: Symbol::new(ticker),
        target_price,
        stop_loss_pct,
        max_units,
        added_date,
    })
}

/// Load settings overrides from a `key,value` CSV, applying each row to the
/// given settings. Unknown keys and bad values are skipped with a warning.
pub fn load_settings(path: &Path, settings: &mut TradingSettings) -> Result<(), WatchlistError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .has_headers(true)
        .from_path(path)?;

    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "skipping malformed settings row");
                continue;
            }
        };
        let (key, value) = match (record.get(0), record.get(1)) {
            (Some(k), Some(v)) if !k.is_empty() => (k, v),
            _ => continue,
        };
        if let Err(e) = settings.apply(key, value) {
            warn!(key, error = %e, "ignoring settings row");
        }
    }
    info!(path = %path.display(), settings = ?settings, "settings loaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_watchlist_full_rows() {
        let file = write_file(
            "ticker,target_price,stop_loss_pct,max_units,added_date\n\
             aapl,185.50,3,2,2026-01-15\n\
             NVDA,900,,,\n",
        );
        let items = load_watchlist(file.path()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].ticker, Symbol::new("AAPL"));
        assert_eq!(
            items[0].stop_loss_pct,
            Some(Decimal::from_str_canonical("3").unwrap())
        );
        assert_eq!(items[0].max_units, Some(2));
        assert_eq!(items[0].added_date, Some("2026-01-15".parse().unwrap()));
        assert_eq!(items[1].ticker, Symbol::new("NVDA"));
        assert_eq!(items[1].stop_loss_pct, None);
        assert_eq!(items[1].max_units_or_default(), 1);
    }

    #[test]
    fn test_malformed_rows_are_skipped_not_fatal() {
        let file = write_file(
            "ticker,target_price,stop_loss_pct,max_units,added_date\n\
             AAPL,not_a_price,,,\n\
             ,100,,,\n\
             MSFT,420.10,,,\n",
        );
        let items = load_watchlist(file.path()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].ticker, Symbol::new("MSFT"));
    }

    #[test]
    fn test_bad_added_date_keeps_row() {
        let file = write_file(
            "ticker,target_price,stop_loss_pct,max_units,added_date\n\
             AAPL,185.50,,,02/30/2026\n",
        );
        let items = load_watchlist(file.path()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].added_date, None);
    }

    #[test]
    fn test_settings_csv_applies_and_skips() {
        let file = write_file(
            "key,value\n\
             UNIT,2\n\
             STOP_LOSS_PCT,bogus\n\
             PRICE_BUFFER_PCT,0.3\n\
             UNKNOWN_KEY,1\n",
        );
        let mut settings = TradingSettings::default();
        load_settings(file.path(), &mut settings).unwrap();
        assert_eq!(settings.unit_count, 2);
        // bad value left the default intact
        assert_eq!(
            settings.stop_loss_pct,
            Decimal::from_str_canonical("3").unwrap()
        );
        assert_eq!(
            settings.price_buffer_pct,
            Decimal::from_str_canonical("0.3").unwrap()
        );
    }

    #[test]
    fn test_watched_file_change_detection() {
        let file = write_file("ticker,target_price\nAAPL,100\n");
        let mut watched = WatchedFile::new(file.path());
        assert!(watched.changed());
        assert!(!watched.changed());
    }
}
