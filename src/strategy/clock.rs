//! Exchange-local session clock.
//!
//! All trading-day semantics (rollover, open minute, near-close window)
//! follow the exchange's local calendar, not the operator's. Holidays are
//! not modeled; a holiday simply produces a day with no quotes.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::Tz;

/// Minutes before the close during which close-of-day logic runs.
pub const CLOSE_WINDOW_MINUTES: u32 = 5;

const OPEN: (u32, u32) = (9, 30);
const CLOSE: (u32, u32) = (16, 0);

pub fn now_exchange() -> DateTime<Tz> {
    Utc::now().with_timezone(&New_York)
}

/// A point-in-time snapshot of session state, taken once per cycle so every
/// check within the cycle sees the same answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSession {
    pub trading_date: NaiveDate,
    pub is_open: bool,
    /// First minute after the open (gap-up entries only fire here).
    pub is_opening_minute: bool,
    /// Within `CLOSE_WINDOW_MINUTES` of the close.
    pub is_near_close: bool,
}

impl MarketSession {
    pub fn at(now: DateTime<Tz>) -> Self {
        let trading_date = now.date_naive();
        let weekday_ok = !matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
        let time = now.time();

        let open = NaiveTime::from_hms_opt(OPEN.0, OPEN.1, 0).unwrap_or(NaiveTime::MIN);
        let close = NaiveTime::from_hms_opt(CLOSE.0, CLOSE.1, 0).unwrap_or(NaiveTime::MIN);
        let is_open = weekday_ok && time >= open && time < close;

        let is_opening_minute =
            is_open && time.hour() == OPEN.0 && time.minute() == OPEN.1;

        let near_close_start = close - chrono::Duration::minutes(CLOSE_WINDOW_MINUTES as i64);
        let is_near_close = is_open && time >= near_close_start;

        MarketSession {
            trading_date,
            is_open,
            is_opening_minute,
            is_near_close,
        }
    }

    pub fn now() -> Self {
        Self::at(now_exchange())
    }
}
