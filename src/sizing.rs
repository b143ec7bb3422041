//! Unit-based position sizing.
//!
//! One unit is a fixed fraction of total account value (5%). Occupancy is
//! measured in purchase cost, never market value, so an unrealized gain
//! does not inflate how many units a position appears to consume.

use crate::config::TradingSettings;
use crate::domain::Decimal;

/// Converts account value into unit terms for one evaluation.
///
/// Rebuilt per evaluation from the latest known account value; holds no
/// state of its own.
#[derive(Debug, Clone, Copy)]
pub struct PositionSizer {
    account_value: Decimal,
}

impl PositionSizer {
    pub fn new(account_value: Decimal) -> Self {
        PositionSizer { account_value }
    }

    pub fn account_value(&self) -> Decimal {
        self.account_value
    }

    /// Value of one unit: 5% of total account value.
    pub fn unit_value(&self) -> Decimal {
        self.account_value
            .pct_of(Decimal::from_str_canonical(crate::config::UNIT_BASE_PERCENT).unwrap_or_else(
                |_| Decimal::zero(),
            ))
    }

    /// Units consumed by a given purchase cost.
    pub fn units_held(&self, cost_basis: Decimal) -> Decimal {
        let unit = self.unit_value();
        if unit.is_positive() {
            cost_basis / unit
        } else {
            Decimal::zero()
        }
    }

    /// Dollar amount targeted by one buy action: half the configured
    /// position, so two buys complete a full position.
    pub fn half_unit_amount(&self, settings: &TradingSettings) -> Decimal {
        self.account_value.pct_of(settings.half_unit_percent())
    }
}

/// Resolve a symbol's purchase cost from the first source that knows it.
///
/// Fallback order is fixed: lot ledger, then the broker's live holdings
/// feed, then the local position cache. The later sources exist so that
/// trades made outside this process still count against the unit cap.
pub fn cost_basis_with_fallback(
    ledger_cost: Option<Decimal>,
    holdings_cost: Option<Decimal>,
    cached_cost: Option<Decimal>,
) -> Decimal {
    for candidate in [ledger_cost, holdings_cost, cached_cost].into_iter().flatten() {
        if candidate.is_positive() {
            return candidate;
        }
    }
    Decimal::zero()
}
