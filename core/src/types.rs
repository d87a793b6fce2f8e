//! Shared primitive types used across the entire ledger.

use rust_decimal::Decimal;

/// Every amount of money in the core. Exact decimal, never floating point.
pub type Money = Decimal;

pub type UserId = i64;
pub type GroupId = i64;
pub type ExpenseId = i64;
pub type SettlementId = i64;
pub type NotificationId = i64;

/// Balances and transfers closer to zero than this are treated as settled.
/// 0.01 currency units.
pub const ROUNDING_TOLERANCE: Money = Decimal::from_parts(1, 0, 0, false, 2);

/// True when `amount` is within the rounding tolerance of zero.
pub fn is_settled_amount(amount: Money) -> bool {
    amount.abs() <= ROUNDING_TOLERANCE
}

/// Round for display: two places, midpoint away from zero.
pub fn display_amount(amount: Money) -> Money {
    amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}
