//! Split rules for expenses recorded with an explicit division.
//!
//! A split turns one expense into the shares every other participant owes
//! the payer. The payer's own share is never a debt.

use crate::{
    error::{LedgerError, LedgerResult},
    model::{ExpenseRecord, SettlementRecord},
    types::{GroupId, Money, UserId, ROUNDING_TOLERANCE},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "split_type", content = "splits", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitRule {
    /// Every member owes amount / member count.
    Equal,
    /// user → percent of the amount. Must sum to 100 (± tolerance).
    Percentage(BTreeMap<UserId, Decimal>),
}

/// A recorded split expense and the settlements it created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitExpense {
    pub expense:     ExpenseRecord,
    pub settlements: Vec<SettlementRecord>,
}

/// What each non-payer owes the payer under `rule`. Only positive shares
/// are returned, in ascending member order.
pub fn split_shares(
    group_id: GroupId,
    rule: &SplitRule,
    amount: Money,
    payer: UserId,
    members: &[UserId],
) -> LedgerResult<Vec<(UserId, Money)>> {
    if members.is_empty() {
        return Err(LedgerError::EmptyGroup { group_id });
    }

    match rule {
        SplitRule::Equal => {
            let share = amount / Decimal::from(members.len());
            let mut shares: Vec<(UserId, Money)> = members
                .iter()
                .filter(|&&m| m != payer)
                .map(|&m| (m, share))
                .collect();
            shares.sort_by_key(|(m, _)| *m);
            Ok(shares)
        }
        SplitRule::Percentage(splits) => {
            validate_percentages(group_id, splits, members)?;
            let hundred = Decimal::ONE_HUNDRED;
            Ok(splits
                .iter()
                .filter(|(m, pct)| **m != payer && **pct > Decimal::ZERO)
                .map(|(&m, pct)| (m, amount * *pct / hundred))
                .collect())
        }
    }
}

fn validate_percentages(
    group_id: GroupId,
    splits: &BTreeMap<UserId, Decimal>,
    members: &[UserId],
) -> LedgerResult<()> {
    if splits.is_empty() {
        return Err(LedgerError::validation("percentage split needs at least one entry"));
    }
    for (user, pct) in splits {
        if !members.contains(user) {
            return Err(LedgerError::validation(format!(
                "split participant {user} is not a member of group {group_id}"
            )));
        }
        if pct.is_sign_negative() {
            return Err(LedgerError::validation(format!(
                "split percentage for user {user} is negative ({pct})"
            )));
        }
    }
    let total: Decimal = splits.values().sum();
    if (total - Decimal::ONE_HUNDRED).abs() > ROUNDING_TOLERANCE {
        return Err(LedgerError::validation(format!(
            "split percentages must sum to 100, got {total}"
        )));
    }
    Ok(())
}
