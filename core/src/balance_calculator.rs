//! Balance calculator: turns a group's ledger into each member's net position.
//!
//! Design:
//!   - paid_in     = sum of in-scope expenses the member paid
//!   - fair_share  = total in-scope expenses / member count (equal split only)
//!   - net_balance = paid_in − fair_share, then every Confirmed settlement
//!                   moves `amount` from the receiver's position to the payer's
//!   - owes        = max(0, −net_balance)
//!   - is_owed     = paid_in (contribution view, not max(0, net_balance))
//!
//! Split expenses and the settlements billed for them form their own
//! sub-ledger: neither enters equal-split netting.
//!
//! Pure function of its inputs: the caller fetches members, expenses and
//! settlements inside one store transaction and hands them in.

use crate::{
    error::{LedgerError, LedgerResult},
    model::{ExpenseRecord, SettlementRecord, SettlementStatus},
    types::{GroupId, Money, UserId},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which expenses feed `paid_in` and the fair share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseScope {
    /// Every expense ever recorded. Consistent with confirmed settlements,
    /// which discharge debt from any batch.
    #[default]
    All,
    /// Only the current, not yet swept, batch.
    UnsettledOnly,
}

impl ExpenseScope {
    fn includes(self, expense: &ExpenseRecord) -> bool {
        match self {
            Self::All => true,
            Self::UnsettledOnly => !expense.settled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBalance {
    pub member_id:   UserId,
    pub paid_in:     Money,
    pub fair_share:  Money,
    pub net_balance: Money,
    pub owes:        Money,
    pub is_owed:     Money,
}

pub type MemberBalances = BTreeMap<UserId, MemberBalance>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBalance {
    pub group_id:   GroupId,
    pub group_name: String,
    pub scope:      ExpenseScope,
    pub members:    MemberBalances,
}

impl GroupBalance {
    pub fn member(&self, member_id: UserId) -> Option<&MemberBalance> {
        self.members.get(&member_id)
    }

    pub fn total_net(&self) -> Money {
        total_net(&self.members)
    }
}

pub fn total_net(balances: &MemberBalances) -> Money {
    balances.values().map(|b| b.net_balance).sum()
}

/// Compute every member's position. Members with no expenses still get a
/// row (paid_in = 0, net = −fair_share).
pub fn compute_balances(
    group_id: GroupId,
    members: &[UserId],
    expenses: &[ExpenseRecord],
    settlements: &[SettlementRecord],
    scope: ExpenseScope,
) -> LedgerResult<MemberBalances> {
    if members.is_empty() {
        return Err(LedgerError::EmptyGroup { group_id });
    }

    let mut paid_in: BTreeMap<UserId, Money> =
        members.iter().map(|&id| (id, Decimal::ZERO)).collect();
    let mut total = Decimal::ZERO;

    for expense in expenses.iter().filter(|e| !e.split && scope.includes(e)) {
        let slot = paid_in.get_mut(&expense.paid_by).ok_or_else(|| {
            LedgerError::validation(format!(
                "expense {} paid by user {} who is not a member of group {group_id}",
                expense.expense_id, expense.paid_by
            ))
        })?;
        *slot += expense.amount;
        total += expense.amount;
    }

    let fair_share = total / Decimal::from(paid_in.len());

    let mut net: BTreeMap<UserId, Money> = paid_in
        .iter()
        .map(|(&id, &paid)| (id, paid - fair_share))
        .collect();

    for s in settlements
        .iter()
        .filter(|s| s.status == SettlementStatus::Confirmed && s.split_expense.is_none())
    {
        if !net.contains_key(&s.payer) || !net.contains_key(&s.receiver) {
            return Err(LedgerError::validation(format!(
                "settlement {} involves a user outside group {group_id}",
                s.settlement_id
            )));
        }
        if let Some(payer) = net.get_mut(&s.payer) {
            *payer += s.amount;
        }
        if let Some(receiver) = net.get_mut(&s.receiver) {
            *receiver -= s.amount;
        }
    }

    let balances = net
        .into_iter()
        .map(|(member_id, net_balance)| {
            let paid = paid_in[&member_id];
            let balance = MemberBalance {
                member_id,
                paid_in: paid,
                fair_share,
                net_balance,
                owes: (-net_balance).max(Decimal::ZERO),
                is_owed: paid,
            };
            (member_id, balance)
        })
        .collect();

    Ok(balances)
}
