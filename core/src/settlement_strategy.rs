//! Settlement strategies: how a balance snapshot becomes a list of transfers.
//!
//! Two strategies exist and they are not interchangeable:
//!   - GreedyNetting pairs the largest debtor with the largest creditor
//!     until every position is within tolerance. Used when splits are finalized.
//!   - MaxPayer sends every member's shortfall to the single largest
//!     contributor of the batch. Used by the periodic sweep.

use crate::{
    balance_calculator::MemberBalances,
    types::{Money, UserId, ROUNDING_TOLERANCE},
};
use serde::{Deserialize, Serialize};

/// One proposed payment from a debtor to a creditor. Amount is always > 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub payer:    UserId,
    pub receiver: UserId,
    pub amount:   Money,
}

/// The contract every strategy fulfills.
pub trait SettlementStrategy: Send + Sync {
    /// Unique stable name, used in logs.
    fn name(&self) -> &'static str;

    /// Deterministic for identical input. Never emits a transfer with
    /// amount <= 0 or with payer == receiver.
    fn propose(&self, balances: &MemberBalances) -> Vec<Transfer>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyNetting;

impl SettlementStrategy for GreedyNetting {
    fn name(&self) -> &'static str {
        "greedy_netting"
    }

    fn propose(&self, balances: &MemberBalances) -> Vec<Transfer> {
        // Both sides hold magnitudes; members within tolerance of zero are ignored.
        let mut debtors: Vec<(UserId, Money)> = balances
            .values()
            .filter(|b| b.net_balance < -ROUNDING_TOLERANCE)
            .map(|b| (b.member_id, -b.net_balance))
            .collect();
        let mut creditors: Vec<(UserId, Money)> = balances
            .values()
            .filter(|b| b.net_balance > ROUNDING_TOLERANCE)
            .map(|b| (b.member_id, b.net_balance))
            .collect();

        // Most negative debtor first, most positive creditor first; ties by id.
        debtors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        creditors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut transfers = Vec::new();
        let (mut d, mut c) = (0, 0);
        while d < debtors.len() && c < creditors.len() {
            let amount = debtors[d].1.min(creditors[c].1);
            transfers.push(Transfer {
                payer: debtors[d].0,
                receiver: creditors[c].0,
                amount,
            });
            debtors[d].1 -= amount;
            creditors[c].1 -= amount;
            if debtors[d].1 <= ROUNDING_TOLERANCE {
                d += 1;
            }
            if creditors[c].1 <= ROUNDING_TOLERANCE {
                c += 1;
            }
        }
        transfers
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MaxPayer;

impl MaxPayer {
    /// The member who paid the most. Ties go to the lowest id.
    fn top_contributor(balances: &MemberBalances) -> Option<UserId> {
        let mut best: Option<(UserId, Money)> = None;
        for b in balances.values() {
            match best {
                Some((_, paid)) if b.paid_in <= paid => {}
                _ => best = Some((b.member_id, b.paid_in)),
            }
        }
        best.map(|(id, _)| id)
    }
}

impl SettlementStrategy for MaxPayer {
    fn name(&self) -> &'static str {
        "max_payer"
    }

    fn propose(&self, balances: &MemberBalances) -> Vec<Transfer> {
        let Some(receiver) = Self::top_contributor(balances) else {
            return Vec::new();
        };
        balances
            .values()
            .filter(|b| b.member_id != receiver)
            .filter_map(|b| {
                let shortfall = b.fair_share - b.paid_in;
                (shortfall > ROUNDING_TOLERANCE).then(|| Transfer {
                    payer: b.member_id,
                    receiver,
                    amount: shortfall,
                })
            })
            .collect()
    }
}
