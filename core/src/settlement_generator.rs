//! Settlement generator: finalizes a group's splits into settlement records.
//!
//! Execution (inside one store transaction, supplied by the engine):
//!   1. Balance snapshot over every expense plus Confirmed settlements
//!      (split expenses and their shares excluded)
//!   2. Strategy proposes transfers
//!   3. Each transfer re-prices the oldest open (Pending or Overdue) netted
//!      record for the same (payer, receiver) pair, or creates a new one and
//!      notifies the payer. Further open netted records for that pair are
//!      deleted: one pair, one netted debt.
//!   4. Optionally append the group's untouched settlements
//!
//! Open records are not part of the balance snapshot, so running the
//! generator again without new expenses reproduces the same transfers and
//! only re-prices the records it created the first time. Shares billed by a
//! split expense are never re-priced.

use crate::{
    balance_calculator::{compute_balances, ExpenseScope},
    error::{LedgerError, LedgerResult},
    model::{NewSettlement, SettlementRecord, SettlementStatus},
    settlement_strategy::SettlementStrategy,
    store::{LedgerStore, NewNotification},
    types::{GroupId, Money, SettlementId, UserId},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Append settlements this run did not touch.
    #[serde(default)]
    pub include_existing: bool,
    /// Write proposals through to the store.
    #[serde(default)]
    pub persist: bool,
}

/// How a proposal relates to the stored settlements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalOrigin {
    /// Dry run: nothing was written.
    Proposed,
    /// A new Pending settlement was stored.
    Created,
    /// An open settlement for the same pair was re-priced (and is Pending again).
    Updated,
    /// Already stored and untouched by this run.
    Existing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementProposal {
    /// Stored record this proposal refers to, if any. For a dry run this is
    /// the open record that persisting would re-price.
    pub settlement_id: Option<SettlementId>,
    pub group_id:      GroupId,
    pub payer:         UserId,
    pub receiver:      UserId,
    pub amount:        Money,
    pub status:        SettlementStatus,
    pub due_date:      DateTime<Utc>,
    pub origin:        ProposalOrigin,
}

impl SettlementProposal {
    fn existing(record: &SettlementRecord) -> Self {
        Self {
            settlement_id: Some(record.settlement_id),
            group_id: record.group_id,
            payer: record.payer,
            receiver: record.receiver,
            amount: record.amount,
            status: record.status,
            due_date: record.due_date,
            origin: ProposalOrigin::Existing,
        }
    }
}

pub struct SettlementGenerator<'a> {
    store:      &'a LedgerStore,
    strategy:   &'a dyn SettlementStrategy,
    due_window: Duration,
}

impl<'a> SettlementGenerator<'a> {
    pub fn new(
        store: &'a LedgerStore,
        strategy: &'a dyn SettlementStrategy,
        due_window: Duration,
    ) -> Self {
        Self {
            store,
            strategy,
            due_window,
        }
    }

    /// Proposals in strategy order, followed by untouched records when
    /// `include_existing` is set.
    pub fn generate(
        &self,
        group_id: GroupId,
        options: GenerateOptions,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<SettlementProposal>> {
        let members = self.store.group_member_ids(group_id)?;
        if members.is_empty() {
            return Err(LedgerError::EmptyGroup { group_id });
        }
        let expenses = self.store.group_expenses(group_id)?;
        if expenses.is_empty() {
            return Err(LedgerError::NoExpenses { group_id });
        }
        let confirmed =
            self.store
                .group_settlements_with_status(group_id, SettlementStatus::Confirmed)?;
        let balances = compute_balances(group_id, &members, &expenses, &confirmed, ExpenseScope::All)?;

        let existing = self.store.group_settlements(group_id)?;
        // Oldest open record per pair first; later ones are duplicates.
        let mut open_pairs: HashMap<(UserId, UserId), Vec<&SettlementRecord>> = HashMap::new();
        for record in existing.iter().filter(|s| s.is_netted_debt()) {
            open_pairs
                .entry((record.payer, record.receiver))
                .or_default()
                .push(record);
        }

        let due_date = now + self.due_window;
        let mut touched: HashSet<SettlementId> = HashSet::new();
        let mut proposals = Vec::new();
        let (mut created, mut updated, mut merged) = (0usize, 0usize, 0usize);

        for transfer in self.strategy.propose(&balances) {
            let pair = open_pairs
                .get(&(transfer.payer, transfer.receiver))
                .map(Vec::as_slice)
                .unwrap_or_default();
            touched.extend(pair.iter().map(|r| r.settlement_id));
            let open = pair.first().copied();

            if options.persist {
                for duplicate in pair.iter().skip(1) {
                    self.store.delete_settlement(duplicate.settlement_id)?;
                    merged += 1;
                }
            }

            let (settlement_id, origin) = match (options.persist, open) {
                (false, open) => (open.map(|r| r.settlement_id), ProposalOrigin::Proposed),
                (true, Some(record)) => {
                    self.store
                        .update_settlement_terms(record.settlement_id, transfer.amount, due_date)?;
                    updated += 1;
                    (Some(record.settlement_id), ProposalOrigin::Updated)
                }
                (true, None) => {
                    let new = NewSettlement {
                        group_id,
                        payer: transfer.payer,
                        receiver: transfer.receiver,
                        amount: transfer.amount,
                        due_date: Some(due_date),
                    };
                    let record = self.store.insert_settlement(&new, now, due_date)?;
                    self.store
                        .insert_notification(&NewNotification::settlement_due(&record), now)?;
                    created += 1;
                    (Some(record.settlement_id), ProposalOrigin::Created)
                }
            };

            proposals.push(SettlementProposal {
                settlement_id,
                group_id,
                payer: transfer.payer,
                receiver: transfer.receiver,
                amount: transfer.amount,
                status: SettlementStatus::Pending,
                due_date,
                origin,
            });
        }

        if options.persist {
            log::info!(
                "group={group_id} {}: {created} settlements created, {updated} re-priced, {merged} duplicates merged",
                self.strategy.name()
            );
        } else {
            log::debug!(
                "group={group_id} {}: {} settlements proposed (dry run)",
                self.strategy.name(),
                proposals.len()
            );
        }

        if options.include_existing {
            proposals.extend(
                existing
                    .iter()
                    .filter(|s| !touched.contains(&s.settlement_id))
                    .map(SettlementProposal::existing),
            );
        }

        Ok(proposals)
    }
}
