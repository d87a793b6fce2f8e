//! Settlement lifecycle: explicit requests, payment, confirmation, overdue.
//!
//! State machine:
//!   Pending ──confirm (receiver)──▶ Confirmed   (terminal)
//!   Pending ──due date passed────▶ Overdue ──confirm──▶ Confirmed
//!
//! Payment is reported by the payer but only the receiver's confirmation
//! changes the status; nothing here talks to a payment rail.

use crate::{
    access::{require_member, require_participant},
    error::{LedgerError, LedgerResult},
    model::{NewSettlement, SettlementRecord, SettlementStatus},
    store::{LedgerStore, NewNotification},
    types::{is_settled_amount, GroupId, Money, SettlementId, UserId},
};
use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A settlement requested directly by a member.
pub fn create_settlement(
    store: &LedgerStore,
    caller: UserId,
    new: &NewSettlement,
    now: DateTime<Utc>,
    due_window: Duration,
) -> LedgerResult<SettlementRecord> {
    require_member(store, new.group_id, caller)?;
    require_participant(store, new.group_id, new.payer, "payer")?;
    require_participant(store, new.group_id, new.receiver, "receiver")?;
    if new.payer == new.receiver {
        return Err(LedgerError::validation("payer and receiver must differ"));
    }
    if new.amount <= Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "settlement amount must be positive, got {}",
            new.amount
        )));
    }

    let due_date = new.due_date.unwrap_or(now + due_window);
    let record = store.insert_settlement(new, now, due_date)?;
    store.insert_notification(&NewNotification::settlement_due(&record), now)?;
    log::debug!(
        "group={} settlement #{} requested: {} -> {} {}",
        record.group_id,
        record.settlement_id,
        record.payer,
        record.receiver,
        record.amount
    );
    Ok(record)
}

/// The payer reports a payment. The receiver is asked to confirm it.
pub fn record_payment(
    store: &LedgerStore,
    caller: UserId,
    settlement_id: SettlementId,
    amount: Money,
    payment_method: Option<&str>,
    now: DateTime<Utc>,
) -> LedgerResult<SettlementRecord> {
    let record = store.get_settlement(settlement_id)?;
    if record.payer != caller {
        return Err(LedgerError::permission(format!(
            "only the payer can pay settlement #{settlement_id}"
        )));
    }
    if !record.status.is_open() {
        return Err(LedgerError::validation(format!(
            "settlement #{settlement_id} is already confirmed"
        )));
    }
    if !is_settled_amount(amount - record.amount) {
        return Err(LedgerError::validation(format!(
            "payment of {amount} does not match settlement amount {}",
            record.amount
        )));
    }

    store.record_settlement_payment(settlement_id, now, payment_method)?;
    store.insert_notification(&NewNotification::payment_received(&record, amount), now)?;
    store.get_settlement(settlement_id)
}

/// Receiver-initiated confirmation. Confirmed settlements feed back into
/// balances as discharged debt.
pub fn confirm_settlement(
    store: &LedgerStore,
    caller: UserId,
    settlement_id: SettlementId,
    payment_method: Option<&str>,
    now: DateTime<Utc>,
) -> LedgerResult<SettlementRecord> {
    let record = store.get_settlement(settlement_id)?;
    if record.receiver != caller {
        return Err(LedgerError::permission(
            "only the receiver can confirm the settlement",
        ));
    }
    if !record.status.is_open() {
        return Err(LedgerError::validation(format!(
            "settlement #{settlement_id} is already confirmed"
        )));
    }

    let paid_at = record.payment_date.unwrap_or(now);
    store.record_settlement_payment(settlement_id, paid_at, payment_method)?;
    store.update_settlement_status(settlement_id, SettlementStatus::Confirmed)?;
    let confirmed = store.get_settlement(settlement_id)?;
    store.insert_notification(&NewNotification::settlement_confirmed(&confirmed), now)?;
    log::info!(
        "group={} settlement #{settlement_id} confirmed by user {caller}",
        confirmed.group_id
    );
    Ok(confirmed)
}

/// Flip every Pending settlement whose due date has passed to Overdue.
/// Returns the settlements that changed.
pub fn mark_overdue(store: &LedgerStore, now: DateTime<Utc>) -> LedgerResult<Vec<SettlementRecord>> {
    let late = store.pending_settlements_due_before(now)?;
    let mut flipped = Vec::with_capacity(late.len());
    for mut record in late {
        store.update_settlement_status(record.settlement_id, SettlementStatus::Overdue)?;
        record.status = SettlementStatus::Overdue;
        store.insert_notification(&NewNotification::settlement_overdue(&record), now)?;
        flipped.push(record);
    }
    if !flipped.is_empty() {
        log::info!("{} settlements became overdue", flipped.len());
    }
    Ok(flipped)
}

// ── Reporting ─────────────────────────────────────────────────

/// Look-back window for settlement summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryWindow {
    Day,
    Week,
    Month,
    Year,
    #[default]
    All,
}

impl SummaryWindow {
    /// First instant inside the window, or None for no lower bound.
    pub fn start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Day   => Some(now - Duration::days(1)),
            Self::Week  => Some(now - Duration::weeks(1)),
            Self::Month => now.checked_sub_months(Months::new(1)),
            Self::Year  => now.checked_sub_months(Months::new(12)),
            Self::All   => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub group_id:     GroupId,
    pub window:       SummaryWindow,
    pub total_amount: Money,
    pub settlements:  Vec<SettlementRecord>,
}

pub fn settlement_summary(
    store: &LedgerStore,
    caller: UserId,
    group_id: GroupId,
    window: SummaryWindow,
    now: DateTime<Utc>,
) -> LedgerResult<SettlementSummary> {
    require_member(store, group_id, caller)?;
    let settlements = match window.start(now) {
        Some(from) => {
            let until = now + Duration::microseconds(1);
            store.group_settlements_created_between(group_id, from, until)?
        }
        None => store.group_settlements(group_id)?,
    };
    let total_amount = settlements.iter().map(|s| s.amount).sum();
    Ok(SettlementSummary {
        group_id,
        window,
        total_amount,
        settlements,
    })
}
