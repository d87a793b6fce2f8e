//! Periodic settlement sweep and the scheduler that drives it.
//!
//! Per scheduled group:  Idle ──next_run <= now──▶ Due ──sweep──▶ Idle
//!
//! Sweep of one due group (one store transaction):
//!   1. Gather the unsettled batch of expenses
//!   2. Balance the batch alone (no settlements applied)
//!   3. MaxPayer: every member short of the fair share owes the
//!      batch's largest contributor; each debt is a Pending settlement
//!      plus a due notification
//!   4. Mark the batch settled
//!   5. last_run = now, next_run = now + period, even for an empty batch
//!
//! A failing group is rolled back, logged and skipped; its schedule is
//! untouched, so the next tick retries it.

use crate::{
    balance_calculator::{compute_balances, ExpenseScope},
    clock::Clock,
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    model::{NewSettlement, ScheduleState, SettlementRecord},
    settlement_lifecycle::mark_overdue,
    settlement_strategy::{MaxPayer, SettlementStrategy},
    shutdown::ShutdownSignal,
    store::{LedgerStore, NewNotification},
    types::{GroupId, SettlementId},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSweepOutcome {
    pub group_id:        GroupId,
    pub settlements:     Vec<SettlementId>,
    pub expenses_closed: usize,
    pub next_run:        DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub group_id: GroupId,
    pub reason:   String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub swept_at:  DateTime<Utc>,
    pub processed: Vec<GroupSweepOutcome>,
    pub failures:  Vec<SweepFailure>,
}

impl SweepReport {
    pub fn settlements_created(&self) -> usize {
        self.processed.iter().map(|g| g.settlements.len()).sum()
    }
}

/// Sweep every group whose schedule is due at `now`.
pub fn run_settlement_sweep(
    store: &LedgerStore,
    now: DateTime<Utc>,
    due_window: Duration,
) -> LedgerResult<SweepReport> {
    let due = store.due_schedules(now)?;
    let mut report = SweepReport {
        swept_at: now,
        processed: Vec::with_capacity(due.len()),
        failures: Vec::new(),
    };

    for schedule in &due {
        let group_id = schedule.group_id;
        match store.in_transaction(|store| sweep_group(store, group_id, now, due_window)) {
            Ok(Some(outcome)) => report.processed.push(outcome),
            Ok(None) => log::debug!("group={group_id} rescheduled before its sweep; skipped"),
            Err(err) => {
                let err = LedgerError::sweep(group_id, err);
                log::warn!("{err}; retrying next tick");
                report.failures.push(SweepFailure {
                    group_id,
                    reason: err.to_string(),
                });
            }
        }
    }

    if !due.is_empty() {
        log::info!(
            "sweep at {now}: {} groups swept, {} settlements created, {} failed",
            report.processed.len(),
            report.settlements_created(),
            report.failures.len()
        );
    }
    Ok(report)
}

/// Sweep one group if its schedule is still due at `now`, re-read inside
/// the caller's transaction. Returns None when there is nothing to do.
pub fn sweep_group(
    store: &LedgerStore,
    group_id: GroupId,
    now: DateTime<Utc>,
    due_window: Duration,
) -> LedgerResult<Option<GroupSweepOutcome>> {
    let Some(schedule) = store
        .get_schedule(group_id)?
        .filter(|s| s.state(now) == ScheduleState::Due)
    else {
        return Ok(None);
    };
    let batch = store.unsettled_expenses(group_id)?;
    let mut created: Vec<SettlementRecord> = Vec::new();

    if !batch.is_empty() {
        let members = store.group_member_ids(group_id)?;
        let balances = compute_balances(group_id, &members, &batch, &[], ExpenseScope::UnsettledOnly)?;
        let due_date = now + due_window;

        for transfer in MaxPayer.propose(&balances) {
            let new = NewSettlement {
                group_id,
                payer: transfer.payer,
                receiver: transfer.receiver,
                amount: transfer.amount,
                due_date: Some(due_date),
            };
            let record = store.insert_settlement(&new, now, due_date)?;
            store.insert_notification(&NewNotification::settlement_due(&record), now)?;
            created.push(record);
        }

        let ids: Vec<_> = batch.iter().map(|e| e.expense_id).collect();
        store.mark_expenses_settled(&ids)?;
    }

    let next_run = schedule.period.advance(now)?;
    store.advance_schedule(group_id, now, next_run)?;
    log::debug!(
        "group={group_id} swept: {} expenses closed, {} settlements, next run {next_run}",
        batch.len(),
        created.len()
    );

    Ok(Some(GroupSweepOutcome {
        group_id,
        settlements: created.iter().map(|s| s.settlement_id).collect(),
        expenses_closed: batch.len(),
        next_run,
    }))
}

/// What one scheduler poll did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub sweep:   SweepReport,
    pub overdue: Vec<SettlementId>,
}

/// Owns its own store connection and polls on a fixed interval until
/// shut down. Start one per process.
pub struct SweepScheduler {
    store:         Mutex<LedgerStore>,
    clock:         Arc<dyn Clock>,
    poll_interval: std::time::Duration,
    due_window:    Duration,
}

impl SweepScheduler {
    pub fn new(store: LedgerStore, clock: Arc<dyn Clock>, config: &LedgerConfig) -> Self {
        Self {
            store: Mutex::new(store),
            clock,
            poll_interval: config.poll_interval(),
            due_window: config.due_window(),
        }
    }

    /// One poll: sweep due groups, then flag overdue settlements.
    pub fn tick(&self) -> LedgerResult<TickReport> {
        let store = self
            .store
            .lock()
            .map_err(|_| LedgerError::Other(anyhow::anyhow!("scheduler store lock poisoned")))?;
        let now = self.clock.now();
        let sweep = run_settlement_sweep(&store, now, self.due_window)?;
        let overdue = store.in_transaction(|store| mark_overdue(store, now))?;
        Ok(TickReport {
            sweep,
            overdue: overdue.iter().map(|s| s.settlement_id).collect(),
        })
    }

    /// Run on the current tokio runtime. The first poll happens immediately.
    /// A failed poll is logged and the loop carries on.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let scheduler = Arc::new(self);
        tokio::spawn(async move {
            let mut ticker = interval(scheduler.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            log::info!(
                "sweep scheduler started, polling every {:?}",
                scheduler.poll_interval
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let worker = Arc::clone(&scheduler);
                        match tokio::task::spawn_blocking(move || worker.tick()).await {
                            Ok(Ok(report)) => log::debug!(
                                "scheduler tick: {} groups swept, {} overdue",
                                report.sweep.processed.len(),
                                report.overdue.len()
                            ),
                            Ok(Err(err)) => log::error!("scheduler tick failed: {err}"),
                            Err(err) => log::error!("scheduler tick aborted: {err}"),
                        }
                    }
                    _ = shutdown.wait() => {
                        log::info!("sweep scheduler stopping");
                        break;
                    }
                }
            }
        })
    }
}
