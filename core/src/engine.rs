//! The ledger engine: the one entry point the boundary layer talks to.
//!
//! RULES:
//!   - Every operation runs inside exactly one store transaction.
//!   - Access checks happen first, inside that transaction.
//!   - "now" always comes from the injected clock.
//!   - Finalize-splits uses the engine's strategy (GreedyNetting unless
//!     replaced); the periodic sweep always uses MaxPayer.

use crate::{
    access::{require_admin, require_member, require_participant},
    balance_calculator::{compute_balances, ExpenseScope, GroupBalance},
    clock::Clock,
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    model::{
        ExpenseRecord, GroupRecord, NewExpense, NewSettlement, NotificationRecord,
        ScheduleRecord, SettlementRecord, SettlementStatus,
    },
    period::SettlementPeriod,
    settlement_generator::{GenerateOptions, SettlementGenerator, SettlementProposal},
    settlement_lifecycle::{self, SettlementSummary, SummaryWindow},
    settlement_strategy::{GreedyNetting, SettlementStrategy},
    split::{split_shares, SplitExpense, SplitRule},
    store::{LedgerStore, NewNotification},
    sweep_scheduler::{self, SweepReport},
    types::{GroupId, Money, NotificationId, SettlementId, UserId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct LedgerEngine {
    store:    LedgerStore,
    clock:    Arc<dyn Clock>,
    config:   LedgerConfig,
    strategy: Box<dyn SettlementStrategy>,
}

impl LedgerEngine {
    pub fn new(store: LedgerStore, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            store,
            clock,
            config,
            strategy: Box::new(GreedyNetting),
        }
    }

    /// Replace the finalize-splits strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn SettlementStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ── Users and groups ──────────────────────────────────────

    pub fn add_user(&self, name: &str) -> LedgerResult<UserId> {
        if name.trim().is_empty() {
            return Err(LedgerError::validation("user name must not be empty"));
        }
        self.store.in_transaction(|store| store.insert_user(name))
    }

    pub fn create_group(&self, creator: UserId, name: &str) -> LedgerResult<GroupRecord> {
        if name.trim().is_empty() {
            return Err(LedgerError::validation("group name must not be empty"));
        }
        let now = self.now();
        self.store.in_transaction(|store| {
            store.get_user(creator)?;
            let group_id = store.insert_group(name, creator, now)?;
            log::debug!("group={group_id} created by user {creator}");
            store.get_group(group_id)
        })
    }

    /// Only an admin may add members or promote them.
    pub fn add_member(
        &self,
        caller: UserId,
        group_id: GroupId,
        user_id: UserId,
        is_admin: bool,
    ) -> LedgerResult<()> {
        self.store.in_transaction(|store| {
            require_admin(store, group_id, caller)?;
            store.get_user(user_id)?;
            store.add_member(group_id, user_id, is_admin)
        })
    }

    // ── Balances ──────────────────────────────────────────────

    pub fn compute_balances(&self, caller: UserId, group_id: GroupId) -> LedgerResult<GroupBalance> {
        self.compute_balances_with_scope(caller, group_id, ExpenseScope::default())
    }

    pub fn compute_balances_with_scope(
        &self,
        caller: UserId,
        group_id: GroupId,
        scope: ExpenseScope,
    ) -> LedgerResult<GroupBalance> {
        self.store.in_transaction(|store| {
            require_member(store, group_id, caller)?;
            let group = store.get_group(group_id)?;
            let members = store.group_member_ids(group_id)?;
            let expenses = store.group_expenses(group_id)?;
            let confirmed =
                store.group_settlements_with_status(group_id, SettlementStatus::Confirmed)?;
            let members = compute_balances(group_id, &members, &expenses, &confirmed, scope)?;
            Ok(GroupBalance {
                group_id,
                group_name: group.name,
                scope,
                members,
            })
        })
    }

    // ── Settlement generation ─────────────────────────────────

    /// Finalize splits.
    pub fn generate_settlements(
        &self,
        caller: UserId,
        group_id: GroupId,
        options: GenerateOptions,
    ) -> LedgerResult<Vec<SettlementProposal>> {
        let now = self.now();
        self.store.in_transaction(|store| {
            require_member(store, group_id, caller)?;
            SettlementGenerator::new(store, self.strategy.as_ref(), self.config.due_window())
                .generate(group_id, options, now)
        })
    }

    // ── Expenses ──────────────────────────────────────────────

    pub fn record_expense(&self, caller: UserId, new: &NewExpense) -> LedgerResult<ExpenseRecord> {
        let now = self.now();
        self.store.in_transaction(|store| {
            check_new_expense(store, caller, new)?;
            let expense = store.insert_expense(new, now)?;
            log::debug!(
                "group={} expense #{} of {} paid by {}",
                expense.group_id,
                expense.expense_id,
                expense.amount,
                expense.paid_by
            );
            Ok(expense)
        })
    }

    /// Record an expense and turn its shares into Pending settlements
    /// owed to the payer. Neither the sweep nor finalize bills the expense
    /// again, and finalize never re-prices its shares.
    pub fn record_split_expense(
        &self,
        caller: UserId,
        new: &NewExpense,
        rule: &SplitRule,
    ) -> LedgerResult<SplitExpense> {
        let now = self.now();
        let due_date = now + self.config.due_window();
        self.store.in_transaction(|store| {
            check_new_expense(store, caller, new)?;
            let members = store.group_member_ids(new.group_id)?;
            let shares = split_shares(new.group_id, rule, new.amount, new.paid_by, &members)?;

            let expense = store.insert_split_expense(new, now)?;

            let mut settlements = Vec::with_capacity(shares.len());
            for (member, share) in shares {
                let request = NewSettlement {
                    group_id: new.group_id,
                    payer: member,
                    receiver: new.paid_by,
                    amount: share,
                    due_date: Some(due_date),
                };
                let record =
                    store.insert_split_settlement(&request, expense.expense_id, now, due_date)?;
                store.insert_notification(&NewNotification::settlement_due(&record), now)?;
                settlements.push(record);
            }
            log::info!(
                "group={} split expense #{}: {} settlements to user {}",
                new.group_id,
                expense.expense_id,
                settlements.len(),
                new.paid_by
            );
            Ok(SplitExpense {
                expense,
                settlements,
            })
        })
    }

    // ── Settlement lifecycle ──────────────────────────────────

    pub fn create_settlement(
        &self,
        caller: UserId,
        new: &NewSettlement,
    ) -> LedgerResult<SettlementRecord> {
        let now = self.now();
        let window = self.config.due_window();
        self.store.in_transaction(|store| {
            settlement_lifecycle::create_settlement(store, caller, new, now, window)
        })
    }

    pub fn record_payment(
        &self,
        caller: UserId,
        settlement_id: SettlementId,
        amount: Money,
        payment_method: Option<&str>,
    ) -> LedgerResult<SettlementRecord> {
        let now = self.now();
        self.store.in_transaction(|store| {
            settlement_lifecycle::record_payment(store, caller, settlement_id, amount, payment_method, now)
        })
    }

    pub fn confirm_settlement(
        &self,
        caller: UserId,
        settlement_id: SettlementId,
        payment_method: Option<&str>,
    ) -> LedgerResult<SettlementRecord> {
        let now = self.now();
        self.store.in_transaction(|store| {
            settlement_lifecycle::confirm_settlement(store, caller, settlement_id, payment_method, now)
        })
    }

    pub fn mark_overdue(&self) -> LedgerResult<Vec<SettlementRecord>> {
        let now = self.now();
        self.store
            .in_transaction(|store| settlement_lifecycle::mark_overdue(store, now))
    }

    /// Pending settlements `user_id` pays or receives. Only visible to that user.
    pub fn pending_settlements_for_user(
        &self,
        caller: UserId,
        user_id: UserId,
    ) -> LedgerResult<Vec<SettlementRecord>> {
        if caller != user_id {
            return Err(LedgerError::permission(format!(
                "user {caller} cannot view settlements of user {user_id}"
            )));
        }
        self.store
            .in_transaction(|store| store.pending_settlements_for_user(user_id))
    }

    pub fn group_settlements(
        &self,
        caller: UserId,
        group_id: GroupId,
    ) -> LedgerResult<Vec<SettlementRecord>> {
        self.store.in_transaction(|store| {
            require_member(store, group_id, caller)?;
            store.group_settlements(group_id)
        })
    }

    pub fn settlement_summary(
        &self,
        caller: UserId,
        group_id: GroupId,
        window: SummaryWindow,
    ) -> LedgerResult<SettlementSummary> {
        let now = self.now();
        self.store.in_transaction(|store| {
            settlement_lifecycle::settlement_summary(store, caller, group_id, window, now)
        })
    }

    // ── Schedules ─────────────────────────────────────────────

    /// Admin-only. The period string is parsed here, so a malformed one
    /// never reaches the scheduler.
    pub fn set_settlement_period(
        &self,
        caller: UserId,
        group_id: GroupId,
        period: &str,
    ) -> LedgerResult<ScheduleRecord> {
        let now = self.now();
        self.store.in_transaction(|store| {
            require_admin(store, group_id, caller)?;
            let period: SettlementPeriod = period.parse()?;
            let last_run = store.get_schedule(group_id)?.and_then(|s| s.last_run);
            let schedule = ScheduleRecord {
                group_id,
                period,
                last_run,
                next_run: period.advance(now)?,
            };
            store.upsert_schedule(&schedule)?;
            log::info!(
                "group={group_id} settles every {period}, next run {}",
                schedule.next_run
            );
            Ok(schedule)
        })
    }

    pub fn settlement_schedule(
        &self,
        caller: UserId,
        group_id: GroupId,
    ) -> LedgerResult<Option<ScheduleRecord>> {
        self.store.in_transaction(|store| {
            require_member(store, group_id, caller)?;
            store.get_schedule(group_id)
        })
    }

    /// One sweep over every due group at the clock's current time.
    pub fn run_settlement_sweep(&self) -> LedgerResult<SweepReport> {
        sweep_scheduler::run_settlement_sweep(&self.store, self.now(), self.config.due_window())
    }

    // ── Notifications ─────────────────────────────────────────

    pub fn notifications_for(&self, caller: UserId) -> LedgerResult<Vec<NotificationRecord>> {
        self.store
            .in_transaction(|store| store.notifications_for_user(caller))
    }

    pub fn mark_notification_read(
        &self,
        caller: UserId,
        notification_id: NotificationId,
    ) -> LedgerResult<NotificationRecord> {
        self.store.in_transaction(|store| {
            let notification = store.get_notification(notification_id)?;
            if notification.user_id != caller {
                return Err(LedgerError::permission(format!(
                    "notification {notification_id} does not belong to user {caller}"
                )));
            }
            store.mark_notification_read(notification_id)?;
            store.get_notification(notification_id)
        })
    }
}

fn check_new_expense(store: &LedgerStore, caller: UserId, new: &NewExpense) -> LedgerResult<()> {
    require_member(store, new.group_id, caller)?;
    require_participant(store, new.group_id, new.paid_by, "payer")?;
    if new.amount <= Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "expense amount must be positive, got {}",
            new.amount
        )));
    }
    if new.description.trim().is_empty() {
        return Err(LedgerError::validation("expense description must not be empty"));
    }
    Ok(())
}
