use super::{decimal_at, money, opt_timestamp_at, parsed_at, timestamp_at, ts, LedgerStore};
use crate::{
    error::{LedgerError, LedgerResult},
    model::{NewSettlement, SettlementRecord, SettlementStatus},
    types::{ExpenseId, GroupId, Money, SettlementId, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const SETTLEMENT_COLUMNS: &str = "settlement_id, group_id, payer, receiver, amount, status,
     created_at, due_date, payment_date, payment_method, split_expense";

impl LedgerStore {
    /// Insert a new Pending settlement.
    pub fn insert_settlement(
        &self,
        new: &NewSettlement,
        created_at: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> LedgerResult<SettlementRecord> {
        self.insert_settlement_row(new, None, created_at, due_date)
    }

    /// Insert a Pending share of a split expense.
    pub fn insert_split_settlement(
        &self,
        new: &NewSettlement,
        split_expense: ExpenseId,
        created_at: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> LedgerResult<SettlementRecord> {
        self.insert_settlement_row(new, Some(split_expense), created_at, due_date)
    }

    fn insert_settlement_row(
        &self,
        new: &NewSettlement,
        split_expense: Option<ExpenseId>,
        created_at: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> LedgerResult<SettlementRecord> {
        self.conn.execute(
            "INSERT INTO settlement
                 (group_id, payer, receiver, amount, status, created_at, due_date, split_expense)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.group_id,
                new.payer,
                new.receiver,
                money(new.amount),
                SettlementStatus::Pending.as_str(),
                ts(created_at),
                ts(due_date),
                split_expense,
            ],
        )?;
        Ok(SettlementRecord {
            settlement_id: self.conn.last_insert_rowid(),
            group_id: new.group_id,
            payer: new.payer,
            receiver: new.receiver,
            amount: new.amount,
            status: SettlementStatus::Pending,
            created_at,
            due_date,
            payment_date: None,
            payment_method: None,
            split_expense,
        })
    }

    pub fn get_settlement(&self, settlement_id: SettlementId) -> LedgerResult<SettlementRecord> {
        self.conn
            .query_row(
                &format!("SELECT {SETTLEMENT_COLUMNS} FROM settlement WHERE settlement_id = ?1"),
                params![settlement_id],
                Self::map_settlement_row,
            )
            .optional()?
            .ok_or_else(|| LedgerError::not_found("settlement", settlement_id))
    }

    /// Every settlement of a group, in creation order.
    pub fn group_settlements(&self, group_id: GroupId) -> LedgerResult<Vec<SettlementRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlement
             WHERE group_id = ?1
             ORDER BY settlement_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![group_id], Self::map_settlement_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn group_settlements_with_status(
        &self,
        group_id: GroupId,
        status: SettlementStatus,
    ) -> LedgerResult<Vec<SettlementRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlement
             WHERE group_id = ?1 AND status = ?2
             ORDER BY settlement_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![group_id, status.as_str()], Self::map_settlement_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Settlements created in `[from, to)`, in creation order.
    pub fn group_settlements_created_between(
        &self,
        group_id: GroupId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<SettlementRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlement
             WHERE group_id = ?1 AND created_at >= ?2 AND created_at < ?3
             ORDER BY settlement_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![group_id, ts(from), ts(to)], Self::map_settlement_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Pending settlements where the user pays or receives, across all groups.
    pub fn pending_settlements_for_user(&self, user_id: UserId) -> LedgerResult<Vec<SettlementRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlement
             WHERE (payer = ?1 OR receiver = ?1) AND status = ?2
             ORDER BY due_date ASC, settlement_id ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![user_id, SettlementStatus::Pending.as_str()],
                Self::map_settlement_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Pending settlements whose due date is strictly before `now`.
    pub fn pending_settlements_due_before(
        &self,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<SettlementRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlement
             WHERE status = ?1 AND due_date < ?2
             ORDER BY due_date ASC, settlement_id ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![SettlementStatus::Pending.as_str(), ts(now)],
                Self::map_settlement_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Re-price an open settlement instead of creating a duplicate pair.
    /// The new due date puts an Overdue record back to Pending.
    pub fn update_settlement_terms(
        &self,
        settlement_id: SettlementId,
        amount: Money,
        due_date: DateTime<Utc>,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "UPDATE settlement SET amount = ?1, due_date = ?2, status = ?3 WHERE settlement_id = ?4",
            params![
                money(amount),
                ts(due_date),
                SettlementStatus::Pending.as_str(),
                settlement_id
            ],
        )?;
        Ok(())
    }

    pub fn update_settlement_status(
        &self,
        settlement_id: SettlementId,
        status: SettlementStatus,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "UPDATE settlement SET status = ?1 WHERE settlement_id = ?2",
            params![status.as_str(), settlement_id],
        )?;
        Ok(())
    }

    /// Record when (and how) the payer paid. Status is left to the receiver.
    pub fn record_settlement_payment(
        &self,
        settlement_id: SettlementId,
        payment_date: DateTime<Utc>,
        payment_method: Option<&str>,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "UPDATE settlement
             SET payment_date = ?1, payment_method = COALESCE(?2, payment_method)
             WHERE settlement_id = ?3",
            params![ts(payment_date), payment_method, settlement_id],
        )?;
        Ok(())
    }

    /// Remove a superseded Pending record. Its notifications keep their
    /// text but lose the link.
    pub fn delete_settlement(&self, settlement_id: SettlementId) -> LedgerResult<()> {
        self.conn.execute(
            "DELETE FROM settlement WHERE settlement_id = ?1",
            params![settlement_id],
        )?;
        Ok(())
    }

    fn map_settlement_row(row: &Row<'_>) -> rusqlite::Result<SettlementRecord> {
        Ok(SettlementRecord {
            settlement_id: row.get(0)?,
            group_id: row.get(1)?,
            payer: row.get(2)?,
            receiver: row.get(3)?,
            amount: decimal_at(row, 4)?,
            status: parsed_at(row, 5)?,
            created_at: timestamp_at(row, 6)?,
            due_date: timestamp_at(row, 7)?,
            payment_date: opt_timestamp_at(row, 8)?,
            payment_method: row.get(9)?,
            split_expense: row.get(10)?,
        })
    }
}
