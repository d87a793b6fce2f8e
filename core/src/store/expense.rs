use super::{decimal_at, money, timestamp_at, ts, LedgerStore};
use crate::{
    error::LedgerResult,
    model::{ExpenseRecord, NewExpense},
    types::{ExpenseId, GroupId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

const EXPENSE_COLUMNS: &str =
    "expense_id, group_id, paid_by, amount, description, created_at, settled, split";

impl LedgerStore {
    /// An equal-split expense, open for the next sweep batch.
    pub fn insert_expense(
        &self,
        expense: &NewExpense,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<ExpenseRecord> {
        self.insert_expense_row(expense, created_at, false)
    }

    /// A split-rule expense. Stored settled: its own settlements bill it,
    /// so no sweep batch ever picks it up.
    pub fn insert_split_expense(
        &self,
        expense: &NewExpense,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<ExpenseRecord> {
        self.insert_expense_row(expense, created_at, true)
    }

    fn insert_expense_row(
        &self,
        expense: &NewExpense,
        created_at: DateTime<Utc>,
        split: bool,
    ) -> LedgerResult<ExpenseRecord> {
        self.conn.execute(
            "INSERT INTO expense (group_id, paid_by, amount, description, created_at, settled, split)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                expense.group_id,
                expense.paid_by,
                money(expense.amount),
                expense.description,
                ts(created_at),
                split,
            ],
        )?;
        Ok(ExpenseRecord {
            expense_id: self.conn.last_insert_rowid(),
            group_id: expense.group_id,
            paid_by: expense.paid_by,
            amount: expense.amount,
            description: expense.description.clone(),
            created_at,
            settled: split,
            split,
        })
    }

    /// All expenses for a group, oldest first.
    pub fn group_expenses(&self, group_id: GroupId) -> LedgerResult<Vec<ExpenseRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense
             WHERE group_id = ?1
             ORDER BY created_at ASC, expense_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![group_id], Self::map_expense_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Expenses not yet closed by a sweep batch, oldest first.
    pub fn unsettled_expenses(&self, group_id: GroupId) -> LedgerResult<Vec<ExpenseRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense
             WHERE group_id = ?1 AND settled = 0
             ORDER BY created_at ASC, expense_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![group_id], Self::map_expense_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Close a batch. Only the settlement workflow calls this.
    pub fn mark_expenses_settled(&self, expense_ids: &[ExpenseId]) -> LedgerResult<usize> {
        let mut stmt = self
            .conn
            .prepare("UPDATE expense SET settled = 1 WHERE expense_id = ?1")?;
        let mut updated = 0;
        for id in expense_ids {
            updated += stmt.execute(params![id])?;
        }
        Ok(updated)
    }

    fn map_expense_row(row: &Row<'_>) -> rusqlite::Result<ExpenseRecord> {
        Ok(ExpenseRecord {
            expense_id: row.get(0)?,
            group_id: row.get(1)?,
            paid_by: row.get(2)?,
            amount: decimal_at(row, 3)?,
            description: row.get(4)?,
            created_at: timestamp_at(row, 5)?,
            settled: row.get(6)?,
            split: row.get(7)?,
        })
    }
}
