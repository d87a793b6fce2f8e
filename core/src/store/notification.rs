use super::{parsed_at, timestamp_at, ts, LedgerStore};
use crate::{
    error::{LedgerError, LedgerResult},
    model::{NotificationKind, NotificationRecord, SettlementRecord},
    types::{display_amount, Money, NotificationId, SettlementId, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

/// A notification the core has generated but not yet stored.
/// Delivery is somebody else's job; the ledger only writes the record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id:       UserId,
    pub kind:          NotificationKind,
    pub message:       String,
    pub settlement_id: Option<SettlementId>,
}

impl NewNotification {
    /// Tell the payer a settlement is waiting for them.
    pub fn settlement_due(s: &SettlementRecord) -> Self {
        Self {
            user_id: s.payer,
            kind: NotificationKind::SettlementDue,
            message: format!(
                "You owe {} to user {} in group {}, due by {}",
                display_amount(s.amount),
                s.receiver,
                s.group_id,
                s.due_date.format("%Y-%m-%d"),
            ),
            settlement_id: Some(s.settlement_id),
        }
    }

    /// Tell the receiver the payer reports having paid.
    pub fn payment_received(s: &SettlementRecord, amount: Money) -> Self {
        Self {
            user_id: s.receiver,
            kind: NotificationKind::PaymentReceived,
            message: format!(
                "User {} reports paying you {}; confirm settlement #{} once received",
                s.payer,
                display_amount(amount),
                s.settlement_id,
            ),
            settlement_id: Some(s.settlement_id),
        }
    }

    pub fn settlement_confirmed(s: &SettlementRecord) -> Self {
        Self {
            user_id: s.payer,
            kind: NotificationKind::SettlementConfirmed,
            message: format!(
                "User {} confirmed your payment of {}",
                s.receiver,
                display_amount(s.amount),
            ),
            settlement_id: Some(s.settlement_id),
        }
    }

    pub fn settlement_overdue(s: &SettlementRecord) -> Self {
        Self {
            user_id: s.payer,
            kind: NotificationKind::SettlementOverdue,
            message: format!(
                "Your payment of {} to user {} was due {} and is now overdue",
                display_amount(s.amount),
                s.receiver,
                s.due_date.format("%Y-%m-%d"),
            ),
            settlement_id: Some(s.settlement_id),
        }
    }
}

impl LedgerStore {
    pub fn insert_notification(
        &self,
        n: &NewNotification,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<NotificationId> {
        self.conn.execute(
            "INSERT INTO notification (user_id, kind, message, settlement_id, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                n.user_id,
                n.kind.as_str(),
                n.message,
                n.settlement_id,
                ts(created_at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// A user's notifications, newest first.
    pub fn notifications_for_user(&self, user_id: UserId) -> LedgerResult<Vec<NotificationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT notification_id, user_id, kind, message, settlement_id, is_read, created_at
             FROM notification WHERE user_id = ?1
             ORDER BY created_at DESC, notification_id DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], Self::map_notification_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_notification(&self, notification_id: NotificationId) -> LedgerResult<NotificationRecord> {
        self.conn
            .query_row(
                "SELECT notification_id, user_id, kind, message, settlement_id, is_read, created_at
                 FROM notification WHERE notification_id = ?1",
                params![notification_id],
                Self::map_notification_row,
            )
            .optional()?
            .ok_or_else(|| LedgerError::not_found("notification", notification_id))
    }

    pub fn mark_notification_read(&self, notification_id: NotificationId) -> LedgerResult<()> {
        self.conn.execute(
            "UPDATE notification SET is_read = 1 WHERE notification_id = ?1",
            params![notification_id],
        )?;
        Ok(())
    }

    pub fn notification_count(&self) -> LedgerResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM notification", [], |row| row.get(0))?;
        Ok(count)
    }

    fn map_notification_row(row: &Row<'_>) -> rusqlite::Result<NotificationRecord> {
        Ok(NotificationRecord {
            notification_id: row.get(0)?,
            user_id: row.get(1)?,
            kind: parsed_at(row, 2)?,
            message: row.get(3)?,
            settlement_id: row.get(4)?,
            is_read: row.get(5)?,
            created_at: timestamp_at(row, 6)?,
        })
    }
}
