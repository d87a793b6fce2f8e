//! Ledger records as the store hands them to the core.
//!
//! Records are plain values: the core never mutates a record in place,
//! it asks the store to write a new state.

use crate::{
    period::SettlementPeriod,
    types::{ExpenseId, GroupId, Money, NotificationId, SettlementId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub name:    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub group_id:   GroupId,
    pub name:       String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub group_id: GroupId,
    pub user_id:  UserId,
    pub is_admin: bool,
}

// ── Expenses ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub expense_id:  ExpenseId,
    pub group_id:    GroupId,
    pub paid_by:     UserId,
    pub amount:      Money,
    pub description: String,
    pub created_at:  DateTime<Utc>,
    pub settled:     bool,
    /// Recorded with a split rule. Its shares are billed by the settlements
    /// that carry its id, not by equal-split netting.
    pub split:       bool,
}

/// An expense as submitted, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub group_id:    GroupId,
    pub paid_by:     UserId,
    pub amount:      Money,
    pub description: String,
}

// ── Settlements ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementStatus {
    Pending,
    Confirmed,
    Overdue,
}

impl SettlementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending   => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Overdue   => "Overdue",
        }
    }

    /// Confirmed is terminal; everything else still awaits payment.
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Confirmed)
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "Pending"   => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Overdue"   => Ok(Self::Overdue),
            other       => Err(format!("unknown settlement status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub settlement_id:  SettlementId,
    pub group_id:       GroupId,
    pub payer:          UserId,
    pub receiver:       UserId,
    pub amount:         Money,
    pub status:         SettlementStatus,
    pub created_at:     DateTime<Utc>,
    pub due_date:       DateTime<Utc>,
    pub payment_date:   Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    /// The split expense this share was billed for.
    pub split_expense:  Option<ExpenseId>,
}

impl SettlementRecord {
    /// Open and produced by equal-split netting, so finalize may re-price it.
    pub fn is_netted_debt(&self) -> bool {
        self.status.is_open() && self.split_expense.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSettlement {
    pub group_id: GroupId,
    pub payer:    UserId,
    pub receiver: UserId,
    pub amount:   Money,
    /// Defaults to now + the configured due window.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

// ── Schedules ─────────────────────────────────────────────────

/// Where a scheduled group sits in the sweep cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    Idle,
    Due,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub group_id: GroupId,
    pub period:   SettlementPeriod,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
}

impl ScheduleRecord {
    pub fn state(&self, now: DateTime<Utc>) -> ScheduleState {
        if self.next_run <= now {
            ScheduleState::Due
        } else {
            ScheduleState::Idle
        }
    }
}

// ── Notifications ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    SettlementDue,
    PaymentReceived,
    SettlementConfirmed,
    SettlementOverdue,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SettlementDue       => "SETTLEMENT_DUE",
            Self::PaymentReceived     => "PAYMENT_RECEIVED",
            Self::SettlementConfirmed => "SETTLEMENT_CONFIRMED",
            Self::SettlementOverdue   => "SETTLEMENT_OVERDUE",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "SETTLEMENT_DUE"       => Ok(Self::SettlementDue),
            "PAYMENT_RECEIVED"     => Ok(Self::PaymentReceived),
            "SETTLEMENT_CONFIRMED" => Ok(Self::SettlementConfirmed),
            "SETTLEMENT_OVERDUE"   => Ok(Self::SettlementOverdue),
            other                  => Err(format!("unknown notification kind {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub notification_id: NotificationId,
    pub user_id:         UserId,
    pub kind:            NotificationKind,
    pub message:         String,
    pub settlement_id:   Option<SettlementId>,
    pub is_read:         bool,
    pub created_at:      DateTime<Utc>,
}
