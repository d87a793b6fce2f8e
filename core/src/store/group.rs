use super::{timestamp_at, ts, LedgerStore};
use crate::{
    error::{LedgerError, LedgerResult},
    model::{GroupRecord, MemberRecord, UserRecord},
    types::{GroupId, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

impl LedgerStore {
    // ── Users ──────────────────────────────────────────────────

    pub fn insert_user(&self, name: &str) -> LedgerResult<UserId> {
        self.conn
            .execute("INSERT INTO app_user (name) VALUES (?1)", params![name])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_user(&self, user_id: UserId) -> LedgerResult<UserRecord> {
        self.conn
            .query_row(
                "SELECT user_id, name FROM app_user WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserRecord {
                        user_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| LedgerError::not_found("user", user_id))
    }

    // ── Groups ─────────────────────────────────────────────────

    /// Create a group and make its creator the first (admin) member.
    pub fn insert_group(
        &self,
        name: &str,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<GroupId> {
        self.conn.execute(
            "INSERT INTO user_group (name, created_by, created_at) VALUES (?1, ?2, ?3)",
            params![name, created_by, ts(created_at)],
        )?;
        let group_id = self.conn.last_insert_rowid();
        self.add_member(group_id, created_by, true)?;
        Ok(group_id)
    }

    pub fn get_group(&self, group_id: GroupId) -> LedgerResult<GroupRecord> {
        self.conn
            .query_row(
                "SELECT group_id, name, created_by, created_at
                 FROM user_group WHERE group_id = ?1",
                params![group_id],
                |row| {
                    Ok(GroupRecord {
                        group_id: row.get(0)?,
                        name: row.get(1)?,
                        created_by: row.get(2)?,
                        created_at: timestamp_at(row, 3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| LedgerError::not_found("group", group_id))
    }

    // ── Membership ─────────────────────────────────────────────

    pub fn add_member(&self, group_id: GroupId, user_id: UserId, is_admin: bool) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO group_member (group_id, user_id, is_admin) VALUES (?1, ?2, ?3)
             ON CONFLICT(group_id, user_id) DO UPDATE SET is_admin = excluded.is_admin",
            params![group_id, user_id, is_admin],
        )?;
        Ok(())
    }

    /// The membership row, or None when the user is not in the group.
    pub fn get_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> LedgerResult<Option<MemberRecord>> {
        let member = self
            .conn
            .query_row(
                "SELECT group_id, user_id, is_admin FROM group_member
                 WHERE group_id = ?1 AND user_id = ?2",
                params![group_id, user_id],
                |row| {
                    Ok(MemberRecord {
                        group_id: row.get(0)?,
                        user_id: row.get(1)?,
                        is_admin: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(member)
    }

    /// Member ids in ascending order.
    pub fn group_member_ids(&self, group_id: GroupId) -> LedgerResult<Vec<UserId>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id FROM group_member WHERE group_id = ?1 ORDER BY user_id ASC",
        )?;
        let ids = stmt
            .query_map(params![group_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}
