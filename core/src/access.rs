//! Membership checks shared by every caller-facing operation.
//!
//! Who may act on a group is decided here and nowhere else.

use crate::{
    error::{LedgerError, LedgerResult},
    model::MemberRecord,
    store::LedgerStore,
    types::{GroupId, UserId},
};

/// The group must exist and `user_id` must belong to it.
pub fn require_member(
    store: &LedgerStore,
    group_id: GroupId,
    user_id: UserId,
) -> LedgerResult<MemberRecord> {
    store.get_group(group_id)?;
    store.get_membership(group_id, user_id)?.ok_or_else(|| {
        LedgerError::permission(format!("user {user_id} is not a member of group {group_id}"))
    })
}

pub fn require_admin(
    store: &LedgerStore,
    group_id: GroupId,
    user_id: UserId,
) -> LedgerResult<MemberRecord> {
    let member = require_member(store, group_id, user_id)?;
    if !member.is_admin {
        return Err(LedgerError::permission(format!(
            "user {user_id} is not an admin of group {group_id}"
        )));
    }
    Ok(member)
}

/// A named party (payer, receiver, split participant) must be a member.
/// Unlike the caller check, a stranger here is malformed input.
pub fn require_participant(
    store: &LedgerStore,
    group_id: GroupId,
    user_id: UserId,
    role: &str,
) -> LedgerResult<()> {
    match store.get_membership(group_id, user_id)? {
        Some(_) => Ok(()),
        None => Err(LedgerError::validation(format!(
            "{role} {user_id} is not a member of group {group_id}"
        ))),
    }
}
