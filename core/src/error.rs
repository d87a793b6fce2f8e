use thiserror::Error;

use crate::types::GroupId;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Group {group_id} has no members")]
    EmptyGroup { group_id: GroupId },

    #[error("Group {group_id} has no expenses to settle")]
    NoExpenses { group_id: GroupId },

    #[error("Sweep failed for group {group_id}: {source}")]
    Sweep {
        group_id: GroupId,
        #[source]
        source: Box<LedgerError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn permission(reason: impl Into<String>) -> Self {
        Self::Permission(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Wrap a per-group failure raised while sweeping.
    pub fn sweep(group_id: GroupId, source: LedgerError) -> Self {
        Self::Sweep {
            group_id,
            source: Box::new(source),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
