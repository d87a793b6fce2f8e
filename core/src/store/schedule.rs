use super::{opt_timestamp_at, parsed_at, timestamp_at, ts, LedgerStore};
use crate::{
    error::LedgerResult,
    model::ScheduleRecord,
    types::GroupId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

impl LedgerStore {
    /// One schedule per group: insert, or replace period and next run.
    /// `last_run` is left untouched on update.
    pub fn upsert_schedule(&self, schedule: &ScheduleRecord) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO settlement_schedule (group_id, period, last_run, next_run)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(group_id) DO UPDATE
             SET period = excluded.period, next_run = excluded.next_run",
            params![
                schedule.group_id,
                schedule.period.to_string(),
                schedule.last_run.map(ts),
                ts(schedule.next_run),
            ],
        )?;
        Ok(())
    }

    pub fn get_schedule(&self, group_id: GroupId) -> LedgerResult<Option<ScheduleRecord>> {
        let schedule = self
            .conn
            .query_row(
                "SELECT group_id, period, last_run, next_run
                 FROM settlement_schedule WHERE group_id = ?1",
                params![group_id],
                Self::map_schedule_row,
            )
            .optional()?;
        Ok(schedule)
    }

    /// Schedules with `next_run <= now`, most overdue first.
    pub fn due_schedules(&self, now: DateTime<Utc>) -> LedgerResult<Vec<ScheduleRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT group_id, period, last_run, next_run
             FROM settlement_schedule
             WHERE next_run <= ?1
             ORDER BY next_run ASC, group_id ASC",
        )?;
        let rows = stmt
            .query_map(params![ts(now)], Self::map_schedule_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn advance_schedule(
        &self,
        group_id: GroupId,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "UPDATE settlement_schedule SET last_run = ?1, next_run = ?2 WHERE group_id = ?3",
            params![ts(last_run), ts(next_run), group_id],
        )?;
        Ok(())
    }

    fn map_schedule_row(row: &Row<'_>) -> rusqlite::Result<ScheduleRecord> {
        Ok(ScheduleRecord {
            group_id: row.get(0)?,
            period: parsed_at(row, 1)?,
            last_run: opt_timestamp_at(row, 2)?,
            next_run: timestamp_at(row, 3)?,
        })
    }
}
