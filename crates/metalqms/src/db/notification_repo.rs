//! Notification preferences and the notification delivery log.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{Database, DatabaseError, UnknownVariant};
use crate::notify::category::NotificationCategory;
use crate::notify::preferences::{CategoryPreference, NotificationPreferences, QuietHours};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Retry,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Retry => "retry",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "retry" => Ok(Self::Retry),
            other => Err(UnknownVariant::new("notification status", other)),
        }
    }
}

super::text_column!(NotificationStatus);

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

fn preferences_from_row(row: &Row<'_>) -> Result<(NotificationPreferences, String), rusqlite::Error> {
    let start: Option<NaiveTime> = row.get("quiet_hours_start")?;
    let end: Option<NaiveTime> = row.get("quiet_hours_end")?;
    let categories: String = row.get("categories")?;
    let prefs = NotificationPreferences {
        user_id: row.get("user_id")?,
        chat_id: row.get("chat_id")?,
        enabled: row.get("enabled")?,
        categories: BTreeMap::new(),
        quiet_hours: start.zip(end).and_then(|(s, e)| QuietHours::new(s, e)),
        utc_offset_minutes: row.get("utc_offset_minutes")?,
    };
    Ok((prefs, categories))
}

pub fn find_preferences(
    db: &Database,
    user_id: i64,
) -> Result<Option<NotificationPreferences>, DatabaseError> {
    let found = db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM notification_preferences WHERE user_id = ?1",
                params![user_id],
                preferences_from_row,
            )
            .optional()?)
    })?;

    match found {
        Some((mut prefs, categories)) => {
            prefs.categories =
                serde_json::from_str::<BTreeMap<NotificationCategory, CategoryPreference>>(
                    &categories,
                )?;
            Ok(Some(prefs))
        }
        None => Ok(None),
    }
}

pub fn upsert_preferences(
    db: &Database,
    prefs: &NotificationPreferences,
) -> Result<(), DatabaseError> {
    let categories = serde_json::to_string(&prefs.categories)?;
    let (start, end) = match prefs.quiet_hours {
        Some(q) => (Some(q.start), Some(q.end)),
        None => (None, None),
    };
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO notification_preferences
               (user_id, chat_id, enabled, categories, quiet_hours_start, quiet_hours_end,
                utc_offset_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
               chat_id = excluded.chat_id, enabled = excluded.enabled,
               categories = excluded.categories,
               quiet_hours_start = excluded.quiet_hours_start,
               quiet_hours_end = excluded.quiet_hours_end,
               utc_offset_minutes = excluded.utc_offset_minutes",
            params![
                prefs.user_id,
                prefs.chat_id,
                prefs.enabled,
                categories,
                start,
                end,
                prefs.utc_offset_minutes,
            ],
        )?;
        Ok(())
    })
}

/// Turns off the master switch. Returns `false` when the user has no
/// preferences row.
pub fn disable_user(db: &Database, user_id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE notification_preferences SET enabled = 0 WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(changed > 0)
    })
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: i64,
    pub user_id: i64,
    pub category: NotificationCategory,
    pub chat_id: String,
    pub message: String,
    pub urgent: bool,
    pub status: NotificationStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub object_type: Option<String>,
    pub object_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            category: row.get("category")?,
            chat_id: row.get("chat_id")?,
            message: row.get("message")?,
            urgent: row.get("urgent")?,
            status: row.get("status")?,
            retry_count: row.get("retry_count")?,
            error_message: row.get("error_message")?,
            object_type: row.get("object_type")?,
            object_id: row.get("object_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            sent_at: row.get("sent_at")?,
            next_attempt_at: row.get("next_attempt_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewLogEntry<'a> {
    pub user_id: i64,
    pub category: NotificationCategory,
    pub chat_id: &'a str,
    pub message: &'a str,
    pub urgent: bool,
    pub object_type: Option<&'a str>,
    pub object_id: Option<i64>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// Outcome of one delivery attempt as written back to the log.
#[derive(Debug, Clone)]
pub struct AttemptUpdate {
    pub status: NotificationStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// Inserts a `pending` entry and returns its id.
pub fn insert_log(db: &Database, entry: &NewLogEntry<'_>, now: DateTime<Utc>) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO notification_log
               (user_id, category, chat_id, message, urgent, status, retry_count,
                object_type, object_id, created_at, updated_at, next_attempt_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9, ?9, ?10)",
            params![
                entry.user_id,
                entry.category,
                entry.chat_id,
                entry.message,
                entry.urgent,
                NotificationStatus::Pending,
                entry.object_type,
                entry.object_id,
                now,
                entry.next_attempt_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn find_log(db: &Database, id: i64) -> Result<Option<LogEntry>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM notification_log WHERE id = ?1",
                params![id],
                LogEntry::from_row,
            )
            .optional()?)
    })
}

pub fn record_attempt(
    db: &Database,
    id: i64,
    update: &AttemptUpdate,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE notification_log SET status = ?2, retry_count = ?3, error_message = ?4,
               sent_at = COALESCE(?5, sent_at), next_attempt_at = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id,
                update.status,
                update.retry_count,
                update.error_message,
                update.sent_at,
                update.next_attempt_at,
                now,
            ],
        )?;
        Ok(())
    })
}

/// Moves the held-back entry to a later slot without counting an attempt.
pub fn reschedule(
    db: &Database,
    id: i64,
    next_attempt_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE notification_log SET next_attempt_at = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, next_attempt_at, now],
        )?;
        Ok(())
    })
}

/// Pending and retry entries whose next attempt is due, oldest first.
pub fn due(db: &Database, now: DateTime<Utc>, limit: usize) -> Result<Vec<LogEntry>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM notification_log
             WHERE status IN ('pending', 'retry')
               AND next_attempt_at IS NOT NULL AND next_attempt_at <= ?1
             ORDER BY next_attempt_at, id
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![now, limit as i64], LogEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Takes a due entry for delivery by clearing its schedule. Returns `false`
/// when another dispatcher claimed it first or it is no longer due.
pub fn claim_due(db: &Database, id: i64, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE notification_log SET next_attempt_at = NULL, updated_at = ?2
             WHERE id = ?1 AND status IN ('pending', 'retry')
               AND next_attempt_at IS NOT NULL AND next_attempt_at <= ?2",
            params![id, now],
        )?;
        Ok(changed > 0)
    })
}

/// Moves a `failed` entry back to `pending` with a fresh retry budget.
/// Returns `false` when the entry is not failed (anymore).
pub fn reopen_failed(db: &Database, id: i64, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE notification_log
             SET status = 'pending', retry_count = 0, error_message = NULL,
                 next_attempt_at = NULL, updated_at = ?2
             WHERE id = ?1 AND status = 'failed'",
            params![id, now],
        )?;
        Ok(changed > 0)
    })
}

/// Deletes entries created before `cutoff`. Returns the number removed.
pub fn delete_older_than(db: &Database, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute(
            "DELETE FROM notification_log WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    })
}

pub fn count_by_status(db: &Database) -> Result<BTreeMap<String, u64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM notification_log GROUP BY status")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    })
}
