//! Preview repository: one thumbnail record per certificate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{Database, DatabaseError, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl PreviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PreviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreviewStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "generating" => Ok(Self::Generating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant::new("preview status", other)),
        }
    }
}

super::text_column!(PreviewStatus);

#[derive(Debug, Clone)]
pub struct PreviewRow {
    pub certificate_id: i64,
    pub thumbnail_path: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub status: PreviewStatus,
    pub error_message: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
}

impl PreviewRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            certificate_id: row.get("certificate_id")?,
            thumbnail_path: row.get("thumbnail_path")?,
            width: row.get("width")?,
            height: row.get("height")?,
            status: row.get("status")?,
            error_message: row.get("error_message")?,
            generated_at: row.get("generated_at")?,
        })
    }
}

/// Creates the record if needed and marks it `generating`.
pub fn mark_generating(db: &Database, certificate_id: i64, now: DateTime<Utc>) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO previews (certificate_id, status, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(certificate_id) DO UPDATE SET
               status = excluded.status, error_message = NULL, updated_at = excluded.updated_at",
            params![certificate_id, PreviewStatus::Generating, now],
        )?;
        Ok(())
    })
}

pub fn mark_completed(
    db: &Database,
    certificate_id: i64,
    thumbnail_path: &str,
    width: u32,
    height: u32,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO previews (certificate_id, thumbnail_path, width, height, status,
                                   error_message, generated_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)
             ON CONFLICT(certificate_id) DO UPDATE SET
               thumbnail_path = excluded.thumbnail_path, width = excluded.width,
               height = excluded.height, status = excluded.status, error_message = NULL,
               generated_at = excluded.generated_at, updated_at = excluded.updated_at",
            params![certificate_id, thumbnail_path, width, height, PreviewStatus::Completed, now],
        )?;
        Ok(())
    })
}

/// Marks the preview failed, keeping any earlier thumbnail path.
pub fn mark_failed(
    db: &Database,
    certificate_id: i64,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO previews (certificate_id, status, error_message, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(certificate_id) DO UPDATE SET
               status = excluded.status, error_message = excluded.error_message,
               updated_at = excluded.updated_at",
            params![certificate_id, PreviewStatus::Failed, error, now],
        )?;
        Ok(())
    })
}

pub fn find(db: &Database, certificate_id: i64) -> Result<Option<PreviewRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM previews WHERE certificate_id = ?1",
                params![certificate_id],
                PreviewRow::from_row,
            )
            .optional()?)
    })
}
