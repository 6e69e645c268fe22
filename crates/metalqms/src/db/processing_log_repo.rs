//! Append-only log of processing attempts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use super::{Database, DatabaseError, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    TextExtraction,
    SearchIndexing,
    PreviewGeneration,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextExtraction => "text_extraction",
            Self::SearchIndexing => "search_indexing",
            Self::PreviewGeneration => "preview_generation",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_extraction" => Ok(Self::TextExtraction),
            "search_indexing" => Ok(Self::SearchIndexing),
            "preview_generation" => Ok(Self::PreviewGeneration),
            other => Err(UnknownVariant::new("operation", other)),
        }
    }
}

super::text_column!(Operation);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Completed,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for AttemptStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant::new("attempt status", other)),
        }
    }
}

super::text_column!(AttemptStatus);

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub certificate_id: i64,
    pub operation: Operation,
    pub attempt: u32,
    pub status: AttemptStatus,
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let metadata: String = row.get("metadata")?;
        Ok(Self {
            certificate_id: row.get("certificate_id")?,
            operation: row.get("operation")?,
            attempt: row.get("attempt")?,
            status: row.get("status")?,
            duration_ms: row.get("duration_ms")?,
            error_message: row.get("error_message")?,
            metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
            created_at: row.get("created_at")?,
        })
    }
}

pub fn append(db: &Database, entry: &LogEntry) -> Result<(), DatabaseError> {
    let metadata = serde_json::to_string(&entry.metadata)?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO processing_log (certificate_id, operation, attempt, status, duration_ms,
             error_message, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.certificate_id,
                entry.operation,
                entry.attempt,
                entry.status,
                entry.duration_ms,
                entry.error_message,
                metadata,
                entry.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Entries of a certificate in insertion order.
pub fn for_certificate(db: &Database, certificate_id: i64) -> Result<Vec<LogEntry>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM processing_log WHERE certificate_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![certificate_id], LogEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
