//! Search index repository: the `search_index` table, which also carries
//! the processing status of each certificate.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::extractor::CertificateFields;
use crate::pipeline::status::{InvalidTransition, ProcessingStatus, Transition};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct IndexRow {
    pub certificate_id: i64,
    pub extracted_text: String,
    pub fields: CertificateFields,
    pub status: ProcessingStatus,
    pub error_message: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl IndexRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let chemistry: String = row.get("chemical_composition")?;
        let mechanical: String = row.get("mechanical_properties")?;
        let tests: String = row.get("test_results")?;

        let fields = CertificateFields {
            grade: row.get("grade")?,
            heat_number: row.get("heat_number")?,
            certificate_number: row.get("certificate_number")?,
            supplier: row.get("supplier")?,
            chemical_composition: serde_json::from_str(&chemistry).unwrap_or_default(),
            mechanical_properties: serde_json::from_str(&mechanical).unwrap_or_default(),
            test_results: serde_json::from_str(&tests).unwrap_or_default(),
        };

        Ok(Self {
            certificate_id: row.get("certificate_id")?,
            extracted_text: row.get("extracted_text")?,
            fields,
            status: row.get("status")?,
            error_message: row.get("error_message")?,
            last_attempt_at: row.get("last_attempt_at")?,
            indexed_at: row.get("indexed_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// A completed index entry joined with its certificate and preview.
#[derive(Debug, Clone)]
pub struct IndexedCertificate {
    pub certificate_id: i64,
    pub material_id: i64,
    pub uploaded_at: DateTime<Utc>,
    pub extracted_text: String,
    pub grade: Option<String>,
    pub heat_number: Option<String>,
    pub certificate_number: Option<String>,
    pub supplier: Option<String>,
    pub thumbnail_path: Option<String>,
}

/// Result of a status change request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied {
        from: ProcessingStatus,
        to: ProcessingStatus,
    },
    /// The transition is not allowed from the current status, or the
    /// status changed underneath the request.
    Rejected(InvalidTransition),
    /// No index entry exists for the certificate.
    Missing,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Creates a `pending` entry unless one exists. Returns whether a row was added.
pub fn ensure_entry(db: &Database, certificate_id: i64, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO search_index (certificate_id, status, updated_at)
             VALUES (?1, ?2, ?3)",
            params![certificate_id, ProcessingStatus::Pending, now],
        )?;
        Ok(inserted > 0)
    })
}

pub fn find(db: &Database, certificate_id: i64) -> Result<Option<IndexRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM search_index WHERE certificate_id = ?1",
                params![certificate_id],
                IndexRow::from_row,
            )
            .optional()?)
    })
}

pub fn status_of(db: &Database, certificate_id: i64) -> Result<Option<ProcessingStatus>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT status FROM search_index WHERE certificate_id = ?1",
                params![certificate_id],
                |r| r.get(0),
            )
            .optional()?)
    })
}

/// Applies a validated status transition as a compare-and-set on the stored
/// status. `error` replaces the stored error message (`None` clears it).
///
/// `Start` also stamps `last_attempt_at`, which stale-claim recovery reads.
pub fn transition(
    db: &Database,
    certificate_id: i64,
    transition: Transition,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, DatabaseError> {
    db.with_transaction(|tx| {
        let current: Option<ProcessingStatus> = tx
            .query_row(
                "SELECT status FROM search_index WHERE certificate_id = ?1",
                params![certificate_id],
                |r| r.get(0),
            )
            .optional()?;

        let Some(from) = current else {
            return Ok(TransitionOutcome::Missing);
        };

        let to = match from.apply(transition) {
            Ok(to) => to,
            Err(rejected) => return Ok(TransitionOutcome::Rejected(rejected)),
        };

        let stamp_attempt = matches!(transition, Transition::Start);
        let changed = tx.execute(
            "UPDATE search_index
             SET status = ?3,
                 error_message = ?4,
                 updated_at = ?5,
                 last_attempt_at = CASE WHEN ?6 THEN ?5 ELSE last_attempt_at END
             WHERE certificate_id = ?1 AND status = ?2",
            params![certificate_id, from, to, error, now, stamp_attempt],
        )?;

        if changed == 0 {
            return Ok(TransitionOutcome::Rejected(InvalidTransition { from, transition }));
        }

        Ok(TransitionOutcome::Applied { from, to })
    })
}

/// Stores extracted text and fields. The status is left untouched.
pub fn write_content(
    db: &Database,
    certificate_id: i64,
    text: &str,
    fields: &CertificateFields,
    search_blob: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let chemistry = serde_json::to_string(&fields.chemical_composition)?;
    let mechanical = serde_json::to_string(&fields.mechanical_properties)?;
    let tests = serde_json::to_string(&fields.test_results)?;

    db.with_conn(|conn| {
        conn.execute(
            "UPDATE search_index
             SET extracted_text = ?2, grade = ?3, heat_number = ?4, certificate_number = ?5,
                 supplier = ?6, chemical_composition = ?7, mechanical_properties = ?8,
                 test_results = ?9, search_blob = ?10, indexed_at = ?11, updated_at = ?11
             WHERE certificate_id = ?1",
            params![
                certificate_id,
                text,
                fields.grade,
                fields.heat_number,
                fields.certificate_number,
                fields.supplier,
                chemistry,
                mechanical,
                tests,
                search_blob,
                now,
            ],
        )?;
        Ok(())
    })
}

/// Certificates that have been `processing` since before `cutoff`.
pub fn stale_processing(db: &Database, cutoff: DateTime<Utc>) -> Result<Vec<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT certificate_id FROM search_index
             WHERE status = 'processing'
               AND COALESCE(last_attempt_at, updated_at) < ?1
             ORDER BY certificate_id",
        )?;
        let ids = stmt
            .query_map(params![cutoff], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    })
}

/// Completed entries whose search blob contains `needle` (already
/// lower-cased); `None` returns every completed entry.
pub fn completed_entries(
    db: &Database,
    needle: Option<&str>,
) -> Result<Vec<IndexedCertificate>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT s.certificate_id, c.material_id, c.uploaded_at, s.extracted_text,
                    s.grade, s.heat_number, s.certificate_number, s.supplier,
                    p.thumbnail_path
             FROM search_index s
             JOIN certificates c ON c.id = s.certificate_id
             LEFT JOIN previews p ON p.certificate_id = s.certificate_id AND p.status = 'completed'
             WHERE s.status = 'completed'
               AND (?1 IS NULL OR instr(s.search_blob, ?1) > 0)
             ORDER BY s.certificate_id DESC",
        )?;
        let rows = stmt
            .query_map(params![needle], |row| {
                Ok(IndexedCertificate {
                    certificate_id: row.get(0)?,
                    material_id: row.get(1)?,
                    uploaded_at: row.get(2)?,
                    extracted_text: row.get(3)?,
                    grade: row.get(4)?,
                    heat_number: row.get(5)?,
                    certificate_number: row.get(6)?,
                    supplier: row.get(7)?,
                    thumbnail_path: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Columns offered for autocomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueColumn {
    Grade,
    HeatNumber,
    CertificateNumber,
    Supplier,
}

impl ValueColumn {
    fn column(&self) -> &'static str {
        match self {
            Self::Grade => "grade",
            Self::HeatNumber => "heat_number",
            Self::CertificateNumber => "certificate_number",
            Self::Supplier => "supplier",
        }
    }
}

/// Distinct non-empty values of a field over completed entries.
pub fn distinct_values(db: &Database, column: ValueColumn) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT DISTINCT {col} FROM search_index
             WHERE status = 'completed' AND {col} IS NOT NULL AND {col} != ''
             ORDER BY {col}",
            col = column.column()
        );
        let mut stmt = conn.prepare(&sql)?;
        let values = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(values)
    })
}
