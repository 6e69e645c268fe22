//! Certificate repository: the `certificates` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A stored certificate upload.
#[derive(Debug, Clone)]
pub struct CertificateRow {
    pub id: i64,
    pub material_id: i64,
    pub file_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub content_hash: String,
    pub uploaded_by: Option<i64>,
    pub uploaded_at: DateTime<Utc>,
    pub parsed_data: serde_json::Value,
}

impl CertificateRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let parsed: String = row.get("parsed_data")?;
        Ok(Self {
            id: row.get("id")?,
            material_id: row.get("material_id")?,
            file_path: row.get("file_path")?,
            original_filename: row.get("original_filename")?,
            file_size: row.get("file_size")?,
            content_hash: row.get("content_hash")?,
            uploaded_by: row.get("uploaded_by")?,
            uploaded_at: row.get("uploaded_at")?,
            parsed_data: serde_json::from_str(&parsed).unwrap_or(serde_json::Value::Null),
        })
    }
}

/// Values for a new certificate row; the id is assigned by SQLite.
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub material_id: i64,
    pub file_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub content_hash: String,
    pub uploaded_by: Option<i64>,
    pub uploaded_at: DateTime<Utc>,
}

/// Selection of certificates for batch reprocessing.
#[derive(Debug, Default, Clone)]
pub struct CertificateFilter {
    /// Explicit ids; `None` selects all certificates.
    pub ids: Option<Vec<i64>>,
    /// Only certificates whose index entry is `failed`.
    pub failed_only: bool,
    /// Only certificates without a completed preview.
    pub missing_preview: bool,
    pub limit: Option<u64>,
}

/// Inserts a certificate and returns its id.
pub fn insert(db: &Database, cert: &NewCertificate) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO certificates (material_id, file_path, original_filename, file_size,
             content_hash, uploaded_by, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                cert.material_id,
                cert.file_path,
                cert.original_filename,
                cert.file_size,
                cert.content_hash,
                cert.uploaded_by,
                cert.uploaded_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<CertificateRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM certificates WHERE id = ?1",
                params![id],
                CertificateRow::from_row,
            )
            .optional()?)
    })
}

/// Finds an earlier upload with identical content.
pub fn find_by_hash(db: &Database, hash: &str) -> Result<Option<CertificateRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM certificates WHERE content_hash = ?1 ORDER BY id LIMIT 1",
                params![hash],
                CertificateRow::from_row,
            )
            .optional()?)
    })
}

/// Replaces the parsed-field dictionary of a certificate.
pub fn update_parsed_data(
    db: &Database,
    id: i64,
    parsed: &serde_json::Value,
) -> Result<(), DatabaseError> {
    let encoded = serde_json::to_string(parsed)?;
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE certificates SET parsed_data = ?2 WHERE id = ?1",
            params![id, encoded],
        )?;
        Ok(())
    })
}

/// Returns ids matching the filter, ascending.
pub fn select_ids(db: &Database, filter: &CertificateFilter) -> Result<Vec<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref ids) = filter.ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = ids
                .iter()
                .map(|id| {
                    param_values.push(Box::new(*id));
                    format!("?{}", param_values.len())
                })
                .collect();
            conditions.push(format!("c.id IN ({})", placeholders.join(", ")));
        }
        if filter.failed_only {
            conditions.push("s.status = 'failed'".to_string());
        }
        if filter.missing_preview {
            conditions.push("(p.status IS NULL OR p.status != 'completed')".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let limit_clause = match filter.limit {
            Some(limit) => {
                param_values.push(Box::new(limit as i64));
                format!("LIMIT ?{}", param_values.len())
            }
            None => String::new(),
        };

        let sql = format!(
            "SELECT c.id FROM certificates c
             LEFT JOIN search_index s ON s.certificate_id = c.id
             LEFT JOIN previews p ON p.certificate_id = c.id
             {} ORDER BY c.id {}",
            where_clause, limit_clause
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_ref.as_slice(), |r| r.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM certificates", [], |r| r.get(0))?)
    })
}

#[cfg(test)]
pub(crate) fn sample(material_id: i64) -> NewCertificate {
    NewCertificate {
        material_id,
        file_path: format!("certificates/{material_id}.pdf"),
        original_filename: format!("cert-{material_id}.pdf"),
        file_size: 1024,
        content_hash: format!("hash-{material_id}"),
        uploaded_by: Some(7),
        uploaded_at: Utc::now(),
    }
}
