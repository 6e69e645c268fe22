//! Processing statistics: aggregate counts over certificates, the search
//! index and previews.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{Database, DatabaseError};

/// Snapshot of the processing state of all certificates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    pub total_certificates: u64,
    /// Index entries per processing status.
    pub by_status: BTreeMap<String, u64>,
    pub previews_completed: u64,
    pub previews_failed: u64,
    /// Certificates that have no `completed` index entry, including those
    /// never registered in the index.
    pub without_completed_index: u64,
}

pub fn processing_stats(db: &Database) -> Result<ProcessingStats, DatabaseError> {
    db.with_conn(|conn| {
        let total_certificates: i64 =
            conn.query_row("SELECT COUNT(*) FROM certificates", [], |r| r.get(0))?;

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM search_index GROUP BY status")?;
        let by_status = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let (previews_completed, previews_failed): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(status = 'completed'), 0), COALESCE(SUM(status = 'failed'), 0)
             FROM previews",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        let without_completed_index: i64 = conn.query_row(
            "SELECT COUNT(*) FROM certificates c
             LEFT JOIN search_index s ON s.certificate_id = c.id AND s.status = 'completed'
             WHERE s.certificate_id IS NULL",
            [],
            |r| r.get(0),
        )?;

        Ok(ProcessingStats {
            total_certificates: total_certificates as u64,
            by_status,
            previews_completed: previews_completed as u64,
            previews_failed: previews_failed as u64,
            without_completed_index: without_completed_index as u64,
        })
    })
}
