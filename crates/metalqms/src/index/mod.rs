//! Search index: persisting extracted content and querying it.

pub mod search;

use chrono::{DateTime, Utc};

use crate::db::{certificate_repo, index_repo, Database};
use crate::error::IndexingError;
use crate::extractor::CertificateFields;

pub use search::{FieldFilters, SearchQuery, SearchResult, SearchService, Suggestion, SuggestionField};

/// Writes extracted text and fields into the search index.
#[derive(Clone)]
pub struct Indexer {
    db: Database,
}

impl Indexer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Stores text, fields and the lower-cased search blob of a
    /// certificate, and mirrors the fields into its parsed data. Status is
    /// managed by the orchestrator.
    pub fn upsert(
        &self,
        certificate_id: i64,
        text: &str,
        fields: &CertificateFields,
        now: DateTime<Utc>,
    ) -> Result<(), IndexingError> {
        let parsed = serde_json::to_value(fields)?;
        index_repo::ensure_entry(&self.db, certificate_id, now)?;
        index_repo::write_content(
            &self.db,
            certificate_id,
            text,
            fields,
            &search_blob(text, fields),
            now,
        )?;
        certificate_repo::update_parsed_data(&self.db, certificate_id, &parsed)?;
        Ok(())
    }
}

/// Lower-cased concatenation of every searchable value, one per line.
pub fn search_blob(text: &str, fields: &CertificateFields) -> String {
    let mut parts: Vec<&str> = vec![text];
    parts.extend(
        [
            &fields.grade,
            &fields.heat_number,
            &fields.certificate_number,
            &fields.supplier,
        ]
        .into_iter()
        .filter_map(|f| f.as_deref()),
    );
    parts.join("\n").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::certificate_repo::sample;

    #[test]
    fn test_search_blob_lowercases_cyrillic() {
        let fields = CertificateFields {
            grade: Some("09Г2С".into()),
            supplier: Some("ПАО Северсталь".into()),
            ..Default::default()
        };
        let blob = search_blob("Сертификат качества", &fields);
        assert_eq!(blob, "сертификат качества\n09г2с\nпао северсталь");
    }

    #[test]
    fn test_upsert_writes_index_and_parsed_data() {
        let db = Database::open_in_memory().unwrap();
        let id = certificate_repo::insert(&db, &sample(3)).unwrap();
        let fields = CertificateFields {
            grade: Some("40X".into()),
            heat_number: Some("12345".into()),
            ..Default::default()
        };

        Indexer::new(db.clone())
            .upsert(id, "Марка стали: 40X", &fields, Utc::now())
            .unwrap();

        let row = index_repo::find(&db, id).unwrap().unwrap();
        assert_eq!(row.extracted_text, "Марка стали: 40X");
        assert_eq!(row.fields, fields);
        let cert = certificate_repo::find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(cert.parsed_data["grade"], "40X");
        assert_eq!(cert.parsed_data["heat_number"], "12345");
    }
}
