//! Ranked certificate search and autocomplete over completed index entries.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SearchConfig;
use crate::db::index_repo::{self, IndexedCertificate, ValueColumn};
use crate::db::{Database, DatabaseError, UnknownVariant};

const EXACT_FIELD_SCORE: f64 = 10.0;
const PARTIAL_CODE_SCORE: f64 = 5.0;
const PARTIAL_SUPPLIER_SCORE: f64 = 3.0;
const TEXT_OCCURRENCE_SCORE: f64 = 0.5;
const MAX_TEXT_SCORE: f64 = 3.0;

/// Case-insensitive equality constraints on identification fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldFilters {
    pub grade: Option<String>,
    pub heat_number: Option<String>,
    pub certificate_number: Option<String>,
    pub supplier: Option<String>,
}

impl FieldFilters {
    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }

    fn active(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("grade", &self.grade),
            ("heat_number", &self.heat_number),
            ("certificate_number", &self.certificate_number),
            ("supplier", &self.supplier),
        ]
        .into_iter()
        .filter_map(|(name, v)| v.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(|v| (name, v)))
    }

    fn accepts(&self, entry: &IndexedCertificate) -> bool {
        self.active().all(|(name, wanted)| {
            let actual = match name {
                "grade" => entry.grade.as_deref(),
                "heat_number" => entry.heat_number.as_deref(),
                "certificate_number" => entry.certificate_number.as_deref(),
                _ => entry.supplier.as_deref(),
            };
            actual.is_some_and(|a| a.to_lowercase() == wanted.to_lowercase())
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    pub filters: FieldFilters,
    /// Falls back to the configured maximum.
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub certificate_id: i64,
    pub material_id: i64,
    pub grade: Option<String>,
    pub heat_number: Option<String>,
    pub certificate_number: Option<String>,
    pub supplier: Option<String>,
    pub match_score: f64,
    pub matched_fields: Vec<&'static str>,
    pub preview_url: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionField {
    Grade,
    HeatNumber,
    Supplier,
    Certificate,
    All,
}

impl SuggestionField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grade => "grade",
            Self::HeatNumber => "heat_number",
            Self::Supplier => "supplier",
            Self::Certificate => "certificate",
            Self::All => "all",
        }
    }

    fn label_prefix(&self) -> &'static str {
        match self {
            Self::Grade => "Марка",
            Self::HeatNumber => "Плавка",
            Self::Supplier => "Поставщик",
            Self::Certificate => "Сертификат",
            Self::All => "",
        }
    }

    fn column(&self) -> Option<ValueColumn> {
        match self {
            Self::Grade => Some(ValueColumn::Grade),
            Self::HeatNumber => Some(ValueColumn::HeatNumber),
            Self::Supplier => Some(ValueColumn::Supplier),
            Self::Certificate => Some(ValueColumn::CertificateNumber),
            Self::All => None,
        }
    }

    fn expand(self) -> Vec<SuggestionField> {
        match self {
            Self::All => vec![Self::Grade, Self::HeatNumber, Self::Supplier, Self::Certificate],
            single => vec![single],
        }
    }
}

impl fmt::Display for SuggestionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionField {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grade" => Ok(Self::Grade),
            "heat_number" => Ok(Self::HeatNumber),
            "supplier" => Ok(Self::Supplier),
            "certificate" => Ok(Self::Certificate),
            "all" => Ok(Self::All),
            other => Err(UnknownVariant::new("suggestion field", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: String,
    pub label: String,
}

pub struct SearchService {
    db: Database,
    config: SearchConfig,
    media_url: String,
}

impl SearchService {
    pub fn new(db: Database, config: SearchConfig, media_url: impl Into<String>) -> Self {
        Self {
            db,
            config,
            media_url: media_url.into(),
        }
    }

    pub fn query(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, DatabaseError> {
        let text = query.text.trim();
        let needle = (text.chars().count() >= self.config.min_query_chars).then(|| text.to_lowercase());
        if needle.is_none() && query.filters.is_empty() {
            return Ok(Vec::new());
        }

        let entries = index_repo::completed_entries(&self.db, needle.as_deref())?;
        let limit = query.limit.unwrap_or(self.config.max_results);

        let mut results: Vec<SearchResult> = entries
            .into_iter()
            .filter(|entry| query.filters.accepts(entry))
            .map(|entry| {
                let (match_score, matched_fields) = match needle.as_deref() {
                    Some(needle) => (score(needle, &entry), matched_fields(needle, &entry)),
                    None => (0.0, query.filters.active().map(|(name, _)| name).collect()),
                };
                SearchResult {
                    preview_url: entry.thumbnail_path.as_deref().and_then(|p| self.preview_url(p)),
                    certificate_id: entry.certificate_id,
                    material_id: entry.material_id,
                    grade: entry.grade,
                    heat_number: entry.heat_number,
                    certificate_number: entry.certificate_number,
                    supplier: entry.supplier,
                    match_score,
                    matched_fields,
                    uploaded_at: entry.uploaded_at,
                }
            })
            .collect();

        // Entries arrive newest first; the stable sort keeps that order on ties.
        results.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
        results.truncate(limit);

        tracing::debug!(query = %text, results = results.len(), "search finished");
        Ok(results)
    }

    /// Known values of `field` starting with `partial`, case-insensitively.
    pub fn autocomplete(
        &self,
        partial: &str,
        field: SuggestionField,
    ) -> Result<Vec<Suggestion>, DatabaseError> {
        let prefix = partial.trim().to_lowercase();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }

        let mut suggestions = Vec::new();
        for field in field.expand() {
            let Some(column) = field.column() else { continue };
            let mut values: Vec<String> = index_repo::distinct_values(&self.db, column)?
                .into_iter()
                .filter(|v| v.to_lowercase().starts_with(&prefix))
                .collect();
            values.sort_by_key(|v| v.to_lowercase());
            values.dedup();

            suggestions.extend(values.into_iter().take(self.config.suggestions_per_field).map(
                |value| Suggestion {
                    kind: field.as_str(),
                    label: format!("{}: {}", field.label_prefix(), value),
                    value,
                },
            ));
        }

        suggestions.truncate(self.config.max_suggestions);
        Ok(suggestions)
    }

    fn preview_url(&self, thumbnail_path: &str) -> Option<String> {
        let file_name = Path::new(thumbnail_path).file_name()?.to_str()?;
        Some(format!("{}/{}", self.media_url.trim_end_matches('/'), file_name))
    }
}

fn lower(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::to_lowercase)
}

fn score(needle: &str, entry: &IndexedCertificate) -> f64 {
    let grade = lower(&entry.grade);
    let heat = lower(&entry.heat_number);
    let cert = lower(&entry.certificate_number);
    let supplier = lower(&entry.supplier);

    let mut score = 0.0;
    for exact in [&grade, &heat, &cert] {
        if exact.as_deref() == Some(needle) {
            score += EXACT_FIELD_SCORE;
        }
    }
    for partial in [&grade, &heat, &cert] {
        if partial.as_deref().is_some_and(|v| v.contains(needle)) {
            score += PARTIAL_CODE_SCORE;
        }
    }
    if supplier.as_deref().is_some_and(|v| v.contains(needle)) {
        score += PARTIAL_SUPPLIER_SCORE;
    }

    let occurrences = entry.extracted_text.to_lowercase().matches(needle).count();
    score + (occurrences as f64 * TEXT_OCCURRENCE_SCORE).min(MAX_TEXT_SCORE)
}

fn matched_fields(needle: &str, entry: &IndexedCertificate) -> Vec<&'static str> {
    [
        ("grade", &entry.grade),
        ("heat_number", &entry.heat_number),
        ("certificate_number", &entry.certificate_number),
        ("supplier", &entry.supplier),
    ]
    .into_iter()
    .filter(|(_, v)| v.as_deref().is_some_and(|v| v.to_lowercase().contains(needle)))
    .map(|(name, _)| name)
    .chain(
        entry
            .extracted_text
            .to_lowercase()
            .contains(needle)
            .then_some("text"),
    )
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::certificate_repo;
    use crate::db::preview_repo;
    use crate::extractor::CertificateFields;
    use crate::index::Indexer;
    use crate::pipeline::status::Transition;

    fn fields(grade: &str, heat: &str, cert: Option<&str>, supplier: Option<&str>) -> CertificateFields {
        CertificateFields {
            grade: Some(grade.to_string()),
            heat_number: Some(heat.to_string()),
            certificate_number: cert.map(String::from),
            supplier: supplier.map(String::from),
            ..Default::default()
        }
    }

    fn add_completed(db: &Database, text: &str, fields: &CertificateFields) -> i64 {
        let id = certificate_repo::insert(db, &certificate_repo::sample(1)).unwrap();
        Indexer::new(db.clone()).upsert(id, text, fields, Utc::now()).unwrap();
        index_repo::transition(db, id, Transition::Start, None, Utc::now()).unwrap();
        index_repo::transition(db, id, Transition::Complete, None, Utc::now()).unwrap();
        id
    }

    fn service(db: &Database) -> SearchService {
        SearchService::new(db.clone(), SearchConfig::default(), "/media/certificates/previews/")
    }

    #[test]
    fn test_exact_grade_outranks_text_mentions() {
        let db = Database::open_in_memory().unwrap();
        let mention = add_completed(
            &db,
            "Аналог 40X 40X 40X 40X 40X 40X 40X 40X",
            &fields("45", "777", None, None),
        );
        let exact = add_completed(&db, "Марка стали: 40X", &fields("40X", "12345", None, None));

        let results = service(&db).query(&SearchQuery::text("40x")).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].certificate_id, exact);
        assert_eq!(results[0].match_score, 10.0 + 5.0 + 0.5);
        assert_eq!(results[0].matched_fields, vec!["grade", "text"]);
        assert_eq!(results[1].certificate_id, mention);
        assert_eq!(results[1].match_score, 3.0);
    }

    #[test]
    fn test_short_query_without_filters_is_empty() {
        let db = Database::open_in_memory().unwrap();
        add_completed(&db, "Марка 40X", &fields("40X", "12345", None, None));
        assert!(service(&db).query(&SearchQuery::text("4")).unwrap().is_empty());
        assert!(service(&db).query(&SearchQuery::text("  ")).unwrap().is_empty());
    }

    #[test]
    fn test_filters_without_text() {
        let db = Database::open_in_memory().unwrap();
        add_completed(&db, "a", &fields("09Г2С", "111", None, Some("ПАО Северсталь")));
        let wanted = add_completed(&db, "b", &fields("40X", "222", None, Some("ПАО Северсталь")));

        let query = SearchQuery {
            filters: FieldFilters {
                grade: Some("40x".into()),
                supplier: Some("пао северсталь".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let results = service(&db).query(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].certificate_id, wanted);
        assert_eq!(results[0].matched_fields, vec!["grade", "supplier"]);
    }

    #[test]
    fn test_cyrillic_case_insensitive_supplier_match() {
        let db = Database::open_in_memory().unwrap();
        let id = add_completed(&db, "Поставщик", &fields("40X", "1", None, Some("ООО МеталлТорг")));
        let results = service(&db).query(&SearchQuery::text("металлторг")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].certificate_id, id);
        assert_eq!(results[0].match_score, 3.0);
        assert_eq!(results[0].matched_fields, vec!["supplier"]);
    }

    #[test]
    fn test_limit_and_preview_url() {
        let db = Database::open_in_memory().unwrap();
        let first = add_completed(&db, "Ст3", &fields("СТ3", "1", None, None));
        let second = add_completed(&db, "Ст3", &fields("СТ3", "2", None, None));
        preview_repo::mark_completed(&db, first, "/data/previews/certificate_1.png", 300, 400, Utc::now())
            .unwrap();

        let mut query = SearchQuery::text("ст3");
        query.limit = Some(1);
        let results = service(&db).query(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].certificate_id, second);
        assert_eq!(results[0].preview_url, None);

        query.limit = None;
        let results = service(&db).query(&query).unwrap();
        let with_preview = results.iter().find(|r| r.certificate_id == first).unwrap();
        assert_eq!(
            with_preview.preview_url.as_deref(),
            Some("/media/certificates/previews/certificate_1.png")
        );
    }

    #[test]
    fn test_autocomplete_prefix_and_limits() {
        let db = Database::open_in_memory().unwrap();
        for n in 0..12 {
            add_completed(&db, "x", &fields(&format!("40X{n:02}"), &format!("4{n}00"), None, None));
        }
        add_completed(&db, "x", &fields("09Г2С", "999", Some("С-40"), Some("Завод 40 лет")));

        let svc = service(&db);
        let grades = svc.autocomplete("40x", SuggestionField::Grade).unwrap();
        assert_eq!(grades.len(), 10);
        assert_eq!(grades[0].value, "40X00");
        assert_eq!(grades[0].label, "Марка: 40X00");
        assert_eq!(grades[0].kind, "grade");

        let all = svc.autocomplete("4", SuggestionField::All).unwrap();
        assert_eq!(all.len(), 20);
        assert!(all[..10].iter().all(|s| s.kind == "grade"));
        assert!(all[10..].iter().all(|s| s.kind == "heat_number"));

        let certs = svc.autocomplete("с-", SuggestionField::Certificate).unwrap();
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].label, "Сертификат: С-40");

        assert!(svc.autocomplete("", SuggestionField::All).unwrap().is_empty());
        assert!(svc.autocomplete("лет", SuggestionField::Supplier).unwrap().is_empty());
    }

    #[test]
    fn test_parse_suggestion_field() {
        assert_eq!("certificate".parse::<SuggestionField>().unwrap(), SuggestionField::Certificate);
        assert!("material".parse::<SuggestionField>().is_err());
    }
}
