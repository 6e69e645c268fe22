pub mod fields;
pub mod pdf;

use std::time::Duration;

use crate::config::schema::{ExtractionBackendKind, ExtractionConfig};
use crate::error::ExtractionError;

pub use fields::{CertificateFields, FieldParser, TestResults};
pub use pdf::{LopdfBackend, PdftotextBackend};

/// Leading bytes of every PDF file.
pub const PDF_MAGIC: &[u8] = b"%PDF";

/// A source of plain text for a PDF document.
pub trait TextBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, pdf: &[u8]) -> Result<String, ExtractionError>;
}

/// Text chosen from the backend chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub backend: &'static str,
}

impl ExtractedText {
    /// Number of non-whitespace characters.
    pub fn significant_chars(&self) -> usize {
        significant_chars(&self.text)
    }
}

/// Ordered text backends plus the field parser.
pub struct Extractor {
    backends: Vec<Box<dyn TextBackend>>,
    min_text_chars: usize,
    parser: FieldParser,
}

impl Extractor {
    pub fn new(backends: Vec<Box<dyn TextBackend>>, min_text_chars: usize) -> Self {
        Self {
            backends,
            min_text_chars,
            parser: FieldParser::new(),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let backends = config
            .backends
            .iter()
            .map(|kind| -> Box<dyn TextBackend> {
                match kind {
                    ExtractionBackendKind::Lopdf => Box::new(LopdfBackend),
                    ExtractionBackendKind::Pdftotext => Box::new(PdftotextBackend::new(timeout)),
                }
            })
            .collect();
        Self::new(backends, config.min_text_chars)
    }

    /// Runs the backends in order. The first one producing at least
    /// `min_text_chars` significant characters wins; otherwise the longest
    /// successful output is returned, which may be empty.
    pub fn extract_text(&self, pdf: &[u8]) -> Result<ExtractedText, ExtractionError> {
        if !pdf.starts_with(PDF_MAGIC) {
            return Err(ExtractionError::NotPdf);
        }

        let mut best: Option<ExtractedText> = None;
        let mut failures = Vec::new();

        for backend in &self.backends {
            match backend.extract(pdf) {
                Ok(text) => {
                    let candidate = ExtractedText {
                        text,
                        backend: backend.name(),
                    };
                    let chars = candidate.significant_chars();
                    tracing::debug!(backend = backend.name(), chars, "Backend produced text");

                    if chars >= self.min_text_chars {
                        return Ok(candidate);
                    }
                    let better = best
                        .as_ref()
                        .map_or(true, |b| chars > b.significant_chars());
                    if better {
                        best = Some(candidate);
                    }
                }
                Err(e) => {
                    tracing::warn!(backend = backend.name(), error = %e, "Extraction backend failed");
                    failures.push(e);
                }
            }
        }

        if let Some(best) = best {
            return Ok(best);
        }

        // A timeout is only reported as such when nothing else went wrong.
        if let [ExtractionError::Timeout(after)] = failures.as_slice() {
            return Err(ExtractionError::Timeout(*after));
        }

        let summary = if failures.is_empty() {
            "no extraction backends configured".to_string()
        } else {
            failures
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        };
        Err(ExtractionError::AllBackendsFailed(summary))
    }

    pub fn parse_fields(&self, text: &str) -> CertificateFields {
        self.parser.parse(text)
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }
}

fn significant_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
