use std::process::Command;
use std::time::Duration;

use crate::error::ExtractionError;
use crate::process::{run_with_deadline, CommandError, TempFile};

use super::TextBackend;

/// In-process text extraction with `lopdf`.
pub struct LopdfBackend;

impl TextBackend for LopdfBackend {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn extract(&self, pdf: &[u8]) -> Result<String, ExtractionError> {
        let _span = tracing::debug_span!("extractor.lopdf").entered();

        let doc = lopdf::Document::load_mem(pdf).map_err(|e| ExtractionError::Backend {
            backend: self.name().to_string(),
            message: format!("Failed to load PDF: {}", e),
        })?;

        let mut text = String::new();
        for (page_num, _) in doc.get_pages() {
            match doc.extract_text(&[page_num]) {
                Ok(page_text) => {
                    text.push_str(&page_text);
                    text.push('\n');
                }
                Err(e) => tracing::debug!(page = page_num, error = %e, "Skipping unreadable page"),
            }
        }

        Ok(text)
    }
}

/// Text extraction through poppler's `pdftotext`.
pub struct PdftotextBackend {
    timeout: Duration,
}

impl PdftotextBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl TextBackend for PdftotextBackend {
    fn name(&self) -> &'static str {
        "pdftotext"
    }

    fn extract(&self, pdf: &[u8]) -> Result<String, ExtractionError> {
        let _span = tracing::debug_span!("extractor.pdftotext").entered();

        let input = TempFile::with_bytes("extract", "pdf", pdf).map_err(|e| {
            ExtractionError::Backend {
                backend: self.name().to_string(),
                message: format!("Failed to write temp PDF: {}", e),
            }
        })?;

        let mut command = Command::new("pdftotext");
        command
            .args(["-layout", "-enc", "UTF-8"])
            .arg(input.path())
            .arg("-");

        match run_with_deadline(&mut command, self.timeout) {
            Ok(stdout) => Ok(String::from_utf8_lossy(&stdout).into_owned()),
            Err(CommandError::TimedOut { timeout, .. }) => Err(ExtractionError::Timeout(timeout)),
            Err(e) => Err(ExtractionError::Backend {
                backend: self.name().to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// One-page PDF with a single line of Courier text.
#[cfg(test)]
pub(crate) fn pdf_with_text(line: &str) -> Vec<u8> {
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", line);
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lopdf_reads_generated_pdf() {
        let pdf = pdf_with_text("Steel grade 40X heat 12345");
        let text = LopdfBackend.extract(&pdf).unwrap();
        assert!(text.contains("40X"), "unexpected text: {text:?}");
    }

    #[test]
    fn test_lopdf_rejects_garbage() {
        let err = LopdfBackend.extract(b"%PDF-1.5 truncated").unwrap_err();
        match err {
            ExtractionError::Backend { backend, message } => {
                assert_eq!(backend, "lopdf");
                assert!(message.contains("Failed to load PDF"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(LopdfBackend.name(), "lopdf");
        assert_eq!(PdftotextBackend::new(Duration::from_secs(1)).name(), "pdftotext");
    }
}
