//! Certificate documents and pipeline test doubles.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lopdf::{dictionary, Document, Object, Stream};

use metalqms::extractor::TextBackend;
use metalqms::preview::PageRenderer;
use metalqms::{ExtractionError, PreviewError};

/// A one-page PDF showing `line` in Courier. Only Latin-1 text survives
/// the round trip through the built-in font.
pub fn text_pdf(line: &str) -> Vec<u8> {
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
    doc.save_to(&mut bytes).expect("Failed to serialize PDF");
    bytes
}

/// Serves scripted text for known documents, keyed by their exact bytes.
/// Clones share the script and the call counter.
#[derive(Clone, Default)]
pub struct ScriptedTextBackend {
    texts: Arc<Mutex<HashMap<Vec<u8>, String>>>,
    pub calls: Arc<AtomicU32>,
}

impl ScriptedTextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A real PDF labelled `label` whose extracted text will be `text`.
    pub fn document(&self, label: &str, text: &str) -> Vec<u8> {
        let pdf = text_pdf(label);
        self.texts
            .lock()
            .expect("script lock")
            .insert(pdf.clone(), text.to_string());
        pdf
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextBackend for ScriptedTextBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn extract(&self, pdf: &[u8]) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .texts
            .lock()
            .expect("script lock")
            .get(pdf)
            .cloned()
            .unwrap_or_default())
    }
}

/// Times out on every call.
#[derive(Clone, Default)]
pub struct HangingBackend {
    pub calls: Arc<AtomicU32>,
}

impl HangingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextBackend for HangingBackend {
    fn name(&self) -> &'static str {
        "hanging"
    }

    fn extract(&self, _pdf: &[u8]) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ExtractionError::Timeout(Duration::from_secs(120)))
    }
}

/// Renders a blank US Letter page.
pub struct BlankRenderer;

impl PageRenderer for BlankRenderer {
    fn render_first_page(&self, _pdf: &[u8]) -> Result<Vec<u8>, PreviewError> {
        let page = image::RgbImage::from_pixel(612, 792, image::Rgb([255, 255, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(page)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("Failed to encode page");
        Ok(bytes)
    }
}

/// Always fails, as if the rasterizer were missing.
pub struct BrokenRenderer;

impl PageRenderer for BrokenRenderer {
    fn render_first_page(&self, _pdf: &[u8]) -> Result<Vec<u8>, PreviewError> {
        Err(PreviewError::Render("pdftoppm: command not found".into()))
    }
}
