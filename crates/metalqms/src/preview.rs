//! First-page thumbnails for certificate PDFs.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::debug;

use crate::config::PreviewConfig;
use crate::error::PreviewError;
use crate::process::{run_with_deadline, CommandError, TempFile};

/// Renders page one of a PDF into encoded image bytes.
pub trait PageRenderer: Send + Sync {
    fn render_first_page(&self, pdf: &[u8]) -> Result<Vec<u8>, PreviewError>;
}

/// Rendering through poppler's `pdftoppm`.
pub struct PdftoppmRenderer {
    dpi: u32,
    timeout: Duration,
}

impl PdftoppmRenderer {
    pub fn new(dpi: u32, timeout: Duration) -> Self {
        Self { dpi, timeout }
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render_first_page(&self, pdf: &[u8]) -> Result<Vec<u8>, PreviewError> {
        let _span = tracing::debug_span!("preview.pdftoppm").entered();

        let input = TempFile::with_bytes("preview", "pdf", pdf)
            .map_err(|e| PreviewError::Render(format!("Failed to write temp PDF: {}", e)))?;
        let output_root = input.path().with_extension("");
        // -singlefile makes pdftoppm write exactly `<root>.png`
        let output = TempFile::adopt(output_root.with_extension("png"));

        let mut command = Command::new("pdftoppm");
        command
            .args(["-png", "-singlefile", "-f", "1", "-l", "1", "-r"])
            .arg(self.dpi.to_string())
            .arg(input.path())
            .arg(&output_root);

        match run_with_deadline(&mut command, self.timeout) {
            Ok(_) => {}
            Err(CommandError::TimedOut { timeout, .. }) => return Err(PreviewError::Timeout(timeout)),
            Err(e) => return Err(PreviewError::Render(e.to_string())),
        }

        std::fs::read(output.path())
            .map_err(|e| PreviewError::Render(format!("Failed to read rendered page: {}", e)))
    }
}

/// An encoded PNG thumbnail and its dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Thumbnail {
    /// Writes the thumbnail as `certificate_<id>.png` under `dir`.
    pub fn save(&self, dir: &Path, certificate_id: i64) -> Result<PathBuf, PreviewError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| PreviewError::Write(format!("{}: {}", dir.display(), e)))?;
        let path = dir.join(thumbnail_file_name(certificate_id));
        std::fs::write(&path, &self.png)
            .map_err(|e| PreviewError::Write(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }
}

pub fn thumbnail_file_name(certificate_id: i64) -> String {
    format!("certificate_{}.png", certificate_id)
}

pub struct PreviewGenerator {
    renderer: Box<dyn PageRenderer>,
    max_width: u32,
    max_height: u32,
}

impl PreviewGenerator {
    pub fn new(renderer: Box<dyn PageRenderer>, max_width: u32, max_height: u32) -> Self {
        Self {
            renderer,
            max_width: max_width.max(1),
            max_height: max_height.max(1),
        }
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        Self::new(
            Box::new(PdftoppmRenderer::new(
                config.dpi,
                Duration::from_secs(config.timeout_secs),
            )),
            config.max_width,
            config.max_height,
        )
    }

    pub fn generate(&self, pdf: &[u8]) -> Result<Thumbnail, PreviewError> {
        let pages = page_count(pdf)?;
        if pages == 0 {
            return Err(PreviewError::NoPages);
        }

        let rendered = self.renderer.render_first_page(pdf)?;
        let image = image::load_from_memory(&rendered)
            .map_err(|e| PreviewError::Image(format!("Failed to decode rendered page: {}", e)))?;

        let thumbnail = fit_within(image, self.max_width, self.max_height);
        let (width, height) = thumbnail.dimensions();

        let mut png = Vec::new();
        thumbnail
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| PreviewError::Image(e.to_string()))?;

        debug!(pages, width, height, "thumbnail generated");
        Ok(Thumbnail { png, width, height })
    }
}

pub fn page_count(pdf: &[u8]) -> Result<usize, PreviewError> {
    let doc = lopdf::Document::load_mem(pdf)
        .map_err(|e| PreviewError::InvalidDocument(e.to_string()))?;
    Ok(doc.get_pages().len())
}

/// Scales down to fit `max_width × max_height`, keeping the aspect ratio.
/// Images that already fit are left alone.
fn fit_within(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_width && height <= max_height {
        return image;
    }
    image.resize(max_width, max_height, FilterType::Lanczos3)
}
