use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::db::certificate_repo::{self, NewCertificate};
use crate::db::{index_repo, Database};
use crate::error::{MetalQmsError, StorageError};
use crate::extractor::PDF_MAGIC;
use crate::sanitize;

/// Subdirectory of the storage root that holds uploaded PDFs.
pub const CERTIFICATE_SUBDIRECTORY: &str = "certificates";

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// A certificate file that was written and registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCertificate {
    pub certificate_id: i64,
    /// Path relative to the storage root, as recorded on the certificate.
    pub relative_path: PathBuf,
    pub content_hash: String,
    pub file_size: u64,
    /// An earlier certificate with identical content, if any.
    pub duplicate_of: Option<i64>,
}

/// Writes uploaded certificate PDFs below the storage root and registers
/// them for processing.
pub struct CertificateStore {
    db: Database,
    root: PathBuf,
    max_upload_bytes: Option<u64>,
    clock: Arc<dyn Clock>,
}

impl CertificateStore {
    pub fn new<P: AsRef<Path>>(
        db: Database,
        root: P,
        max_upload_bytes: Option<u64>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            root: root.as_ref().to_path_buf(),
            max_upload_bytes,
            clock,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates and stores `content`, creates the certificate row and a
    /// `pending` index entry.
    pub fn register(
        &self,
        material_id: i64,
        original_filename: &str,
        content: &[u8],
        uploaded_by: Option<i64>,
    ) -> Result<StoredCertificate, MetalQmsError> {
        if !content.starts_with(PDF_MAGIC) {
            return Err(StorageError::NotPdf.into());
        }
        let file_size = content.len() as u64;
        if let Some(limit) = self.max_upload_bytes {
            if file_size > limit {
                return Err(StorageError::TooLarge { size: file_size, limit }.into());
            }
        }

        let content_hash = content_hash(content);
        let duplicate_of = certificate_repo::find_by_hash(&self.db, &content_hash)?.map(|c| c.id);
        if let Some(existing) = duplicate_of {
            info!("Upload matches the content of certificate {}", existing);
        }

        let directory = self.root.join(CERTIFICATE_SUBDIRECTORY);
        ensure_directory(&directory)?;
        let stored_path = store_exclusive(&directory, &safe_file_name(original_filename), content)?;
        let relative_path = stored_path
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| stored_path.clone());

        let now = self.clock.now();
        let certificate_id = certificate_repo::insert(
            &self.db,
            &NewCertificate {
                material_id,
                file_path: relative_path.to_string_lossy().into_owned(),
                original_filename: original_filename.to_string(),
                file_size: file_size as i64,
                content_hash: content_hash.clone(),
                uploaded_by,
                uploaded_at: now,
            },
        )?;
        index_repo::ensure_entry(&self.db, certificate_id, now)?;

        debug!(
            "Stored certificate {} as {}",
            certificate_id,
            sanitize::redact_path(&stored_path)
        );

        Ok(StoredCertificate {
            certificate_id,
            relative_path,
            content_hash,
            file_size,
            duplicate_of,
        })
    }

    /// Reads a file from disk and registers it under its own file name.
    pub fn ingest_file(
        &self,
        path: &Path,
        material_id: i64,
        uploaded_by: Option<i64>,
    ) -> Result<StoredCertificate, MetalQmsError> {
        let content = std::fs::read(path).map_err(|e| StorageError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("certificate.pdf");
        self.register(material_id, name, &content, uploaded_by)
    }
}

/// Lower-case hex SHA-256 of the content.
pub fn content_hash(content: &[u8]) -> String {
    Sha256::digest(content)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// The final path component of an uploaded name, with a `.pdf` extension.
fn safe_file_name(original: &str) -> String {
    let name = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches('.');
    let name = if name.is_empty() { "certificate" } else { name };
    if name.to_lowercase().ends_with(".pdf") {
        name.to_string()
    } else {
        format!("{}.pdf", name)
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Creates the file with `create_new`, falling back to `name_2.pdf`,
/// `name_3.pdf`, ... when the name is taken.
fn store_exclusive(directory: &Path, filename: &str, content: &[u8]) -> Result<PathBuf, StorageError> {
    let (base, ext) = match filename.rfind('.') {
        Some(dot) => (&filename[..dot], &filename[dot..]),
        None => (filename, ""),
    };

    for counter in 1..=MAX_NAME_ATTEMPTS {
        let candidate = if counter == 1 {
            filename.to_string()
        } else {
            format!("{}_{}{}", base, counter, ext)
        };
        let path = directory.join(&candidate);

        match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(content).map_err(|e| StorageError::WriteFile {
                    path: path.clone(),
                    source: e,
                })?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(StorageError::WriteFile { path, source: e }),
        }
    }

    Err(StorageError::NameExhausted(filename.to_string()))
}
