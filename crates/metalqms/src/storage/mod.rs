pub mod filesystem;

pub use filesystem::{content_hash, CertificateStore, StoredCertificate, CERTIFICATE_SUBDIRECTORY};
