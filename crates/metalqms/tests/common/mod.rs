//! Shared helpers for metalqms integration tests.
//!
//! - `TestHarness`: temp storage, in-memory database, manual clock
//! - builders for certificate PDFs and test doubles

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
