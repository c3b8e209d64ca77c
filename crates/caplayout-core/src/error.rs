//! # Error Types
//!
//! General error handling for the layout scraper.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! The error taxonomy mirrors the failure semantics of the scraping pipeline:
//!
//! 1. **Source errors**: Io, Object, Dwarf — the binary cannot be opened or
//!    its debug info cannot be decoded. These abort the scraper job.
//! 2. **Structural errors**: Unsupported, InvalidUnit, InvalidRecord — the
//!    DWARF is well-formed but uses a construct the scraper does not handle,
//!    or violates an invariant the pipeline depends on. These abort the job.
//! 3. **Storage errors**: Storage — constraint violations and other SQLite
//!    failures. Uniqueness conflicts are handled inline by the scraper and
//!    never surface here.
//!
//! Recoverable conditions (a record missing `DW_AT_byte_size`, an
//! unresolvable member type) are logged as warnings at the point of
//! discovery and never become a `ScrapeError`.

use thiserror::Error;

/// Main error type for scraper operations.
#[derive(Error, Debug)]
pub enum ScrapeError
{
    /// I/O error reading a binary from disk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The input file is not a parseable object file.
    #[error("failed to parse object file: {0}")]
    Object(#[from] object::Error),

    /// A DWARF decoding error, annotated with what the scraper was doing
    /// when the reader failed.
    #[error("DWARF error while {context}: {source}")]
    Dwarf
    {
        context: String,
        source: gimli::Error,
    },

    /// A debug section exists but its contents cannot be loaded.
    #[error("failed to load section {name}: {detail}")]
    Section
    {
        name: &'static str,
        detail: String,
    },

    /// The relational store rejected an operation.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The debug info uses a construct the scraper does not support
    /// (e.g. `DW_AT_specification`).
    #[error("unsupported DWARF construct: {0}")]
    Unsupported(String),

    /// A compilation unit is malformed (e.g. missing `DW_AT_name`).
    #[error("invalid compilation unit: {0}")]
    InvalidUnit(String),

    /// A record or member entry violates a pipeline invariant.
    #[error("invalid record state: {0}")]
    InvalidRecord(String),
}

/// Convenience type alias for `Result<T, ScrapeError>`.
pub type Result<T> = std::result::Result<T, ScrapeError>;
