//! # DWARF Access
//!
//! Wraps a binary file and exposes the DWARF structures the scraper
//! consumes: compilation units, DIE trees with attribute lookup, and
//! type-reference resolution across unit boundaries.
//!
//! ## Module Structure
//!
//! - **`source`**: binary parsing, architecture detection, section loading,
//!   unit materialization
//! - **`resolver`**: member-type resolution (`TypeInfo`) over `DW_AT_type`
//!   chains
//!
//! All section data is loaded into owned `Arc`-backed readers so a
//! `DwarfSource` can be moved into a worker thread without borrowing the
//! mapped file.

use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, UnitOffset};

use crate::error::ScrapeError;

pub mod resolver;
pub mod source;

// Shared type aliases
pub(crate) type OwnedReader = EndianArcSlice<RunTimeEndian>;
pub(crate) type OwnedDwarf = Dwarf<OwnedReader>;

// Re-exports
pub use resolver::{TypeInfo, TypeResolver};
pub use source::DwarfSource;

/// Reference to a DIE: the owning unit's index plus the DIE offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DieRef
{
    pub unit: usize,
    pub offset: UnitOffset<usize>,
}

/// Wrap a gimli error with a description of the operation that failed.
pub(crate) fn map_dwarf_error(context: &str, source: gimli::Error) -> ScrapeError
{
    ScrapeError::Dwarf {
        context: context.to_string(),
        source,
    }
}
