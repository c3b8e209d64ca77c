//! # Layout Scraping
//!
//! The scraper walks each compilation unit of a [`DwarfSource`], collects
//! record types (struct/union/class) and their members into an in-memory
//! graph, flattens nested layouts into fully-qualified member paths,
//! computes representable sub-object bounds for every path, and persists
//! the result through the shared [`StorageManager`].
//!
//! ## Module Structure
//!
//! - this module: row types, flag bits, per-job statistics and results
//! - **`layout`**: the [`StructLayoutScraper`] itself
//!
//! [`DwarfSource`]: crate::dwarf::DwarfSource
//! [`StorageManager`]: crate::storage::StorageManager

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

pub mod layout;

pub use layout::StructLayoutScraper;

bitflags! {
    /// Flag bits shared by `struct_type.flags` and `struct_member.flags`.
    ///
    /// Each column uses only its relevant subset; the bit positions are part
    /// of the database schema and must not change.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeFlags: u32 {
        const IS_STRUCT = 1 << 0;
        const IS_UNION = 1 << 1;
        const IS_CLASS = 1 << 2;
        const IS_ANONYMOUS = 1 << 3;
        const IS_ARRAY = 1 << 4;
        const IS_PTR = 1 << 5;
        const IS_FNPTR = 1 << 6;
        const IS_TYPEDEF = 1 << 7;
        const IS_CONST = 1 << 8;
        const IS_VOLATILE = 1 << 9;
    }
}

impl TypeFlags
{
    /// Bits marking a record type (struct/union/class).
    pub const RECORD_MASK: TypeFlags = TypeFlags::IS_STRUCT.union(TypeFlags::IS_UNION).union(TypeFlags::IS_CLASS);

    /// Whether any record bit is set.
    pub fn is_record(self) -> bool
    {
        self.intersects(Self::RECORD_MASK)
    }
}

/// One row of the `struct_type` table.
///
/// The tuple `(name, file, line)` identifies a record type; `size` is
/// carried but not part of the identity.
#[derive(Debug, Clone)]
pub struct StructTypeRow
{
    pub id: u64,
    pub file: String,
    pub line: u64,
    pub name: String,
    pub size: u64,
    pub flags: TypeFlags,
    pub has_imprecise: bool,
}

/// One row of the `struct_member` table.
#[derive(Debug, Clone)]
pub struct StructMemberRow
{
    pub id: u64,
    pub owner: u64,
    /// Id of the nested record type, when the member is an aggregate.
    pub nested: Option<u64>,
    pub name: String,
    pub type_name: String,
    pub line: u64,
    pub byte_size: u64,
    /// Set only for bit-fields.
    pub bit_size: Option<u64>,
    pub byte_offset: u64,
    pub bit_offset: Option<u64>,
    pub flags: TypeFlags,
    /// Array element count; `None` or zero marks a flexible/VLA member.
    pub array_items: Option<u64>,
}

/// One row of the `member_bounds` table: a flattened member path with its
/// representable sub-object bounds. The row id is assigned by the database.
#[derive(Debug, Clone)]
pub struct MemberBoundsRow
{
    /// Top-level record type containing this path.
    pub owner: u64,
    /// The immediate member the path terminates at.
    pub member: u64,
    /// Fully qualified path, `Type::field1::field2`.
    pub name: String,
    /// Cumulative byte offset from the start of the owner.
    pub offset: u64,
    pub base: u64,
    pub top: u64,
    pub is_imprecise: bool,
    pub required_precision: u32,
}

/// In-memory accumulator for one record type within a compilation unit.
#[derive(Debug)]
pub(crate) struct StructTypeEntry
{
    pub data: StructTypeRow,
    pub members: Vec<StructMemberRow>,
    pub flattened_layout: Vec<MemberBoundsRow>,
    /// Set when another compilation unit owns the flattened layout for this
    /// type (duplicate detected at flush time).
    pub skip_postprocess: bool,
}

/// Counters accumulated by a scraper job.
#[derive(Debug, Clone, Default)]
pub struct ScraperStats
{
    /// Compilation units processed.
    pub units: u64,
    /// Record types collected (before database dedup).
    pub struct_types: u64,
    /// Members collected.
    pub members: u64,
    /// Duplicate record definitions suppressed by the database.
    pub dup_structs: u64,
}

/// Outcome of one scraper job.
#[derive(Debug)]
pub struct ScraperResult
{
    pub source: PathBuf,
    /// Fatal errors; empty on success. Recovered warnings never appear here.
    pub errors: Vec<String>,
    pub stats: ScraperStats,
}

impl ScraperResult
{
    pub fn is_ok(&self) -> bool
    {
        self.errors.is_empty()
    }
}

// Process-wide id allocators. Rows get a stable in-memory identity before
// insertion; uniqueness across scraper threads is by construction.
static NEXT_STRUCT_TYPE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_STRUCT_MEMBER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_struct_type_id() -> u64
{
    NEXT_STRUCT_TYPE_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn next_struct_member_id() -> u64
{
    NEXT_STRUCT_MEMBER_ID.fetch_add(1, Ordering::Relaxed)
}
