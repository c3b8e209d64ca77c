//! Member-type resolution.
//!
//! Walks `DW_AT_type` reference chains (typedef, qualifiers, pointers,
//! arrays, records) and derives the canonical `TypeInfo` the scraper stores
//! for a member: printed type name, byte size, flag bits, array element
//! count and, for aggregate types, the record DIE to recurse into.
//!
//! Pointers are opaque: the chain stops at a pointer with the pointer width
//! as the size, so record types referenced only through pointers are never
//! expanded. Chains are depth-bounded so malformed or cyclic debug info
//! terminates.

use gimli::{constants, DebuggingInformationEntry};

use super::{map_dwarf_error, DieRef, DwarfSource, OwnedReader};
use crate::error::{Result, ScrapeError};
use crate::scraper::TypeFlags;

const MAX_TYPE_CHAIN_DEPTH: usize = 32;

type Die<'a> = DebuggingInformationEntry<'a, 'a, OwnedReader>;

/// Canonical description of a member's type.
#[derive(Debug, Clone)]
pub struct TypeInfo
{
    /// Qualifier-and-pointer-decorated source name (e.g. `const int *`).
    pub type_name: String,
    /// Size in bytes; whole-array size for arrays, pointer width for
    /// pointers, zero for flexible arrays.
    pub byte_size: u64,
    pub flags: TypeFlags,
    /// Element count for arrays; `None` (or zero) denotes a flexible/VLA
    /// member.
    pub array_items: Option<u64>,
    /// The record DIE when the resolved type is a struct/union/class; the
    /// scraper recurses into it.
    pub record: Option<DieRef>,
}

/// Walks type-reference chains for one source.
pub struct TypeResolver<'a>
{
    source: &'a DwarfSource,
}

impl<'a> TypeResolver<'a>
{
    pub fn new(source: &'a DwarfSource) -> Self
    {
        TypeResolver { source }
    }

    /// Derive the `TypeInfo` for the type DIE a member references.
    pub fn type_info(&self, die: DieRef) -> Result<TypeInfo>
    {
        self.resolve(die, 0)
    }

    fn resolve(&self, die_ref: DieRef, depth: usize) -> Result<TypeInfo>
    {
        if depth >= MAX_TYPE_CHAIN_DEPTH {
            return Err(ScrapeError::InvalidRecord("type reference chain too deep".into()));
        }

        let source = self.source;
        let entry = source.entry(die_ref)?;
        match entry.tag() {
            constants::DW_TAG_base_type | constants::DW_TAG_enumeration_type => {
                let name = source.entry_name(die_ref.unit, &entry)?;
                let byte_size = source.udata_attr(&entry, constants::DW_AT_byte_size)?.unwrap_or(0);
                Ok(TypeInfo {
                    type_name: name.unwrap_or_else(|| "<unnamed>".to_string()),
                    byte_size,
                    flags: TypeFlags::empty(),
                    array_items: None,
                    record: None,
                })
            }
            constants::DW_TAG_typedef => {
                let name = source.entry_name(die_ref.unit, &entry)?;
                let mut info = match source.type_ref(die_ref.unit, &entry)? {
                    Some(inner) => self.resolve(inner, depth + 1)?,
                    None => void_info(),
                };
                info.flags |= TypeFlags::IS_TYPEDEF;
                // The typedef name wins unless the chain ended in a pointer.
                if !info.flags.contains(TypeFlags::IS_PTR) {
                    if let Some(name) = name {
                        info.type_name = name;
                    }
                }
                Ok(info)
            }
            constants::DW_TAG_const_type => self.qualified(die_ref, &entry, depth, TypeFlags::IS_CONST, "const"),
            constants::DW_TAG_volatile_type => self.qualified(die_ref, &entry, depth, TypeFlags::IS_VOLATILE, "volatile"),
            constants::DW_TAG_restrict_type => match source.type_ref(die_ref.unit, &entry)? {
                Some(inner) => self.resolve(inner, depth + 1),
                None => Ok(void_info()),
            },
            constants::DW_TAG_pointer_type | constants::DW_TAG_reference_type => self.pointer(die_ref, &entry, depth),
            constants::DW_TAG_array_type => self.array(die_ref, &entry, depth),
            constants::DW_TAG_structure_type => self.record(die_ref, &entry, TypeFlags::IS_STRUCT),
            constants::DW_TAG_union_type => self.record(die_ref, &entry, TypeFlags::IS_UNION),
            constants::DW_TAG_class_type => self.record(die_ref, &entry, TypeFlags::IS_CLASS),
            other => Err(ScrapeError::Unsupported(format!("member type DIE tag {other}"))),
        }
    }

    fn qualified(&self, die_ref: DieRef, entry: &Die<'_>, depth: usize, flag: TypeFlags, keyword: &str) -> Result<TypeInfo>
    {
        let mut info = match self.source.type_ref(die_ref.unit, entry)? {
            Some(inner) => self.resolve(inner, depth + 1)?,
            None => void_info(),
        };
        info.flags |= flag;
        info.type_name = format!("{keyword} {}", info.type_name);
        Ok(info)
    }

    /// Pointers stop the chain: the pointee is resolved for its printed name
    /// only and contributes neither flags nor a nested record.
    fn pointer(&self, die_ref: DieRef, entry: &Die<'_>, depth: usize) -> Result<TypeInfo>
    {
        let mut flags = TypeFlags::IS_PTR;
        let type_name = match self.source.type_ref(die_ref.unit, entry)? {
            None => "void *".to_string(),
            Some(inner) => {
                let inner_entry = self.source.entry(inner)?;
                if inner_entry.tag() == constants::DW_TAG_subroutine_type {
                    flags |= TypeFlags::IS_FNPTR;
                    self.subroutine_name(inner, &inner_entry, depth + 1)?
                } else {
                    format!("{} *", self.resolve(inner, depth + 1)?.type_name)
                }
            }
        };
        Ok(TypeInfo {
            type_name,
            byte_size: u64::from(self.source.pointer_size()),
            flags,
            array_items: None,
            record: None,
        })
    }

    fn subroutine_name(&self, die_ref: DieRef, entry: &Die<'_>, depth: usize) -> Result<String>
    {
        let ret = match self.source.type_ref(die_ref.unit, entry)? {
            Some(inner) => self.resolve(inner, depth + 1)?.type_name,
            None => "void".to_string(),
        };
        Ok(format!("{ret} (*)()"))
    }

    fn array(&self, die_ref: DieRef, entry: &Die<'_>, depth: usize) -> Result<TypeInfo>
    {
        let Some(element) = self.source.type_ref(die_ref.unit, entry)? else {
            return Err(ScrapeError::InvalidRecord("array type without an element type".into()));
        };
        let mut info = self.resolve(element, depth + 1)?;
        let count = self.array_items(die_ref)?;
        // The array DIE's own byte size wins; otherwise element size times
        // count, with flexible arrays collapsing to zero.
        let own_size = self.source.udata_attr(entry, constants::DW_AT_byte_size)?;
        info.byte_size = own_size.unwrap_or(info.byte_size * count.unwrap_or(0));
        info.type_name = match count {
            Some(count) => format!("{} [{count}]", info.type_name),
            None => format!("{} []", info.type_name),
        };
        info.flags |= TypeFlags::IS_ARRAY;
        info.array_items = count;
        Ok(info)
    }

    /// Element count from the array's `DW_TAG_subrange_type` children.
    ///
    /// Multi-dimensional arrays multiply their dimensions. A dimension with
    /// neither `DW_AT_count` nor a resolvable `upper - lower + 1` makes the
    /// whole member flexible.
    fn array_items(&self, die_ref: DieRef) -> Result<Option<u64>>
    {
        let unit = &self.source.units()[die_ref.unit];
        let mut tree = unit
            .entries_tree(Some(die_ref.offset))
            .map_err(|err| map_dwarf_error("building array subtree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating array root", err))?;
        let mut children = root.children();

        let mut items: Option<u64> = None;
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating array subranges", err))?
        {
            let entry = child.entry();
            if entry.tag() != constants::DW_TAG_subrange_type {
                continue;
            }
            let count = match self.source.udata_attr(entry, constants::DW_AT_count)? {
                Some(count) => Some(count),
                None => {
                    let lower = self.source.udata_attr(entry, constants::DW_AT_lower_bound)?.unwrap_or(0);
                    self.source
                        .udata_attr(entry, constants::DW_AT_upper_bound)?
                        .and_then(|upper| upper.checked_add(1))
                        .map(|upper| upper.saturating_sub(lower))
                }
            };
            match count {
                None => return Ok(None),
                Some(count) => items = Some(items.unwrap_or(1) * count),
            }
        }
        Ok(items)
    }

    fn record(&self, die_ref: DieRef, entry: &Die<'_>, flag: TypeFlags) -> Result<TypeInfo>
    {
        let name = self.source.entry_name(die_ref.unit, entry)?;
        let byte_size = self.source.udata_attr(entry, constants::DW_AT_byte_size)?.unwrap_or(0);
        Ok(TypeInfo {
            type_name: name.unwrap_or_else(|| "<anon>".to_string()),
            byte_size,
            flags: flag,
            array_items: None,
            record: Some(die_ref),
        })
    }
}

fn void_info() -> TypeInfo
{
    TypeInfo {
        type_name: "void".to_string(),
        byte_size: 0,
        flags: TypeFlags::empty(),
        array_items: None,
        record: None,
    }
}
