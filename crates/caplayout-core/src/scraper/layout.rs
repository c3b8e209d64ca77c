//! The structure-layout scraper.
//!
//! One scraper owns one [`DwarfSource`] and runs single-threaded inside a
//! worker. Per compilation unit it accumulates record types keyed by
//! `(name, file, line)`, then flushes in two transactions: types and
//! members first (resolving duplicates against the database), then the
//! flattened member bounds and sub-object alias pairs. All per-unit state
//! is cleared before advancing, so the working set is bounded by the
//! largest unit.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use gimli::{constants, UnitOffset};
use rusqlite::{params, Transaction};

use super::{
    next_struct_member_id, next_struct_type_id, MemberBoundsRow, ScraperStats, StructMemberRow, StructTypeEntry,
    StructTypeRow, TypeFlags,
};
use crate::capability::CapabilityEncoder;
use crate::dwarf::{map_dwarf_error, DieRef, DwarfSource, TypeResolver};
use crate::error::{Result, ScrapeError};
use crate::scheduler::StopToken;
use crate::storage::StorageManager;

/// Containment deeper than this means the debug info is malformed.
const MAX_FLATTEN_DEPTH: usize = 128;

const SCHEMA: &str = "
-- Structures, unions and classes. Two records are the same type when they
-- share the name and the declaration coordinates.
CREATE TABLE IF NOT EXISTS struct_type (
  id INTEGER NOT NULL PRIMARY KEY,
  file TEXT NOT NULL,
  line INTEGER NOT NULL,
  name TEXT,
  -- size of the structure including any padding
  size INTEGER NOT NULL,
  flags INTEGER DEFAULT 0 NOT NULL,
  -- set when at least one field is not precisely representable by a
  -- sub-object capability
  has_imprecise BOOLEAN DEFAULT 0,
  UNIQUE(name, file, line));

-- One row per member; aggregate members also reference the nested record.
CREATE TABLE IF NOT EXISTS struct_member (
  id INTEGER NOT NULL PRIMARY KEY,
  owner INTEGER NOT NULL,
  nested INTEGER,
  name TEXT NOT NULL,
  type_name TEXT NOT NULL,
  line INTEGER NOT NULL,
  size INTEGER NOT NULL,
  -- bit remainder of the size, only valid for bit-fields
  bit_size INTEGER,
  offset INTEGER NOT NULL,
  -- bit remainder of the offset, only valid for bit-fields
  bit_offset INTEGER,
  flags INTEGER DEFAULT 0 NOT NULL,
  array_items INTEGER,
  FOREIGN KEY (owner) REFERENCES struct_type (id),
  FOREIGN KEY (nested) REFERENCES struct_type (id),
  UNIQUE(owner, name, offset),
  CHECK(owner != nested));

-- Representable bounds for every flattened member path.
CREATE TABLE IF NOT EXISTS member_bounds (
  id INTEGER NOT NULL PRIMARY KEY,
  owner INTEGER NOT NULL,
  name TEXT NOT NULL,
  member INTEGER NOT NULL,
  -- cumulative offset from the start of the owner
  offset INTEGER NOT NULL,
  base INTEGER NOT NULL,
  top INTEGER NOT NULL,
  is_imprecise BOOL DEFAULT 0,
  -- precision bits required to exactly represent the capability
  precision INTEGER,
  FOREIGN KEY (owner) REFERENCES struct_type (id),
  FOREIGN KEY (member) REFERENCES struct_member (id));

-- Pairs of flattened members whose sub-object capabilities alias.
CREATE TABLE IF NOT EXISTS subobject_alias (
  subobj INTEGER NOT NULL,
  alias INTEGER NOT NULL,
  PRIMARY KEY (subobj, alias),
  FOREIGN KEY (subobj) REFERENCES member_bounds (id),
  FOREIGN KEY (alias) REFERENCES member_bounds (id));

-- Combinations of member_bounds to check for sub-object aliasing. A pair
-- aliases when the representable interval of one overlaps the extent of the
-- other and neither flattened name contains the other.
CREATE VIEW IF NOT EXISTS alias_bounds AS
WITH impl (owner, id, alias_id, name, alias_name, base, check_base, top, check_top) AS (
  SELECT
    mb.owner,
    mb.id,
    alb.id AS alias_id,
    mb.name,
    alb.name AS alias_name,
    mb.base,
    alb.offset AS check_base,
    mb.top,
    (alb.offset + alm.size + IIF(alm.bit_size, 1, 0)) AS check_top
  FROM member_bounds alb
    JOIN struct_member alm ON alb.member = alm.id
    JOIN member_bounds mb ON mb.owner = alb.owner AND mb.id != alb.id)
SELECT owner, id AS subobj_id, alias_id
FROM impl
WHERE
  MAX(check_base, base) < MIN(check_top, top) AND
  NOT (name LIKE alias_name || '%') AND
  NOT (alias_name LIKE name || '%');
";

const INSERT_STRUCT_TYPE: &str = "INSERT INTO struct_type (id, file, line, name, size, flags) \
                                  VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT DO NOTHING RETURNING id";

const SELECT_STRUCT_TYPE: &str = "SELECT id FROM struct_type WHERE name = ?1 AND file = ?2 AND line = ?3";

const INSERT_STRUCT_MEMBER: &str = "INSERT INTO struct_member \
                                    (id, owner, nested, name, type_name, line, size, bit_size, offset, bit_offset, \
                                    flags, array_items) \
                                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
                                    ON CONFLICT DO NOTHING RETURNING id";

const SELECT_STRUCT_MEMBER: &str = "SELECT id FROM struct_member WHERE owner = ?1 AND name = ?2 AND offset = ?3";

const INSERT_MEMBER_BOUNDS: &str = "INSERT INTO member_bounds \
                                    (owner, member, offset, name, base, top, is_imprecise, precision) \
                                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const MARK_TYPE_IMPRECISE: &str = "UPDATE struct_type SET has_imprecise = 1 WHERE id = ?1";

const INSERT_SUBOBJECT_ALIASES: &str = "INSERT INTO subobject_alias (subobj, alias) \
                                        SELECT ab.subobj_id, ab.alias_id FROM alias_bounds ab WHERE ab.owner = ?1";

/// Key identifying a record type: `(name, file, line)`.
type StructKey = (String, String, u64);

/// Scrapes record layouts and sub-object bounds from one DWARF source.
pub struct StructLayoutScraper
{
    storage: Arc<StorageManager>,
    source: DwarfSource,
    encoder: CapabilityEncoder,
    strip_prefix: Option<PathBuf>,
    struct_type_map: HashMap<StructKey, StructTypeEntry>,
    /// Record names by local id, for anonymous-type member naming.
    name_by_id: HashMap<u64, String>,
    /// Records currently being visited, to reject self-containment.
    visiting: HashSet<DieRef>,
    stats: ScraperStats,
}

impl StructLayoutScraper
{
    pub fn new(storage: Arc<StorageManager>, source: DwarfSource, strip_prefix: Option<PathBuf>) -> Self
    {
        let encoder = source.encoder();
        StructLayoutScraper {
            storage,
            source,
            encoder,
            strip_prefix,
            struct_type_map: HashMap::new(),
            name_by_id: HashMap::new(),
            visiting: HashSet::new(),
            stats: ScraperStats::default(),
        }
    }

    pub fn source(&self) -> &DwarfSource
    {
        &self.source
    }

    pub fn stats(&self) -> &ScraperStats
    {
        &self.stats
    }

    /// Create the output schema. Idempotent; every scraper calls this before
    /// its main loop.
    pub fn init_schema(&self) -> Result<()>
    {
        tracing::debug!("initialize struct layout schema");
        self.storage.execute_batch(SCHEMA)?;

        // Projections used by downstream VLA analyses. A member is a VLA
        // when it is an array with no (or zero) element count.
        let is_array = TypeFlags::IS_ARRAY.bits();
        self.storage.execute_batch(&format!(
            "CREATE VIEW IF NOT EXISTS layout_member AS \
             SELECT mb.*, (sm.flags & {is_array} != 0 AND IFNULL(sm.array_items, 0) = 0) AS is_vla \
             FROM member_bounds mb JOIN struct_member sm ON mb.member = sm.id; \
             CREATE VIEW IF NOT EXISTS type_layout AS \
             SELECT st.*, EXISTS ( \
               SELECT 1 FROM member_bounds mb JOIN struct_member sm ON mb.member = sm.id \
               WHERE mb.owner = st.id AND sm.flags & {is_array} != 0 AND IFNULL(sm.array_items, 0) = 0) AS has_vla \
             FROM struct_type st;"
        ))?;
        Ok(())
    }

    /// Scrape every compilation unit, consulting the stop token at unit
    /// boundaries. A cancelled job finalizes nothing beyond the units it
    /// already committed.
    pub fn run(&mut self, token: &StopToken) -> Result<()>
    {
        for unit_index in 0..self.source.unit_count() {
            if !self.source.is_compile_unit(unit_index) {
                continue;
            }
            if token.is_cancelled() {
                tracing::info!(source = %self.source.path().display(), "scrape cancelled at unit boundary");
                break;
            }
            self.begin_unit(unit_index)?;
            self.walk_unit(unit_index)?;
            self.end_unit()?;
        }
        Ok(())
    }

    fn begin_unit(&mut self, unit_index: usize) -> Result<()>
    {
        let Some(name) = self.source.unit_name(unit_index)? else {
            tracing::error!("invalid compilation unit, missing DW_AT_name");
            return Err(ScrapeError::InvalidUnit("missing DW_AT_name".into()));
        };
        tracing::debug!(unit = %name, "enter compilation unit");
        self.stats.units += 1;
        Ok(())
    }

    /// Depth-first sweep over the unit collecting record DIEs to visit.
    fn walk_unit(&mut self, unit_index: usize) -> Result<()>
    {
        let mut targets = Vec::new();
        {
            let unit = &self.source.units()[unit_index];
            let mut cursor = unit.entries();
            while let Some((_delta, entry)) = cursor
                .next_dfs()
                .map_err(|err| map_dwarf_error("traversing DIE tree", err))?
            {
                let kind = match entry.tag() {
                    constants::DW_TAG_structure_type => TypeFlags::IS_STRUCT,
                    constants::DW_TAG_union_type => TypeFlags::IS_UNION,
                    constants::DW_TAG_class_type => TypeFlags::IS_CLASS,
                    // typedefs are reached transitively through member types
                    _ => continue,
                };
                targets.push((entry.offset(), kind));
            }
        }

        for (offset, kind) in targets {
            self.visit_common(
                DieRef {
                    unit: unit_index,
                    offset,
                },
                kind,
            )?;
        }
        Ok(())
    }

    /// Visit a record DIE, collecting it and its members into the unit map.
    ///
    /// Returns the record's local id, or `None` when the DIE is skipped
    /// (declaration, or missing a required attribute). Revisiting a known
    /// `(name, file, line)` key returns the existing id without touching
    /// the collected members.
    fn visit_common(&mut self, die: DieRef, kind: TypeFlags) -> Result<Option<u64>>
    {
        if !self.visiting.insert(die) {
            return Err(ScrapeError::InvalidRecord(format!(
                "record at {:#x} contains itself",
                die.offset.0
            )));
        }
        let result = self.visit_record(die, kind);
        self.visiting.remove(&die);
        result
    }

    fn visit_record(&mut self, die: DieRef, kind: TypeFlags) -> Result<Option<u64>>
    {
        struct Candidate
        {
            size: u64,
            file: String,
            line: u64,
            name: Option<String>,
            members: Vec<UnitOffset<usize>>,
        }

        let candidate = {
            let entry = self.source.entry(die)?;
            // Declarations are skipped, their definition appears elsewhere.
            if self.source.has_attr(&entry, constants::DW_AT_declaration)? {
                return Ok(None);
            }
            if self.source.has_attr(&entry, constants::DW_AT_specification)? {
                tracing::error!("DW_AT_specification unsupported");
                return Err(ScrapeError::Unsupported("DW_AT_specification".into()));
            }
            let Some(size) = self.source.udata_attr(&entry, constants::DW_AT_byte_size)? else {
                tracing::warn!(offset = format_args!("{:#x}", die.offset.0), "missing record size for DIE");
                return Ok(None);
            };
            let file = match self.source.decl_file(die.unit, &entry)? {
                Some(path) => self.strip(path),
                None => String::new(),
            };
            Candidate {
                size,
                file,
                line: self.source.decl_line(&entry)?,
                name: self.source.entry_name(die.unit, &entry)?,
                members: self.member_children(die)?,
            }
        };

        let mut flags = kind;
        let name = match candidate.name {
            Some(name) => name,
            None => {
                flags |= TypeFlags::IS_ANONYMOUS;
                format!("<anon>@{}:{}:{:#x}", candidate.file, candidate.line, die.offset.0)
            }
        };

        let key: StructKey = (name, candidate.file, candidate.line);
        if let Some(existing) = self.struct_type_map.get(&key) {
            return Ok(Some(existing.data.id));
        }

        let id = next_struct_type_id();
        let row = StructTypeRow {
            id,
            file: key.1.clone(),
            line: key.2,
            name: key.0.clone(),
            size: candidate.size,
            flags,
            has_imprecise: false,
        };

        let mut members = Vec::with_capacity(candidate.members.len());
        for (index, &offset) in candidate.members.iter().enumerate() {
            let member = self.visit_member(DieRef { unit: die.unit, offset }, &row, index)?;
            if let Some(member) = member {
                members.push(member);
            }
        }

        self.name_by_id.insert(id, key.0.clone());
        self.struct_type_map.insert(
            key,
            StructTypeEntry {
                data: row,
                members,
                flattened_layout: Vec::new(),
                skip_postprocess: false,
            },
        );
        self.stats.struct_types += 1;
        Ok(Some(id))
    }

    fn member_children(&self, die: DieRef) -> Result<Vec<UnitOffset<usize>>>
    {
        let unit = &self.source.units()[die.unit];
        let mut tree = unit
            .entries_tree(Some(die.offset))
            .map_err(|err| map_dwarf_error("building record subtree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating record root", err))?;
        let mut children = root.children();

        let mut offsets = Vec::new();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating record children", err))?
        {
            if child.entry().tag() == constants::DW_TAG_member {
                offsets.push(child.entry().offset());
            }
        }
        Ok(offsets)
    }

    /// Build the member row for one `DW_TAG_member` DIE.
    ///
    /// Returns `None` when the member's type cannot be resolved; that is a
    /// recoverable condition and only the member is dropped.
    fn visit_member(&mut self, die: DieRef, owner: &StructTypeRow, member_index: usize) -> Result<Option<StructMemberRow>>
    {
        struct MemberAttrs
        {
            line: u64,
            name: Option<String>,
            byte_size: Option<u64>,
            bit_size: Option<u64>,
            location: Option<u64>,
            data_bit_offset: Option<u64>,
            legacy_bit_offset: Option<u64>,
            type_ref: Option<DieRef>,
        }

        let attrs = {
            let entry = self.source.entry(die)?;
            MemberAttrs {
                line: self.source.decl_line(&entry)?,
                name: self.source.entry_name(die.unit, &entry)?,
                byte_size: self.source.udata_attr(&entry, constants::DW_AT_byte_size)?,
                bit_size: self.source.udata_attr(&entry, constants::DW_AT_bit_size)?,
                location: self.source.udata_attr(&entry, constants::DW_AT_data_member_location)?,
                data_bit_offset: self.source.udata_attr(&entry, constants::DW_AT_data_bit_offset)?,
                legacy_bit_offset: self.source.udata_attr(&entry, constants::DW_AT_bit_offset)?,
                type_ref: self.source.type_ref(die.unit, &entry)?,
            }
        };

        let Some(type_ref) = attrs.type_ref else {
            tracing::warn!(owner = %owner.name, "member without a resolvable DW_AT_type, skipping");
            return Ok(None);
        };
        let info = match TypeResolver::new(&self.source).type_info(type_ref) {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!(owner = %owner.name, error = %err, "cannot resolve member type, skipping");
                return Ok(None);
            }
        };

        let mut member = StructMemberRow {
            id: next_struct_member_id(),
            owner: owner.id,
            nested: None,
            name: String::new(),
            type_name: info.type_name,
            line: attrs.line,
            // the member DIE size overrides the type size, for
            // bit-field-containing storage units
            byte_size: attrs.byte_size.unwrap_or(info.byte_size),
            bit_size: attrs.bit_size,
            byte_offset: 0,
            bit_offset: None,
            flags: info.flags,
            array_items: info.array_items,
        };

        // Aggregate members reference the nested record; visit it so the
        // type exists in the unit map.
        if let Some(record) = info.record {
            let kind = if info.flags.contains(TypeFlags::IS_UNION) {
                TypeFlags::IS_UNION
            } else if info.flags.contains(TypeFlags::IS_CLASS) {
                TypeFlags::IS_CLASS
            } else {
                TypeFlags::IS_STRUCT
            };
            member.nested = self.visit_common(record, kind)?;
            match member.nested {
                Some(nested) => {
                    if member.type_name == "<anon>" {
                        if let Some(name) = self.name_by_id.get(&nested) {
                            member.type_name = name.clone();
                        }
                    }
                }
                None => {
                    tracing::warn!(owner = %owner.name, "nested record was skipped, dropping the reference");
                }
            }
        }

        // Bit position, taking bit-fields into account. DWARF 5 expresses
        // the position as data_member_location plus data_bit_offset; DWARF 3/4
        // bit-fields carry the legacy DW_AT_bit_offset, counted from the
        // storage unit's most significant bit and folded with endianness.
        let location = attrs.location.unwrap_or(0);
        let mut bit_pos = attrs.data_bit_offset.map(|bits| location * 8 + bits);
        if let Some(legacy) = attrs.legacy_bit_offset {
            let pos = bit_pos.unwrap_or(location * 8);
            bit_pos = Some(if self.source.is_little_endian() {
                pos + (member.byte_size * 8).saturating_sub(legacy + member.bit_size.unwrap_or(0))
            } else {
                pos + legacy
            });
        }
        match bit_pos {
            Some(pos) => {
                member.byte_offset = pos / 8;
                member.bit_offset = Some(pos % 8);
            }
            None => member.byte_offset = location,
        }

        member.name = match attrs.name {
            Some(name) => name,
            None => {
                if owner.flags.contains(TypeFlags::IS_UNION) {
                    format!("<anon>@{member_index}")
                } else if let Some(bit) = member.bit_offset {
                    format!("<anon>@{}:{bit}", member.byte_offset)
                } else {
                    format!("<anon>@{}", member.byte_offset)
                }
            }
        };

        self.stats.members += 1;
        Ok(Some(member))
    }

    /// Two-phase flush of the unit map, then clear it.
    fn end_unit(&mut self) -> Result<()>
    {
        // Duplicate structures already in the database keep their original
        // id; local references are rewritten through this map.
        let mut remap_id: HashMap<u64, u64> = HashMap::new();

        // Transaction 1: types first so ids are stable, then members.
        {
            let entries = &mut self.struct_type_map;
            let stats = &mut self.stats;
            self.storage.transaction(|tx| {
                for entry in entries.values_mut() {
                    tracing::debug!(name = %entry.data.name, "try insert struct");
                    let local_id = entry.data.id;
                    let new_entry = insert_struct_type(tx, &mut entry.data)?;
                    if !new_entry {
                        remap_id.insert(local_id, entry.data.id);
                        // another compilation unit owns the flattened layout
                        entry.skip_postprocess = true;
                        stats.dup_structs += 1;
                    }
                }

                for entry in entries.values_mut() {
                    let owner = entry.data.id;
                    for member in &mut entry.members {
                        member.owner = owner;
                        if let Some(nested) = member.nested {
                            if let Some(&mapped) = remap_id.get(&nested) {
                                if mapped == owner {
                                    return Err(ScrapeError::InvalidRecord(format!(
                                        "member {} of {} nests its own owner",
                                        member.name, entry.data.name
                                    )));
                                }
                                member.nested = Some(mapped);
                            }
                        }
                        insert_struct_member(tx, member)?;
                    }
                }
                Ok(())
            })?;
        }

        // Flattened layouts for the types this unit is responsible for.
        // No database I/O happens here.
        {
            let by_id: HashMap<u64, &StructTypeEntry> =
                self.struct_type_map.values().map(|entry| (entry.data.id, entry)).collect();
            let mut layouts: HashMap<u64, Vec<MemberBoundsRow>> = HashMap::new();
            for entry in self.struct_type_map.values() {
                if entry.skip_postprocess {
                    continue;
                }
                let mut rows = Vec::new();
                self.flatten_into(entry.data.id, entry, 0, &entry.data.name, &by_id, &mut rows, 0)?;
                layouts.insert(entry.data.id, rows);
            }
            drop(by_id);
            for entry in self.struct_type_map.values_mut() {
                if let Some(rows) = layouts.remove(&entry.data.id) {
                    entry.data.has_imprecise = rows.iter().any(|row| row.is_imprecise);
                    entry.flattened_layout = rows;
                }
            }
        }

        // Transaction 2: bounds, imprecision marks, alias discovery.
        {
            let entries = &self.struct_type_map;
            self.storage.transaction(|tx| {
                for entry in entries.values() {
                    if entry.skip_postprocess {
                        continue;
                    }
                    for row in &entry.flattened_layout {
                        insert_member_bounds(tx, row)?;
                    }
                    if entry.data.has_imprecise {
                        let mut stmt = tx.prepare_cached(MARK_TYPE_IMPRECISE)?;
                        stmt.execute(params![entry.data.id as i64])?;
                    }
                    let mut stmt = tx.prepare_cached(INSERT_SUBOBJECT_ALIASES)?;
                    stmt.execute(params![entry.data.id as i64])?;
                }
                Ok(())
            })?;
        }

        self.struct_type_map.clear();
        self.name_by_id.clear();
        Ok(())
    }

    /// Emit the flattened layout of `curr` into `out`, rooted at the record
    /// identified by `owner`.
    ///
    /// Nested aggregates are expanded before the member's own row, with
    /// bounds always computed at the cumulative offset from the owner's
    /// start.
    #[allow(clippy::too_many_arguments)]
    fn flatten_into(
        &self,
        owner: u64,
        curr: &StructTypeEntry,
        offset: u64,
        prefix: &str,
        by_id: &HashMap<u64, &StructTypeEntry>,
        out: &mut Vec<MemberBoundsRow>,
        depth: usize,
    ) -> Result<()>
    {
        if depth > MAX_FLATTEN_DEPTH {
            return Err(ScrapeError::InvalidRecord(format!(
                "containment of {} exceeds depth {MAX_FLATTEN_DEPTH}",
                curr.data.name
            )));
        }

        for member in &curr.members {
            let member_offset = offset + member.byte_offset;
            let required_length = member.byte_size + u64::from(member.bit_size.is_some());
            let (base, length) = self.encoder.representable_range(member_offset, required_length);
            let name = format!("{prefix}::{}", member.name);

            if let Some(nested) = member.nested {
                let Some(nested_entry) = by_id.get(&nested) else {
                    return Err(ScrapeError::InvalidRecord(format!(
                        "nested record {nested} of {} is not in the compilation unit",
                        curr.data.name
                    )));
                };
                self.flatten_into(owner, nested_entry, member_offset, &name, by_id, out, depth + 1)?;
            }

            let row = MemberBoundsRow {
                owner,
                member: member.id,
                name,
                offset: member_offset,
                base,
                top: base + length,
                is_imprecise: member_offset != base || length != required_length,
                required_precision: self.encoder.required_precision(member_offset, required_length),
            };
            tracing::debug!(
                name = %row.name,
                base = format_args!("{:#x}", row.base),
                offset = format_args!("{:#x}", row.offset),
                top = format_args!("{:#x}", row.top),
                precision = row.required_precision,
                "record member bounds"
            );
            out.push(row);
        }
        Ok(())
    }

    /// Strip the configured prefix from a declaration path. Paths outside
    /// the prefix are recorded unchanged.
    fn strip(&self, path: PathBuf) -> String
    {
        let stripped = match &self.strip_prefix {
            Some(prefix) => match path.strip_prefix(prefix) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => path,
            },
            None => path,
        };
        stripped.to_string_lossy().into_owned()
    }
}

/// Insert a type row; on a uniqueness conflict fetch the existing id.
/// Returns whether the row was newly inserted and leaves the database id in
/// `row.id`.
fn insert_struct_type(tx: &Transaction<'_>, row: &mut StructTypeRow) -> Result<bool>
{
    let inserted = {
        let mut stmt = tx.prepare_cached(INSERT_STRUCT_TYPE)?;
        let mut rows = stmt.query(params![
            row.id as i64,
            row.file,
            row.line as i64,
            row.name,
            row.size as i64,
            row.flags.bits() as i64
        ])?;
        match rows.next()? {
            Some(result) => {
                row.id = result.get::<_, i64>(0)? as u64;
                true
            }
            None => false,
        }
    };
    if inserted {
        tracing::debug!(name = %row.name, file = %row.file, line = row.line, id = row.id, "insert record type");
        return Ok(true);
    }

    let mut stmt = tx.prepare_cached(SELECT_STRUCT_TYPE)?;
    row.id = stmt.query_row(params![row.name, row.file, row.line as i64], |result| {
        result.get::<_, i64>(0)
    })? as u64;
    Ok(false)
}

/// Insert a member row; on a uniqueness conflict fetch the existing id.
fn insert_struct_member(tx: &Transaction<'_>, row: &mut StructMemberRow) -> Result<()>
{
    let inserted = {
        let mut stmt = tx.prepare_cached(INSERT_STRUCT_MEMBER)?;
        let mut rows = stmt.query(params![
            row.id as i64,
            row.owner as i64,
            row.nested.map(|nested| nested as i64),
            row.name,
            row.type_name,
            row.line as i64,
            row.byte_size as i64,
            row.bit_size.map(|bits| bits as i64),
            row.byte_offset as i64,
            row.bit_offset.map(|bits| bits as i64),
            row.flags.bits() as i64,
            row.array_items.map(|items| items as i64)
        ])?;
        match rows.next()? {
            Some(result) => {
                row.id = result.get::<_, i64>(0)? as u64;
                true
            }
            None => false,
        }
    };
    if !inserted {
        let mut stmt = tx.prepare_cached(SELECT_STRUCT_MEMBER)?;
        row.id = stmt.query_row(params![row.owner as i64, row.name, row.byte_offset as i64], |result| {
            result.get::<_, i64>(0)
        })? as u64;
    }
    Ok(())
}

fn insert_member_bounds(tx: &Transaction<'_>, row: &MemberBoundsRow) -> Result<()>
{
    let mut stmt = tx.prepare_cached(INSERT_MEMBER_BOUNDS)?;
    stmt.execute(params![
        row.owner as i64,
        row.member as i64,
        row.offset as i64,
        row.name,
        row.base as i64,
        row.top as i64,
        row.is_imprecise,
        row.required_precision
    ])?;
    Ok(())
}
