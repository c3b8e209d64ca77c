//! In-memory DWARF fixtures for scraper tests.
//!
//! Assembles compilation units with `gimli::write`, emits the section bytes
//! and feeds them back through `DwarfSource::from_sections`, so the tests
//! exercise the same read path as a real binary without shipping ELF
//! assets.

use std::collections::HashMap;
use std::sync::Arc;

use gimli::write::{AttributeValue, Dwarf, EndianVec, FileId, LineProgram, LineString, Sections, Unit, UnitEntryId};
use gimli::{constants, Encoding, Format, LineEncoding, LittleEndian, SectionId};

use caplayout_core::scheduler::StopToken;
use caplayout_core::{CheriArch, DwarfSource, ScraperStats, StorageManager, StructLayoutScraper};

pub const ENCODING: Encoding = Encoding {
    format: Format::Dwarf32,
    version: 4,
    address_size: 8,
};

/// One compilation unit under construction.
pub struct UnitFixture
{
    pub unit: Unit,
    file: FileId,
}

pub fn compile_unit(dir: &str, file: &str) -> UnitFixture
{
    let mut line_program = LineProgram::new(
        ENCODING,
        LineEncoding::default(),
        LineString::String(dir.as_bytes().to_vec()),
        None,
        LineString::String(file.as_bytes().to_vec()),
        None,
    );
    let default_dir = line_program.default_directory();
    let file_id = line_program.add_file(LineString::String(file.as_bytes().to_vec()), default_dir, None);

    let mut unit = Unit::new(ENCODING, line_program);
    let root = unit.root();
    let root_die = unit.get_mut(root);
    root_die.set(constants::DW_AT_name, AttributeValue::String(file.as_bytes().to_vec()));
    root_die.set(constants::DW_AT_comp_dir, AttributeValue::String(dir.as_bytes().to_vec()));

    UnitFixture { unit, file: file_id }
}

impl UnitFixture
{
    pub fn base_type(&mut self, name: &str, size: u64) -> UnitEntryId
    {
        let root = self.unit.root();
        let id = self.unit.add(root, constants::DW_TAG_base_type);
        let die = self.unit.get_mut(id);
        die.set(constants::DW_AT_name, AttributeValue::String(name.as_bytes().to_vec()));
        die.set(constants::DW_AT_byte_size, AttributeValue::Udata(size));
        id
    }

    /// A struct/union/class DIE with declaration coordinates.
    pub fn record(&mut self, tag: gimli::DwTag, name: Option<&str>, size: u64, line: u64) -> UnitEntryId
    {
        let root = self.unit.root();
        let id = self.unit.add(root, tag);
        let die = self.unit.get_mut(id);
        if let Some(name) = name {
            die.set(constants::DW_AT_name, AttributeValue::String(name.as_bytes().to_vec()));
        }
        die.set(constants::DW_AT_byte_size, AttributeValue::Udata(size));
        die.set(constants::DW_AT_decl_file, AttributeValue::FileIndex(Some(self.file)));
        die.set(constants::DW_AT_decl_line, AttributeValue::Udata(line));
        id
    }

    pub fn structure(&mut self, name: &str, size: u64, line: u64) -> UnitEntryId
    {
        self.record(constants::DW_TAG_structure_type, Some(name), size, line)
    }

    pub fn member(&mut self, parent: UnitEntryId, name: Option<&str>, ty: UnitEntryId, offset: u64) -> UnitEntryId
    {
        let id = self.unit.add(parent, constants::DW_TAG_member);
        let die = self.unit.get_mut(id);
        if let Some(name) = name {
            die.set(constants::DW_AT_name, AttributeValue::String(name.as_bytes().to_vec()));
        }
        die.set(constants::DW_AT_type, AttributeValue::UnitRef(ty));
        die.set(constants::DW_AT_data_member_location, AttributeValue::Udata(offset));
        id
    }

    /// A DWARF 3/4 style bit-field member with the legacy `DW_AT_bit_offset`.
    pub fn bit_field(
        &mut self,
        parent: UnitEntryId,
        name: &str,
        ty: UnitEntryId,
        storage_size: u64,
        bit_size: u64,
        bit_offset: u64,
    ) -> UnitEntryId
    {
        let id = self.member(parent, Some(name), ty, 0);
        let die = self.unit.get_mut(id);
        die.set(constants::DW_AT_byte_size, AttributeValue::Udata(storage_size));
        die.set(constants::DW_AT_bit_size, AttributeValue::Udata(bit_size));
        die.set(constants::DW_AT_bit_offset, AttributeValue::Udata(bit_offset));
        id
    }

    pub fn array(&mut self, element: UnitEntryId, count: Option<u64>) -> UnitEntryId
    {
        let root = self.unit.root();
        let id = self.unit.add(root, constants::DW_TAG_array_type);
        self.unit.get_mut(id).set(constants::DW_AT_type, AttributeValue::UnitRef(element));
        let subrange = self.unit.add(id, constants::DW_TAG_subrange_type);
        if let Some(count) = count {
            self.unit
                .get_mut(subrange)
                .set(constants::DW_AT_count, AttributeValue::Udata(count));
        }
        id
    }

    pub fn pointer(&mut self, pointee: Option<UnitEntryId>) -> UnitEntryId
    {
        let root = self.unit.root();
        let id = self.unit.add(root, constants::DW_TAG_pointer_type);
        let die = self.unit.get_mut(id);
        die.set(constants::DW_AT_byte_size, AttributeValue::Udata(8));
        if let Some(pointee) = pointee {
            die.set(constants::DW_AT_type, AttributeValue::UnitRef(pointee));
        }
        id
    }

    pub fn typedef(&mut self, name: &str, referent: UnitEntryId) -> UnitEntryId
    {
        let root = self.unit.root();
        let id = self.unit.add(root, constants::DW_TAG_typedef);
        let die = self.unit.get_mut(id);
        die.set(constants::DW_AT_name, AttributeValue::String(name.as_bytes().to_vec()));
        die.set(constants::DW_AT_type, AttributeValue::UnitRef(referent));
        id
    }

    pub fn const_of(&mut self, referent: UnitEntryId) -> UnitEntryId
    {
        let root = self.unit.root();
        let id = self.unit.add(root, constants::DW_TAG_const_type);
        self.unit
            .get_mut(id)
            .set(constants::DW_AT_type, AttributeValue::UnitRef(referent));
        id
    }

    pub fn subroutine(&mut self, return_type: Option<UnitEntryId>) -> UnitEntryId
    {
        let root = self.unit.root();
        let id = self.unit.add(root, constants::DW_TAG_subroutine_type);
        if let Some(return_type) = return_type {
            self.unit
                .get_mut(id)
                .set(constants::DW_AT_type, AttributeValue::UnitRef(return_type));
        }
        id
    }
}

/// Emit units into raw section bytes.
pub fn emit(units: Vec<Unit>) -> HashMap<SectionId, Vec<u8>>
{
    let mut dwarf = Dwarf::new();
    for unit in units {
        dwarf.units.add(unit);
    }
    let mut sections = Sections::new(EndianVec::new(LittleEndian));
    dwarf.write(&mut sections).expect("emit DWARF");

    let mut out = HashMap::new();
    sections
        .for_each(|id, data| {
            out.insert(id, data.slice().to_vec());
            Ok::<(), gimli::Error>(())
        })
        .unwrap();
    out
}

pub fn source_from(units: Vec<Unit>, label: &str) -> DwarfSource
{
    let sections = emit(units);
    DwarfSource::from_sections(label, &sections, CheriArch::Morello, true).expect("parse emitted DWARF")
}

/// Run one scraper over the given units against `storage`.
pub fn scrape_into(storage: &Arc<StorageManager>, units: Vec<Unit>, label: &str) -> ScraperStats
{
    let source = source_from(units, label);
    let mut scraper = StructLayoutScraper::new(storage.clone(), source, None);
    scraper.init_schema().expect("schema");
    scraper.run(&StopToken::default()).expect("scrape");
    scraper.stats().clone()
}

/// Fresh in-memory database plus one scrape over the given units.
pub fn scrape(units: Vec<Unit>, label: &str) -> (Arc<StorageManager>, ScraperStats)
{
    let storage = Arc::new(StorageManager::open_in_memory().expect("open database"));
    let stats = scrape_into(&storage, units, label);
    (storage, stats)
}
