//! Binary parsing and DWARF section loading.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::{
    constants, AttributeValue, DebuggingInformationEntry, Dwarf, EndianArcSlice, Reader, RunTimeEndian, SectionId,
    Unit, UnitSectionOffset, UnitType,
};
use object::{Object, ObjectSection};

use super::{map_dwarf_error, DieRef, OwnedDwarf, OwnedReader};
use crate::capability::{CapabilityEncoder, CheriArch};
use crate::error::{Result, ScrapeError};

/// Sections the scraper may need. Missing sections load as empty readers.
const DWARF_SECTIONS: &[SectionId] = &[
    SectionId::DebugAbbrev,
    SectionId::DebugAddr,
    SectionId::DebugInfo,
    SectionId::DebugLine,
    SectionId::DebugLineStr,
    SectionId::DebugRanges,
    SectionId::DebugRngLists,
    SectionId::DebugStr,
    SectionId::DebugStrOffsets,
    SectionId::DebugTypes,
    SectionId::DebugLoc,
    SectionId::DebugLocLists,
];

/// A binary input: parsed debug sections plus the capability encoding of the
/// target architecture.
///
/// All compilation units (including `.debug_types` type units) are
/// materialized up front so `DW_AT_type` references can be chased across
/// unit boundaries.
pub struct DwarfSource
{
    path: PathBuf,
    arch: CheriArch,
    endian: RunTimeEndian,
    pointer_size: u8,
    dwarf: OwnedDwarf,
    units: Vec<Unit<OwnedReader>>,
}

impl DwarfSource
{
    /// Open a binary from disk, detect its architecture and load its DWARF.
    pub fn open(path: &Path) -> Result<Self>
    {
        let bytes = fs::read(path)?;
        let data = Arc::<[u8]>::from(bytes);
        let file = object::File::parse(&*data)?;

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let arch = match file.architecture() {
            object::Architecture::Aarch64 => CheriArch::Morello,
            object::Architecture::Riscv64 => CheriArch::Riscv64,
            other => {
                return Err(ScrapeError::Unsupported(format!(
                    "{} is not a CHERI-capable architecture ({other:?})",
                    path.display()
                )))
            }
        };

        let pointer_size = file
            .architecture()
            .address_size()
            .map(object::AddressSize::bytes)
            .unwrap_or_else(|| arch.pointer_size_bytes());

        let mut sections = HashMap::new();
        for &id in DWARF_SECTIONS {
            sections.insert(id, load_section_bytes(&file, id)?);
        }

        Self::build(path.to_path_buf(), arch, endian, pointer_size, sections)
    }

    /// Build a source from raw section bytes with an explicit architecture.
    ///
    /// Used by tests that assemble DWARF in memory instead of reading an ELF
    /// from disk.
    pub fn from_sections(
        label: &str,
        sections: &HashMap<SectionId, Vec<u8>>,
        arch: CheriArch,
        little_endian: bool,
    ) -> Result<Self>
    {
        let endian = if little_endian {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let owned = sections
            .iter()
            .map(|(&id, data)| (id, Arc::<[u8]>::from(data.clone())))
            .collect();
        Self::build(PathBuf::from(label), arch, endian, arch.pointer_size_bytes(), owned)
    }

    fn build(
        path: PathBuf,
        arch: CheriArch,
        endian: RunTimeEndian,
        pointer_size: u8,
        sections: HashMap<SectionId, Arc<[u8]>>,
    ) -> Result<Self>
    {
        let dwarf = Dwarf::load(|id| {
            let data = sections.get(&id).cloned().unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
            Ok::<_, gimli::Error>(EndianArcSlice::new(data, endian))
        })
        .map_err(|err| map_dwarf_error("loading DWARF sections", err))?;

        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
        {
            units.push(
                dwarf
                    .unit(header)
                    .map_err(|err| map_dwarf_error("parsing compilation unit", err))?,
            );
        }

        let mut type_headers = dwarf.type_units();
        while let Some(header) = type_headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_types unit header", err))?
        {
            units.push(dwarf.unit(header).map_err(|err| map_dwarf_error("parsing type unit", err))?);
        }

        if units.is_empty() {
            tracing::warn!(binary = %path.display(), "no debug info found");
        }

        Ok(DwarfSource {
            path,
            arch,
            endian,
            pointer_size,
            dwarf,
            units,
        })
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn arch(&self) -> CheriArch
    {
        self.arch
    }

    /// Bounds calculator for the architecture selected from this binary.
    pub fn encoder(&self) -> CapabilityEncoder
    {
        CapabilityEncoder::new(self.arch)
    }

    pub fn is_little_endian(&self) -> bool
    {
        self.endian == RunTimeEndian::Little
    }

    pub fn pointer_size(&self) -> u8
    {
        self.pointer_size
    }

    pub(crate) fn units(&self) -> &[Unit<OwnedReader>]
    {
        &self.units
    }

    /// Number of materialized units (including type units).
    pub fn unit_count(&self) -> usize
    {
        self.units.len()
    }

    /// Whether the unit is a proper compilation unit. Type units are kept
    /// only for cross-unit type-reference resolution and are never scraped
    /// directly.
    pub fn is_compile_unit(&self, unit_index: usize) -> bool
    {
        matches!(self.units[unit_index].header.type_(), UnitType::Compilation)
    }

    /// Name of the compilation unit, from its root `DW_AT_name`.
    pub(crate) fn unit_name(&self, unit_index: usize) -> Result<Option<String>>
    {
        match &self.units[unit_index].name {
            Some(reader) => Ok(Some(
                reader
                    .to_string_lossy()
                    .map_err(|err| map_dwarf_error("decoding compilation unit name", err))?
                    .into_owned(),
            )),
            None => Ok(None),
        }
    }

    /// Fetch the DIE a `DieRef` points at.
    pub(crate) fn entry(&self, die: DieRef) -> Result<DebuggingInformationEntry<'_, '_, OwnedReader>>
    {
        self.units[die.unit]
            .entry(die.offset)
            .map_err(|err| map_dwarf_error("fetching DIE", err))
    }

    pub(crate) fn has_attr(&self, entry: &DebuggingInformationEntry<'_, '_, OwnedReader>, at: gimli::DwAt) -> Result<bool>
    {
        Ok(entry
            .attr(at)
            .map_err(|err| map_dwarf_error("reading DIE attribute", err))?
            .is_some())
    }

    pub(crate) fn udata_attr(
        &self,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
        at: gimli::DwAt,
    ) -> Result<Option<u64>>
    {
        let attr = entry
            .attr(at)
            .map_err(|err| map_dwarf_error("reading DIE attribute", err))?;
        Ok(attr.and_then(|attr| attr.udata_value()))
    }

    /// Decode the `DW_AT_name` of a DIE, if present.
    pub(crate) fn entry_name(
        &self,
        unit_index: usize,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
    ) -> Result<Option<String>>
    {
        if let Some(attr) = entry
            .attr(constants::DW_AT_name)
            .map_err(|err| map_dwarf_error("reading DW_AT_name", err))?
        {
            return Ok(Some(self.attr_string(unit_index, attr.value())?));
        }
        Ok(None)
    }

    pub(crate) fn attr_string(&self, unit_index: usize, value: AttributeValue<OwnedReader>) -> Result<String>
    {
        let unit = &self.units[unit_index];
        let reader = self
            .dwarf
            .attr_string(unit, value)
            .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
        let owned = match reader.to_string() {
            Ok(cow) => cow.into_owned(),
            Err(_) => reader
                .to_string_lossy()
                .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
                .into_owned(),
        };
        Ok(owned)
    }

    /// Declaration line of a DIE, zero when absent.
    pub(crate) fn decl_line(&self, entry: &DebuggingInformationEntry<'_, '_, OwnedReader>) -> Result<u64>
    {
        Ok(self.udata_attr(entry, constants::DW_AT_decl_line)?.unwrap_or(0))
    }

    /// Declaration file of a DIE, resolved through the unit line program.
    ///
    /// The path is absolute when the compilation directory is: comp_dir,
    /// then the file's include directory, then the file name. Returns `None`
    /// when the DIE has no `DW_AT_decl_file` or the unit has no line program.
    pub(crate) fn decl_file(
        &self,
        unit_index: usize,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
    ) -> Result<Option<PathBuf>>
    {
        let Some(attr) = entry
            .attr(constants::DW_AT_decl_file)
            .map_err(|err| map_dwarf_error("reading DW_AT_decl_file", err))?
        else {
            return Ok(None);
        };
        let index = match attr.value() {
            AttributeValue::FileIndex(index) => index,
            AttributeValue::Udata(index) => index,
            _ => return Ok(None),
        };

        let unit = &self.units[unit_index];
        let Some(program) = unit.line_program.as_ref() else {
            return Ok(None);
        };
        let header = program.header();
        let Some(file) = header.file(index) else {
            return Ok(None);
        };

        let mut path = PathBuf::new();
        if let Some(comp_dir) = unit.comp_dir.as_ref() {
            path.push(
                comp_dir
                    .to_string_lossy()
                    .map_err(|err| map_dwarf_error("decoding DW_AT_comp_dir", err))?
                    .as_ref(),
            );
        }
        if let Some(directory) = file.directory(header) {
            path.push(self.attr_string(unit_index, directory)?);
        }
        path.push(self.attr_string(unit_index, file.path_name())?);
        Ok(Some(path))
    }

    /// Resolve a `DW_AT_type` attribute value to the referenced DIE,
    /// following references across unit boundaries and through
    /// `.debug_types` signatures.
    pub(crate) fn resolve_type_ref(&self, unit_index: usize, value: AttributeValue<OwnedReader>) -> Option<DieRef>
    {
        match value {
            AttributeValue::UnitRef(offset) => Some(DieRef {
                unit: unit_index,
                offset,
            }),
            AttributeValue::DebugInfoRef(offset) => {
                let target = UnitSectionOffset::from(offset);
                self.units
                    .iter()
                    .enumerate()
                    .find_map(|(unit, candidate)| target.to_unit_offset(candidate).map(|offset| DieRef { unit, offset }))
            }
            AttributeValue::DebugTypesRef(signature) => {
                self.units
                    .iter()
                    .enumerate()
                    .find_map(|(unit, candidate)| match candidate.header.type_() {
                        UnitType::Type {
                            type_signature,
                            type_offset,
                        }
                        | UnitType::SplitType {
                            type_signature,
                            type_offset,
                        } if type_signature == signature => Some(DieRef {
                            unit,
                            offset: type_offset,
                        }),
                        _ => None,
                    })
            }
            _ => None,
        }
    }

    /// Resolve the `DW_AT_type` reference of a DIE, if any.
    pub(crate) fn type_ref(
        &self,
        unit_index: usize,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
    ) -> Result<Option<DieRef>>
    {
        let Some(attr) = entry
            .attr(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
        else {
            return Ok(None);
        };
        Ok(self.resolve_type_ref(unit_index, attr.value()))
    }
}

fn load_section_bytes<'data>(file: &object::File<'data>, id: SectionId) -> Result<Arc<[u8]>>
{
    match file.section_by_name(id.name()) {
        Some(section) => {
            let data = section.uncompressed_data().map_err(|err| ScrapeError::Section {
                name: id.name(),
                detail: err.to_string(),
            })?;
            Ok(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
                Cow::Owned(vec) => vec.into(),
            })
        }
        None => Ok(Arc::<[u8]>::from(Vec::new())),
    }
}
