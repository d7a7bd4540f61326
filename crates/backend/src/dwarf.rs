//! Minimal DWARF debug-info builder.
//!
//! The compile unit exists to give the code generator a well-formed scope;
//! only basic types are described. Finalization serializes the DWARF
//! sections and must happen exactly once, after every function referencing
//! the scope has been created.

use crate::ModuleError;
use gimli::write::{AttributeValue, DwarfUnit, EndianVec, Sections, UnitEntryId};
use gimli::{Encoding, Format, LittleEndian};

const PRODUCER: &str = "WAVM";

/// An opaque reference to a debug type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DebugType(UnitEntryId);

/// Builds the module's DWARF debug info.
pub struct DebugBuilder {
    dwarf: DwarfUnit,
    finalized: bool,
    sections: Vec<(&'static str, Vec<u8>)>,
}

impl DebugBuilder {
    /// Creates a builder whose compile unit is bound to the file
    /// `unknown:unknown` with a vendor-reserved language tag.
    pub fn new() -> Self {
        let encoding = Encoding {
            format: Format::Dwarf32,
            version: 4,
            address_size: 8,
        };
        let mut dwarf = DwarfUnit::new(encoding);

        let root = dwarf.unit.root();
        let entry = dwarf.unit.get_mut(root);
        entry.set(
            gimli::DW_AT_producer,
            AttributeValue::String(PRODUCER.as_bytes().to_vec()),
        );
        entry.set(gimli::DW_AT_language, AttributeValue::Language(gimli::DwLang(0xffff)));
        entry.set(gimli::DW_AT_name, AttributeValue::String(b"unknown".to_vec()));
        entry.set(gimli::DW_AT_comp_dir, AttributeValue::String(b"unknown".to_vec()));

        Self {
            dwarf,
            finalized: false,
            sections: Vec::new(),
        }
    }

    /// Describes a basic type of the given bit width and DWARF encoding.
    pub fn base_type(&mut self, name: &str, bit_width: u16, encoding: gimli::DwAte) -> DebugType {
        let root = self.dwarf.unit.root();
        let id = self.dwarf.unit.add(root, gimli::DW_TAG_base_type);
        let entry = self.dwarf.unit.get_mut(id);
        entry.set(
            gimli::DW_AT_name,
            AttributeValue::String(name.as_bytes().to_vec()),
        );
        entry.set(
            gimli::DW_AT_byte_size,
            AttributeValue::Data1((bit_width / 8).max(1) as u8),
        );
        entry.set(gimli::DW_AT_encoding, AttributeValue::Encoding(encoding));
        DebugType(id)
    }

    /// Serializes the DWARF sections.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn finalize(&mut self) -> Result<(), ModuleError> {
        assert!(!self.finalized, "debug info was already finalized");
        self.finalized = true;

        let mut sections = Sections::new(EndianVec::new(LittleEndian));
        self.dwarf.write(&mut sections)?;
        sections.for_each(|id, data| {
            if !data.slice().is_empty() {
                self.sections.push((id.name(), data.slice().to_vec()));
            }
            Ok::<(), gimli::write::Error>(())
        })?;
        Ok(())
    }

    /// Returns `true` once [`DebugBuilder::finalize`] has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Iterates over the serialized DWARF sections and their contents.
    pub fn sections(&self) -> impl Iterator<Item = (&'static str, &[u8])> {
        self.sections.iter().map(|(name, data)| (*name, data.as_slice()))
    }
}

impl Default for DebugBuilder {
    fn default() -> Self {
        Self::new()
    }
}
