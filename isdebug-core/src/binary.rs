use crate::error::LoadError;
use crate::header::pe::OptionalHeader;
use crate::sections::{self, ImageSection};
use goblin::Object;
use std::path::Path;

/// A PE image read fully into memory.
pub struct PeImage {
    pub bytes: Vec<u8>,
    pub sections: Vec<ImageSection>,
    pub optional_header: OptionalHeader,
    /// `IMAGE_FILE_HEADER.Machine`.
    pub machine: u16,
}

impl PeImage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let bytes = std::fs::read(&path)?;
        Self::parse(bytes)
    }

    pub fn parse(bytes: Vec<u8>) -> Result<Self, LoadError> {
        let (sections, machine, pe_pointer) = match Object::parse(&bytes) {
            Ok(Object::PE(pe)) => {
                let sections: Vec<ImageSection> =
                    pe.sections.iter().map(ImageSection::from_goblin).collect();
                log::debug!(
                    "PE image: machine {:#06x}, {} sections",
                    pe.header.coff_header.machine,
                    sections.len()
                );
                (
                    sections,
                    pe.header.coff_header.machine,
                    pe.header.dos_header.pe_pointer,
                )
            }
            Ok(_) => return Err(LoadError::bad_format("not a PE image")),
            Err(e) => return Err(LoadError::bad_format(e.to_string())),
        };

        let optional_header = OptionalHeader::parse(&bytes, pe_pointer)
            .map_err(|e| LoadError::bad_format(format!("optional header: {e}")))?;

        Ok(Self {
            bytes,
            sections,
            optional_header,
            machine,
        })
    }

    pub fn slice_at_rva(&self, rva: u32, len: usize) -> Option<&[u8]> {
        sections::slice_at_rva(&self.bytes, &self.sections, rva, len)
    }

    /// Contents of data directory `index`, if present and backed by file data.
    pub fn directory(&self, index: usize) -> Option<&[u8]> {
        let dir = self.optional_header.directory(index)?;
        self.slice_at_rva(dir.virtual_address, dir.size as usize)
    }
}
