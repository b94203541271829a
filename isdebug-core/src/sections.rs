use goblin::pe::section_table::SectionTable;

/// A section of a PE image, kept only for RVA to file-offset translation.
#[derive(Debug, Clone)]
pub struct ImageSection {
    pub name: String,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub file_offset: u32,
    pub raw_size: u32,
}

impl ImageSection {
    pub fn from_goblin(s: &SectionTable) -> Self {
        Self {
            name: s.name().unwrap_or("").to_string(),
            virtual_address: s.virtual_address,
            virtual_size: s.virtual_size,
            file_offset: s.pointer_to_raw_data,
            raw_size: s.size_of_raw_data,
        }
    }

    /// Bytes of address space the section spans; some linkers leave `VirtualSize` zero.
    fn span(&self) -> u32 {
        if self.virtual_size == 0 {
            self.raw_size
        } else {
            self.virtual_size
        }
    }

    pub fn contains(&self, rva: u32) -> bool {
        let end = u64::from(self.virtual_address) + u64::from(self.span());
        rva >= self.virtual_address && u64::from(rva) < end
    }
}

/// Maps an RVA to a file offset, if some section's raw data backs it.
pub fn rva_to_offset(sections: &[ImageSection], rva: u32) -> Option<usize> {
    let s = sections.iter().find(|s| s.contains(rva))?;
    let delta = rva - s.virtual_address;
    if delta >= s.raw_size {
        log::debug!("rva {rva:#x} falls in the zero-filled tail of {}", s.name);
        return None;
    }
    Some(s.file_offset as usize + delta as usize)
}

/// Slices `len` bytes of `image` starting at `rva`.
pub fn slice_at_rva<'a>(
    image: &'a [u8],
    sections: &[ImageSection],
    rva: u32,
    len: usize,
) -> Option<&'a [u8]> {
    let start = rva_to_offset(sections, rva)?;
    image.get(start..start.checked_add(len)?)
}
