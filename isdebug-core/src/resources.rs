use crate::binary::PeImage;
use crate::error::DecodeError;
use crate::header::pe::RESOURCE_DIRECTORY;
use crate::reader::{align4, ReadAt};
use byteorder::{ReadBytesExt, LE};
use std::fmt;
use std::io::Cursor;

const RT_VERSION: u32 = 16;
const SUBDIRECTORY: u32 = 0x8000_0000;
const VS_FIXEDFILEINFO_SIGNATURE: u32 = 0xfeef_04bd;

/// `VS_FIXEDFILEINFO`, the binary part of a version resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VsFixedFileInfo {
    pub signature: u32,
    pub struct_version: u32,
    pub file_version_ms: u32,
    pub file_version_ls: u32,
    pub product_version_ms: u32,
    pub product_version_ls: u32,
}

impl VsFixedFileInfo {
    fn from_bytes(data: &[u8]) -> std::io::Result<Self> {
        let mut cur = Cursor::new(data);
        Ok(Self {
            signature: cur.read_u32::<LE>()?,
            struct_version: cur.read_u32::<LE>()?,
            file_version_ms: cur.read_u32::<LE>()?,
            file_version_ls: cur.read_u32::<LE>()?,
            product_version_ms: cur.read_u32::<LE>()?,
            product_version_ls: cur.read_u32::<LE>()?,
        })
    }

    pub fn file_version(&self) -> FileVersion {
        FileVersion([
            (self.file_version_ms >> 16) as u16,
            self.file_version_ms as u16,
            (self.file_version_ls >> 16) as u16,
            self.file_version_ls as u16,
        ])
    }
}

/// `major.minor.build.revision`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileVersion(pub [u16; 4]);

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

/// Follows the first entry of a resource directory, or the entry with `id` if given.
///
/// Returns the entry's `OffsetToData` relative to the start of the resource section.
fn directory_entry(rsrc: &[u8], dir: usize, id: Option<u32>) -> Result<Option<u32>, DecodeError> {
    let named = rsrc.u16_at(dir + 12)? as usize;
    let ids = rsrc.u16_at(dir + 14)? as usize;
    for i in 0..named + ids {
        let entry = dir + 16 + i * 8;
        let name = rsrc.u32_at(entry)?;
        if id.map_or(true, |id| name == id) {
            return Ok(Some(rsrc.u32_at(entry + 4)?));
        }
    }
    Ok(None)
}

/// Reads the `VS_FIXEDFILEINFO` of the first `RT_VERSION` resource.
pub fn fixed_file_info(image: &PeImage) -> Result<Option<VsFixedFileInfo>, DecodeError> {
    let Some(rsrc) = image.directory(RESOURCE_DIRECTORY) else {
        return Ok(None);
    };

    // type -> name -> language -> data entry
    let mut offset = 0u32;
    for id in [Some(RT_VERSION), None, None] {
        if offset != 0 && offset & SUBDIRECTORY == 0 {
            return Ok(None);
        }
        match directory_entry(rsrc, (offset & !SUBDIRECTORY) as usize, id)? {
            Some(next) => offset = next,
            None => return Ok(None),
        }
    }
    if offset & SUBDIRECTORY != 0 {
        return Ok(None);
    }

    let data_rva = rsrc.u32_at(offset as usize)?;
    let data_len = rsrc.u32_at(offset as usize + 4)? as usize;
    let Some(version_info) = image.slice_at_rva(data_rva, data_len) else {
        return Ok(None);
    };

    // VS_VERSIONINFO: wLength, wValueLength, wType, L"VS_VERSION_INFO\0", padding
    let value_len = version_info.u16_at(2)? as usize;
    let key = 6 + "VS_VERSION_INFO".len() * 2 + 2;
    let value = version_info.bytes_at(align4(key), value_len)?;
    let info = VsFixedFileInfo::from_bytes(value)
        .map_err(|_| DecodeError::Metadata("truncated VS_FIXEDFILEINFO".into()))?;
    if info.signature != VS_FIXEDFILEINFO_SIGNATURE {
        return Err(DecodeError::Metadata(format!(
            "VS_FIXEDFILEINFO signature {:#010x}",
            info.signature
        )));
    }
    Ok(Some(info))
}

/// File version from the version resource, if the image has one.
pub fn file_version(image: &PeImage) -> Option<FileVersion> {
    match fixed_file_info(image) {
        Ok(info) => info.map(|i| i.file_version()),
        Err(e) => {
            log::debug!("ignoring version resource: {e}");
            None
        }
    }
}
