use crate::error::DecodeError;
use byteorder::{ReadBytesExt, LE};
use std::io::{self, Cursor, SeekFrom};

pub const PE32_MAGIC: u16 = 0x10b;
pub const PE32_PLUS_MAGIC: u16 = 0x20b;

pub const RESOURCE_DIRECTORY: usize = 2;
pub const CLR_RUNTIME_DIRECTORY: usize = 14;

const COFF_HEADER_LEN: u64 = 20;

/// One `IMAGE_DATA_DIRECTORY` slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 && self.size != 0
    }

    fn from_reader<R: io::Read>(cur: &mut R) -> io::Result<Self> {
        Ok(Self {
            virtual_address: cur.read_u32::<LE>()?,
            size: cur.read_u32::<LE>()?,
        })
    }
}

/// The parts of the optional header goblin's section table doesn't cover.
///
/// Layout: PE signature (4 bytes), `IMAGE_FILE_HEADER` (20 bytes), then the optional
/// header whose data directories start at byte 96 (PE32) or 112 (PE32+).
#[derive(Debug, Clone)]
pub struct OptionalHeader {
    /// `0x10b` for PE32, `0x20b` for PE32+.
    pub magic: u16,
    pub data_directories: Vec<DataDirectory>,
}

impl OptionalHeader {
    pub fn is_pe32_plus(&self) -> bool {
        self.magic == PE32_PLUS_MAGIC
    }

    pub fn directory(&self, index: usize) -> Option<DataDirectory> {
        self.data_directories
            .get(index)
            .copied()
            .filter(DataDirectory::is_present)
    }

    /// Parses the optional header of the image whose PE signature sits at `pe_pointer`.
    pub fn parse(image: &[u8], pe_pointer: u32) -> Result<Self, DecodeError> {
        let start = u64::from(pe_pointer) + 4 + COFF_HEADER_LEN;
        let mut cur = Cursor::new(image);
        Self::from_reader(&mut cur, start).map_err(|_| DecodeError::OutOfRange {
            offset: start,
            len: 96,
            available: image.len(),
        })
    }

    fn from_reader<R: io::Read + io::Seek>(cur: &mut R, start: u64) -> io::Result<Self> {
        cur.seek(SeekFrom::Start(start))?;
        let magic = cur.read_u16::<LE>()?;

        // NumberOfRvaAndSizes immediately precedes the directory array.
        let count_at = match magic {
            PE32_PLUS_MAGIC => 108,
            _ => 92,
        };
        cur.seek(SeekFrom::Start(start + count_at))?;
        let count = cur.read_u32::<LE>()?.min(16) as usize;

        let mut data_directories = Vec::with_capacity(count);
        for _ in 0..count {
            data_directories.push(DataDirectory::from_reader(cur)?);
        }

        Ok(Self {
            magic,
            data_directories,
        })
    }
}

/// `IMAGE_COR20_HEADER`, the CLI header a managed image points to from directory 14.
#[derive(Debug, Clone, Copy)]
pub struct CliHeader {
    pub cb: u32,
    pub major_runtime_version: u16,
    pub minor_runtime_version: u16,
    pub metadata: DataDirectory,
    /// `COMIMAGE_FLAGS_*`.
    pub flags: u32,
    pub entry_point_token: u32,
}

impl CliHeader {
    pub const SIZE: usize = 72;

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let mut cur = Cursor::new(data);
        Ok(Self {
            cb: cur.read_u32::<LE>()?,
            major_runtime_version: cur.read_u16::<LE>()?,
            minor_runtime_version: cur.read_u16::<LE>()?,
            metadata: DataDirectory::from_reader(&mut cur)?,
            flags: cur.read_u32::<LE>()?,
            entry_point_token: cur.read_u32::<LE>()?,
        })
    }
}
