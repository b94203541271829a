use crate::error::DecodeError;
use crate::reader::{c_str_at, ReadAt};

/// Reads an ECMA-335 compressed unsigned integer (II.23.2) at `*pos`, advancing it.
pub fn read_compressed_u32(data: &[u8], pos: &mut usize) -> Result<u32, DecodeError> {
    let b0 = data.u8_at(*pos)?;
    let (value, len) = if b0 & 0x80 == 0 {
        (u32::from(b0), 1)
    } else if b0 & 0xc0 == 0x80 {
        let b1 = data.u8_at(*pos + 1)?;
        ((u32::from(b0 & 0x3f) << 8) | u32::from(b1), 2)
    } else if b0 & 0xe0 == 0xc0 {
        let rest = data.bytes_at(*pos + 1, 3)?;
        let value = (u32::from(b0 & 0x1f) << 24)
            | (u32::from(rest[0]) << 16)
            | (u32::from(rest[1]) << 8)
            | u32::from(rest[2]);
        (value, 4)
    } else {
        return Err(DecodeError::Metadata(format!(
            "bad compressed integer lead byte {b0:#04x} at {:#x}",
            *pos
        )));
    };
    *pos += len;
    Ok(value)
}

/// The `#Strings` heap: NUL-terminated UTF-8 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringsHeap<'a>(pub &'a [u8]);

impl<'a> StringsHeap<'a> {
    pub fn get(&self, index: u32) -> Result<&'a str, DecodeError> {
        c_str_at(self.0, index as usize)
    }
}

/// The `#Blob` heap: length-prefixed byte runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobHeap<'a>(pub &'a [u8]);

impl<'a> BlobHeap<'a> {
    pub fn get(&self, index: u32) -> Result<&'a [u8], DecodeError> {
        let mut pos = index as usize;
        let len = read_compressed_u32(self.0, &mut pos)?;
        self.0.bytes_at(pos, len as usize)
    }
}
