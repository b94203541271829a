use crate::error::DecodeError;
use byteorder::{ByteOrder, LE};

/// Bounds-checked little-endian reads at absolute offsets.
pub(crate) trait ReadAt {
    fn bytes_at(&self, offset: usize, len: usize) -> Result<&[u8], DecodeError>;

    fn u8_at(&self, offset: usize) -> Result<u8, DecodeError> {
        Ok(self.bytes_at(offset, 1)?[0])
    }

    fn u16_at(&self, offset: usize) -> Result<u16, DecodeError> {
        Ok(LE::read_u16(self.bytes_at(offset, 2)?))
    }

    fn u32_at(&self, offset: usize) -> Result<u32, DecodeError> {
        Ok(LE::read_u32(self.bytes_at(offset, 4)?))
    }

    fn i32_at(&self, offset: usize) -> Result<i32, DecodeError> {
        Ok(LE::read_i32(self.bytes_at(offset, 4)?))
    }

    fn u64_at(&self, offset: usize) -> Result<u64, DecodeError> {
        Ok(LE::read_u64(self.bytes_at(offset, 8)?))
    }

    /// Reads a 2- or 4-byte heap/table index.
    fn index_at(&self, offset: usize, wide: bool) -> Result<u32, DecodeError> {
        if wide {
            self.u32_at(offset)
        } else {
            self.u16_at(offset).map(u32::from)
        }
    }
}

impl ReadAt for [u8] {
    fn bytes_at(&self, offset: usize, len: usize) -> Result<&[u8], DecodeError> {
        offset
            .checked_add(len)
            .and_then(|end| self.get(offset..end))
            .ok_or(DecodeError::OutOfRange {
                offset: offset as u64,
                len,
                available: self.len(),
            })
    }
}

/// Reads a NUL-terminated byte string starting at `offset`.
pub(crate) fn c_str_at(data: &[u8], offset: usize) -> Result<&str, DecodeError> {
    let tail = data.get(offset..).ok_or(DecodeError::OutOfRange {
        offset: offset as u64,
        len: 1,
        available: data.len(),
    })?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    std::str::from_utf8(&tail[..end])
        .map_err(|_| DecodeError::Metadata(format!("non UTF-8 string at {offset:#x}")))
}

pub(crate) fn align4(n: usize) -> usize {
    (n + 3) & !3
}
