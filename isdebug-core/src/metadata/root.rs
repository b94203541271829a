use crate::error::DecodeError;
use crate::reader::{align4, c_str_at, ReadAt};

/// `BSJB`, the metadata root signature.
pub const METADATA_SIGNATURE: u32 = 0x424a_5342;

#[derive(Debug, Clone, Copy)]
pub struct StreamHeader<'a> {
    pub name: &'a str,
    pub offset: u32,
    pub size: u32,
}

/// The metadata root (ECMA-335 II.24.2.1) and its stream directory.
#[derive(Debug, Clone)]
pub struct MetadataRoot<'a> {
    data: &'a [u8],
    pub major_version: u16,
    pub minor_version: u16,
    version: &'a [u8],
    pub streams: Vec<StreamHeader<'a>>,
}

impl<'a> MetadataRoot<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        let signature = data.u32_at(0)?;
        if signature != METADATA_SIGNATURE {
            return Err(DecodeError::Metadata(format!(
                "metadata signature {signature:#010x}"
            )));
        }
        let major_version = data.u16_at(4)?;
        let minor_version = data.u16_at(6)?;
        let version_len = data.u32_at(12)? as usize;
        let version = data.bytes_at(16, version_len)?;

        let mut pos = 16 + align4(version_len);
        // Flags (reserved) precede the stream count.
        let count = data.u16_at(pos + 2)?;
        pos += 4;

        let mut streams = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let offset = data.u32_at(pos)?;
            let size = data.u32_at(pos + 4)?;
            let name = c_str_at(data, pos + 8)?;
            pos += 8 + align4(name.len() + 1);
            streams.push(StreamHeader { name, offset, size });
        }

        Ok(Self {
            data,
            major_version,
            minor_version,
            version,
            streams,
        })
    }

    /// Runtime version the module was built against, e.g. `v4.0.30319`.
    pub fn version(&self) -> Result<&'a str, DecodeError> {
        let end = self
            .version
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.version.len());
        std::str::from_utf8(&self.version[..end])
            .map_err(|_| DecodeError::Metadata("runtime version is not UTF-8".into()))
    }

    /// Bytes of the named stream; the last header wins when a name repeats.
    pub fn stream(&self, name: &str) -> Result<Option<&'a [u8]>, DecodeError> {
        match self.streams.iter().rev().find(|s| s.name == name) {
            Some(s) => self.data.bytes_at(s.offset as usize, s.size as usize).map(Some),
            None => Ok(None),
        }
    }
}
