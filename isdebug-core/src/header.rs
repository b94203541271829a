pub mod pe;

use crate::error::DecodeError;
use crate::reader::ReadAt;
use anyhow::Result;
use chrono::{DateTime, Duration, Local, NaiveDateTime, Offset, TimeZone};
use serde::Serialize;
use std::io::Read;
use std::path::Path;

/// Number of leading bytes consulted for the linker timestamp.
pub const HEADER_PREFIX_LEN: usize = 2048;

/// Location of `e_lfanew`, the file offset of the PE signature.
pub const PE_POINTER_OFFSET: usize = 60;

/// Distance from the PE signature to `TimeDateStamp` in the COFF header.
pub const LINKER_TIMESTAMP_OFFSET: usize = 8;

/// Where the UTC offset applied to the build time comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UtcOffset {
    /// The host's local timezone.
    #[default]
    Local,
    /// A fixed offset east of UTC, in seconds.
    Fixed(i32),
}

impl UtcOffset {
    fn seconds_at(self, utc: &NaiveDateTime) -> i32 {
        match self {
            UtcOffset::Local => Local.offset_from_utc_datetime(utc).fix().local_minus_utc(),
            UtcOffset::Fixed(secs) => secs,
        }
    }
}

/// Linker timestamp decoded from the PE file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutableHeaderInfo {
    pub pe_header_offset: u32,
    /// Raw `TimeDateStamp`, seconds since 1970-01-01T00:00:00.
    pub linker_timestamp: i32,
    /// Build time shifted by the local offset, whole hours only.
    pub built_on: NaiveDateTime,
}

impl ExecutableHeaderInfo {
    /// Reads the first [`HEADER_PREFIX_LEN`] bytes of `path` and decodes the timestamp.
    pub fn read<P: AsRef<Path>>(path: P, offset: UtcOffset) -> Result<Self> {
        let mut prefix = Vec::with_capacity(HEADER_PREFIX_LEN);
        std::fs::File::open(&path)?
            .take(HEADER_PREFIX_LEN as u64)
            .read_to_end(&mut prefix)?;

        log::debug!(
            "read {} header bytes from {}",
            prefix.len(),
            path.as_ref().display()
        );
        Ok(Self::from_prefix(&prefix, offset)?)
    }

    /// Decodes the timestamp from an already-read file prefix.
    ///
    /// Short prefixes are fine as long as both fields lie inside them. The offset is
    /// truncated toward zero to whole hours, so a +05:30 zone shifts by five hours.
    pub fn from_prefix(prefix: &[u8], offset: UtcOffset) -> Result<Self, DecodeError> {
        let pe_header_offset = prefix.u32_at(PE_POINTER_OFFSET)?;
        let timestamp_at = (pe_header_offset as usize)
            .checked_add(LINKER_TIMESTAMP_OFFSET)
            .ok_or(DecodeError::OutOfRange {
                offset: pe_header_offset as u64,
                len: 4,
                available: prefix.len(),
            })?;
        let linker_timestamp = prefix.i32_at(timestamp_at)?;

        let utc = DateTime::from_timestamp(i64::from(linker_timestamp), 0)
            .ok_or_else(|| DecodeError::Metadata(format!("timestamp {linker_timestamp}")))?
            .naive_utc();
        let hours = offset.seconds_at(&utc) / 3600;

        Ok(Self {
            pe_header_offset,
            linker_timestamp,
            built_on: utc + Duration::hours(i64::from(hours)),
        })
    }
}
