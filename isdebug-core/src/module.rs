use crate::binary::PeImage;
use crate::error::{DecodeError, LoadError};
use crate::header::pe::{CliHeader, CLR_RUNTIME_DIRECTORY};
use crate::metadata::{DebugConfiguration, Metadata};
use bitflags::bitflags;
use serde::Serialize;
use std::fmt;
use std::path::Path;

bitflags! {
    /// `COMIMAGE_FLAGS_*` from the CLI header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CorFlags: u32 {
        const IL_ONLY = 0x0000_0001;
        const REQUIRED_32BIT = 0x0000_0002;
        const IL_LIBRARY = 0x0000_0004;
        const STRONG_NAME_SIGNED = 0x0000_0008;
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        const TRACK_DEBUG_DATA = 0x0001_0000;
        const PREFERRED_32BIT = 0x0002_0000;
    }
}

bitflags! {
    /// Portable-executable kinds, valued as the runtime reports them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct ImageKind: u32 {
        const IL_ONLY = 0x01;
        const REQUIRED_32BIT = 0x02;
        const PE32_PLUS = 0x04;
        const UNMANAGED_32BIT = 0x08;
        const PREFERRED_32BIT = 0x10;
    }
}

impl ImageKind {
    pub fn from_header(flags: CorFlags, pe32_plus: bool) -> Self {
        let mut kind = ImageKind::empty();
        if flags.contains(CorFlags::IL_ONLY) {
            kind |= ImageKind::IL_ONLY;
        }
        if pe32_plus {
            kind |= ImageKind::PE32_PLUS;
        } else {
            if flags.contains(CorFlags::REQUIRED_32BIT) {
                kind |= ImageKind::REQUIRED_32BIT;
            }
            if flags.contains(CorFlags::PREFERRED_32BIT) {
                kind |= ImageKind::PREFERRED_32BIT;
            }
            if !flags.contains(CorFlags::IL_ONLY) {
                kind |= ImageKind::UNMANAGED_32BIT;
            }
        }
        kind
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Invalid");
        }
        let names = [
            (ImageKind::IL_ONLY, "ILOnly"),
            (ImageKind::REQUIRED_32BIT, "Required32Bit"),
            (ImageKind::PE32_PLUS, "PE32Plus"),
            (ImageKind::UNMANAGED_32BIT, "Unmanaged32Bit"),
            (ImageKind::PREFERRED_32BIT, "Preferred32Bit"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", set.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Machine {
    I386,
    IA64,
    AMD64,
    ARM,
    ARM64,
    Unknown(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            0x014c => Machine::I386,
            0x0200 => Machine::IA64,
            0x8664 => Machine::AMD64,
            0x01c4 => Machine::ARM,
            0xaa64 => Machine::ARM64,
            other => Machine::Unknown(other),
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Machine::Unknown(raw) => write!(f, "{raw:#06x}"),
            known => write!(f, "{known:?}"),
        }
    }
}

/// What the loaded module says about its runtime and platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleMetadata {
    pub runtime_version: String,
    pub image_kind: ImageKind,
    pub machine: Machine,
}

/// A PE image confirmed to carry CLI metadata.
pub struct ManagedModule {
    image: PeImage,
    cli: CliHeader,
}

impl ManagedModule {
    /// Loads `path` as a managed module.
    ///
    /// Anything that is not a PE image with a CLI header and a readable metadata root is
    /// [`LoadError::BadImageFormat`]; failures to read the file are [`LoadError::Io`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        Self::from_image(PeImage::open(path)?)
    }

    pub fn from_image(image: PeImage) -> Result<Self, LoadError> {
        let raw = image
            .directory(CLR_RUNTIME_DIRECTORY)
            .ok_or_else(|| LoadError::bad_format("no CLI header"))?;
        let cli = CliHeader::from_bytes(raw)
            .map_err(|_| LoadError::bad_format("truncated CLI header"))?;

        let module = Self { image, cli };
        module
            .metadata()
            .map_err(|e| LoadError::bad_format(e.to_string()))?;
        log::info!(
            "managed module, CLI header v{}.{}",
            cli.major_runtime_version,
            cli.minor_runtime_version
        );
        Ok(module)
    }

    pub fn image(&self) -> &PeImage {
        &self.image
    }

    pub fn cor_flags(&self) -> CorFlags {
        CorFlags::from_bits_retain(self.cli.flags)
    }

    pub fn metadata(&self) -> Result<Metadata<'_>, DecodeError> {
        let dir = self.cli.metadata;
        let bytes = self
            .image
            .slice_at_rva(dir.virtual_address, dir.size as usize)
            .ok_or_else(|| {
                DecodeError::Metadata(format!(
                    "metadata at rva {:#x} is not backed by file data",
                    dir.virtual_address
                ))
            })?;
        Metadata::parse(bytes)
    }

    pub fn runtime_version(&self) -> Result<String, DecodeError> {
        Ok(self.metadata()?.root.version()?.to_string())
    }

    pub fn debuggable_attributes(&self) -> Result<Vec<DebugConfiguration>, DecodeError> {
        self.metadata()?.debuggable_attributes()
    }

    pub fn image_kind(&self) -> ImageKind {
        ImageKind::from_header(self.cor_flags(), self.image.optional_header.is_pe32_plus())
    }

    pub fn machine(&self) -> Machine {
        Machine::from(self.image.machine)
    }

    pub fn module_metadata(&self) -> Result<ModuleMetadata, DecodeError> {
        Ok(ModuleMetadata {
            runtime_version: self.runtime_version()?,
            image_kind: self.image_kind(),
            machine: self.machine(),
        })
    }
}
