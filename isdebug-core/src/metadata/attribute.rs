use super::heaps::read_compressed_u32;
use crate::error::DecodeError;
use crate::reader::ReadAt;
use bitflags::bitflags;
use serde::Serialize;

pub const DEBUGGABLE_NAMESPACE: &str = "System.Diagnostics";
pub const DEBUGGABLE_NAME: &str = "DebuggableAttribute";

const ELEMENT_TYPE_BOOLEAN: u8 = 0x02;
const CUSTOM_ATTRIBUTE_PROLOG: u16 = 0x0001;

bitflags! {
    /// `DebuggableAttribute.DebuggingModes`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct DebuggingModes: u32 {
        const DEFAULT = 0x0001;
        const IGNORE_SYMBOL_STORE_SEQUENCE_POINTS = 0x0002;
        const ENABLE_EDIT_AND_CONTINUE = 0x0004;
        const DISABLE_OPTIMIZATIONS = 0x0100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DebugOutputKind {
    Full,
    PdbOnly,
}

impl std::fmt::Display for DebugOutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebugOutputKind::Full => write!(f, "Full"),
            DebugOutputKind::PdbOnly => write!(f, "pdb-only"),
        }
    }
}

/// What one `DebuggableAttribute` says about how the module was compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DebugConfiguration {
    pub debugging_modes: DebuggingModes,
    pub is_full_debug_info: bool,
    pub is_jit_optimization_disabled: bool,
    pub debug_output: DebugOutputKind,
}

impl DebugConfiguration {
    pub fn from_modes(modes: DebuggingModes) -> Self {
        Self {
            debugging_modes: modes,
            is_full_debug_info: modes.contains(DebuggingModes::DEFAULT),
            is_jit_optimization_disabled: modes.contains(DebuggingModes::DISABLE_OPTIMIZATIONS),
            debug_output: if modes.intersects(DebuggingModes::DEFAULT) {
                DebugOutputKind::Full
            } else {
                DebugOutputKind::PdbOnly
            },
        }
    }

    /// Decodes an attribute instance from its constructor signature and value blob.
    ///
    /// Two constructors exist: `(bool isJITTrackingEnabled, bool isJITOptimizerDisabled)`
    /// and `(DebuggingModes modes)`. The enum is encoded as its int32 underlying value.
    pub fn decode(ctor_signature: &[u8], value: &[u8]) -> Result<Self, DecodeError> {
        // HASTHIS calling convention byte, then the parameter count.
        let mut pos = 1;
        let params = read_compressed_u32(ctor_signature, &mut pos)?;
        // Skip the return type (VOID).
        pos += 1;

        let prolog = value.u16_at(0)?;
        if prolog != CUSTOM_ATTRIBUTE_PROLOG {
            return Err(DecodeError::Metadata(format!(
                "custom attribute prolog {prolog:#06x}"
            )));
        }

        let modes = match params {
            2 if ctor_signature.bytes_at(pos, 2)? == [ELEMENT_TYPE_BOOLEAN; 2] => {
                let mut modes = DebuggingModes::empty();
                if value.u8_at(2)? != 0 {
                    modes |= DebuggingModes::DEFAULT;
                }
                if value.u8_at(3)? != 0 {
                    modes |= DebuggingModes::DISABLE_OPTIMIZATIONS;
                }
                modes
            }
            1 => DebuggingModes::from_bits_retain(value.u32_at(2)?),
            _ => {
                return Err(DecodeError::Metadata(format!(
                    "unexpected {DEBUGGABLE_NAME} constructor with {params} parameters"
                )))
            }
        };
        Ok(Self::from_modes(modes))
    }
}
