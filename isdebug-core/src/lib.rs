pub mod binary;
pub mod classifier;
pub mod error;
pub mod header;
pub mod metadata;
pub mod module;
mod reader;
pub mod resources;
pub mod sections;

pub use binary::*;
pub use classifier::*;
pub use error::*;
pub use header::{ExecutableHeaderInfo, UtcOffset};
pub use metadata::{DebugConfiguration, DebugOutputKind, DebuggingModes};
pub use module::*;
