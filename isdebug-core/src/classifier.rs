use crate::binary::PeImage;
use crate::error::LoadError;
use crate::header::{ExecutableHeaderInfo, UtcOffset};
use crate::metadata::DebugConfiguration;
use crate::module::{ManagedModule, ModuleMetadata};
use crate::resources;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// Everything learned about one file. `is_debug` is the verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InspectionReport {
    pub file_name: Option<String>,
    pub directory: Option<PathBuf>,
    pub path: Option<PathBuf>,
    pub file_version: Option<String>,
    pub header: Option<ExecutableHeaderInfo>,
    pub is_managed: bool,
    /// Why a load failed for a reason other than the file's format.
    pub load_error: Option<String>,
    pub module: Option<ModuleMetadata>,
    /// The last `DebuggableAttribute` found, if any.
    pub debug: Option<DebugConfiguration>,
    pub is_debug: bool,
}

impl InspectionReport {
    /// A file that does not exist: nothing analyzed, not debug.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Decides whether a module was built with the JIT optimizer disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    utc_offset: UtcOffset,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a fixed UTC offset (seconds east) instead of the host timezone.
    pub fn with_utc_offset(seconds: i32) -> Self {
        Self {
            utc_offset: UtcOffset::Fixed(seconds),
        }
    }

    pub fn inspect<P: AsRef<Path>>(&self, path: P) -> Result<InspectionReport> {
        let path = path.as_ref();
        if !path.is_file() {
            log::info!("{} does not exist", path.display());
            return Ok(InspectionReport::default());
        }

        let path = std::path::absolute(path)
            .with_context(|| format!("resolving {}", path.display()))?;
        let mut report = InspectionReport {
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            directory: path.parent().map(Path::to_path_buf),
            path: Some(path.clone()),
            ..Default::default()
        };

        let module = match PeImage::open(&path).and_then(|image| {
            report.file_version = resources::file_version(&image).map(|v| v.to_string());
            ManagedModule::from_image(image)
        }) {
            Ok(module) => module,
            Err(LoadError::BadImageFormat(reason)) => {
                log::info!("not a managed module: {reason}");
                self.read_header_lossy(&mut report, &path);
                return Ok(report);
            }
            Err(e) => {
                log::warn!("failed to load {}: {e}", path.display());
                report.load_error = Some(e.to_string());
                self.read_header_lossy(&mut report, &path);
                return Ok(report);
            }
        };

        report.header = Some(
            ExecutableHeaderInfo::read(&path, self.utc_offset)
                .with_context(|| format!("reading linker timestamp of {}", path.display()))?,
        );
        report.is_managed = true;

        report.module = Some(
            module
                .module_metadata()
                .context("reading module metadata")?,
        );

        let attributes = module
            .debuggable_attributes()
            .context("scanning custom attributes")?;
        if attributes.len() > 1 {
            log::warn!(
                "{} DebuggableAttribute instances; using the last",
                attributes.len()
            );
        }
        report.debug = attributes.last().copied();
        report.is_debug = report
            .debug
            .is_some_and(|d| d.is_jit_optimization_disabled);

        Ok(report)
    }

    /// Fills the header of a module that failed to load. A missing timestamp is not
    /// an error here; an I/O failure is kept as the load error if none was recorded.
    fn read_header_lossy(&self, report: &mut InspectionReport, path: &Path) {
        match ExecutableHeaderInfo::read(path, self.utc_offset) {
            Ok(header) => report.header = Some(header),
            Err(e) => {
                log::debug!("no linker timestamp for {}: {e}", path.display());
                if e.downcast_ref::<io::Error>().is_some() && report.load_error.is_none() {
                    report.load_error = Some(e.to_string());
                }
            }
        }
    }
}
