use isdebug_core::InspectionReport;
use std::fmt;

pub const USAGE: &str = "
IsDebug: .NET Debug version checker.
USAGE  :  isdebug fileName [-S]
          filename = file to check
          -S Silent (no messages, just returns true/false)
Returns 1 if debug, otherwise 0

";

fn yes_no(b: bool) -> &'static str {
    if b { "True" } else { "False" }
}

/// The narrative report. A missing file renders as nothing.
pub struct Narrative<'a>(pub &'a InspectionReport);

impl fmt::Display for Narrative<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let Some(file_name) = &report.file_name else {
            return Ok(());
        };

        writeln!(f)?;
        writeln!(f, "File          : {file_name}")?;
        let dir = report
            .directory
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        writeln!(f, "Path          : {dir}")?;
        writeln!(
            f,
            "File Version  : {}",
            report.file_version.as_deref().unwrap_or("")
        )?;
        if let Some(header) = &report.header {
            writeln!(
                f,
                "Built on      : {}",
                header.built_on.format("%-m/%-d/%Y %-I:%M:%S %p")
            )?;
        }

        if let Some(err) = &report.load_error {
            writeln!(f, "Error loading {file_name}:{err}")?;
        }
        writeln!(f, ".NET Assembly: {}", yes_no(report.is_managed))?;

        if let Some(module) = &report.module {
            writeln!(f, "CLR Version   : {}", module.runtime_version)?;
            if let Some(debug) = &report.debug {
                writeln!(f, "Debuggable    : {}", yes_no(debug.is_full_debug_info))?;
                writeln!(
                    f,
                    "JIT Optimized : {}",
                    yes_no(!debug.is_jit_optimization_disabled)
                )?;
                writeln!(f, "Debug Output  : {}", debug.debug_output)?;
            }
            writeln!(f, "PE Type       : {}", module.image_kind)?;
            writeln!(f, "Machine       : {}", module.machine)?;
            writeln!(f)?;
        }
        Ok(())
    }
}
