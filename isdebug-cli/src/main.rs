mod report;

use anyhow::Result;
use clap::Parser;
use isdebug_core::{Classifier, InspectionReport};
use std::process::ExitCode;

/// Tells whether a .NET module was built with JIT optimizations disabled
#[derive(Parser)]
#[command(
    name = "isdebug",
    about = "Check whether a .NET module is a debug build",
    version,
    author
)]
struct Cli {
    /// Print the report as JSON instead of text
    #[arg(long)]
    json: bool,

    /// <fileName> [-S]; -S suppresses all output
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    args: Vec<String>,
}

/// Exit status for reports the core could not produce.
const EXIT_FAILURE: u8 = 2;

/// What the positional arguments ask for.
#[derive(Debug, PartialEq, Eq)]
enum Invocation<'a> {
    Usage,
    Inspect { file: &'a str, verbose: bool },
}

impl<'a> Invocation<'a> {
    fn from_args(args: &'a [String]) -> Self {
        match args {
            [file] => Invocation::Inspect {
                file: file.as_str(),
                verbose: true,
            },
            [file, flag] => Invocation::Inspect {
                file: file.as_str(),
                verbose: flag != "-S",
            },
            _ => Invocation::Usage,
        }
    }
}

fn exit_code(report: &InspectionReport) -> u8 {
    u8::from(report.is_debug)
}

fn inspect(file: &str, verbose: bool, json: bool) -> Result<u8> {
    let report = Classifier::new().inspect(file)?;
    log::info!("{file}: debug = {}", report.is_debug);

    if verbose {
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report::Narrative(&report));
        }
    }
    Ok(exit_code(&report))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let (file, verbose) = match Invocation::from_args(&cli.args) {
        Invocation::Usage => {
            print!("{}", report::USAGE);
            return ExitCode::SUCCESS;
        }
        Invocation::Inspect { file, verbose } => (file, verbose),
    };

    match inspect(file, verbose, cli.json) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            if verbose {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
