//! Command-line surface: `pidwatch <PID> [--out|-o <file>]`

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

pub const OUT_MISSING_VALUE: &str = "Error: --out parameter requires a file path.";

#[derive(Parser, Debug)]
#[command(
    name = "pidwatch",
    version,
    about = "pidwatch - Real-time process resource monitoring tool",
    after_help = "EXAMPLES:
    pidwatch 1234
    pidwatch 1234 --out metrics.json
    pidwatch 1234 -o /tmp/process-metrics.json

TO FIND A PROCESS PID:
    Linux:   ps aux | grep your-app
    macOS:   ps aux | grep your-app
    Windows: Get-Process | Where-Object {$_.ProcessName -like '*your-app*'}"
)]
pub struct Cli {
    /// Process ID to monitor (the last integer given wins)
    #[arg(value_name = "PID", allow_negative_numbers = true)]
    pub pids: Vec<String>,

    /// Output file path; if set, JSON is written to the file instead of the console
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Delay between samples in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: Option<u64>,

    /// Stop after this many snapshots
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_samples: Option<u64>,

    /// Log filter for stderr diagnostics (error|warn|info|debug|trace)
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

impl Cli {
    /// The last positional that parses as an i32 is the PID; if that one
    /// is not positive there is no PID at all.
    pub fn pid(&self) -> Option<u32> {
        self.pids
            .iter()
            .filter_map(|arg| arg.trim().parse::<i32>().ok())
            .last()
            .and_then(|pid| u32::try_from(pid).ok())
            .filter(|&pid| pid > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    pub pid: u32,
    pub out: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub interval_ms: Option<u64>,
    pub max_samples: Option<u64>,
    pub log_level: Option<String>,
}

/// What the binary should do with its arguments. Everything except `Run`
/// prints its text and exits without sampling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Help(String),
    Version(String),
    ParamError(String),
    Run(RunArgs),
}

/// `--out` followed by another flag rather than a path.
fn is_out_missing_value(e: &clap::Error) -> bool {
    matches!(e.kind(), ErrorKind::InvalidValue | ErrorKind::NoEquals)
        && matches!(
            e.get(ContextKind::InvalidArg),
            Some(ContextValue::String(arg)) if arg.starts_with("--out") || arg.starts_with("-o")
        )
}

pub fn usage() -> String {
    Cli::command().render_help().to_string()
}

pub fn parse_args<I, T>(args: I) -> CliAction
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    if args.len() <= 1 {
        return CliAction::Help(usage());
    }
    if args
        .last()
        .is_some_and(|last| last == "--out" || last == "-o")
    {
        return CliAction::ParamError(OUT_MISSING_VALUE.to_string());
    }

    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let text = e.render().to_string();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                    CliAction::Help(text)
                }
                ErrorKind::DisplayVersion => CliAction::Version(text),
                _ if is_out_missing_value(&e) => CliAction::ParamError(OUT_MISSING_VALUE.to_string()),
                _ => CliAction::ParamError(text),
            };
        }
    };

    match cli.pid() {
        Some(pid) => CliAction::Run(RunArgs {
            pid,
            out: cli.out,
            config: cli.config,
            interval_ms: cli.interval_ms,
            max_samples: cli.max_samples,
            log_level: cli.log_level,
        }),
        None => CliAction::Help(usage()),
    }
}
