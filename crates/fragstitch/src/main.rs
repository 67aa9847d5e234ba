use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use env_logger::Env;
use fragstitch_core::{config::parse_box_type, StitchConfig, Strictness};
use log::*;

use std::{io::Write, path::PathBuf, process::ExitCode};

use crate::stitch::{error_chain, stitch_files};

mod reporter;
mod stitch;

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None, author = "Jonathan Nilsson")]
struct Cli {
    /// Input JSON fragment manifest
    #[clap(long)]
    input: Option<PathBuf>,

    /// Source MP4 to read samples from
    #[clap(long = "inMP4", value_name = "IN_MP4")]
    in_mp4: Option<PathBuf>,

    /// Destination MP4 to write to, created or truncated
    #[clap(long)]
    output: Option<PathBuf>,

    /// Verbosity, 1 prints every fragment and chunk, 2 and up prints everything
    #[clap(long, default_value_t = 0)]
    verbosity: u8,

    /// How to treat overlapping or misplaced fragments in the manifest
    #[clap(long, value_enum, default_value_t = Validation::Strict)]
    strictness: Validation,

    /// Box type written after the payload size of fragments with a header
    #[clap(long, value_parser = box_type_parser, default_value = "mdat")]
    box_type: [u8; 4],

    /// Final size of the output file in bytes
    #[clap(long)]
    output_size: Option<u64>,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum Validation {
    /// Trust the manifest
    Trust,
    /// Warn about problems and carry on
    Warn,
    /// Refuse to run on any problem
    #[default]
    Strict,
}

impl From<Validation> for Strictness {
    fn from(validation: Validation) -> Self {
        match validation {
            Validation::Trust => Strictness::Trust,
            Validation::Warn => Strictness::Warn,
            Validation::Strict => Strictness::Strict,
        }
    }
}

fn box_type_parser(s: &str) -> Result<[u8; 4], String> {
    parse_box_type(s).ok_or_else(|| format!("Box type '{}' is not four ASCII characters", s))
}

fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default())
        .filter_level(level_filter(cli.verbosity))
        .target(env_logger::Target::Stdout)
        .format(|buf, record| {
            let level = record.level();
            if level == Level::Info {
                writeln!(buf, "{}", record.args())
            } else {
                writeln!(buf, "{}: {}", record.level(), record.args())
            }
        })
        .init();

    let input = match cli.input {
        Some(input) => input,
        None => {
            Cli::command().print_help()?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    let (in_mp4, output) = match (cli.in_mp4, cli.output) {
        (Some(in_mp4), Some(output)) => (in_mp4, output),
        (None, _) => missing_argument("--inMP4"),
        (_, None) => missing_argument("--output"),
    };

    let config = StitchConfig {
        strictness: cli.strictness.into(),
        box_type: cli.box_type,
        output_size: cli.output_size,
    };

    let run = match stitch_files(&input, &in_mp4, &output, &config) {
        Ok(run) => run,
        Err(err) => {
            error!("{}", error_chain(&err));
            return Ok(ExitCode::FAILURE);
        }
    };
    let report = &run.report;

    info!(
        "Fragments: {} attempted, {} succeeded, {} failed",
        report.attempted,
        report.succeeded,
        report.failed()
    );

    for failure in &report.failures {
        error!(
            "{} in fragment {} (track {}): {}",
            failure.error.kind(),
            failure.index,
            failure.track_id,
            error_chain(&failure.error)
        );
    }

    if let Some(err) = &run.finalize_error {
        error!("{}", error_chain(err));
    }

    Ok(if run.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn missing_argument(flag: &str) -> ! {
    Cli::command()
        .error(
            ErrorKind::MissingRequiredArgument,
            format!("the following required argument was not provided: {}", flag),
        )
        .exit()
}
