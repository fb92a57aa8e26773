mod cli;

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use log::debug;

/// Plugwire: inspect plugin trees and how their components resolve
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Also recognise .yml/.yaml plugin descriptors
    #[arg(long, global = true)]
    yaml: bool,

    /// Default requirement map (.json, .yaml/.yml or .toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the plugins found under a directory
    Scan {
        /// Directory to search for plugin folders
        dir: PathBuf,
    },
    /// List providers of a component
    Providers {
        dir: PathBuf,
        component: String,
        /// Include providers of subtypes (`shape` also lists `shape.circle`)
        #[arg(long)]
        subtypes: bool,
        /// List every registered version instead of the best per plugin
        #[arg(long)]
        all_versions: bool,
    },
    /// Show which plugin version a requirement selects
    Resolve {
        dir: PathBuf,
        component: String,
        /// Requirement such as `greeter:>=1.0.0`; defaults to the configured one
        #[arg(long, value_name = "REQ")]
        require: Option<String>,
    },
    /// Check every consumed component can be resolved and print the load order
    Check { dir: PathBuf },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let result = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.verbose);
    debug!("Parsed args: {:?}", args);

    match cli::run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
