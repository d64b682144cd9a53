mod commands;
mod render;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use utils::response::Response;

#[derive(Parser)]
#[command(name = "rostersync")]
#[command(about = "Reconcile staff schedules kept in a workbook against a calendar")]
struct Cli {
    /// Config file (defaults to ~/.config/rostersync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More output: full listings and info logs; repeat for debug logs
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a commented default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Show what a sync would change, without writing to the calendar
    Preview {
        /// Print a JSON envelope instead of text
        #[arg(long)]
        json: bool,
    },
    /// Preview, then apply the selected rows to the calendar
    Commit {
        /// Only commit these row ids (repeatable)
        #[arg(long = "only", value_name = "ROW_ID")]
        only: Vec<String>,

        /// Leave this field untouched: title, location, description, schedule, guests
        #[arg(long = "skip", value_name = "FIELD")]
        skip: Vec<String>,

        /// Print a JSON envelope instead of text
        #[arg(long)]
        json: bool,
    },
    /// List every event on one or more calendars between two dates
    Inspect {
        /// First day to scan, e.g. 2024-09-02 or 9/2/2024
        #[arg(long)]
        from: String,

        /// Last day to scan, inclusive
        #[arg(long)]
        to: String,

        /// Calendar to scan (repeatable; defaults to `inspect.calendars`, then the sync calendar)
        #[arg(long = "calendar", value_name = "ID")]
        calendars: Vec<String>,

        /// Print a JSON envelope instead of text
        #[arg(long)]
        json: bool,
    },
    /// Create or update exam events from the exam tabs
    Exams {
        /// Only report which exams are already on the calendar
        #[arg(long)]
        check: bool,

        /// Print a JSON envelope instead of text
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Commands::Init { .. } => false,
            Commands::Preview { json }
            | Commands::Commit { json, .. }
            | Commands::Inspect { json, .. }
            | Commands::Exams { json, .. } => *json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json = cli.command.json();
    match run(cli) {
        Err(e) if json => {
            match Response::error(&format!("{e:#}")) {
                Ok(envelope) => println!("{envelope}"),
                Err(_) => eprintln!("{e:#}"),
            }
            std::process::exit(1);
        }
        result => result,
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();
    let verbose = cli.verbose > 0;

    match cli.command {
        Commands::Init { force } => commands::init::run(config, force),
        Commands::Preview { json } => commands::preview::run(config, verbose, json),
        Commands::Commit { only, skip, json } => {
            commands::commit::run(config, only, skip, verbose, json)
        }
        Commands::Inspect {
            from,
            to,
            calendars,
            json,
        } => commands::inspect::run(config, &from, &to, calendars, json),
        Commands::Exams { check, json } => commands::exams::run(config, check, json),
    }
}

/// Logs go to stderr so stdout stays parseable. `RUST_LOG` applies unless `-v` is given.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
