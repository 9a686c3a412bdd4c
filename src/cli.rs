use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::warn;

use crate::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::pipeline::Strategy;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sequential,
    Parallel,
    Hybrid,
}

impl From<Mode> for Strategy {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Sequential => Strategy::Sequential,
            Mode::Parallel => Strategy::Parallel,
            Mode::Hybrid => Strategy::Hybrid,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Encrypted document to recover the password for
    pub document: PathBuf,

    /// Candidate password list, one per line
    pub wordlist: PathBuf,

    /// Search strategy (overrides config)
    #[arg(short, long, value_enum)]
    pub mode: Option<Mode>,

    /// Number of worker threads, clamped to 1..=32 (overrides config)
    #[arg(short, long, allow_negative_numbers = true)]
    pub threads: Option<i64>,

    /// Candidates per worker chunk in parallel mode (overrides config)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size: Option<u64>,

    /// Run timeout, in seconds (overrides config)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Skip confirming that a matching password decrypts the package
    #[arg(long)]
    pub no_verify: bool,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Write a JSON run report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Emit log lines as JSON
    #[arg(long)]
    pub log_json: bool,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}

impl CliOptions {
    /// Requested thread count clamped into the supported range.
    pub fn thread_count(&self) -> Option<usize> {
        self.threads.map(|requested| {
            let clamped = requested.clamp(MIN_CONCURRENCY as i64, MAX_CONCURRENCY as i64);
            if clamped != requested {
                warn!(
                    "--threads {requested} out of range {MIN_CONCURRENCY}..={MAX_CONCURRENCY}; using {clamped}"
                );
            }
            clamped as usize
        })
    }
}
