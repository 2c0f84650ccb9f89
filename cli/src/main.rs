//! Surety CLI - drives a ledger snapshot on disk one operation at a time.
//!
//! ```text
//! main() -> Cli::parse() -> commands::run() -> load snapshot -> operation -> save
//! ```
//!
//! Logs go to stderr so command output on stdout stays scriptable.

mod commands;

use std::io::{self, Write};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::commands::Cli;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    commands::run(cli, &mut out)?;
    out.flush()?;
    Ok(())
}
