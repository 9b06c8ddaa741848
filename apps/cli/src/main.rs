//! ragpipe CLI: retrieval-augmented generation workflows from the terminal.
//!
//! Indexes CSV rows or a folder of mixed-format files into an in-memory
//! document store and answers questions over them, or runs a
//! metadata-filtered keyword search.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
