//! CLI argument definitions

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "caplayout", version, about = "CHERI sub-object layout scraper")]
pub struct Cli
{
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command
{
    /// Extract structure layouts and sub-object bounds from DWARF binaries
    Extract
    {
        /// Binaries with DWARF debug info for a CHERI-capable target
        #[arg(required = true, value_name = "BINARY")]
        binaries: Vec<PathBuf>,

        /// Prefix stripped from declaration file paths
        #[arg(long, value_name = "PATH")]
        strip_prefix: Option<PathBuf>,

        /// Output database path
        #[arg(long, value_name = "DB", default_value = "layouts.db")]
        output: PathBuf,

        /// Worker pool size (defaults to the available parallelism)
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },
}
