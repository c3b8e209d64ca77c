//! caplayout command line driver.
//!
//! Opens each input binary as a DWARF source, schedules one scraper job per
//! source on the worker pool, and reports the collected results. Exit
//! codes: 0 on success, 1 when any scraper failed, 2 on usage errors
//! (reported by clap).

mod args;

use std::process::ExitCode;
use std::sync::Arc;
use std::{env, thread};

use anyhow::Context;
use clap::Parser;

use args::{Cli, Command};
use caplayout_core::{DwarfSource, Scheduler, StorageManager, StructLayoutScraper};
use caplayout_utils::{init_logging_with_level, LogFormat, LogLevel};

fn main() -> ExitCode
{
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LogLevel::Info,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    let format = env::var("CAPLAYOUT_LOG_FORMAT")
        .ok()
        .and_then(|value| value.parse::<LogFormat>().ok())
        .unwrap_or(LogFormat::Pretty);
    if let Err(err) = init_logging_with_level(level, format) {
        eprintln!("Failed to initialize logging: {err}");
        return ExitCode::from(1);
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            tracing::error!(error = format_args!("{err:#}"), "extraction aborted");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool>
{
    match cli.command {
        Command::Extract {
            binaries,
            strip_prefix,
            output,
            workers,
        } => {
            let storage = Arc::new(
                StorageManager::open(&output).with_context(|| format!("cannot open database {}", output.display()))?,
            );
            let workers = workers
                .unwrap_or_else(|| thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1));
            let scheduler = Scheduler::new(workers);

            let mut pending = Vec::new();
            let mut clean = true;
            for path in &binaries {
                match DwarfSource::open(path) {
                    Ok(source) => {
                        let scraper = StructLayoutScraper::new(storage.clone(), source, strip_prefix.clone());
                        pending.push(scheduler.schedule(scraper));
                    }
                    Err(err) => {
                        tracing::error!(binary = %path.display(), error = %err, "cannot open DWARF source");
                        clean = false;
                    }
                }
            }

            for receiver in pending {
                match receiver.recv() {
                    Ok(result) => {
                        if result.is_ok() {
                            tracing::info!(
                                source = %result.source.display(),
                                units = result.stats.units,
                                struct_types = result.stats.struct_types,
                                members = result.stats.members,
                                dup_structs = result.stats.dup_structs,
                                "scrape finished"
                            );
                        } else {
                            clean = false;
                            for error in &result.errors {
                                tracing::error!(source = %result.source.display(), "{error}");
                            }
                        }
                    }
                    Err(_) => {
                        tracing::error!("scraper job terminated without a result");
                        clean = false;
                    }
                }
            }

            scheduler.wait();
            Ok(clean)
        }
    }
}
