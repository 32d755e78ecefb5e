//! Wikidump Ingest - Wikidata dump ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use wikidump_common::logging::{init_logging, LogConfig, LogLevel};
use wikidump_ingest::checkpoint::{read_checkpoint, CheckpointConfig};
use wikidump_ingest::config::IngestConfig;
use wikidump_ingest::entity::{decode_entity, encode_entity};
use wikidump_ingest::pipeline;

#[derive(Parser, Debug)]
#[command(name = "wikidump-ingest")]
#[command(author, version, about = "Wikidata dump ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a dump, resuming from the checkpoint
    Run {
        /// Dump file (plain or .gz)
        #[arg(short, long, env = "WIKIDUMP_DUMP")]
        dump: PathBuf,

        /// Checkpoint file
        #[arg(short, long, env = "WIKIDUMP_CHECKPOINT", default_value = "checkpoint.json")]
        checkpoint: PathBuf,

        /// Decode workers (defaults to available parallelism)
        #[arg(short, long, env = "WIKIDUMP_WORKERS")]
        workers: Option<usize>,

        /// Seconds between background checkpoint flushes
        #[arg(long, env = "WIKIDUMP_SAVE_INTERVAL_SECS", default_value_t = 300)]
        save_interval_secs: u64,

        /// Processed entities that force a checkpoint flush
        #[arg(long, env = "WIKIDUMP_ITEMS_THRESHOLD", default_value_t = 1000)]
        items_threshold: u64,

        /// Stop after dispatching this many entities
        #[arg(long)]
        limit: Option<u64>,

        /// Frames buffered between the reader and the workers
        #[arg(long, env = "WIKIDUMP_CHANNEL_CAPACITY", default_value_t = 256)]
        channel_capacity: usize,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the stored checkpoint and where a run would resume
    Checkpoint {
        /// Checkpoint file
        #[arg(short, long, env = "WIKIDUMP_CHECKPOINT", default_value = "checkpoint.json")]
        checkpoint: PathBuf,

        /// In-flight window used to compute the resume position
        #[arg(short, long, env = "WIKIDUMP_WORKERS")]
        workers: Option<usize>,
    },

    /// Decode one entity document and print its canonical encoding
    Normalize {
        /// JSON file holding a single entity
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn default_workers(workers: Option<usize>) -> usize {
    workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("wikidump-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Run {
            dump,
            checkpoint,
            workers,
            save_interval_secs,
            items_threshold,
            limit,
            channel_capacity,
            no_progress,
        } => {
            let config = IngestConfig {
                dump_path: dump,
                checkpoint: CheckpointConfig::new(
                    checkpoint,
                    Duration::from_secs(save_interval_secs),
                    items_threshold,
                ),
                workers: default_workers(workers),
                channel_capacity,
                limit,
                show_progress: !no_progress,
            };
            let stats = pipeline::run(config).await?;
            print_json(&serde_json::to_value(&stats)?)?;
        },
        Command::Checkpoint { checkpoint, workers } => {
            let stored = read_checkpoint(&checkpoint)?;
            let window = default_workers(workers) as u64;
            print_json(&json!({
                "checkpoint": stored,
                "resume_position": stored.resume_position(window).max(1),
            }))?;
        },
        Command::Normalize { input } => {
            debug!(input = %input.display(), "Normalizing entity");
            let bytes = std::fs::read(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let entity = decode_entity(&bytes)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&encode_entity(&entity)?)?;
            writeln!(stdout)?;
        },
    }

    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
