//! Ingestion configuration
//!
//! Every value is explicit; defaults live in the CLI layer only.

use crate::checkpoint::CheckpointConfig;
use std::path::PathBuf;

/// Settings for one pipeline run
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Dump file, plain or gzip-compressed (`.gz`)
    pub dump_path: PathBuf,
    /// Checkpoint persistence settings
    pub checkpoint: CheckpointConfig,
    /// Number of concurrent decode workers
    pub workers: usize,
    /// Capacity of the channel between the dump reader and the workers
    pub channel_capacity: usize,
    /// Stop after dispatching this many entities
    pub limit: Option<u64>,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl IngestConfig {
    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be greater than 0");
        }
        if self.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be greater than 0");
        }
        self.checkpoint.validate()?;
        Ok(())
    }

    /// Entities that may be dispatched but unfinished at any moment: one per
    /// worker plus those queued in the channel
    pub fn in_flight_window(&self) -> u64 {
        (self.workers + self.channel_capacity) as u64
    }
}
