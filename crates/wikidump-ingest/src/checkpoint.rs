//! Durable ingestion progress
//!
//! [`CheckpointManager`] keeps one [`Checkpoint`] in memory and persists it
//! when either trigger fires:
//!
//! - `items_threshold` updates have accumulated since the last flush
//!   (synchronously, inside [`CheckpointManager::update_progress`])
//! - the `save_interval` timer ticks while there is unflushed progress
//!   (background task; failures are logged and retried on the next tick)
//!
//! Flushes write a sibling `.tmp` file and rename it over the checkpoint, so
//! a crash mid-write leaves the previous snapshot intact.
//!
//! # Positions under concurrent workers
//!
//! With several workers completing out of order, `position` is the position
//! of the most recently *reported* item, not a completion watermark. Items
//! before it may still be in flight. After a restart the driver must
//! re-dispatch from [`Checkpoint::resume_position`] with the number of items
//! it allows in flight, and its processing must tolerate seeing those items
//! twice. The manager cannot check this bound; it is the caller's obligation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Error types for checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt checkpoint file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid checkpoint configuration: {0}")]
    InvalidConfig(String),

    #[error("Checkpoint manager requires a Tokio runtime: {0}")]
    Runtime(String),
}

/// Checkpoint settings, all supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointConfig {
    /// Checkpoint file location
    pub path: PathBuf,
    /// Period of the background flush
    pub save_interval: Duration,
    /// Updates since the last flush that force a synchronous flush
    pub items_threshold: u64,
}

impl CheckpointConfig {
    pub fn new(path: impl Into<PathBuf>, save_interval: Duration, items_threshold: u64) -> Self {
        Self {
            path: path.into(),
            save_interval,
            items_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.items_threshold == 0 {
            return Err(CheckpointError::InvalidConfig(
                "items_threshold must be greater than 0".to_string(),
            ));
        }
        if self.save_interval.is_zero() {
            return Err(CheckpointError::InvalidConfig(
                "save_interval must be greater than 0".to_string(),
            ));
        }
        if self.path.file_name().is_none() {
            return Err(CheckpointError::InvalidConfig(format!(
                "checkpoint path {} does not name a file",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Persisted progress snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Items reported across all runs
    pub total_items: u64,
    /// When the snapshot was written
    #[serde(rename = "timestamp")]
    pub saved_at: DateTime<Utc>,
    /// Id of the last reported item; informational only
    pub last_item_id: String,
    /// Dump position of the last reported item
    pub position: u64,
}

impl Checkpoint {
    /// First position to re-dispatch when up to `in_flight` items may have
    /// been reported out of order
    pub fn resume_position(&self, in_flight: u64) -> u64 {
        self.position.saturating_sub(in_flight)
    }
}

#[derive(Debug)]
struct State {
    checkpoint: Checkpoint,
    items_since_flush: u64,
    dirty: bool,
}

#[derive(Debug)]
struct Shared {
    config: CheckpointConfig,
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State is always left consistent between statements, so a panic in
        // another holder does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flush if dirty; returns whether a snapshot was written
    fn flush(&self) -> Result<bool> {
        let mut state = self.lock();
        self.flush_locked(&mut state)
    }

    fn flush_locked(&self, state: &mut State) -> Result<bool> {
        if !state.dirty {
            return Ok(false);
        }

        state.checkpoint.saved_at = Utc::now();
        let data = serde_json::to_vec_pretty(&state.checkpoint)?;
        self.write_atomically(&data)?;

        state.items_since_flush = 0;
        state.dirty = false;
        debug!(
            path = %self.config.path.display(),
            total_items = state.checkpoint.total_items,
            position = state.checkpoint.position,
            "Saved checkpoint"
        );
        Ok(true)
    }

    fn write_atomically(&self, data: &[u8]) -> Result<()> {
        let temp_path = self.config.temp_path();
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| CheckpointError::Io { path, source }
        };

        let mut file = File::create(&temp_path).map_err(io_error(&temp_path))?;
        file.write_all(data).map_err(io_error(&temp_path))?;
        file.sync_all().map_err(io_error(&temp_path))?;
        drop(file);

        fs::rename(&temp_path, &self.config.path).map_err(io_error(&self.config.path))
    }
}

/// Read the checkpoint at `path`; a missing file is an empty checkpoint
pub fn read_checkpoint(path: &Path) -> Result<Checkpoint> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "No checkpoint found, starting from the beginning");
            return Ok(Checkpoint::default());
        },
        Err(source) => {
            return Err(CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            })
        },
    };

    let checkpoint: Checkpoint =
        serde_json::from_slice(&data).map_err(|source| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
    info!(
        path = %path.display(),
        total_items = checkpoint.total_items,
        position = checkpoint.position,
        last_item_id = %checkpoint.last_item_id,
        saved_at = %checkpoint.saved_at,
        "Loaded checkpoint"
    );
    Ok(checkpoint)
}

/// Owner of the in-memory checkpoint and its background flush task
///
/// All operations serialize through one lock; an update and the flush it
/// triggers form a single critical section. Call [`close`](Self::close) on
/// shutdown: it stops the background task and performs the final flush.
/// Dropping the manager without closing stops the task but does not flush.
#[derive(Debug)]
pub struct CheckpointManager {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    autosave: Option<JoinHandle<()>>,
}

impl CheckpointManager {
    /// Load the checkpoint at `config.path` and start the background flush
    ///
    /// A missing file yields an empty checkpoint. A file that cannot be parsed
    /// is an error: progress is never guessed from corrupt state.
    /// Must be called from within a Tokio runtime.
    pub fn open(config: CheckpointConfig) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CheckpointError::Runtime(e.to_string()))?;

        let checkpoint = read_checkpoint(&config.path)?;
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(State {
                checkpoint,
                items_since_flush: 0,
                dirty: false,
            }),
        });

        let cancel = CancellationToken::new();
        let autosave = runtime.spawn(autosave(Arc::clone(&shared), cancel.clone()));

        Ok(Self {
            shared,
            cancel,
            autosave: Some(autosave),
        })
    }

    /// Record that the item at `position` was processed
    ///
    /// Flushes before returning once `items_threshold` updates have
    /// accumulated; a failed flush is returned and retried on the next
    /// update or tick.
    pub fn update_progress(&self, position: u64, item_id: &str) -> Result<()> {
        let mut state = self.shared.lock();
        state.checkpoint.position = position;
        state.checkpoint.last_item_id.clear();
        state.checkpoint.last_item_id.push_str(item_id);
        state.checkpoint.total_items += 1;
        state.items_since_flush += 1;
        state.dirty = true;

        if state.items_since_flush >= self.shared.config.items_threshold {
            self.shared.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// Write the snapshot now if there is unflushed progress
    pub fn flush(&self) -> Result<()> {
        self.shared.flush().map(|_| ())
    }

    /// Copy of the in-memory snapshot
    pub fn checkpoint(&self) -> Checkpoint {
        self.shared.lock().checkpoint.clone()
    }

    /// Whether the in-memory snapshot has unflushed progress
    pub fn is_dirty(&self) -> bool {
        self.shared.lock().dirty
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.shared.config
    }

    /// Stop the background task, then flush the latest state
    pub async fn close(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(handle) = self.autosave.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Checkpoint autosave task ended abnormally");
            }
        }

        let shared = Arc::clone(&self.shared);
        match tokio::task::spawn_blocking(move || shared.flush()).await {
            Ok(result) => result.map(|_| ()),
            // Blocking pool unavailable or the flush panicked; retry inline.
            Err(_) => self.flush(),
        }
    }
}

impl Drop for CheckpointManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn autosave(shared: Arc<Shared>, cancel: CancellationToken) {
    let period = shared.config.save_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let shared = Arc::clone(&shared);
                match tokio::task::spawn_blocking(move || shared.flush()).await {
                    Ok(Ok(true)) => debug!("Autosaved checkpoint"),
                    Ok(Ok(false)) => {},
                    Ok(Err(e)) => warn!(error = %e, "Failed to autosave checkpoint, retrying next tick"),
                    Err(e) => warn!(error = %e, "Checkpoint autosave flush did not complete"),
                }
            }
        }
    }

    debug!("Checkpoint autosave stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_position_saturates() {
        let checkpoint = Checkpoint {
            position: 10,
            ..Checkpoint::default()
        };
        assert_eq!(checkpoint.resume_position(4), 6);
        assert_eq!(checkpoint.resume_position(40), 0);
    }

    #[test]
    fn test_config_validation() {
        let config = CheckpointConfig::new("cp.json", Duration::from_secs(1), 0);
        assert!(matches!(config.validate(), Err(CheckpointError::InvalidConfig(_))));

        let config = CheckpointConfig::new("cp.json", Duration::ZERO, 10);
        assert!(matches!(config.validate(), Err(CheckpointError::InvalidConfig(_))));

        let config = CheckpointConfig::new("cp.json", Duration::from_secs(1), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let config = CheckpointConfig::new("/data/run/checkpoint.json", Duration::from_secs(1), 1);
        assert_eq!(config.temp_path(), PathBuf::from("/data/run/checkpoint.json.tmp"));
    }

    #[test]
    fn test_open_outside_runtime_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckpointConfig::new(dir.path().join("cp.json"), Duration::from_secs(1), 1);
        let err = CheckpointManager::open(config).unwrap_err();
        assert!(matches!(err, CheckpointError::Runtime(_)));
    }

    #[test]
    fn test_snapshot_wire_format() {
        let checkpoint: Checkpoint = serde_json::from_str(
            r#"{"total_items": 5, "timestamp": "2024-01-18T10:00:00Z", "last_item_id": "Q5", "position": 7}"#,
        )
        .unwrap();
        assert_eq!(checkpoint.total_items, 5);
        assert_eq!(checkpoint.position, 7);
        assert_eq!(checkpoint.last_item_id, "Q5");
        assert_eq!(checkpoint.saved_at.to_rfc3339(), "2024-01-18T10:00:00+00:00");
    }
}
