//! Dump ingestion driver
//!
//! A blocking reader streams dump entities into a bounded channel; `workers`
//! tasks pull frames from it, decode them on the blocking pool and report
//! each processed entity to the [`CheckpointManager`].
//!
//! Workers finish out of order, so the position handed to the checkpoint is a
//! completion low watermark: every entity at or below it has been processed.
//! It never moves backwards, even when a slow frame completes after many
//! later ones. A restart re-dispatches from
//! `resume_position(workers + channel_capacity)`; entities in that window may
//! be decoded twice.

use crate::checkpoint::{self, CheckpointManager};
use crate::config::IngestConfig;
use crate::dump::DumpReader;
use crate::entity::{decode_entity, Entity, EntityType};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use wikidump_common::framing::{add_line_number, parse_line_number};

/// Totals for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Entities handed to the workers
    pub dispatched: u64,
    /// Entities decoded successfully
    pub entities: u64,
    pub items: u64,
    pub properties: u64,
    pub statements: u64,
    /// Data values that carried an error instead of a payload
    pub error_values: u64,
    /// Entities that could not be decoded
    pub failures: u64,
    /// First dump position dispatched in this run
    pub resumed_from: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    entities: AtomicU64,
    items: AtomicU64,
    properties: AtomicU64,
    statements: AtomicU64,
    error_values: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn record(&self, entity: &Entity) {
        self.entities.fetch_add(1, Ordering::Relaxed);
        match entity.entity_type {
            EntityType::Item => self.items.fetch_add(1, Ordering::Relaxed),
            EntityType::Property => self.properties.fetch_add(1, Ordering::Relaxed),
        };
        self.statements
            .fetch_add(entity.statements().count() as u64, Ordering::Relaxed);
        let errors = entity.values().filter(|value| value.is_error()).count();
        self.error_values.fetch_add(errors as u64, Ordering::Relaxed);
    }

    fn snapshot(&self, resumed_from: u64) -> PipelineStats {
        PipelineStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            entities: self.entities.load(Ordering::Relaxed),
            items: self.items.load(Ordering::Relaxed),
            properties: self.properties.load(Ordering::Relaxed),
            statements: self.statements.load(Ordering::Relaxed),
            error_values: self.error_values.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            resumed_from,
        }
    }
}

/// Tracks which dispatched positions have completed
#[derive(Debug)]
struct CompletionWatermark {
    /// Lowest position not yet completed
    next: u64,
    /// Completed positions above `next`
    completed: BTreeSet<u64>,
    /// Position already known complete from an earlier run
    floor: u64,
}

impl CompletionWatermark {
    fn new(first: u64, floor: u64) -> Self {
        Self {
            next: first,
            completed: BTreeSet::new(),
            floor,
        }
    }

    /// Mark `position` complete and return the highest position with every
    /// earlier one complete
    fn complete(&mut self, position: u64) -> u64 {
        if position >= self.next {
            self.completed.insert(position);
        }
        while self.completed.remove(&self.next) {
            self.next += 1;
        }
        self.next.saturating_sub(1).max(self.floor)
    }
}

/// Checkpoint manager fed with watermark positions
///
/// Advancing the watermark and recording it happen under one lock, so a
/// lower watermark is never written after a higher one.
struct ProgressReporter {
    manager: CheckpointManager,
    watermark: Mutex<CompletionWatermark>,
}

impl ProgressReporter {
    fn new(manager: CheckpointManager, first: u64) -> Self {
        let floor = manager.checkpoint().position;
        Self {
            manager,
            watermark: Mutex::new(CompletionWatermark::new(first, floor)),
        }
    }

    fn report(&self, line: u64, item_id: &str) -> checkpoint::Result<()> {
        let mut watermark = self.watermark.lock().unwrap_or_else(PoisonError::into_inner);
        let position = watermark.complete(line);
        self.manager.update_progress(position, item_id)
    }

    async fn close(self) -> checkpoint::Result<()> {
        self.manager.close().await
    }
}

/// Ingest the dump named by `config`, resuming from its checkpoint
pub async fn run(config: IngestConfig) -> Result<PipelineStats> {
    config.validate()?;

    let manager =
        CheckpointManager::open(config.checkpoint.clone()).context("Failed to open checkpoint")?;
    let stored = manager.checkpoint();
    let resume = stored.resume_position(config.in_flight_window()).max(1);
    let reporter = Arc::new(ProgressReporter::new(manager, resume));
    info!(
        dump = %config.dump_path.display(),
        checkpoint_position = stored.position,
        resume_position = resume,
        workers = config.workers,
        "Starting ingestion"
    );

    let counters = Arc::new(Counters::default());
    let progress = create_progress(config.show_progress);
    let (tx, rx) = mpsc::channel::<Vec<u8>>(config.channel_capacity);

    let producer = {
        let path = config.dump_path.clone();
        let limit = config.limit;
        let counters = Arc::clone(&counters);
        tokio::task::spawn_blocking(move || produce(&path, resume, limit, &tx, &counters))
    };

    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    let mut workers = JoinSet::new();
    for worker_id in 0..config.workers {
        workers.spawn(work(
            worker_id,
            Arc::clone(&rx),
            Arc::clone(&reporter),
            Arc::clone(&counters),
            progress.clone(),
        ));
    }
    drop(rx);

    let mut outcome: Result<()> = Ok(());
    while let Some(joined) = workers.join_next().await {
        let result = joined
            .context("Worker task failed")
            .and_then(|result| result);
        if let Err(e) = result {
            if outcome.is_ok() {
                workers.abort_all();
                outcome = Err(e);
            }
        }
    }

    let produced = producer.await.context("Dump reader task failed").and_then(|r| r);
    if outcome.is_ok() {
        outcome = produced.map(|_| ());
    }

    let close = match Arc::try_unwrap(reporter) {
        Ok(reporter) => reporter.close().await,
        Err(reporter) => reporter.manager.flush(),
    };
    if outcome.is_ok() {
        close.context("Failed to write final checkpoint")?;
    } else if let Err(e) = close {
        warn!(error = %e, "Failed to write final checkpoint");
    }
    outcome?;

    let stats = counters.snapshot(resume);
    progress.finish_with_message(format!(
        "Ingested {} entities ({} failures)",
        stats.entities, stats.failures
    ));
    info!(
        dispatched = stats.dispatched,
        entities = stats.entities,
        items = stats.items,
        properties = stats.properties,
        statements = stats.statements,
        error_values = stats.error_values,
        failures = stats.failures,
        "Ingestion complete"
    );
    Ok(stats)
}

/// Read the dump from `resume` and send framed payloads until the end, the
/// limit, or the workers hanging up
fn produce(
    path: &std::path::Path,
    resume: u64,
    limit: Option<u64>,
    tx: &mpsc::Sender<Vec<u8>>,
    counters: &Counters,
) -> Result<u64> {
    let mut reader = DumpReader::open(path)
        .with_context(|| format!("Failed to open dump {}", path.display()))?;
    let skipped = reader.skip_to(resume)?;
    debug!(skipped, "Skipped already processed entities");

    let mut sent = 0u64;
    for entry in reader {
        if limit.is_some_and(|limit| sent >= limit) {
            info!(limit = sent, "Dispatch limit reached");
            break;
        }

        let (position, payload) = entry.context("Failed to read dump")?;
        let line = u32::try_from(position)
            .with_context(|| format!("Dump position {position} exceeds frame range"))?;
        if tx.blocking_send(add_line_number(line, &payload)).is_err() {
            debug!(position, "Workers stopped, ending dispatch");
            break;
        }
        sent += 1;
        counters.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    Ok(sent)
}

async fn work(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>>,
    reporter: Arc<ProgressReporter>,
    counters: Arc<Counters>,
    progress: ProgressBar,
) -> Result<()> {
    loop {
        let frame = { rx.lock().await.recv().await };
        let Some(frame) = frame else {
            break;
        };

        let reporter = Arc::clone(&reporter);
        let counters = Arc::clone(&counters);
        tokio::task::spawn_blocking(move || process_frame(&frame, &reporter, &counters))
            .await
            .context("Decode task failed")??;
        progress.inc(1);
    }

    debug!(worker_id, "Worker finished");
    Ok(())
}

/// Decode one frame and report it; only checkpoint failures are errors
fn process_frame(frame: &[u8], reporter: &ProgressReporter, counters: &Counters) -> Result<()> {
    let (line, payload) = parse_line_number(frame)?;

    let item_id = match decode_entity(payload) {
        Ok(entity) => {
            counters.record(&entity);
            entity.id
        },
        Err(e) => {
            counters.failures.fetch_add(1, Ordering::Relaxed);
            let item_id = e.entity_id().unwrap_or_default().to_string();
            warn!(line, item_id = %item_id, error = %e, "Failed to decode entity");
            item_id
        },
    };

    reporter
        .report(u64::from(line), &item_id)
        .with_context(|| format!("Failed to checkpoint line {line}"))?;
    Ok(())
}

fn create_progress(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {pos} entities ({per_sec}) {msg}")
    {
        Ok(style) => pb.set_style(style),
        Err(e) => warn!(error = %e, "Invalid progress template"),
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::checkpoint::{read_checkpoint, CheckpointConfig};

    fn reporter(dir: &tempfile::TempDir, items_threshold: u64, first: u64) -> ProgressReporter {
        let config = CheckpointConfig::new(
            dir.path().join("checkpoint.json"),
            Duration::from_secs(3600),
            items_threshold,
        );
        ProgressReporter::new(CheckpointManager::open(config).unwrap(), first)
    }

    fn item_frame(line: u32) -> Vec<u8> {
        let payload = format!(r#"{{"id":"Q{line}","type":"item","lastrevid":{line}}}"#);
        add_line_number(line, payload.as_bytes())
    }

    #[test]
    fn test_watermark_waits_for_earliest_gap() {
        let mut watermark = CompletionWatermark::new(1, 0);
        for position in 2..=10 {
            assert_eq!(watermark.complete(position), 0);
        }
        assert_eq!(watermark.complete(1), 10);
        assert_eq!(watermark.complete(11), 11);
    }

    #[test]
    fn test_watermark_never_drops_below_floor() {
        // Resumed at 3 with position 4 stored by the previous run
        let mut watermark = CompletionWatermark::new(3, 4);
        assert_eq!(watermark.complete(5), 4);
        assert_eq!(watermark.complete(3), 4);
        assert_eq!(watermark.complete(4), 5);
        assert_eq!(watermark.complete(6), 6);
    }

    #[tokio::test]
    async fn test_process_frame_counts_entity() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = reporter(&dir, 1000, 3);
        let counters = Counters::default();

        let payload = br#"{"id":"Q42","type":"item","lastrevid":7}"#;
        process_frame(&add_line_number(3, payload), &reporter, &counters).unwrap();

        let stats = counters.snapshot(1);
        assert_eq!(stats.entities, 1);
        assert_eq!(stats.items, 1);
        assert_eq!(stats.failures, 0);
        let checkpoint = reporter.manager.checkpoint();
        assert_eq!(checkpoint.position, 3);
        assert_eq!(checkpoint.last_item_id, "Q42");
    }

    #[tokio::test]
    async fn test_process_frame_decode_failure_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = reporter(&dir, 1000, 9);
        let counters = Counters::default();

        let payload = br#"{"id":"Q5","type":"foobar","lastrevid":1}"#;
        process_frame(&add_line_number(9, payload), &reporter, &counters).unwrap();

        assert_eq!(counters.snapshot(1).failures, 1);
        let checkpoint = reporter.manager.checkpoint();
        assert_eq!(checkpoint.position, 9);
        assert_eq!(checkpoint.last_item_id, "Q5");
    }

    #[tokio::test]
    async fn test_process_frame_rejects_short_frame() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = reporter(&dir, 1000, 1);
        assert!(process_frame(&[1, 2], &reporter, &Counters::default()).is_err());
        assert_eq!(reporter.manager.checkpoint().total_items, 0);
    }

    #[tokio::test]
    async fn test_slow_first_frame_survives_crash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let counters = Counters::default();

        // Frame 1 is still being decoded while 2..=10 finish and are flushed
        let reporter = reporter(&dir, 1, 1);
        for line in 2..=10 {
            process_frame(&item_frame(line), &reporter, &counters).unwrap();
        }
        let stored = read_checkpoint(&path).unwrap();
        assert_eq!(stored.total_items, 9);
        assert_eq!(stored.position, 0);
        assert_eq!(stored.resume_position(2).max(1), 1);

        // Late completion advances the position instead of rewinding it
        process_frame(&item_frame(1), &reporter, &counters).unwrap();
        let stored = read_checkpoint(&path).unwrap();
        assert_eq!(stored.position, 10);
        assert_eq!(stored.last_item_id, "Q1");

        // Dropping without close stands in for a crash
        drop(reporter);
        assert_eq!(read_checkpoint(&path).unwrap().position, 10);
    }
}
