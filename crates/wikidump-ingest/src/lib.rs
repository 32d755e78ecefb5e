//! Wikidump Ingest Library
//!
//! Streams Wikidata JSON dumps through a typed entity codec with resumable
//! progress.
//!
//! # Components
//!
//! - **entity**: decode and re-encode dump entities without loss
//! - **checkpoint**: durable progress with periodic and threshold flushes
//! - **dump**: line-oriented reader over plain or gzip dumps
//! - **pipeline**: worker pool tying the reader, codec and checkpoint together
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wikidump_ingest::checkpoint::CheckpointConfig;
//! use wikidump_ingest::config::IngestConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig {
//!         dump_path: "latest-all.json.gz".into(),
//!         checkpoint: CheckpointConfig::new("checkpoint.json", Duration::from_secs(300), 1000),
//!         workers: 8,
//!         channel_capacity: 256,
//!         limit: None,
//!         show_progress: true,
//!     };
//!     let stats = wikidump_ingest::pipeline::run(config).await?;
//!     println!("{} entities", stats.entities);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checkpoint;
pub mod config;
pub mod dump;
pub mod entity;
pub mod pipeline;

pub use checkpoint::{Checkpoint, CheckpointConfig, CheckpointError, CheckpointManager};
pub use entity::{decode_entity, encode_entity, CodecError, Entity};
