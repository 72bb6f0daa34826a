//! # unsc-ingest
//!
//! Resilient ingestion of UN Security Council meeting and resolution records.
//!
//! The upstream archive is decades old, inconsistent and flaky. Every piece of
//! work is a [`WorkUnit`] in a [`RetryQueue`]; an [`Executor`] drains the queue
//! with a fixed number of workers and failed units are retried round-robin
//! until a bound, then snapshotted for a later replay run. Documents are
//! served behind a cookie-gated chain of `<meta http-equiv="refresh">` pages,
//! which [`redirect::RedirectResolver`] follows.
//!
//! The crate is a library: it emits `tracing` events and leaves subscriber
//! setup, argument handling and PDF text extraction to the host.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use unsc_ingest::{Config, Database, Ingestor, RunOptions, TextExtractor};
//!
//! struct PdfText;
//!
//! #[async_trait]
//! impl TextExtractor for PdfText {
//!     async fn extract_text(&self, path: &Path) -> unsc_ingest::Result<String> {
//!         // call into a PDF library of your choice
//!         Ok(std::fs::read_to_string(path)?)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("ingest.json"))?;
//!     let database = Arc::new(Database::new(&config.persistence.database_path).await?);
//!
//!     let ingestor = Ingestor::new(config, database, Arc::new(PdfText));
//!     let report = ingestor
//!         .run(RunOptions {
//!             fetch_index: true,
//!             replay_file: None,
//!         })
//!         .await?;
//!
//!     println!("{:?}", report.stats);
//!     std::process::exit(report.exit_code());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Worker pool draining a retry queue
pub mod executor;
/// Index pages, page fetching and document downloads
pub mod fetch;
/// Meeting table and veto table parsers
pub mod parser;
/// Processing functions and the run driver
pub mod pipeline;
/// FIFO work queue with bounded retry
pub mod queue;
/// Meta-refresh redirect protocol
pub mod redirect;
/// Resolution id matching and lookup tables
pub mod resolution;
/// Retry classification and start delays
pub mod retry;
/// Failure snapshots and replay
pub mod snapshot;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, Persistence, UnitOfWork};
pub use error::{DatabaseError, Error, ProtocolError, Result};
pub use executor::Executor;
pub use fetch::{ArtifactDownloader, FileStore, LocalFileStore, PageFetcher};
pub use parser::{MeetingTableParser, RecordExtractor, VetoTableParser};
pub use pipeline::{Ingestor, RunOptions, RunReport, TextExtractor, UnitProcessor};
pub use queue::RetryQueue;
pub use redirect::{Artifact, RedirectResolver};
pub use resolution::{CrossReference, VetoTable};
pub use retry::{DelayPolicy, IsRetryable};
pub use types::{
    FetchTask, MeetingRecord, Payload, QueueEvent, QueueStats, RecordTask, WorkUnit,
};
