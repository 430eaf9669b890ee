//! Concurrent transfer engine
//!
//! Transfers are split into contiguous parts and moved by a bounded set of spawned tasks:
//!
//! - [`config`]: transfer tuning ([`TransferSpec`])
//! - [`partition`]: planning the byte ranges of a transfer
//! - [`engine`]: the parallel worker pool, with cancel-on-first-error semantics
//! - [`progress`]: the reporter capability the engine calls into
//! - [`sink`]: positional sinks and sources the workers read and write
//!
//! ## Usage Example
//!
//! ```no_run
//! use sif_library_client::concurrency::{
//!     MemoryBuffer, NoopProgress, PositionalSink, TransferEngine, TransferSpec,
//! };
//! use sif_library_client::LibraryError;
//! use sif_library_client::logging::Logger;
//!
//! # async fn example() -> sif_library_client::Result<()> {
//! use std::sync::Arc;
//!
//! let source = Arc::new(b"some bytes to move".to_vec());
//! let sink = Arc::new(MemoryBuffer::new());
//! let engine = TransferEngine::new(Logger::new(false));
//! let (from, to) = (Arc::clone(&source), Arc::clone(&sink));
//! engine
//!     .transfer(source.len() as i64, &TransferSpec::new(4, 5), move |part| {
//!         let (source, sink) = (Arc::clone(&from), Arc::clone(&to));
//!         async move {
//!             let range = part.start as usize..=part.end as usize;
//!             sink.write_at(&source[range], part.start)?;
//!             Ok::<u64, LibraryError>(part.len())
//!         }
//!     }, &NoopProgress)
//!     .await?;
//! assert_eq!(sink.to_vec(), *source);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod partition;
pub mod progress;
pub mod sink;

pub use config::TransferSpec;
pub use engine::TransferEngine;
pub use partition::{PartDescriptor, TransferPlan, plan};
pub use progress::{ConsoleProgress, NoopProgress, ProgressReporter};
pub use sink::{MemoryBuffer, PositionalSink, PositionalSource};
