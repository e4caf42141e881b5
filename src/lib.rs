//! A library presenting an evolving folder of (namely container log) files as
//! a single, ordered stream.
//!
//! Every file in a folder whose name starts with a given prefix is read in
//! turn, as if all of them were one file. Files named after input containers
//! (`<prefix>i1`, `<prefix>i2`, ...) come first, then workload containers,
//! then output containers (`<prefix>o1`, `<prefix>o2`, ...). Files created
//! later are picked up by an optional watch loop, driven by a fixed interval
//! and/or filesystem events from [`notify`](https://crates.io/crates/notify).
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use folderplex::FolderReader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut reader =
//!         FolderReader::new("/var/log/step", "step-", ["step-debug"], Duration::from_secs(1))
//!             .await?;
//!
//!     // Each chunk is one line of one file, in container order.
//!     while let Some(chunk) = reader.next_chunk(b'\n').await? {
//!         print!("{}", String::from_utf8_lossy(chunk.bytes()));
//!     }
//!
//!     reader.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Caveats
//!
//! Only the top level of the folder is scanned. Read order is only guaranteed
//! within one discovery batch: files found by a later scan are read after all
//! files found earlier, whatever their names.

mod config;
mod error;
mod reader;
mod scanner;
mod stream;
mod watcher;
mod weight;

pub use config::Builder;
pub use error::{CloseError, CloseFailure, Error};
pub use reader::{Chunk, Chunks, FolderReader};
pub use weight::{container_weight, ContainerKind, WORKLOAD_WEIGHT};

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
