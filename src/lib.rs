//! `ext-line-sort` is an external merge sort for text files of numbered lines.
//!
//! Every line of the input has the shape `<number>. <text>`. Lines are ordered by their text part
//! (case-insensitive) and lines with equal text by their number, e.g.
//!
//! ```text
//! 415. Apple
//! 30432. Something something something
//! 1. Apple
//! 32. Cherry is the best
//! 2. Banana is yellow
//! ```
//!
//! is sorted into
//!
//! ```text
//! 1. Apple
//! 415. Apple
//! 2. Banana is yellow
//! 32. Cherry is the best
//! 30432. Something something something
//! ```
//!
//! Sorting is achieved in two passes. During the first pass the input is split into chunks that fit in RAM,
//! chunks are sorted in parallel and stored to temporary files. During the second pass the temporary files are
//! merged together into the result file. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Bounded memory:**
//!   input is read through a fixed size buffer, chunks are limited by size and pipeline stages are connected by
//!   single slot channels, so memory consumption does not depend on the input size.
//! * **Multithreading support:**
//!   chunks are sorted by a pool of worker threads while the next chunk is being read.
//! * **Single pass merge:**
//!   all temporary files are merged at once with a binary heap.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use ext_line_sort::ExternalSorterBuilder;
//!
//! fn main() {
//!     let sorter = ExternalSorterBuilder::new()
//!         .with_rw_buf_size(1024 * 1024)
//!         .with_chunk_size(100 * 1024 * 1024)
//!         .build()
//!         .unwrap();
//!
//!     // writes text.sorted.txt next to the input
//!     let sorted = sorter.sort_file(Path::new("text.txt")).unwrap();
//!     println!("{}", sorted.display());
//! }
//! ```

pub mod buffer;
pub mod chunk;
pub mod config;
pub mod gate;
pub mod generator;
pub mod heap;
pub mod merger;
pub mod record;
pub mod sort;

pub use buffer::{Chunk, ChunkBuffer, ChunkReader};
pub use chunk::{ChunkFileReader, TempFiles};
pub use config::{AppSettings, SortSettings};
pub use gate::AdmissionGate;
pub use merger::HeapMerger;
pub use record::{Key, Line, RecordError};
pub use sort::{sorted_path, ExternalSorter, ExternalSorterBuilder, SortError};
