//! `ext-line-sort` sorts line-delimited text files that do not fit into memory.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it sorts chunks of data that each fit in RAM, during the second pass it merges the sorted chunks
//! together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Opaque records:**
//!   every line is a record, ordered by a caller supplied compare function and written back unchanged.
//! * **Bounded memory:**
//!   the number of chunks is derived from the memory available on the machine, a fixed memory budget or
//!   any custom [`ChunkPolicy`].
//! * **Bounded disk:**
//!   sorting refuses to start when the scratch filesystem cannot hold three times the source size.
//! * **No leftovers:**
//!   chunk files are deleted as soon as they are merged and every temporary file goes away on failure.
//!   The sorted file is handed over as a [`TempArtifact`] that is deleted on drop unless persisted.
//! * **Multithreading support:**
//!   chunks are planned as independent byte spans, so they can be sorted in parallel.
//!
//! # Example
//!
//! ```no_run
//! use std::path;
//!
//! use bytesize::MB;
//!
//! use ext_line_sort::ExternalSorterBuilder;
//!
//! fn main() {
//!     let sorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_memory_limit(50 * MB)
//!         .build()
//!         .unwrap();
//!
//!     let sorted = sorter.sort(path::Path::new("input.txt")).unwrap();
//!     sorted.persist("output.txt").unwrap();
//! }
//! ```

pub mod buffer;
pub mod chunk;
pub mod error;
pub mod generator;
pub mod lifecycle;
pub mod merger;
pub mod plan;
pub mod sort;
pub mod source;

pub use buffer::RecordBuffer;
pub use chunk::{sort_chunk, ChunkArtifact};
pub use error::{Error, Result};
pub use generator::RandomContentGenerator;
pub use lifecycle::{ScratchDir, ScratchStorage, TempArtifact};
pub use merger::{merge_chunks, merge_into, BinaryHeapMerger};
pub use plan::{plan_chunks, AvailableMemory, ChunkPolicy, ChunkSpan, FixedChunks, MemoryBudget};
pub use sort::{ExternalSorter, ExternalSorterBuilder};
pub use source::SpanRecords;
