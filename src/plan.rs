//! Chunk planning.
//!
//! Decides how many chunks a source is split into and which byte span each chunk covers. No I/O
//! happens here apart from the optional live memory inquiry of [`AvailableMemory`].

use std::fmt;

use bytesize::ByteSize;
use log;
use sysinfo::System;

/// Share of the memory budget the raw chunk bytes may occupy. The rest is headroom for per-record
/// overhead once lines are materialized as strings and sorted.
pub const SAFETY_FACTOR: f64 = 0.8;

/// Byte range `[offset, offset + length)` of the source assigned to one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub offset: u64,
    pub length: u64,
}

impl ChunkSpan {
    pub fn new(offset: u64, length: u64) -> Self {
        ChunkSpan { offset, length }
    }

    /// Exclusive end of the span.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

impl fmt::Display for ChunkSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// Chunk count decision. Injected into the sorter so the count can be made independent of the
/// runtime memory state.
pub trait ChunkPolicy: Send + Sync {
    /// Returns the number of chunks a source of `source_size` bytes is split into when
    /// `concurrency` chunks are held in memory at the same time.
    fn chunk_count(&self, source_size: u64, concurrency: usize) -> usize;
}

/// Sizes chunks against the memory currently available on the machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct AvailableMemory;

impl AvailableMemory {
    /// Queries the memory available to new allocations.
    pub fn query() -> u64 {
        let mut system = System::new();
        system.refresh_memory();
        system.available_memory()
    }
}

impl ChunkPolicy for AvailableMemory {
    fn chunk_count(&self, source_size: u64, concurrency: usize) -> usize {
        let available = Self::query();
        log::info!("available memory: {}", ByteSize(available));

        MemoryBudget::new(available).chunk_count(source_size, concurrency)
    }
}

/// Sizes chunks against a fixed memory budget.
#[derive(Debug, Clone, Copy)]
pub struct MemoryBudget {
    limit: u64,
}

impl MemoryBudget {
    pub fn new(limit: u64) -> Self {
        MemoryBudget { limit }
    }
}

impl ChunkPolicy for MemoryBudget {
    fn chunk_count(&self, source_size: u64, concurrency: usize) -> usize {
        let per_chunk = self.limit / concurrency.max(1) as u64;
        chunk_count_for_memory(source_size, per_chunk)
    }
}

/// Always splits the source into the same number of chunks.
#[derive(Debug, Clone, Copy)]
pub struct FixedChunks(pub usize);

impl ChunkPolicy for FixedChunks {
    fn chunk_count(&self, _source_size: u64, _concurrency: usize) -> usize {
        self.0
    }
}

/// Computes `max(1, floor(source_size / (available_memory * SAFETY_FACTOR)))`.
pub fn chunk_count_for_memory(source_size: u64, available_memory: u64) -> usize {
    let budget = (available_memory as f64 * SAFETY_FACTOR).max(1.0);
    let count = (source_size as f64 / budget).floor();

    // float to int casts saturate
    (count as usize).max(1)
}

/// Splits `source_size` bytes into `chunk_count` contiguous, non-overlapping spans.
///
/// Every span is `source_size / chunk_count` bytes long except the last one which also takes the
/// remainder. The count is clamped so that no span of a non-empty source is empty. An empty source
/// yields a single empty span.
pub fn plan_chunks(source_size: u64, chunk_count: usize) -> Vec<ChunkSpan> {
    let count = (chunk_count.max(1) as u64).min(source_size.max(1));
    let span_len = source_size / count;
    let remainder = source_size % count;

    let mut spans = Vec::with_capacity(count as usize);
    for idx in 0..count {
        let length = if idx == count - 1 { span_len + remainder } else { span_len };
        spans.push(ChunkSpan::new(idx * span_len, length));
    }

    return spans;
}
