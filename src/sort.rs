//! External sorter.

use log;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Instant;

use bytesize::ByteSize;
use rayon::prelude::*;

use crate::chunk::{self, ChunkArtifact};
use crate::error::{Error, Result};
use crate::lifecycle::{ScratchDir, ScratchStorage, TempArtifact};
use crate::merger;
use crate::plan::{self, AvailableMemory, ChunkPolicy, FixedChunks, MemoryBudget};

/// Sorting needs this many times the source size on the scratch filesystem:
/// room for the chunks and for the output.
pub const DISK_USAGE_FACTOR: u64 = 3;

/// Phase of one sort invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Planning,
    Chunking,
    Merging,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Planning => "planning",
            Phase::Chunking => "chunking",
            Phase::Merging => "merging",
        };
        f.write_str(name)
    }
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Default)]
pub struct ExternalSorterBuilder {
    /// Number of threads to be used to sort chunks in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Chunk count decision.
    chunk_policy: Option<Box<dyn ChunkPolicy>>,
    /// Scratch storage overriding `tmp_dir`.
    scratch: Option<Box<dyn ScratchStorage>>,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter> {
        let scratch: Box<dyn ScratchStorage> = match (self.scratch, self.tmp_dir) {
            (Some(scratch), _) => scratch,
            (None, Some(tmp_dir)) => Box::new(ScratchDir::new(tmp_dir.to_path_buf())),
            (None, None) => Box::new(ScratchDir::default()),
        };

        ExternalSorter::new(
            self.threads_number,
            scratch,
            self.chunk_policy.unwrap_or_else(|| Box::new(AvailableMemory)),
            self.rw_buf_size,
        )
    }

    /// Sets number of threads to be used to sort chunks in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets chunk read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sizes chunks against a fixed memory budget instead of the memory currently available.
    pub fn with_memory_limit(self, limit: u64) -> ExternalSorterBuilder {
        self.with_chunk_policy(MemoryBudget::new(limit))
    }

    /// Splits every source into exactly `chunks_number` chunks (fewer for tiny sources).
    pub fn with_chunks_number(self, chunks_number: usize) -> ExternalSorterBuilder {
        self.with_chunk_policy(FixedChunks(chunks_number))
    }

    /// Sets the chunk count policy.
    pub fn with_chunk_policy(mut self, policy: impl ChunkPolicy + 'static) -> ExternalSorterBuilder {
        self.chunk_policy = Some(Box::new(policy));
        return self;
    }

    /// Sets the scratch storage. Takes precedence over [`ExternalSorterBuilder::with_tmp_dir`].
    pub fn with_scratch(mut self, scratch: impl ScratchStorage + 'static) -> ExternalSorterBuilder {
        self.scratch = Some(Box::new(scratch));
        return self;
    }
}

/// External sorter of line files.
pub struct ExternalSorter {
    /// Chunk sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Storage of temporary data.
    scratch: Box<dyn ScratchStorage>,
    /// Chunk count decision.
    chunk_policy: Box<dyn ChunkPolicy>,
    /// Chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of chunks sorted in parallel. If the parameter is [`None`] chunks are
    ///   sorted one after another.
    /// * `scratch` - Storage of temporary data.
    /// * `chunk_policy` - Decides how many chunks a source is split into.
    /// * `rw_buf_size` - Chunks file read/write buffer size.
    pub fn new(
        threads_number: Option<usize>,
        scratch: Box<dyn ScratchStorage>,
        chunk_policy: Box<dyn ChunkPolicy>,
        rw_buf_size: Option<usize>,
    ) -> Result<Self> {
        if rw_buf_size == Some(0) {
            return Err(Error::configuration("read/write buffer size must be positive"));
        }
        if !scratch.dir().is_dir() {
            return Err(Error::configuration(format!(
                "temporary directory {} does not exist",
                scratch.dir().display()
            )));
        }

        log::info!("using {} as a temporary directory", scratch.dir().display());

        return Ok(ExternalSorter {
            thread_pool: Self::init_thread_pool(threads_number)?,
            scratch,
            chunk_policy,
            rw_buf_size,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool> {
        let threads_number = threads_number.unwrap_or(1);
        if threads_number == 0 {
            return Err(Error::configuration("threads number must be positive"));
        }

        log::info!("initializing thread-pool (threads: {})", threads_number);
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads_number)
            .build()
            .map_err(Error::ThreadPoolBuildError)?;

        return Ok(thread_pool);
    }

    /// Sorts the lines of `source` in lexicographic order.
    /// Returns a new temporary file holding the sorted lines.
    ///
    /// # Arguments
    /// * `source` - File to be sorted
    pub fn sort(&self, source: &Path) -> Result<TempArtifact> {
        self.sort_by(source, |a: &str, b: &str| a.cmp(b))
    }

    /// Sorts the lines of `source` using a custom compare function.
    /// Returns a new temporary file holding the sorted lines, deleted when dropped unless persisted.
    ///
    /// Equal lines end up adjacent in no particular order. On error no temporary file created by
    /// this call is left behind.
    ///
    /// # Arguments
    /// * `source` - File to be sorted
    /// * `compare` - Function to be used to compare lines
    pub fn sort_by<F>(&self, source: &Path, compare: F) -> Result<TempArtifact>
    where
        F: Fn(&str, &str) -> Ordering + Sync + Send + Copy,
    {
        let started = Instant::now();
        let mut phase = Phase::Planning;

        let result = self.run(source, compare, &mut phase);
        match &result {
            Ok(output) => log::info!(
                "sorted {} records of {} in {:.3} sec",
                output.records(),
                source.display(),
                started.elapsed().as_secs_f64()
            ),
            Err(err) => log::error!("sorting {} failed while {}: {}", source.display(), phase, err),
        }

        return result;
    }

    fn run<F>(&self, source: &Path, compare: F, phase: &mut Phase) -> Result<TempArtifact>
    where
        F: Fn(&str, &str) -> Ordering + Sync + Send + Copy,
    {
        let source_size = fs::metadata(source)?.len();
        self.check_scratch_space(source_size)?;

        let concurrency = self.thread_pool.current_num_threads();
        let chunk_count = self.chunk_policy.chunk_count(source_size, concurrency);
        let spans = plan::plan_chunks(source_size, chunk_count);
        log::info!("sorting {} in {} chunks", ByteSize(source_size), spans.len());

        *phase = Phase::Chunking;
        // removed with everything left in it however this call ends
        let workspace = tempfile::Builder::new()
            .prefix("ext-line-sort-")
            .tempdir_in(self.scratch.dir())
            .map_err(Error::TempDir)?;

        let chunks: Vec<ChunkArtifact> = self.thread_pool.install(|| {
            spans
                .par_iter()
                .map(|span| chunk::sort_chunk(source, *span, compare, workspace.path(), self.rw_buf_size))
                .collect::<std::io::Result<Vec<ChunkArtifact>>>()
        })?;
        log::debug!("external sort preparation done");

        *phase = Phase::Merging;
        let output = merger::merge_chunks(chunks, compare, self.scratch.dir(), self.rw_buf_size)?;

        if let Err(err) = workspace.close() {
            log::warn!("temporary directory not removed: {}", err);
        }

        return Ok(output);
    }

    /// Fails before anything is written if the scratch filesystem cannot hold the chunks and the output.
    fn check_scratch_space(&self, source_size: u64) -> Result<()> {
        let required = source_size.saturating_mul(DISK_USAGE_FACTOR);
        match self.scratch.usable_space() {
            Some(available) if required > available => Err(Error::ResourceExhaustion { required, available }),
            Some(_) => Ok(()),
            None => {
                log::warn!(
                    "usable space of {} unknown, sorting without a space check",
                    self.scratch.dir().display()
                );
                Ok(())
            }
        }
    }
}
