//! In-memory record buffer of one chunk.

use std::cmp::Ordering;
use std::mem;

use rayon;
use rayon::slice::ParallelSliceMut;

/// Records of one chunk held in memory while they are being sorted.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    mem_size: u64,
    inner: Vec<String>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        RecordBuffer::default()
    }

    /// Adds a new record to the buffer.
    pub fn push(&mut self, record: String) {
        self.mem_size += (mem::size_of::<String>() + record.capacity()) as u64;
        self.inner.push(record);
    }

    /// Returns the number of buffered records.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Estimated heap footprint of the buffered records.
    pub fn mem_size(&self) -> u64 {
        self.mem_size
    }

    /// Sorts the records in ascending `compare` order.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: Fn(&str, &str) -> Ordering + Sync,
    {
        self.par_sort_by(|a: &String, b: &String| compare(a, b));
    }
}

impl IntoIterator for RecordBuffer {
    type Item = String;
    type IntoIter = <Vec<String> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl rayon::slice::ParallelSliceMut<String> for RecordBuffer {
    fn as_parallel_slice_mut(&mut self) -> &mut [String] {
        self.inner.as_mut_slice()
    }
}
