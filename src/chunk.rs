//! Sorted chunk artifacts.

use std::cmp::Ordering;
use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use bytesize::ByteSize;
use log;
use tempfile::TempPath;

use crate::buffer::RecordBuffer;
use crate::lifecycle;
use crate::plan::ChunkSpan;
use crate::source::{self, SpanRecords};

/// Temporary file holding the records of one chunk in ascending order, one record per line.
///
/// Iterating the chunk reads the records back. The file is deleted as soon as the last record has
/// been read, or when the chunk is dropped, whichever comes first.
pub struct ChunkArtifact {
    reader: Option<io::BufReader<fs::File>>,
    path: Option<TempPath>,
    records: u64,
    buf: Vec<u8>,
}

impl ChunkArtifact {
    /// Builds a chunk creating a file in `dir` and dumping the records to it in iteration order.
    ///
    /// # Arguments
    /// * `dir` - Directory the chunk file is created in
    /// * `records` - Records to be dumped to the chunk
    /// * `buf_size` - File I/O buffer size
    pub fn build(dir: &Path, records: impl IntoIterator<Item = String>, buf_size: Option<usize>) -> io::Result<Self> {
        let (tmp_file, path) = lifecycle::create_temp(dir, "chunk-")?.into_parts();

        let mut chunk_writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufWriter::new(tmp_file.try_clone()?),
        };

        // on error `path` is dropped and the partial file goes with it
        let records = dump(&mut chunk_writer, records)?;
        chunk_writer.flush()?;
        drop(chunk_writer);

        let mut chunk_reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, tmp_file),
            None => io::BufReader::new(tmp_file),
        };
        chunk_reader.rewind()?;

        return Ok(ChunkArtifact {
            reader: Some(chunk_reader),
            path: Some(path),
            records,
            buf: Vec::new(),
        });
    }

    /// Number of records the chunk was built with.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Path of the chunk file, [`None`] once it has been deleted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn remove(&mut self) -> io::Result<()> {
        self.reader = None;
        match self.path.take() {
            Some(path) => lifecycle::remove_temp(path),
            None => Ok(()),
        }
    }
}

fn dump<W: Write>(chunk_writer: &mut W, records: impl IntoIterator<Item = String>) -> io::Result<u64> {
    let mut count = 0;
    for record in records.into_iter() {
        chunk_writer.write_all(record.as_bytes())?;
        chunk_writer.write_all(b"\n")?;
        count += 1;
    }

    return Ok(count);
}

impl Iterator for ChunkArtifact {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        match source::read_record(reader, &mut self.buf) {
            Ok(Some((record, _))) => Some(Ok(record)),
            Ok(None) => self.remove().err().map(Err),
            Err(err) => Some(Err(err)),
        }
    }
}

/// Sorts the records of one span of `source` in memory and saves them to a new chunk in `dir`.
///
/// The span is read through its own file handle, so spans of the same source can be sorted
/// independently of each other.
pub fn sort_chunk<F>(
    source: &Path,
    span: ChunkSpan,
    compare: F,
    dir: &Path,
    buf_size: Option<usize>,
) -> io::Result<ChunkArtifact>
where
    F: Fn(&str, &str) -> Ordering + Sync,
{
    let mut buffer = RecordBuffer::new();
    for record in SpanRecords::open(source, span, buf_size)? {
        buffer.push(record?);
    }

    log::debug!(
        "sorting chunk {} ({} records, ~{} in memory) ...",
        span,
        buffer.len(),
        ByteSize(buffer.mem_size())
    );
    buffer.sort_by(compare);

    log::debug!("saving chunk {}", span);
    ChunkArtifact::build(dir, buffer, buf_size)
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::{self, Write};

    use rstest::*;

    use super::{dump, sort_chunk, ChunkArtifact};
    use crate::plan::ChunkSpan;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn strings(records: &[&str]) -> Vec<String> {
        records.iter().map(|record| record.to_string()).collect()
    }

    #[rstest]
    fn test_chunk(tmp_dir: tempfile::TempDir) {
        let saved = strings(&["a", "", "b c", "d\r"]);

        let chunk = ChunkArtifact::build(tmp_dir.path(), saved.clone(), None).unwrap();
        assert_eq!(chunk.records(), 4);
        let path = chunk.path().unwrap().to_path_buf();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\n\nb c\nd\r\n");

        let restored: io::Result<Vec<String>> = chunk.collect();
        assert_eq!(restored.unwrap(), saved);
        assert!(!path.exists());
    }

    #[rstest]
    fn test_chunk_deleted_on_drop(tmp_dir: tempfile::TempDir) {
        let mut chunk = ChunkArtifact::build(tmp_dir.path(), strings(&["a", "b"]), Some(16)).unwrap();
        assert_eq!(chunk.next().unwrap().unwrap(), "a");

        drop(chunk);
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }

    #[rstest]
    #[case(ChunkSpan::new(0, 4), vec!["aa", "bb"])]
    #[case(ChunkSpan::new(4, 5), vec!["cc"])]
    fn test_sort_chunk(tmp_dir: tempfile::TempDir, #[case] span: ChunkSpan, #[case] expected: Vec<&str>) {
        let source = tmp_dir.path().join("source.txt");
        fs::write(&source, "bb\naa\ncc\n").unwrap();

        let chunk = sort_chunk(&source, span, |a: &str, b: &str| a.cmp(b), tmp_dir.path(), None).unwrap();
        let sorted: io::Result<Vec<String>> = chunk.collect();

        assert_eq!(sorted.unwrap(), expected);
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_dump_failure() {
        struct BrokenWriter;

        impl Write for BrokenWriter {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "device full"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let err = dump(&mut BrokenWriter, strings(&["a"])).unwrap_err();
        assert_eq!(err.to_string(), "device full");
    }
}
