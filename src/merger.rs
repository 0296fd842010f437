//! Binary heap merger.

use std::cmp::Ordering;
use std::io::{self, prelude::*};
use std::path::Path;

use log;

use crate::chunk::ChunkArtifact;
use crate::lifecycle::{self, TempArtifact};

/// Current head record of one input.
struct Head {
    record: String,
    source: usize,
}

/// Min-heap of input heads ordered by a single comparator shared by all entries.
/// Equal records keep no particular order among each other.
struct Frontier<F> {
    heads: Vec<Head>,
    compare: F,
}

impl<F> Frontier<F>
where
    F: Fn(&str, &str) -> Ordering,
{
    fn with_capacity(capacity: usize, compare: F) -> Self {
        Frontier {
            heads: Vec::with_capacity(capacity),
            compare,
        }
    }

    fn less(&self, a: usize, b: usize) -> bool {
        (self.compare)(&self.heads[a].record, &self.heads[b].record) == Ordering::Less
    }

    fn push(&mut self, head: Head) {
        self.heads.push(head);

        let mut idx = self.heads.len() - 1;
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent) {
                break;
            }
            self.heads.swap(idx, parent);
            idx = parent;
        }
    }

    fn pop(&mut self) -> Option<Head> {
        if self.heads.is_empty() {
            return None;
        }
        let last = self.heads.len() - 1;
        self.heads.swap(0, last);
        let head = self.heads.pop();

        let mut idx = 0;
        loop {
            let left = 2 * idx + 1;
            if left >= self.heads.len() {
                break;
            }
            let right = left + 1;
            let smallest = if right < self.heads.len() && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(smallest, idx) {
                break;
            }
            self.heads.swap(idx, smallest);
            idx = smallest;
        }

        return head;
    }
}

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of records,
/// *n* is the number of chunks (inputs).
///
/// An input is dropped as soon as it runs out of records. After the first error the merger yields
/// nothing more.
pub struct BinaryHeapMerger<C, F>
where
    C: Iterator<Item = io::Result<String>>,
    F: Fn(&str, &str) -> Ordering,
{
    frontier: Frontier<F>,
    chunks: Vec<Option<C>>,
    initiated: bool,
    failed: bool,
}

impl<C, F> BinaryHeapMerger<C, F>
where
    C: Iterator<Item = io::Result<String>>,
    F: Fn(&str, &str) -> Ordering,
{
    /// Creates an instance of a binary heap merger using chunks as inputs.
    /// Chunk records should be sorted in ascending `compare` order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `chunks` - Chunks to be merged in a single sorted one
    /// * `compare` - Function to be used to compare records
    pub fn new<I>(chunks: I, compare: F) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let chunks = Vec::from_iter(chunks.into_iter().map(Some));
        let frontier = Frontier::with_capacity(chunks.len(), compare);

        return BinaryHeapMerger {
            chunks,
            frontier,
            initiated: false,
            failed: false,
        };
    }

    /// Pulls the next record of input `idx` into the frontier, retiring the input when it is exhausted.
    fn advance(&mut self, idx: usize) -> io::Result<()> {
        let next = match self.chunks[idx].as_mut() {
            Some(chunk) => chunk.next(),
            None => None,
        };

        match next {
            Some(Ok(record)) => self.frontier.push(Head { record, source: idx }),
            Some(Err(err)) => return Err(err),
            None => {
                log::trace!("input {} exhausted", idx);
                self.chunks[idx] = None;
            }
        }

        return Ok(());
    }
}

impl<C, F> Iterator for BinaryHeapMerger<C, F>
where
    C: Iterator<Item = io::Result<String>>,
    F: Fn(&str, &str) -> Ordering,
{
    type Item = io::Result<String>;

    /// Returns the next record from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if !self.initiated {
            self.initiated = true;
            for idx in 0..self.chunks.len() {
                if let Err(err) = self.advance(idx) {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }

        let head = self.frontier.pop()?;
        if let Err(err) = self.advance(head.source) {
            self.failed = true;
            return Some(Err(err));
        }

        return Some(Ok(head.record));
    }
}

/// Merges sorted inputs into `writer`, one record per line.
/// Returns the number of records written.
///
/// The inputs are consumed: each is dropped once exhausted, the rest when the merge stops.
pub fn merge_into<C, F, W>(chunks: Vec<C>, compare: F, writer: &mut W) -> io::Result<u64>
where
    C: Iterator<Item = io::Result<String>>,
    F: Fn(&str, &str) -> Ordering,
    W: Write,
{
    let mut records = 0;
    for record in BinaryHeapMerger::new(chunks, compare) {
        writer.write_all(record?.as_bytes())?;
        writer.write_all(b"\n")?;
        records += 1;
    }
    writer.flush()?;

    return Ok(records);
}

/// Merges the chunks into a new temporary file created in `dir`.
///
/// Every chunk is deleted whether the merge succeeds or not. On failure the partially written
/// output is deleted as well.
pub fn merge_chunks<F>(
    chunks: Vec<ChunkArtifact>,
    compare: F,
    dir: &Path,
    buf_size: Option<usize>,
) -> io::Result<TempArtifact>
where
    F: Fn(&str, &str) -> Ordering,
{
    let (output_file, path) = lifecycle::create_temp(dir, "sorted-")?.into_parts();
    let mut output_writer = match buf_size {
        Some(buf_size) => io::BufWriter::with_capacity(buf_size, output_file),
        None => io::BufWriter::new(output_file),
    };

    log::debug!("merging {} chunks into {}", chunks.len(), path.display());
    let records = merge_into(chunks, compare, &mut output_writer)?;
    drop(output_writer);

    return Ok(TempArtifact::new(path, records));
}

#[cfg(test)]
mod test {
    use std::error::Error;
    use std::fs;
    use std::io::{self, ErrorKind, Write};

    use rand::seq::SliceRandom;
    use rstest::*;

    use super::{merge_chunks, merge_into, BinaryHeapMerger, Frontier, Head};
    use crate::chunk::ChunkArtifact;

    fn ok(records: &[&str]) -> Vec<io::Result<String>> {
        records.iter().map(|record| Ok(record.to_string())).collect()
    }

    fn test_error() -> io::Error {
        io::Error::new(ErrorKind::Other, "test error")
    }

    #[test]
    fn test_frontier() {
        let mut keys = Vec::from_iter(0..200);
        keys.shuffle(&mut rand::thread_rng());

        let mut frontier = Frontier::with_capacity(keys.len(), |a: &str, b: &str| {
            a.parse::<i32>().unwrap().cmp(&b.parse::<i32>().unwrap())
        });
        for (source, key) in keys.into_iter().enumerate() {
            frontier.push(Head {
                record: key.to_string(),
                source,
            });
        }

        let popped = Vec::from_iter(std::iter::from_fn(|| frontier.pop()).map(|head| head.record));
        assert_eq!(popped, Vec::from_iter((0..200).map(|key| key.to_string())));
    }

    #[rstest]
    #[case(
        vec![],
        vec![],
    )]
    #[case(
        vec![
            vec![],
            vec![]
        ],
        vec![],
    )]
    #[case(
        vec![
            ok(&["d", "e", "g"]),
            ok(&["a", "f"]),
            ok(&["c"]),
            vec![],
        ],
        ok(&["a", "c", "d", "e", "f", "g"]),
    )]
    #[case(
        vec![
            ok(&["b", "b"]),
            ok(&["a", "b", "c"]),
        ],
        ok(&["a", "b", "b", "b", "c"]),
    )]
    #[case(
        vec![
            vec![Err(test_error())]
        ],
        vec![
            Err(test_error())
        ],
    )]
    #[case(
        vec![
            vec![Ok("c".to_string()), Err(test_error())],
            ok(&["a", "b"]),
        ],
        vec![
            Ok("a".to_string()),
            Ok("b".to_string()),
            Err(test_error()),
        ],
    )]
    #[case(
        vec![
            vec![Err(test_error())],
            ok(&["a", "b"]),
        ],
        vec![
            Err(test_error()),
        ],
    )]
    fn test_merger(#[case] chunks: Vec<Vec<io::Result<String>>>, #[case] expected_result: Vec<io::Result<String>>) {
        let merger = BinaryHeapMerger::new(chunks.into_iter().map(|chunk| chunk.into_iter()), |a: &str, b: &str| {
            a.cmp(b)
        });
        let actual_result: Vec<io::Result<String>> = merger.collect();
        assert!(
            compare_vectors_of_result::<_, io::Error>(&actual_result, &expected_result),
            "actual={:?}, expected={:?}",
            actual_result,
            expected_result
        );
    }

    #[test]
    fn test_merger_reversed() {
        let chunks = vec![ok(&["c", "a"]), ok(&["d", "b"])];
        let merger = BinaryHeapMerger::new(chunks.into_iter().map(|chunk| chunk.into_iter()), |a: &str, b: &str| {
            a.cmp(b).reverse()
        });

        let actual: io::Result<Vec<String>> = merger.collect();
        assert_eq!(actual.unwrap(), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn test_merge_chunks() {
        let tmp_dir = tempfile::tempdir_in("./").unwrap();
        let chunks = vec![
            ChunkArtifact::build(tmp_dir.path(), vec!["bb".to_string(), "dd".to_string()], None).unwrap(),
            ChunkArtifact::build(tmp_dir.path(), vec!["aa".to_string(), "cc".to_string()], None).unwrap(),
        ];

        let output = merge_chunks(chunks, |a: &str, b: &str| a.cmp(b), tmp_dir.path(), None).unwrap();

        assert_eq!(output.records(), 4);
        assert_eq!(fs::read_to_string(output.path()).unwrap(), "aa\nbb\ncc\ndd\n");
        // only the output survives the merge
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_merge_read_failure_removes_output() {
        let tmp_dir = tempfile::tempdir_in("./").unwrap();
        let corrupted = ChunkArtifact::build(
            tmp_dir.path(),
            vec!["bb".to_string(), "dd".to_string(), "ff".to_string()],
            None,
        )
        .unwrap();
        // the reader has not buffered anything yet, so it sees the rewritten content
        fs::write(corrupted.path().unwrap(), b"bb\ndd\n\xff\n").unwrap();
        let chunks = vec![
            corrupted,
            ChunkArtifact::build(
                tmp_dir.path(),
                vec!["aa".to_string(), "cc".to_string(), "ee".to_string(), "gg".to_string()],
                None,
            )
            .unwrap(),
        ];

        let err = merge_chunks(chunks, |a: &str, b: &str| a.cmp(b), tmp_dir.path(), None).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_merge_write_failure_removes_chunks() {
        struct FailingWriter {
            budget: usize,
        }

        impl Write for FailingWriter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                if self.budget < buf.len() {
                    return Err(io::Error::new(ErrorKind::Other, "simulated write error"));
                }
                self.budget -= buf.len();
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let tmp_dir = tempfile::tempdir_in("./").unwrap();
        let records = |range: std::ops::Range<u32>| Vec::from_iter(range.map(|n| format!("{:04}", n)));
        let chunks = vec![
            ChunkArtifact::build(tmp_dir.path(), records(0..50), None).unwrap(),
            ChunkArtifact::build(tmp_dir.path(), records(50..100), None).unwrap(),
            ChunkArtifact::build(tmp_dir.path(), records(100..150), None).unwrap(),
        ];
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 3);

        let mut writer = FailingWriter { budget: 100 };
        let err = merge_into(chunks, |a: &str, b: &str| a.cmp(b), &mut writer).unwrap_err();

        assert_eq!(err.to_string(), "simulated write error");
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }

    fn compare_vectors_of_result<T: PartialEq, E: Error + 'static>(
        actual: &Vec<Result<T, E>>,
        expected: &Vec<Result<T, E>>,
    ) -> bool {
        actual.len() == expected.len()
            && actual
                .into_iter()
                .zip(expected)
                .all(
                    |(actual_result, expected_result)| match (actual_result, expected_result) {
                        (Ok(actual_result), Ok(expected_result)) if actual_result == expected_result => true,
                        (Err(actual_err), Err(expected_err)) => actual_err.to_string() == expected_err.to_string(),
                        _ => false,
                    },
                )
    }
}
