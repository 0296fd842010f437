//! Line record reading.
//!
//! A record is the text of one line without its `\n` terminator. A `\r` before the terminator is
//! kept as part of the record so the record is written back unchanged.

use std::fs;
use std::io::{self, prelude::*, SeekFrom};
use std::path::Path;

use crate::plan::ChunkSpan;

/// Reads the next record into a new string.
/// Returns the record together with the number of raw bytes consumed, terminator included.
pub(crate) fn read_record<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<(String, u64)>> {
    buf.clear();
    let consumed = reader.read_until(b'\n', buf)?;
    if consumed == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }

    let record = std::str::from_utf8(buf)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
        .to_owned();

    return Ok(Some((record, consumed as u64)));
}

/// Records of the source owned by one chunk span.
///
/// A record belongs to the span its first byte falls into. A span starting in the middle of a record
/// skips forward to the next record start, and a span keeps yielding records while the running total
/// of bytes consumed from its offset is below the span length. The total accumulates across all
/// records read so far, so the last record may cross the span end but no record starts past it.
pub struct SpanRecords<R> {
    reader: R,
    position: u64,
    end: u64,
    buf: Vec<u8>,
}

impl SpanRecords<io::BufReader<fs::File>> {
    /// Opens a dedicated reader over `path` positioned at the first record of `span`.
    pub fn open(path: &Path, span: ChunkSpan, buf_size: Option<usize>) -> io::Result<Self> {
        let file = fs::File::open(path)?;
        let reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        Self::new(reader, span)
    }
}

impl<R: BufRead + Seek> SpanRecords<R> {
    pub fn new(mut reader: R, span: ChunkSpan) -> io::Result<Self> {
        let mut buf = Vec::new();
        let position = if span.offset == 0 {
            reader.seek(SeekFrom::Start(0))?;
            0
        } else {
            // the record crossing the offset belongs to the previous span
            reader.seek(SeekFrom::Start(span.offset - 1))?;
            span.offset - 1 + reader.read_until(b'\n', &mut buf)? as u64
        };

        Ok(SpanRecords {
            reader,
            position,
            end: span.end(),
            buf,
        })
    }

    /// Source position of the next record.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R: BufRead + Seek> Iterator for SpanRecords<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.end {
            return None;
        }

        match read_record(&mut self.reader, &mut self.buf) {
            Ok(Some((record, consumed))) => {
                self.position += consumed;
                Some(Ok(record))
            }
            Ok(None) => {
                self.end = self.position;
                None
            }
            Err(err) => Some(Err(err)),
        }
    }
}
