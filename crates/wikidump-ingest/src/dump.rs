//! Line-oriented reader for Wikidata JSON dumps
//!
//! The dumps are one JSON array with one entity per line:
//!
//! ```text
//! [
//! {"type":"item","id":"Q1",...},
//! {"type":"item","id":"Q8",...}
//! ]
//! ```
//!
//! [`DumpReader`] yields each entity payload without its trailing comma,
//! numbered by 1-based entity position. Bracket and blank lines are skipped
//! and do not count as positions.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::debug;

const READ_BUFFER_SIZE: usize = 1 << 20;

/// Iterator over `(position, payload)` pairs of a dump
pub struct DumpReader<R> {
    reader: R,
    position: u64,
    buffer: Vec<u8>,
}

impl DumpReader<Box<dyn BufRead + Send>> {
    /// Open a dump file, decompressing it when the name ends in `.gz`
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let compressed = path.extension().is_some_and(|ext| ext == "gz");
        debug!(path = %path.display(), compressed, "Opening dump");

        let reader: Box<dyn BufRead + Send> = if compressed {
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
        };
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
            buffer: Vec::new(),
        }
    }

    /// Position of the last entity read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Consume entities until the next one read has position `position`
    ///
    /// Returns how many entities were skipped.
    pub fn skip_to(&mut self, position: u64) -> io::Result<u64> {
        let mut skipped = 0;
        while self.position + 1 < position {
            if !self.next_entity_line()? {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Read lines until one holds an entity; leaves it trimmed in `buffer`
    fn next_entity_line(&mut self) -> io::Result<bool> {
        loop {
            self.buffer.clear();
            if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
                return Ok(false);
            }

            let (start, end) = entity_bounds(&self.buffer);
            let line = &self.buffer[start..end];
            if line.is_empty() || line == b"[" || line == b"]" {
                continue;
            }

            self.buffer.truncate(end);
            self.buffer.drain(..start);
            self.position += 1;
            return Ok(true);
        }
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = io::Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entity_line() {
            Ok(true) => Some(Ok((self.position, std::mem::take(&mut self.buffer)))),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Byte range of a line without surrounding whitespace and array separator
fn entity_bounds(line: &[u8]) -> (usize, usize) {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let mut end = line.len();
    while end > start && line[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    if end > start && line[end - 1] == b',' {
        end -= 1;
        while end > start && line[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
    }
    (start, end)
}
